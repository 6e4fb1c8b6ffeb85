use serde::Serialize;

use crate::cfn::{cfn_resource, LogicalId, Template};
use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SsmParameter {
    pub name: String,
    #[serde(rename = "Type")]
    pub ty: &'static str,
    pub value: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}
cfn_resource!(SsmParameter, "AWS::SSM::Parameter");

#[derive(Debug, Clone, Default)]
pub struct StringParam {
    /// logical id of the parameter resource
    pub id: String,
    /// full parameter path, eg: `/spaceinvaders/clientid`
    pub name: String,
    pub value: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterHandle {
    pub logical_id: LogicalId,
    pub name: String,
}

/// Parameter store wrapper. Remembers every parameter it created, in order.
///
/// Names are not checked for uniqueness. Two parameters with the same name
/// synthesize fine and only conflict once CloudFormation tries to create them.
#[derive(Debug, Default)]
pub struct Ssm {
    parameters: Vec<ParameterHandle>,
}

impl Ssm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_parameter(&mut self, template: &mut Template, param: StringParam) -> Result<ParameterHandle> {
        let logical_id = LogicalId::new(&param.id)?;
        let resource = SsmParameter {
            name: param.name.clone(),
            ty: "String",
            value: param.value,
            description: param.description.unwrap_or_default(),
        };
        template.add_resource(&logical_id, &resource)?;
        let handle = ParameterHandle { logical_id, name: param.name };
        self.parameters.push(handle.clone());
        Ok(handle)
    }

    pub fn parameters(&self) -> &[ParameterHandle] {
        &self.parameters
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }
}
