use serde::Serialize;
use serde_json::Value;

use crate::cfn::{cfn_resource, LogicalId, PolicyDocument, PolicyStatement, Template};
use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InlinePolicy {
    pub policy_name: String,
    pub policy_document: PolicyDocument,
}

impl InlinePolicy {
    pub fn new<S: Into<String>>(name: S, statements: Vec<PolicyStatement>) -> Self {
        Self {
            policy_name: name.into(),
            policy_document: PolicyDocument::new(statements),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Role {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
    pub assume_role_policy_document: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub managed_policy_arns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<InlinePolicy>,
}
cfn_resource!(Role, "AWS::IAM::Role");

/// a standalone policy attached to one or more roles by name.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Policy {
    pub policy_name: String,
    pub policy_document: PolicyDocument,
    pub roles: Vec<Value>,
}
cfn_resource!(Policy, "AWS::IAM::Policy");

/// grants `statements` to a role this stack does not own. The role is
/// referenced by name, so nothing about the role itself changes.
pub fn grant_to_external_role(
    template: &mut Template,
    id: &LogicalId,
    role_name: &str,
    statements: Vec<PolicyStatement>,
) -> Result<()> {
    let policy = Policy {
        policy_name: id.to_string(),
        policy_document: PolicyDocument::new(statements),
        roles: vec![Value::String(role_name.to_string())],
    };
    template.add_resource(id, &policy)?;
    Ok(())
}
