use std::collections::BTreeMap;

use crate::cfn::Template;
use crate::config::AppConfig;
use crate::error::Result;
use crate::resources::{ParameterHandle, Ssm, StringParam};

/// Parameter store entries for every `[[ssm_parameters]]` in the config.
#[derive(Debug, Default)]
pub struct ConfigurationLayer {
    pub ssm: Ssm,
    /// config key -> created parameter
    pub parameters: BTreeMap<String, ParameterHandle>,
}

impl ConfigurationLayer {
    pub fn new(template: &mut Template, config: &AppConfig) -> Result<Self> {
        let app = &config.application_name;
        let base_name = format!("/{}", config.app_lowercase());
        let mut layer = Self::default();
        for param in &config.ssm_parameters {
            let handle = layer.ssm.add_parameter(template, StringParam {
                id: format!("SSMParameter{app}{}", param.key),
                name: format!("{base_name}/{}", param.key.to_lowercase()),
                value: param.value.clone(),
                description: param.description.clone(),
            })?;
            layer.parameters.insert(param.key.clone(), handle);
        }
        tracing::info!(parameters = layer.parameters.len(), "configuration layer ready");
        Ok(layer)
    }

    pub fn parameter(&self, key: &str) -> Option<&ParameterHandle> {
        self.parameters.get(key)
    }
}
