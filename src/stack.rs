use serde_json::Value;

use crate::cfn::{validate_stack_name, LogicalId, Template};
use crate::config::AppConfig;
use crate::error::Result;
use crate::layers::{ConfigurationLayer, IngestionConsumptionLayer, IngestionConsumptionProps, StorageLayer};

/// builds the whole backend template: storage, then configuration, then the
/// API and ingestion pipeline that use both.
pub fn synthesize(config: &AppConfig) -> Result<Template> {
    config.validate()?;
    let app = &config.application_name;
    tracing::info!(application = %app, region = %config.region, "synthesizing stack");

    let mut template = Template::new(format!("Backend for the {app} game"));
    let storage = StorageLayer::new(&mut template, config)?;
    let configuration = ConfigurationLayer::new(&mut template, config)?;
    let raw_data_bucket_arn = storage.raw_data_bucket_arn();
    IngestionConsumptionLayer::new(&mut template, &IngestionConsumptionProps {
        config,
        ssm: &configuration.ssm,
        raw_data_bucket_arn: &raw_data_bucket_arn,
    })?;

    template.add_output(&LogicalId::new("AppBucket")?, "Bucket hosting the game client",
        Value::String(storage.app_bucket.bucket_name().to_string()));
    template.add_output(&LogicalId::new("RawDataBucketArn")?, "Bucket the input stream is delivered into",
        Value::String(raw_data_bucket_arn));

    tracing::info!(resources = template.resources.len(), outputs = template.outputs.len(), "synthesized stack");
    Ok(template)
}

pub fn stack_name(config: &AppConfig) -> Result<String> {
    let name = config.stack_name();
    validate_stack_name(&name)?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::error::Error;

    #[test]
    fn synthesizes_with_outputs() {
        let template = synthesize(&test_config()).unwrap();
        let mut keys: Vec<_> = template.outputs.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, ["ApiUrl", "AppBucket", "RawDataBucketArn"]);
        assert_eq!(template.outputs["AppBucket"].value, "spaceinvaders.app");
        assert_eq!(template.outputs["RawDataBucketArn"].value, "arn:aws:s3:::spaceinvaders.raw");
        assert_eq!(template.description.as_deref(), Some("Backend for the SpaceInvaders game"));
    }

    #[test]
    fn invalid_config_is_rejected_before_anything_is_built() {
        let mut config = test_config();
        config.region = "moon-east-1".into();
        assert!(matches!(synthesize(&config), Err(Error::InvalidRegion(..))));
    }

    #[test]
    fn stack_name_defaults_to_application_name() {
        let mut config = test_config();
        assert_eq!(stack_name(&config).unwrap(), "SpaceInvaders");
        config.stack_name = Some("space-invaders-dev".into());
        assert_eq!(stack_name(&config).unwrap(), "space-invaders-dev");
        config.stack_name = Some("bad_name".into());
        assert!(stack_name(&config).is_err());
    }
}
