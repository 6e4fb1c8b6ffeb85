use crate::cfn::{arn_s3_bucket, RemovalPolicy, Template};
use crate::config::AppConfig;
use crate::error::Result;
use crate::resources::{import_bucket, plain_bucket, web_bucket, BucketRef};

#[derive(Debug, Clone)]
pub struct BucketCreationProps<'a> {
    pub bucket_name: &'a str,
    pub is_web: bool,
    pub already_exists: bool,
    pub retain: bool,
}

/// Imports the bucket if it already exists, otherwise declares a web or
/// plain bucket.
///
/// An imported bucket is left exactly as it is, even when `is_web` is set:
/// no website or CORS configuration gets applied to it.
pub fn create_bucket(template: &mut Template, props: &BucketCreationProps) -> Result<BucketRef> {
    if props.already_exists {
        return Ok(import_bucket(props.bucket_name));
    }
    if props.is_web {
        // `retain` only applies to plain buckets. web buckets keep their default.
        return web_bucket(template, props.bucket_name, None);
    }
    let removal_policy = if props.retain { RemovalPolicy::Retain } else { RemovalPolicy::Destroy };
    plain_bucket(template, props.bucket_name, removal_policy)
}

#[derive(Debug)]
pub struct StorageLayer {
    pub app_bucket: BucketRef,
    pub raw_data_bucket: BucketRef,
}

impl StorageLayer {
    pub fn new(template: &mut Template, config: &AppConfig) -> Result<Self> {
        let app_bucket_name = app_bucket_name(config);
        let raw_data_bucket_name = raw_data_bucket_name(config);
        let exists = |name: &str| config.existing_buckets.iter().any(|b| b == name);

        let app_bucket = create_bucket(template, &BucketCreationProps {
            bucket_name: &app_bucket_name,
            is_web: true,
            already_exists: exists(&app_bucket_name),
            retain: true,
        })?;
        let raw_data_bucket = create_bucket(template, &BucketCreationProps {
            bucket_name: &raw_data_bucket_name,
            is_web: false,
            already_exists: exists(&raw_data_bucket_name),
            retain: true,
        })?;
        tracing::info!(
            app_bucket = app_bucket.bucket_name(),
            app_bucket_imported = app_bucket.is_imported(),
            raw_data_bucket = raw_data_bucket.bucket_name(),
            raw_data_bucket_imported = raw_data_bucket.is_imported(),
            "storage layer ready"
        );
        Ok(Self { app_bucket, raw_data_bucket })
    }

    pub fn raw_data_bucket_arn(&self) -> String {
        self.raw_data_bucket.arn()
    }
}

pub fn app_bucket_name(config: &AppConfig) -> String {
    format!("{}.app", config.app_lowercase())
}

pub fn raw_data_bucket_name(config: &AppConfig) -> String {
    format!("{}.raw", config.app_lowercase())
}

/// known from the config alone, whether or not the bucket is declared by this stack.
pub fn raw_data_bucket_arn(config: &AppConfig) -> String {
    arn_s3_bucket(&raw_data_bucket_name(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfn::DeletionPolicy;
    use crate::config::test_config;

    #[test]
    fn three_way_policy() {
        let mut template = Template::default();
        let imported = create_bucket(&mut template, &BucketCreationProps {
            bucket_name: "some.web.bucket",
            is_web: true,
            already_exists: true,
            retain: true,
        }).unwrap();
        assert!(imported.is_imported());
        assert!(template.resources.is_empty());

        create_bucket(&mut template, &BucketCreationProps {
            bucket_name: "web.bucket",
            is_web: true,
            already_exists: false,
            retain: true,
        }).unwrap();
        let web = template.resource("webbucket").unwrap();
        assert!(web.properties.get("WebsiteConfiguration").is_some());

        create_bucket(&mut template, &BucketCreationProps {
            bucket_name: "scratch.bucket",
            is_web: false,
            already_exists: false,
            retain: false,
        }).unwrap();
        create_bucket(&mut template, &BucketCreationProps {
            bucket_name: "throwaway.web.bucket",
            is_web: true,
            already_exists: false,
            retain: false,
        }).unwrap();
        let web = template.resource("throwawaywebbucket").unwrap();
        assert_eq!(web.deletion_policy, Some(DeletionPolicy::Retain));
        assert_eq!(web.update_replace_policy, Some(DeletionPolicy::Retain));

        let plain = template.resource("scratchbucket").unwrap();
        assert!(plain.properties.get("WebsiteConfiguration").is_none());
        assert_eq!(plain.deletion_policy, Some(DeletionPolicy::Delete));
    }

    #[test]
    fn creates_app_and_raw_buckets() {
        let mut template = Template::default();
        let storage = StorageLayer::new(&mut template, &test_config()).unwrap();
        assert_eq!(storage.app_bucket.bucket_name(), "spaceinvaders.app");
        assert_eq!(storage.raw_data_bucket.logical_id().unwrap().as_str(), "spaceinvadersraw");
        assert_eq!(template.resources_of_type("AWS::S3::Bucket").count(), 2);
        assert_eq!(template.resource("spaceinvadersraw").unwrap().deletion_policy, Some(DeletionPolicy::Retain));
        assert_eq!(storage.raw_data_bucket_arn(), "arn:aws:s3:::spaceinvaders.raw");
    }

    #[test]
    fn existing_buckets_are_imported() {
        let mut config = test_config();
        config.existing_buckets = vec!["spaceinvaders.app".into(), "unrelated.bucket".into()];
        let mut template = Template::default();
        let storage = StorageLayer::new(&mut template, &config).unwrap();
        assert!(storage.app_bucket.is_imported());
        assert!(!storage.raw_data_bucket.is_imported());
        assert!(template.resource("spaceinvadersapp").is_none());
        assert_eq!(template.resources_of_type("AWS::S3::Bucket").count(), 1);
    }

    #[test]
    fn raw_bucket_arn_is_lowercase() {
        let mut config = test_config();
        config.application_name = "Foo".into();
        assert_eq!(raw_data_bucket_arn(&config), "arn:aws:s3:::foo.raw");
    }
}
