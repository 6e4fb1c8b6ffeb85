use serde::Serialize;

use crate::cfn::{arn_s3_bucket, cfn_resource, LogicalId, RemovalPolicy, Template};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct WebsiteConfiguration {
    pub index_document: String,
    pub error_document: String,
}

impl Default for WebsiteConfiguration {
    fn default() -> Self {
        Self {
            index_document: "index.html".into(),
            error_document: "error.html".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CorsRule {
    pub allowed_headers: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CorsConfiguration {
    pub cors_rules: Vec<CorsRule>,
}

impl CorsConfiguration {
    /// any origin, any header, GET/PUT/DELETE/POST.
    pub fn permissive() -> Self {
        Self {
            cors_rules: vec![CorsRule {
                allowed_headers: vec!["*".into()],
                allowed_methods: ["GET", "PUT", "DELETE", "POST"].iter().map(|m| m.to_string()).collect(),
                allowed_origins: vec!["*".into()],
            }],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct S3Bucket {
    pub bucket_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors_configuration: Option<CorsConfiguration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_configuration: Option<WebsiteConfiguration>,
}
cfn_resource!(S3Bucket, "AWS::S3::Bucket");

/// A bucket the rest of the stack can point at. Imported buckets exist
/// outside of this stack, so nothing about them is declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketRef {
    Imported { bucket_name: String },
    Declared { logical_id: LogicalId, bucket_name: String },
}

impl BucketRef {
    pub fn bucket_name(&self) -> &str {
        match self {
            BucketRef::Imported { bucket_name } | BucketRef::Declared { bucket_name, .. } => bucket_name,
        }
    }

    /// bucket names are physical names, so the ARN is known without a `Ref`.
    pub fn arn(&self) -> String {
        arn_s3_bucket(self.bucket_name())
    }

    pub fn logical_id(&self) -> Option<&LogicalId> {
        match self {
            BucketRef::Imported { .. } => None,
            BucketRef::Declared { logical_id, .. } => Some(logical_id),
        }
    }

    pub fn is_imported(&self) -> bool {
        matches!(self, BucketRef::Imported { .. })
    }
}

pub fn verify_bucket_name(bucket_name: &str) -> Result<()> {
    let invalid = |reason| Err(Error::InvalidBucketName { name: bucket_name.to_string(), reason });
    if bucket_name.len() > 63 || bucket_name.len() < 3 {
        return invalid("Must be between 3 and 63 characters");
    }
    let valid_char_check = |c: char| -> bool {
        c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-'
    };
    if !bucket_name.chars().all(valid_char_check) {
        return invalid("May only contain lowercase letters, numbers, dots, and dashes");
    }
    let first_ok = bucket_name.chars().next().map_or(false, |c| c.is_ascii_alphanumeric());
    let last_ok = bucket_name.chars().last().map_or(false, |c| c.is_ascii_alphanumeric());
    if !first_ok || !last_ok {
        return invalid("First and last character must be either lowercase letter, or number");
    }
    if bucket_name.contains("..") {
        return invalid("May not contain two consecutive dots");
    }
    Ok(())
}

/// references a bucket that already exists. No properties are applied to it.
pub fn import_bucket(bucket_name: &str) -> BucketRef {
    tracing::info!(bucket = bucket_name, arn = %arn_s3_bucket(bucket_name), "importing existing bucket");
    BucketRef::Imported { bucket_name: bucket_name.to_string() }
}

/// a bucket set up for static website hosting with permissive CORS.
/// Retained on removal unless told otherwise.
pub fn web_bucket(template: &mut Template, bucket_name: &str, removal_policy: Option<RemovalPolicy>) -> Result<BucketRef> {
    let bucket = S3Bucket {
        bucket_name: bucket_name.to_string(),
        cors_configuration: Some(CorsConfiguration::permissive()),
        website_configuration: Some(WebsiteConfiguration::default()),
    };
    declare(template, bucket, removal_policy.unwrap_or(RemovalPolicy::Retain))
}

pub fn plain_bucket(template: &mut Template, bucket_name: &str, removal_policy: RemovalPolicy) -> Result<BucketRef> {
    let bucket = S3Bucket {
        bucket_name: bucket_name.to_string(),
        ..Default::default()
    };
    declare(template, bucket, removal_policy)
}

fn declare(template: &mut Template, bucket: S3Bucket, removal_policy: RemovalPolicy) -> Result<BucketRef> {
    verify_bucket_name(&bucket.bucket_name)?;
    let logical_id = LogicalId::new(&bucket.bucket_name)?;
    template.add_resource(&logical_id, &bucket)?
        .apply_removal_policy(removal_policy);
    Ok(BucketRef::Declared { logical_id, bucket_name: bucket.bucket_name })
}
