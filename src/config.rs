//! Application configuration, read from a TOML file.
//!
//! ```toml
//! application_name = "SpaceInvaders"
//! region = "us-east-1"
//! account_id = "123456789012"
//! existing_buckets = ["spaceinvaders.raw"]
//!
//! [features]
//! firehose = true
//!
//! [references]
//! user_pool_arn = "arn:aws:cognito-idp:us-east-1:123456789012:userpool/us-east-1_abc"
//! players_role = "SpaceInvadersPlayersRole"
//!
//! [[ssm_parameters]]
//! key = "ClientId"
//! value = "4tfe5l26kdp59tc4k4v0b688nm"
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::cfn::validate_stack_name;
use crate::error::{Error, Result};
use crate::regions::verify_region;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub application_name: String,
    pub region: String,
    pub account_id: String,
    /// if empty, the application name is used as the stack name.
    #[serde(default)]
    pub stack_name: Option<String>,
    /// buckets that already exist in the account. these get imported
    /// by ARN instead of being created.
    #[serde(default)]
    pub existing_buckets: Vec<String>,
    #[serde(default)]
    pub features: StreamFeatures,
    #[serde(default)]
    pub references: References,
    /// order matters: it is the order the `/config` endpoint requests them in.
    #[serde(default)]
    pub ssm_parameters: Vec<SsmParameterConfig>,
}

/// optional parts of the ingestion pipeline.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub struct StreamFeatures {
    /// bind the scoreboard lambda to the input stream.
    #[serde(default)]
    pub kinesis_integration: bool,
    /// deliver the input stream into the raw data bucket.
    #[serde(default)]
    pub firehose: bool,
}

/// Resources that are managed outside of this stack.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct References {
    pub user_pool_arn: Option<String>,
    /// role names, not ARNs.
    pub players_role: Option<String>,
    pub managers_role: Option<String>,
    pub allocate_lambda_arn: Option<String>,
    pub deallocate_lambda_arn: Option<String>,
    pub scoreboard_lambda_arn: Option<String>,
    /// execution role of the scoreboard lambda. needs to read the input stream.
    pub scoreboard_lambda_role: Option<String>,
    /// table names, not ARNs.
    pub session_table: Option<String>,
    pub session_top_x_table: Option<String>,
}

fn required<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str> {
    match value {
        Some(v) if !v.is_empty() => Ok(v.as_str()),
        _ => Err(Error::MissingParameter(key.to_string())),
    }
}

impl References {
    pub fn user_pool_arn(&self) -> Result<&str> {
        required(&self.user_pool_arn, "references.user_pool_arn")
    }
    pub fn players_role(&self) -> Result<&str> {
        required(&self.players_role, "references.players_role")
    }
    pub fn managers_role(&self) -> Result<&str> {
        required(&self.managers_role, "references.managers_role")
    }
    pub fn allocate_lambda_arn(&self) -> Result<&str> {
        required(&self.allocate_lambda_arn, "references.allocate_lambda_arn")
    }
    pub fn deallocate_lambda_arn(&self) -> Result<&str> {
        required(&self.deallocate_lambda_arn, "references.deallocate_lambda_arn")
    }
    pub fn scoreboard_lambda_arn(&self) -> Result<&str> {
        required(&self.scoreboard_lambda_arn, "references.scoreboard_lambda_arn")
    }
    pub fn scoreboard_lambda_role(&self) -> Result<&str> {
        required(&self.scoreboard_lambda_role, "references.scoreboard_lambda_role")
    }
    pub fn session_table(&self) -> Result<&str> {
        required(&self.session_table, "references.session_table")
    }
    pub fn session_top_x_table(&self) -> Result<&str> {
        required(&self.session_top_x_table, "references.session_top_x_table")
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SsmParameterConfig {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| Error::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        tracing::debug!(?path, application = %config.application_name, "loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        verify_application_name(&self.application_name)?;
        verify_region(&self.region)?;
        if self.account_id.len() != 12 || !self.account_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::InvalidAccountId(self.account_id.clone()));
        }
        validate_stack_name(&self.stack_name())?;
        Ok(())
    }

    pub fn stack_name(&self) -> String {
        match &self.stack_name {
            Some(s) if !s.is_empty() => s.clone(),
            _ => self.application_name.clone(),
        }
    }

    /// application name as used in bucket names and SSM paths.
    pub fn app_lowercase(&self) -> String {
        self.application_name.to_lowercase()
    }
}

/// the application name ends up in logical ids, bucket names, role names
/// and SSM paths, so it has to be valid for all of them.
pub fn verify_application_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "Must contain at least 1 character"
    } else if !name.chars().next().map_or(false, |c| c.is_ascii_alphabetic()) {
        "Must start with an alphabetical character"
    } else if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        "Must contain only alphanumeric characters [A-Za-z0-9]"
    } else if name.len() > 50 {
        "Must be at most 50 characters"
    } else {
        return Ok(());
    };
    Err(Error::InvalidApplicationName { name: name.to_string(), reason })
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig::from_toml_str(r#"
        application_name = "SpaceInvaders"
        region = "us-east-1"
        account_id = "123456789012"

        [references]
        user_pool_arn = "arn:aws:cognito-idp:us-east-1:123456789012:userpool/us-east-1_ueLfdaSXi"
        players_role = "SpaceInvadersPlayersRole"
        managers_role = "SpaceInvadersManagersRole"
        allocate_lambda_arn = "arn:aws:lambda:us-east-1:123456789012:function:SpaceInvadersAllocate"
        deallocate_lambda_arn = "arn:aws:lambda:us-east-1:123456789012:function:SpaceInvadersDeallocate"
        scoreboard_lambda_arn = "arn:aws:lambda:us-east-1:123456789012:function:SpaceInvadersScoreboard"
        scoreboard_lambda_role = "SpaceInvadersScoreboardRole"
        session_table = "SpaceInvadersSession"
        session_top_x_table = "SpaceInvadersSessionTopX"

        [[ssm_parameters]]
        key = "ClientId"
        value = "4tfe5l26kdp59tc4k4v0b688nm"

        [[ssm_parameters]]
        key = "UserPoolId"
        value = "us-east-1_ueLfdaSXi"

        [[ssm_parameters]]
        key = "Session"
        value = "null"
    "#).expect("test config is valid toml")
}
