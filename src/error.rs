use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid resource name {name:?}\n{reason}")]
    InvalidResourceName { name: String, reason: &'static str },

    #[error("Invalid region code {0:?}\nMust be one of {1:?}")]
    InvalidRegion(String, &'static [&'static str]),

    #[error("Invalid stack name {name}\n{reason}")]
    InvalidStackName { name: String, reason: &'static str },

    #[error("Invalid bucket name {name:?}\n{reason}")]
    InvalidBucketName { name: String, reason: &'static str },

    #[error("Invalid application name {name:?}\n{reason}")]
    InvalidApplicationName { name: String, reason: &'static str },

    #[error("Invalid account id {0:?}\nMust be exactly 12 digits")]
    InvalidAccountId(String),

    /// a construct needed a collaborator reference that the config did not provide.
    #[error("Missing required parameter '{0}'")]
    MissingParameter(String),

    #[error("Duplicate logical id '{0}'. Every resource in a template must have a unique logical id")]
    DuplicateLogicalId(String),

    #[error("Cannot add dependency on '{on}' to '{id}': resource not found in template")]
    UnknownResource { id: String, on: String },

    #[error("Failed to read config file {path:?}\n{source}")]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config\n{0}")]
    ParseConfig(#[from] toml::de::Error),

    #[error("Failed to serialize template\n{0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to serialize template\n{0}")]
    Yaml(#[from] serde_yaml::Error),

    #[cfg(feature = "deploy")]
    #[error("Failed to deploy stack {stack}\n{reason}")]
    Deploy { stack: String, reason: String },
}
