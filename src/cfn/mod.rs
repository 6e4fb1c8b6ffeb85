//! The template model every construct writes into.
//!
//! Constructs never produce YAML/JSON text directly. They build typed property
//! structs (anything implementing [`CfnResource`]) and push them into a
//! [`Template`] under a [`LogicalId`]. Cross references between resources are
//! plain `serde_json::Value` intrinsics built with [`get_ref`], [`get_att`]
//! and [`sub`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

mod intrinsics;
pub use intrinsics::*;
mod policy;
pub use policy::*;

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

pub trait CfnResource {
    fn type_string(&self) -> &'static str;
    fn properties(&self) -> Result<Value>;
}

/// implements [`CfnResource`] for a `Serialize` property struct.
macro_rules! cfn_resource {
    ($ty:ty, $type_string:literal) => {
        impl $crate::cfn::CfnResource for $ty {
            fn type_string(&self) -> &'static str {
                $type_string
            }
            fn properties(&self) -> $crate::error::Result<serde_json::Value> {
                Ok(serde_json::to_value(self)?)
            }
        }
    };
}
pub(crate) use cfn_resource;

/// logical name of a resource inside a template. Always alphanumeric.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogicalId(String);

impl LogicalId {
    /// strips every non alphanumeric character from `raw` and verifies what remains.
    pub fn new<S: AsRef<str>>(raw: S) -> Result<Self> {
        let id = sanitize_logical_id(raw.as_ref());
        verify_resource_name(&id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn get_ref(&self) -> Value {
        get_ref(&self.0)
    }

    pub fn get_att(&self, attribute: &str) -> Value {
        get_att(&self.0, attribute)
    }
}

impl std::fmt::Display for LogicalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn sanitize_logical_id(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

pub fn verify_resource_name(resource_name: &str) -> Result<()> {
    let reason = if resource_name.len() > 255 {
        "must be less than 255 characters"
    } else if resource_name.is_empty() {
        "Must contain at least 1 character"
    } else if !resource_name.chars().all(|c| c.is_ascii_alphanumeric()) {
        "Must contain only alphanumeric characters [A-Za-z0-9]"
    } else {
        return Ok(());
    };
    Err(Error::InvalidResourceName { name: resource_name.to_string(), reason })
}

/// A stack name can contain only alphanumeric characters (case sensitive) and hyphens.
/// It must start with an alphabetical character and can't be longer than 128 characters.
pub fn validate_stack_name(stack_name: &str) -> Result<()> {
    let reason = "Must only consist of alphanumeric characters and hyphens, Must start with an alphabetical character, and cannot be longer than 128 characters.";
    let invalid = || Error::InvalidStackName { name: stack_name.to_string(), reason };
    match stack_name.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return Err(invalid()),
    }
    if stack_name.len() > 128 {
        return Err(invalid());
    }
    if !stack_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid());
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionPolicy {
    Retain,
    Delete,
}

/// what happens to a resource when it is removed from the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemovalPolicy {
    #[default]
    Retain,
    Destroy,
}

impl RemovalPolicy {
    pub fn deletion_policy(self) -> DeletionPolicy {
        match self {
            RemovalPolicy::Retain => DeletionPolicy::Retain,
            RemovalPolicy::Destroy => DeletionPolicy::Delete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedResource {
    #[serde(rename = "Type")]
    pub ty: String,
    #[serde(rename = "Properties", default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,
    #[serde(rename = "DependsOn", default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(rename = "DeletionPolicy", default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<DeletionPolicy>,
    #[serde(rename = "UpdateReplacePolicy", default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<DeletionPolicy>,
}

impl SavedResource {
    pub fn apply_removal_policy(&mut self, policy: RemovalPolicy) {
        self.deletion_policy = Some(policy.deletion_policy());
        self.update_replace_policy = Some(policy.deletion_policy());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceOutput {
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Value")]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub version: String,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, SavedResource>,
    #[serde(rename = "Outputs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, ResourceOutput>,
}

impl Default for Template {
    fn default() -> Self {
        Self {
            version: TEMPLATE_FORMAT_VERSION.to_string(),
            description: None,
            resources: Default::default(),
            outputs: Default::default(),
        }
    }
}

impl Template {
    pub fn new<S: Into<String>>(description: S) -> Self {
        Self {
            description: Some(description.into()),
            ..Default::default()
        }
    }

    pub fn add_resource<R: CfnResource>(&mut self, id: &LogicalId, resource: &R) -> Result<&mut SavedResource> {
        if self.resources.contains_key(id.as_str()) {
            return Err(Error::DuplicateLogicalId(id.to_string()));
        }
        let saved = SavedResource {
            ty: resource.type_string().to_string(),
            properties: resource.properties()?,
            depends_on: vec![],
            deletion_policy: None,
            update_replace_policy: None,
        };
        tracing::debug!(logical_id = %id, ty = %saved.ty, "adding resource");
        Ok(self.resources.entry(id.to_string()).or_insert(saved))
    }

    /// `id` will not be created until `on` has been created.
    pub fn add_dependency(&mut self, id: &LogicalId, on: &LogicalId) -> Result<()> {
        if !self.resources.contains_key(on.as_str()) {
            return Err(Error::UnknownResource { id: id.to_string(), on: on.to_string() });
        }
        let resource = self.resources.get_mut(id.as_str())
            .ok_or_else(|| Error::UnknownResource { id: id.to_string(), on: on.to_string() })?;
        if !resource.depends_on.iter().any(|d| d == on.as_str()) {
            resource.depends_on.push(on.to_string());
        }
        Ok(())
    }

    pub fn add_output<S: Into<String>>(&mut self, key: &LogicalId, description: S, value: Value) {
        self.outputs.insert(key.to_string(), ResourceOutput {
            description: description.into(),
            value,
        });
    }

    pub fn resource(&self, id: &str) -> Option<&SavedResource> {
        self.resources.get(id)
    }

    pub fn resources_of_type<'a>(&'a self, ty: &'a str) -> impl Iterator<Item = (&'a String, &'a SavedResource)> + 'a {
        self.resources.iter().filter(move |(_, r)| r.ty == ty)
    }

    /// pretty so that it reads nicely in the CloudFormation console.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
