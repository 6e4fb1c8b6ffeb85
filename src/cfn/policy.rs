use serde::Serialize;
use serde_json::Value;

pub const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyStatement {
    #[serde(rename = "Effect")]
    pub effect: Effect,
    #[serde(rename = "Action")]
    pub actions: Vec<String>,
    #[serde(rename = "Resource")]
    pub resources: Vec<Value>,
}

impl PolicyStatement {
    pub fn allow<A: AsRef<str>, R: Into<Value>>(actions: &[A], resources: Vec<R>) -> Self {
        Self {
            effect: Effect::Allow,
            actions: actions.iter().map(|a| a.as_ref().to_string()).collect(),
            resources: resources.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyDocument {
    #[serde(rename = "Version")]
    pub version: &'static str,
    #[serde(rename = "Statement")]
    pub statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new(statements: Vec<PolicyStatement>) -> Self {
        Self { version: POLICY_VERSION, statements }
    }
}

/// trust policy that lets `service` (eg: `firehose.amazonaws.com`) assume a role.
pub fn assume_role_policy_doc(service: &str) -> Value {
    let mut map = serde_json::Map::default();
    map.insert("Version".to_string(), Value::String(POLICY_VERSION.to_string()));

    let mut principal = serde_json::Map::default();
    principal.insert("Service".to_string(), Value::String(service.to_string()));

    let mut statement_obj = serde_json::Map::default();
    statement_obj.insert("Effect".to_string(), Value::String("Allow".to_string()));
    statement_obj.insert("Principal".to_string(), Value::Object(principal));
    statement_obj.insert("Action".to_string(), Value::String("sts:AssumeRole".to_string()));
    map.insert("Statement".to_string(), Value::Array(vec![Value::Object(statement_obj)]));
    Value::Object(map)
}
