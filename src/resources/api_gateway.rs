//! API Gateway REST API building blocks.
//!
//! [`RestApi`] keeps a registry of every method it created. Endpoints are
//! added as a verb method plus its CORS `OPTIONS` method in one call, and the
//! deployment derives its `DependsOn` list from the registry, so a method can
//! never be left out of the deployment by accident.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};

use crate::cfn::{cfn_resource, LogicalId, Template};
use crate::error::{Error, Result};

pub const CORS_ALLOW_HEADERS: &str = "'Content-Type,X-Amz-Date,Authorization,X-Api-Key,X-Amz-Security-Token'";
/// same headers as `CORS_ALLOW_HEADERS`, in the order the preflight mocks send them.
pub const CORS_PREFLIGHT_ALLOW_HEADERS: &str = "'Content-Type,Authorization,X-Amz-Date,X-Api-Key,X-Amz-Security-Token'";
pub const HEADER_ALLOW_ORIGIN: &str = "method.response.header.Access-Control-Allow-Origin";
pub const HEADER_ALLOW_METHODS: &str = "method.response.header.Access-Control-Allow-Methods";
pub const HEADER_ALLOW_HEADERS: &str = "method.response.header.Access-Control-Allow-Headers";
pub const JSON: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HttpVerb {
    Get,
    Post,
    Options,
}

impl HttpVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpVerb::Get => "GET",
            HttpVerb::Post => "POST",
            HttpVerb::Options => "OPTIONS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationType {
    None,
    CognitoUserPools,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrationType {
    Aws,
    AwsProxy,
    #[default]
    Mock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PassthroughBehavior {
    WhenNoMatch,
    WhenNoTemplates,
    Never,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestApiProps {
    pub name: String,
    pub description: String,
}
cfn_resource!(RestApiProps, "AWS::ApiGateway::RestApi");

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiResource {
    pub parent_id: Value,
    pub path_part: String,
    pub rest_api_id: Value,
}
cfn_resource!(ApiResource, "AWS::ApiGateway::Resource");

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Model {
    pub content_type: String,
    pub description: String,
    pub name: String,
    pub rest_api_id: Value,
    pub schema: Value,
}
cfn_resource!(Model, "AWS::ApiGateway::Model");

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Authorizer {
    pub name: String,
    pub rest_api_id: Value,
    #[serde(rename = "Type")]
    pub ty: &'static str,
    pub identity_source: String,
    pub provider_arns: Vec<String>,
}
cfn_resource!(Authorizer, "AWS::ApiGateway::Authorizer");

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GatewayResponse {
    pub rest_api_id: Value,
    pub response_type: String,
    pub response_parameters: BTreeMap<String, String>,
    pub response_templates: BTreeMap<String, String>,
}
cfn_resource!(GatewayResponse, "AWS::ApiGateway::GatewayResponse");

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Deployment {
    pub rest_api_id: Value,
    pub stage_name: String,
    pub description: String,
}
cfn_resource!(Deployment, "AWS::ApiGateway::Deployment");

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct IntegrationResponse {
    pub status_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_parameters: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_templates: Option<BTreeMap<String, String>>,
}

impl IntegrationResponse {
    /// 200 that allows any origin.
    pub fn ok_with_cors() -> Self {
        Self {
            status_code: "200".into(),
            response_parameters: string_map(&[(HEADER_ALLOW_ORIGIN, "'*'")]),
            response_templates: None,
        }
    }

    pub fn with_json_template<S: Into<String>>(mut self, template: S) -> Self {
        self.response_templates = Some(BTreeMap::from([(JSON.to_string(), template.into())]));
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MethodResponse {
    pub status_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_parameters: Option<BTreeMap<String, bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_models: Option<BTreeMap<String, Value>>,
}

impl MethodResponse {
    pub fn ok() -> Self {
        Self { status_code: "200".into(), ..Default::default() }
    }

    /// 200 exposing the allow-origin header, with `model` as the json response model.
    pub fn ok_with_cors(model: Value) -> Self {
        Self {
            status_code: "200".into(),
            response_parameters: bool_map(&[(HEADER_ALLOW_ORIGIN, true)]),
            response_models: Some(BTreeMap::from([(JSON.to_string(), model)])),
        }
    }

    /// like `ok_with_cors`, but the allow-origin header is declared optional.
    pub fn ok_with_optional_cors(model: Value) -> Self {
        Self {
            response_parameters: bool_map(&[(HEADER_ALLOW_ORIGIN, false)]),
            ..Self::ok_with_cors(model)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Integration {
    #[serde(rename = "Type")]
    pub ty: IntegrationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integration_http_method: Option<HttpVerb>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passthrough_behavior: Option<PassthroughBehavior>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_handling: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_parameters: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_templates: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub integration_responses: Vec<IntegrationResponse>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Method {
    pub rest_api_id: Value,
    pub resource_id: Value,
    pub http_method: HttpVerb,
    pub authorization_type: AuthorizationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorizer_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_parameters: Option<BTreeMap<String, bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_models: Option<BTreeMap<String, Value>>,
    pub integration: Integration,
    pub method_responses: Vec<MethodResponse>,
}
cfn_resource!(Method, "AWS::ApiGateway::Method");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    None,
    Cognito,
}

/// everything about a method except which api/resource it hangs off.
#[derive(Debug, Clone)]
pub struct MethodSpec {
    pub http_method: HttpVerb,
    pub auth: Auth,
    pub request_parameters: Option<BTreeMap<String, bool>>,
    pub request_models: Option<BTreeMap<String, Value>>,
    pub integration: Integration,
    pub method_responses: Vec<MethodResponse>,
}

impl MethodSpec {
    pub fn new(http_method: HttpVerb, auth: Auth, integration: Integration) -> Self {
        Self {
            http_method,
            auth,
            request_parameters: None,
            request_models: None,
            integration,
            method_responses: vec![MethodResponse::ok()],
        }
    }

    /// unauthenticated mock that answers CORS preflight requests.
    pub fn cors_options() -> Self {
        let integration = Integration {
            ty: IntegrationType::Mock,
            passthrough_behavior: Some(PassthroughBehavior::WhenNoMatch),
            request_templates: string_map(&[(JSON, r#"{"statusCode": 200}"#)]),
            integration_responses: vec![IntegrationResponse {
                status_code: "200".into(),
                response_parameters: string_map(&[
                    (HEADER_ALLOW_HEADERS, CORS_PREFLIGHT_ALLOW_HEADERS),
                    (HEADER_ALLOW_METHODS, "'*'"),
                    (HEADER_ALLOW_ORIGIN, "'*'"),
                ]),
                response_templates: None,
            }],
            ..Default::default()
        };
        let mut spec = Self::new(HttpVerb::Options, Auth::None, integration);
        spec.method_responses = vec![MethodResponse {
            status_code: "200".into(),
            response_parameters: bool_map(&[
                (HEADER_ALLOW_ORIGIN, true),
                (HEADER_ALLOW_METHODS, true),
                (HEADER_ALLOW_HEADERS, true),
            ]),
            response_models: Some(BTreeMap::from([(JSON.to_string(), json!("Empty"))])),
        }];
        spec
    }
}

pub fn string_map(pairs: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
    Some(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
}

pub fn bool_map(pairs: &[(&str, bool)]) -> Option<BTreeMap<String, bool>> {
    Some(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredMethod {
    pub logical_id: LogicalId,
    pub resource: LogicalId,
    pub http_method: HttpVerb,
}

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub resource: LogicalId,
    pub method: LogicalId,
    pub options: LogicalId,
}

#[derive(Debug)]
pub struct RestApi {
    pub api: LogicalId,
    authorizer: Option<LogicalId>,
    methods: Vec<RegisteredMethod>,
}

impl RestApi {
    pub fn new(template: &mut Template, id: &str, name: &str, description: &str) -> Result<Self> {
        let api = LogicalId::new(id)?;
        template.add_resource(&api, &RestApiProps {
            name: name.to_string(),
            description: description.to_string(),
        })?;
        Ok(Self { api, authorizer: None, methods: vec![] })
    }

    pub fn rest_api_id(&self) -> Value {
        self.api.get_ref()
    }

    pub fn root_resource_id(&self) -> Value {
        self.api.get_att("RootResourceId")
    }

    pub fn authorizer(&self) -> Option<&LogicalId> {
        self.authorizer.as_ref()
    }

    /// every `Auth::Cognito` method added afterwards uses this authorizer.
    pub fn add_cognito_authorizer(&mut self, template: &mut Template, id: &str, name: &str, user_pool_arn: &str) -> Result<LogicalId> {
        let authorizer = LogicalId::new(id)?;
        template.add_resource(&authorizer, &Authorizer {
            name: name.to_string(),
            rest_api_id: self.rest_api_id(),
            ty: "COGNITO_USER_POOLS",
            identity_source: "method.request.header.Authorization".into(),
            provider_arns: vec![user_pool_arn.to_string()],
        })?;
        self.authorizer = Some(authorizer.clone());
        Ok(authorizer)
    }

    /// CORS headers on every 4XX the gateway itself produces, so browsers can
    /// read auth failures.
    pub fn add_default_4xx_cors_response(&self, template: &mut Template, id: &str) -> Result<LogicalId> {
        let response = LogicalId::new(id)?;
        template.add_resource(&response, &GatewayResponse {
            rest_api_id: self.rest_api_id(),
            response_type: "DEFAULT_4XX".into(),
            response_parameters: BTreeMap::from([
                ("gatewayresponse.header.Access-Control-Allow-Headers".to_string(), CORS_ALLOW_HEADERS.to_string()),
                ("gatewayresponse.header.Access-Control-Allow-Methods".to_string(), "'*'".to_string()),
                ("gatewayresponse.header.Access-Control-Allow-Origin".to_string(), "'*'".to_string()),
            ]),
            response_templates: BTreeMap::from([
                (JSON.to_string(), r#"{"message":$context.error.messageString}"#.to_string()),
            ]),
        })?;
        template.add_dependency(&response, &self.api)?;
        Ok(response)
    }

    pub fn add_model(&self, template: &mut Template, id: &str, name: &str, description: &str, schema: Value) -> Result<LogicalId> {
        let model = LogicalId::new(id)?;
        template.add_resource(&model, &Model {
            content_type: JSON.into(),
            description: description.into(),
            name: name.into(),
            rest_api_id: self.rest_api_id(),
            schema,
        })?;
        Ok(model)
    }

    pub fn add_resource(&self, template: &mut Template, id: &str, parent_id: Value, path_part: &str) -> Result<LogicalId> {
        let resource = LogicalId::new(id)?;
        template.add_resource(&resource, &ApiResource {
            parent_id,
            path_part: path_part.into(),
            rest_api_id: self.rest_api_id(),
        })?;
        Ok(resource)
    }

    pub fn add_method(&mut self, template: &mut Template, id: &str, resource: &LogicalId, spec: MethodSpec) -> Result<LogicalId> {
        let (authorization_type, authorizer_id) = match spec.auth {
            Auth::None => (AuthorizationType::None, None),
            Auth::Cognito => {
                let authorizer = self.authorizer.as_ref()
                    .ok_or_else(|| Error::MissingParameter(format!("authorizer for method {id}")))?;
                (AuthorizationType::CognitoUserPools, Some(authorizer.get_ref()))
            }
        };
        let method = LogicalId::new(id)?;
        template.add_resource(&method, &Method {
            rest_api_id: self.rest_api_id(),
            resource_id: resource.get_ref(),
            http_method: spec.http_method,
            authorization_type,
            authorizer_id,
            request_parameters: spec.request_parameters,
            request_models: spec.request_models,
            integration: spec.integration,
            method_responses: spec.method_responses,
        })?;
        self.methods.push(RegisteredMethod {
            logical_id: method.clone(),
            resource: resource.clone(),
            http_method: spec.http_method,
        });
        Ok(method)
    }

    /// adds `spec` as `{id_prefix}{VERB}` and its CORS preflight as `{id_prefix}OPTIONS`.
    pub fn add_endpoint(&mut self, template: &mut Template, id_prefix: &str, resource: &LogicalId, spec: MethodSpec) -> Result<Endpoint> {
        let verb_id = format!("{id_prefix}{}", spec.http_method.as_str());
        let method = self.add_method(template, &verb_id, resource, spec)?;
        let options = self.add_method(template, &format!("{id_prefix}OPTIONS"), resource, MethodSpec::cors_options())?;
        Ok(Endpoint { resource: resource.clone(), method, options })
    }

    pub fn methods(&self) -> &[RegisteredMethod] {
        &self.methods
    }

    /// The deployment snapshots the api when it is created, so it depends on
    /// every integration method registered so far.
    pub fn add_deployment(&self, template: &mut Template, id: &str, stage_name: &str, description: &str) -> Result<LogicalId> {
        let deployment = LogicalId::new(id)?;
        template.add_resource(&deployment, &Deployment {
            rest_api_id: self.rest_api_id(),
            stage_name: stage_name.into(),
            description: description.into(),
        })?;
        for method in self.methods.iter().filter(|m| m.http_method != HttpVerb::Options) {
            template.add_dependency(&deployment, &method.logical_id)?;
        }
        tracing::debug!(deployment = %deployment, methods = self.methods.len(), "added deployment");
        Ok(deployment)
    }
}
