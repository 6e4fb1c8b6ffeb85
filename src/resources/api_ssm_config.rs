use serde_json::json;

use crate::cfn::{apigateway_service_uri, LogicalId, Template};
use crate::error::Result;
use crate::resources::{
    bool_map, string_map, Auth, Endpoint, HttpVerb, Integration, IntegrationResponse,
    IntegrationType, MethodResponse, MethodSpec, PassthroughBehavior, RestApi, Ssm, JSON,
};

/// reshapes an SSM `GetParameters` response into `{"Parameters":[{"Name","Value"}]}`
pub const GET_PARAMETERS_RESPONSE_TEMPLATE: &str = r#"#set($inputRoot = $input.path('$'))
{
    "Parameters" : [
        #foreach($elem in $inputRoot.Parameters)
        {
            "Name" : "$elem.Name",
            "Value" :  "$util.escapeJavaScript("$elem.Value").replaceAll("'",'"')"
        }
        #if($foreach.hasNext),#end
    #end
    ]
}"#;

pub struct ApiSsmConfigProps<'a> {
    pub application_name: &'a str,
    pub region: &'a str,
    /// resource `/config` is created under, usually `/v1`
    pub parent_version: &'a LogicalId,
    pub api_role: &'a LogicalId,
    pub ssm: &'a Ssm,
}

/// `GET /config`: the values of every parameter registered so far, read
/// straight out of parameter store by API Gateway.
#[derive(Debug)]
pub struct ApiSsmConfig {
    pub endpoint: Endpoint,
    pub model: LogicalId,
}

impl ApiSsmConfig {
    pub fn new(template: &mut Template, api: &mut RestApi, props: &ApiSsmConfigProps) -> Result<Self> {
        let app = props.application_name;
        let config = api.add_resource(template, &format!("{app}APIv1config"), props.parent_version.get_ref(), "config")?;
        let model = api.add_model(template, &format!("{app}APIModelGetParametersRequest"), "GetParametersRequest",
            "Model to request SSM:GetParameters",
            json!({
                "$schema": "http://json-schema.org/draft-04/schema#",
                "title": "GetParametersRequest",
                "type": "object",
                "properties": { "names": { "type": "array" } }
            }),
        )?;

        let request_template = get_parameters_request_template(props.ssm);
        tracing::debug!(parameters = props.ssm.parameters().len(), "baking parameter names into /config");

        let integration = Integration {
            ty: IntegrationType::Aws,
            integration_http_method: Some(HttpVerb::Post),
            uri: Some(json!(apigateway_service_uri(props.region, "ssm", "path//"))),
            credentials: Some(props.api_role.get_att("Arn")),
            passthrough_behavior: Some(PassthroughBehavior::WhenNoTemplates),
            request_parameters: string_map(&[
                ("integration.request.header.Content-Type", "'application/x-amz-json-1.1'"),
                ("integration.request.header.X-Amz-Target", "'AmazonSSM.GetParameters'"),
            ]),
            request_templates: string_map(&[(JSON, request_template.as_str())]),
            integration_responses: vec![
                IntegrationResponse::ok_with_cors().with_json_template(GET_PARAMETERS_RESPONSE_TEMPLATE),
            ],
            ..Default::default()
        };
        let mut spec = MethodSpec::new(HttpVerb::Get, Auth::None, integration);
        spec.request_parameters = bool_map(&[
            ("method.request.header.Content-Type", true),
            ("method.request.header.X-Amz-Target", true),
        ]);
        spec.request_models = Some([(JSON.to_string(), model.get_ref())].into_iter().collect());
        spec.method_responses = vec![MethodResponse::ok_with_cors(json!("Empty"))];

        let endpoint = api.add_endpoint(template, &format!("{app}APIv1config"), &config, spec)?;
        Ok(Self { endpoint, model })
    }
}

/// `{"Names" : ["/app/a","/app/b"]}`, in the order the parameters were registered.
pub fn get_parameters_request_template(ssm: &Ssm) -> String {
    let names = ssm.parameter_names()
        .map(|name| format!("\"{name}\""))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{\"Names\" : [{names}]}}")
}
