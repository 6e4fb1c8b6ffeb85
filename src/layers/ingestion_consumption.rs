//! The REST API the game client talks to, and the input stream behind it.
//!
//! ```text
//! /v1/session       GET   -> ssm GetParameter /<app>/session
//! /v1/websocket     GET   -> ssm GetParameter /<app>/websocket
//! /v1/config        GET   -> ssm GetParameters (unauthenticated)
//! /v1/allocate      POST  -> allocate lambda
//! /v1/deallocate    POST  -> deallocate lambda
//! /v1/scoreboard    GET   -> dynamodb GetItem on the top-x table
//! /v1/updatestatus  POST  -> kinesis PutRecord on the input stream
//! ```
//!
//! Every path also answers `OPTIONS` for CORS preflight.

use serde_json::{json, Value};

use crate::cfn::{
    apigateway_service_uri, arn_dynamodb_table, arn_lambda_function, arn_managed_policy,
    arn_ssm_parameter_path, assume_role_policy_doc, sub, LogicalId, PolicyStatement, Template,
};
use crate::config::AppConfig;
use crate::error::Result;
use crate::resources::{
    bool_map, grant_to_external_role, string_map, ApiSsmConfig, ApiSsmConfigProps, Auth,
    InlinePolicy, Integration, IntegrationResponse, IntegrationType, KinesisStreamFirehoseS3,
    KinesisStreamFirehoseS3Props, MethodResponse, MethodSpec, PassthroughBehavior, RestApi, Role,
    Ssm, HttpVerb, JSON,
};

pub const STAGE_NAME: &str = "prod";

/// unwraps the parameter value out of an SSM `GetParameter` response.
pub const GET_PARAMETER_RESPONSE_TEMPLATE: &str =
    r#""$util.escapeJavaScript("$input.path('$').GetParameterResponse.GetParameterResult.Parameter.Value").replaceAll("\'",'"')""#;

pub const SCOREBOARD_RESPONSE_TEMPLATE: &str = r#"#set($scoreboard = $input.path('$.Item.TopX.L'))
{
"Scoreboard" : [
        #foreach($gamerScore in $scoreboard)
                {
                    "Score" : $gamerScore.M.Score.N ,
                    "Level" : $gamerScore.M.Level.N ,
                    "Shots" : $gamerScore.M.Shots.N ,
                    "Nickname" : "$gamerScore.M.Nickname.S" ,
                    "Lives" : $gamerScore.M.Lives.N
                }#if($foreach.hasNext),#end
        #end
    ]
}"#;

pub struct IngestionConsumptionProps<'a> {
    pub config: &'a AppConfig,
    /// parameters whose names `/config` serves
    pub ssm: &'a Ssm,
    pub raw_data_bucket_arn: &'a str,
}

#[derive(Debug)]
pub struct IngestionConsumptionLayer {
    pub kinesis: KinesisStreamFirehoseS3,
    pub api_role: LogicalId,
    pub api: RestApi,
    pub config_api: ApiSsmConfig,
    pub deployment: LogicalId,
    pub players_policy: LogicalId,
    pub managers_policy: LogicalId,
}

impl IngestionConsumptionLayer {
    pub fn new(template: &mut Template, props: &IngestionConsumptionProps) -> Result<Self> {
        let config = props.config;
        let app = config.application_name.as_str();
        tracing::info!(
            kinesis_integration = config.features.kinesis_integration,
            firehose = config.features.firehose,
            "building ingestion/consumption layer"
        );

        let kinesis = KinesisStreamFirehoseS3::new(template, &KinesisStreamFirehoseS3Props {
            application_name: app,
            region: &config.region,
            account_id: &config.account_id,
            features: config.features,
            stream_consumer_lambda_arn: config.references.scoreboard_lambda_arn.as_deref(),
            stream_consumer_role: config.references.scoreboard_lambda_role.as_deref(),
            bucket_destination_arn: Some(props.raw_data_bucket_arn),
        })?;

        let api_role = create_api_role(template, config, &kinesis)?;
        let mut api = RestApi::new(template, &format!("{app}API"), &config.app_lowercase(),
            &format!("API supporting the application {app}"))?;
        api.add_default_4xx_cors_response(template, &format!("{app}GTWResponse"))?;
        api.add_cognito_authorizer(template, &format!("{app}Authorizer"),
            &format!("{}Authorizer", config.app_lowercase()), config.references.user_pool_arn()?)?;
        let scoreboard_model = api.add_model(template, &format!("{app}APIModelScoreboardResponseModel"),
            "ScoreboardResponseModel", "Scoreboard response model (for /scoreboard/GET)", scoreboard_schema())?;
        let v1 = api.add_resource(template, &format!("{app}APIv1"), api.root_resource_id(), "v1")?;

        let ctx = EndpointContext { config, api_role: &api_role, v1: &v1 };

        for name in ["session", "websocket"] {
            let parameter = format!("/{}/{name}", config.app_lowercase());
            ctx.add(template, &mut api, name, ssm_get_parameter(&ctx, &parameter))?;
        }

        let config_api = ApiSsmConfig::new(template, &mut api, &ApiSsmConfigProps {
            application_name: app,
            region: &config.region,
            parent_version: &v1,
            api_role: &api_role,
            ssm: props.ssm,
        })?;

        let mut allocate = lambda_proxy(&ctx, config.references.allocate_lambda_arn()?, None);
        allocate.integration.passthrough_behavior = Some(PassthroughBehavior::WhenNoMatch);
        ctx.add(template, &mut api, "allocate", allocate)?;
        ctx.add(template, &mut api, "deallocate",
            lambda_proxy(&ctx, config.references.deallocate_lambda_arn()?, Some("CONVERT_TO_TEXT")))?;
        ctx.add(template, &mut api, "scoreboard",
            scoreboard(&ctx, config.references.session_top_x_table()?, scoreboard_model.get_ref()))?;
        ctx.add(template, &mut api, "updatestatus", update_status(&ctx, &kinesis.stream_name))?;

        let deployment = api.add_deployment(template, &format!("{app}APIDeployment"), STAGE_NAME, "Production deployment")?;
        template.add_output(&LogicalId::new("ApiUrl")?, "Base url of the game API", api_url(&api, &config.region));

        let players_policy = grant_players(template, config, &api)?;
        let managers_policy = grant_managers(template, config, &api, &kinesis)?;

        tracing::info!(methods = api.methods().len(), "ingestion/consumption layer ready");
        Ok(Self { kinesis, api_role, api, config_api, deployment, players_policy, managers_policy })
    }
}

/// `https://<api id>.execute-api.<region>.amazonaws.com/prod/v1/`
pub fn api_url(api: &RestApi, region: &str) -> Value {
    sub(format!("https://${{{}}}.execute-api.{region}.amazonaws.com/{STAGE_NAME}/v1/", api.api))
}

struct EndpointContext<'a> {
    config: &'a AppConfig,
    api_role: &'a LogicalId,
    v1: &'a LogicalId,
}

impl EndpointContext<'_> {
    fn add(&self, template: &mut Template, api: &mut RestApi, path_part: &str, spec: MethodSpec) -> Result<()> {
        let id = format!("{}APIv1{path_part}", self.config.application_name);
        let resource = api.add_resource(template, &id, self.v1.get_ref(), path_part)?;
        api.add_endpoint(template, &id, &resource, spec)?;
        Ok(())
    }

    fn credentials(&self) -> Option<Value> {
        Some(self.api_role.get_att("Arn"))
    }

    fn service_uri(&self, service: &str, path: &str) -> Option<Value> {
        Some(json!(apigateway_service_uri(&self.config.region, service, path)))
    }
}

fn create_api_role(template: &mut Template, config: &AppConfig, kinesis: &KinesisStreamFirehoseS3) -> Result<LogicalId> {
    let app = config.application_name.as_str();
    let (region, account_id) = (config.region.as_str(), config.account_id.as_str());
    let statements = vec![
        PolicyStatement::allow(&["lambda:InvokeFunction", "lambda:InvokeAsync"],
            vec![arn_lambda_function(region, account_id, &format!("{app}*"))]),
        PolicyStatement::allow(&[
            "ssm:GetParameterHistory",
            "ssm:GetParametersByPath",
            "ssm:GetParameters",
            "ssm:GetParameter",
        ], vec![arn_ssm_parameter_path(region, account_id, &format!("{}/*", config.app_lowercase()))]),
        PolicyStatement::allow(&["dynamodb:GetItem"], vec![
            arn_dynamodb_table(region, account_id, config.references.session_table()?),
            arn_dynamodb_table(region, account_id, config.references.session_top_x_table()?),
        ]),
        PolicyStatement::allow(&["kinesis:PutRecord", "kinesis:PutRecords"], vec![kinesis.stream_arn()]),
    ];
    let role = LogicalId::new(format!("{app}APIRole"))?;
    template.add_resource(&role, &Role {
        role_name: Some(format!("{app}API")),
        assume_role_policy_document: assume_role_policy_doc("apigateway.amazonaws.com"),
        managed_policy_arns: vec![arn_managed_policy("service-role/AmazonAPIGatewayPushToCloudWatchLogs")],
        policies: vec![InlinePolicy::new(format!("{app}APIRolePolicy"), statements)],
    })?;
    Ok(role)
}

fn ssm_get_parameter(ctx: &EndpointContext, parameter: &str) -> MethodSpec {
    let name = format!("'{parameter}'");
    let integration = Integration {
        ty: IntegrationType::Aws,
        integration_http_method: Some(HttpVerb::Post),
        uri: ctx.service_uri("ssm", "action/GetParameter"),
        credentials: ctx.credentials(),
        passthrough_behavior: Some(PassthroughBehavior::WhenNoMatch),
        request_parameters: string_map(&[
            ("integration.request.querystring.Name", name.as_str()),
            ("integration.request.header.Authentication", "method.request.header.Authentication"),
        ]),
        integration_responses: vec![
            IntegrationResponse::ok_with_cors().with_json_template(GET_PARAMETER_RESPONSE_TEMPLATE),
        ],
        ..Default::default()
    };
    let mut spec = MethodSpec::new(HttpVerb::Get, Auth::Cognito, integration);
    spec.request_parameters = bool_map(&[
        ("method.request.querystring.Name", true),
        ("method.request.header.Authentication", true),
    ]);
    spec.method_responses = vec![MethodResponse::ok_with_optional_cors(json!("Empty"))];
    spec
}

pub fn lambda_invocation_uri(region: &str, function_arn: &str) -> String {
    apigateway_service_uri(region, "lambda", &format!("path/2015-03-31/functions/{function_arn}/invocations"))
}

fn lambda_proxy(ctx: &EndpointContext, function_arn: &str, content_handling: Option<&str>) -> MethodSpec {
    let integration = Integration {
        ty: IntegrationType::AwsProxy,
        integration_http_method: Some(HttpVerb::Post),
        uri: Some(json!(lambda_invocation_uri(&ctx.config.region, function_arn))),
        credentials: ctx.credentials(),
        content_handling: content_handling.map(str::to_string),
        ..Default::default()
    };
    MethodSpec::new(HttpVerb::Post, Auth::Cognito, integration)
}

fn scoreboard(ctx: &EndpointContext, top_x_table: &str, model: Value) -> MethodSpec {
    let request_template = json!({
        "TableName": top_x_table,
        "Key": { "SessionId": { "S": "$input.params('sessionId')" } },
    });
    let integration = Integration {
        ty: IntegrationType::Aws,
        integration_http_method: Some(HttpVerb::Post),
        uri: ctx.service_uri("dynamodb", "action/GetItem"),
        credentials: ctx.credentials(),
        passthrough_behavior: Some(PassthroughBehavior::WhenNoTemplates),
        request_parameters: string_map(&[
            ("integration.request.querystring.sessionId", "method.request.querystring.sessionId"),
        ]),
        request_templates: string_map(&[(JSON, request_template.to_string().as_str())]),
        integration_responses: vec![
            IntegrationResponse::ok_with_cors().with_json_template(SCOREBOARD_RESPONSE_TEMPLATE),
        ],
        ..Default::default()
    };
    let mut spec = MethodSpec::new(HttpVerb::Get, Auth::Cognito, integration);
    spec.request_parameters = bool_map(&[("method.request.querystring.sessionId", true)]);
    spec.method_responses = vec![MethodResponse::ok_with_cors(model)];
    spec
}

/// forwards the request body, base64 encoded, into the input stream.
pub fn put_record_template(stream_name: &str) -> String {
    format!(r#"#set($inputRoot = $input.path('$'))
{{
    "Data" : "$util.base64Encode("$input.json('$')")",
    "PartitionKey" : $input.json('$.SessionId'),
    "StreamName" : "{stream_name}"
}}"#)
}

fn update_status(ctx: &EndpointContext, stream_name: &str) -> MethodSpec {
    let integration = Integration {
        ty: IntegrationType::Aws,
        integration_http_method: Some(HttpVerb::Post),
        uri: ctx.service_uri("kinesis", "action/PutRecord"),
        credentials: ctx.credentials(),
        passthrough_behavior: Some(PassthroughBehavior::WhenNoTemplates),
        request_templates: string_map(&[(JSON, put_record_template(stream_name).as_str())]),
        integration_responses: vec![IntegrationResponse::ok_with_cors()],
        ..Default::default()
    };
    let mut spec = MethodSpec::new(HttpVerb::Post, Auth::Cognito, integration);
    spec.request_parameters = bool_map(&[("method.request.header.Authentication", true)]);
    spec.method_responses = vec![MethodResponse::ok_with_cors(json!("Empty"))];
    spec
}

/// `prefix` followed by each path, all under `Fn::Sub` so the api id resolves.
fn api_arns(prefix: &str, paths: &[&str]) -> Vec<Value> {
    paths.iter().map(|p| sub(format!("{prefix}{p}"))).collect()
}

/// `arn:aws:apigateway:<region>:<account>:${Api}/prod/*/`
fn api_base_arn(config: &AppConfig, api: &RestApi) -> String {
    format!("arn:aws:apigateway:{}:{}:${{{}}}/{STAGE_NAME}/*/", config.region, config.account_id, api.api)
}

fn grant_players(template: &mut Template, config: &AppConfig, api: &RestApi) -> Result<LogicalId> {
    let base_arn = api_base_arn(config, api);
    let base_exec_arn = format!("arn:aws:execute-api:{}:{}:${{{}}}/{STAGE_NAME}/", config.region, config.account_id, api.api);
    let id = LogicalId::new(format!("{}PlayersPolicy", config.application_name))?;
    grant_to_external_role(template, &id, config.references.players_role()?, vec![
        PolicyStatement::allow(&["apigateway:GET"], api_arns(&base_arn, &["config", "session", "scoreboard"])),
        PolicyStatement::allow(&["execute-api:Invoke"], api_arns(&base_exec_arn, &["GET/config", "GET/session", "GET/scoreboard"])),
        PolicyStatement::allow(&["apigateway:POST"], api_arns(&base_arn, &["updatestatus", "allocate", "deallocate"])),
        PolicyStatement::allow(&["execute-api:Invoke"], api_arns(&base_exec_arn, &["POST/updatestatus", "POST/allocate", "POST/deallocate"])),
    ])?;
    Ok(id)
}

fn grant_managers(template: &mut Template, config: &AppConfig, api: &RestApi, kinesis: &KinesisStreamFirehoseS3) -> Result<LogicalId> {
    let app = config.application_name.as_str();
    let (region, account_id) = (config.region.as_str(), config.account_id.as_str());
    let id = LogicalId::new(format!("{app}ManagersPolicy"))?;
    grant_to_external_role(template, &id, config.references.managers_role()?, vec![
        PolicyStatement::allow(&[
            "dynamodb:BatchGetItem",
            "dynamodb:BatchWriteItem",
            "dynamodb:PutItem",
            "dynamodb:Scan",
            "dynamodb:Query",
            "dynamodb:GetItem",
        ], vec![arn_dynamodb_table(region, account_id, &format!("{app}*"))]),
        PolicyStatement::allow(&[
            "ssm:GetParameters",
            "ssm:GetParameter",
            "ssm:DeleteParameters",
            "ssm:PutParameter",
            "ssm:DeleteParameter",
        ], vec![arn_ssm_parameter_path(region, account_id, &format!("{}/*", config.app_lowercase()))]),
        PolicyStatement::allow(&[
            "kinesis:GetShardIterator",
            "kinesis:DescribeStream",
            "kinesis:GetRecords",
        ], vec![kinesis.stream_arn()]),
        PolicyStatement::allow(&["apigateway:*"], api_arns(&api_base_arn(config, api), &["*"])),
    ])?;
    Ok(id)
}

fn scoreboard_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-04/schema#",
        "title": "ScoreboardResponseModel",
        "type": "object",
        "properties": {
            "Scoreboard": {
                "type": "array",
                "items": { "$ref": "#/definitions/GamerScore" }
            }
        },
        "definitions": {
            "GamerScore": {
                "type": "object",
                "properties": {
                    "Name": { "type": "integer" },
                    "Score": { "type": "integer" },
                    "Level": { "type": "integer" },
                    "Shots": { "type": "integer" },
                    "Nickname": { "type": "string" },
                    "Lives": { "type": "integer" }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::resources::HEADER_ALLOW_ORIGIN;
    use crate::layers::ConfigurationLayer;

    fn build(config: &AppConfig) -> (Template, IngestionConsumptionLayer) {
        let mut template = Template::default();
        let configuration = ConfigurationLayer::new(&mut template, config).unwrap();
        let layer = IngestionConsumptionLayer::new(&mut template, &IngestionConsumptionProps {
            config,
            ssm: &configuration.ssm,
            raw_data_bucket_arn: "arn:aws:s3:::spaceinvaders.raw",
        }).unwrap();
        (template, layer)
    }

    #[test]
    fn api_role_permissions() {
        let (template, layer) = build(&test_config());
        let role = template.resource(layer.api_role.as_str()).unwrap();
        assert_eq!(role.properties["RoleName"], "SpaceInvadersAPI");
        assert_eq!(role.properties["AssumeRolePolicyDocument"]["Statement"][0]["Principal"]["Service"], "apigateway.amazonaws.com");
        assert_eq!(role.properties["ManagedPolicyArns"][0], "arn:aws:iam::aws:policy/service-role/AmazonAPIGatewayPushToCloudWatchLogs");
        let statements = &role.properties["Policies"][0]["PolicyDocument"]["Statement"];
        assert_eq!(statements[0]["Resource"][0], "arn:aws:lambda:us-east-1:123456789012:function:SpaceInvaders*");
        assert_eq!(statements[1]["Resource"][0], "arn:aws:ssm:us-east-1:123456789012:parameter/spaceinvaders/*");
        assert_eq!(statements[2]["Resource"][1], "arn:aws:dynamodb:us-east-1:123456789012:table/SpaceInvadersSessionTopX");
        assert_eq!(statements[3]["Resource"][0], json!({ "Fn::GetAtt": ["SpaceInvadersInputStream", "Arn"] }));
    }

    #[test]
    fn session_reads_its_own_parameter() {
        let (template, _) = build(&test_config());
        let get = &template.resource("SpaceInvadersAPIv1sessionGET").unwrap().properties;
        assert_eq!(get["AuthorizationType"], "COGNITO_USER_POOLS");
        assert_eq!(get["AuthorizerId"], json!({ "Ref": "SpaceInvadersAuthorizer" }));
        assert_eq!(get["Integration"]["Uri"], "arn:aws:apigateway:us-east-1:ssm:action/GetParameter");
        assert_eq!(get["Integration"]["RequestParameters"]["integration.request.querystring.Name"], "'/spaceinvaders/session'");
        let websocket = &template.resource("SpaceInvadersAPIv1websocketGET").unwrap().properties;
        assert_eq!(websocket["Integration"]["RequestParameters"]["integration.request.querystring.Name"], "'/spaceinvaders/websocket'");
        for method in [get, websocket] {
            assert_eq!(method["MethodResponses"][0]["ResponseParameters"][HEADER_ALLOW_ORIGIN], false);
            assert_eq!(method["Integration"]["IntegrationResponses"][0]["ResponseParameters"][HEADER_ALLOW_ORIGIN], "'*'");
        }
    }

    #[test]
    fn lambda_endpoints_proxy() {
        let (template, _) = build(&test_config());
        let allocate = &template.resource("SpaceInvadersAPIv1allocatePOST").unwrap().properties;
        assert_eq!(allocate["Integration"]["Type"], "AWS_PROXY");
        assert_eq!(
            allocate["Integration"]["Uri"],
            "arn:aws:apigateway:us-east-1:lambda:path/2015-03-31/functions/arn:aws:lambda:us-east-1:123456789012:function:SpaceInvadersAllocate/invocations"
        );
        assert!(allocate["Integration"].get("ContentHandling").is_none());
        let deallocate = &template.resource("SpaceInvadersAPIv1deallocatePOST").unwrap().properties;
        assert_eq!(deallocate["Integration"]["ContentHandling"], "CONVERT_TO_TEXT");
        assert_eq!(allocate["Integration"]["PassthroughBehavior"], "WHEN_NO_MATCH");
        assert!(deallocate["Integration"].get("PassthroughBehavior").is_none());
    }

    #[test]
    fn scoreboard_and_updatestatus_templates() {
        let (template, layer) = build(&test_config());
        let scoreboard = &template.resource("SpaceInvadersAPIv1scoreboardGET").unwrap().properties;
        let request: Value = serde_json::from_str(scoreboard["Integration"]["RequestTemplates"][JSON].as_str().unwrap()).unwrap();
        assert_eq!(request["TableName"], "SpaceInvadersSessionTopX");
        assert_eq!(request["Key"]["SessionId"]["S"], "$input.params('sessionId')");
        assert_eq!(scoreboard["MethodResponses"][0]["ResponseModels"][JSON], json!({ "Ref": "SpaceInvadersAPIModelScoreboardResponseModel" }));

        let update = &template.resource("SpaceInvadersAPIv1updatestatusPOST").unwrap().properties;
        assert_eq!(update["Integration"]["Uri"], "arn:aws:apigateway:us-east-1:kinesis:action/PutRecord");
        let put = update["Integration"]["RequestTemplates"][JSON].as_str().unwrap();
        assert!(put.contains(&format!("\"StreamName\" : \"{}\"", layer.kinesis.stream_name)));
        assert!(put.contains("$input.json('$.SessionId')"));
    }

    #[test]
    fn external_roles_get_api_scoped_policies() {
        let (template, layer) = build(&test_config());
        let players = template.resource(layer.players_policy.as_str()).unwrap();
        assert_eq!(players.properties["Roles"], json!(["SpaceInvadersPlayersRole"]));
        assert_eq!(
            players.properties["PolicyDocument"]["Statement"][1]["Resource"][0],
            json!({ "Fn::Sub": "arn:aws:execute-api:us-east-1:123456789012:${SpaceInvadersAPI}/prod/GET/config" })
        );
        let managers = template.resource(layer.managers_policy.as_str()).unwrap();
        assert_eq!(managers.properties["Roles"], json!(["SpaceInvadersManagersRole"]));
        assert_eq!(
            managers.properties["PolicyDocument"]["Statement"][3]["Resource"][0],
            json!({ "Fn::Sub": "arn:aws:apigateway:us-east-1:123456789012:${SpaceInvadersAPI}/prod/*/*" })
        );
    }

    #[test]
    fn api_url_output() {
        let (template, _) = build(&test_config());
        assert_eq!(
            template.outputs["ApiUrl"].value,
            json!({ "Fn::Sub": "https://${SpaceInvadersAPI}.execute-api.us-east-1.amazonaws.com/prod/v1/" })
        );
    }

    #[test]
    fn missing_reference_is_reported() {
        let mut config = test_config();
        config.references.user_pool_arn = None;
        let mut template = Template::default();
        let err = IngestionConsumptionLayer::new(&mut template, &IngestionConsumptionProps {
            config: &config,
            ssm: &Ssm::new(),
            raw_data_bucket_arn: "arn:aws:s3:::spaceinvaders.raw",
        }).unwrap_err();
        assert_eq!(err.to_string(), "Missing required parameter 'references.user_pool_arn'");
    }
}
