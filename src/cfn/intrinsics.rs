use serde_json::{json, Value};

/// `{ "Ref": logical_id }`
pub fn get_ref(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

/// `{ "Fn::GetAtt": [logical_id, attribute] }`
pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// `{ "Fn::Sub": s }`. use `${LogicalId}` inside `s` to reference another resource.
pub fn sub<S: AsRef<str>>(s: S) -> Value {
    json!({ "Fn::Sub": s.as_ref() })
}

pub fn arn_s3_bucket(bucket_name: &str) -> String {
    format!("arn:aws:s3:::{bucket_name}")
}

pub fn arn_dynamodb_table(region: &str, account_id: &str, table_name: &str) -> String {
    format!("arn:aws:dynamodb:{region}:{account_id}:table/{table_name}")
}

pub fn arn_ssm_parameter_path(region: &str, account_id: &str, path: &str) -> String {
    format!("arn:aws:ssm:{region}:{account_id}:parameter/{path}")
}

pub fn arn_lambda_function(region: &str, account_id: &str, function_name: &str) -> String {
    format!("arn:aws:lambda:{region}:{account_id}:function:{function_name}")
}

pub fn arn_managed_policy(name: &str) -> String {
    format!("arn:aws:iam::aws:policy/{name}")
}

/// API Gateway service integration uri, eg: `arn:aws:apigateway:us-east-1:ssm:action/GetParameter`
pub fn apigateway_service_uri(region: &str, service: &str, path: &str) -> String {
    format!("arn:aws:apigateway:{region}:{service}:{path}")
}
