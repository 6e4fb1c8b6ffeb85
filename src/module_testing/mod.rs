//! Whole-stack synthesis checks. These go through `synthesize` and only
//! look at the resulting template.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::cfn::Template;
use crate::config::{test_config, AppConfig, StreamFeatures};
use crate::resources::JSON;
use crate::synthesize;

fn synth(config: &AppConfig) -> Template {
    synthesize(config).unwrap()
}

fn methods(template: &Template) -> Vec<(&String, &Value)> {
    template.resources_of_type("AWS::ApiGateway::Method")
        .map(|(id, r)| (id, &r.properties))
        .collect()
}

fn count(template: &Template, ty: &str) -> usize {
    template.resources_of_type(ty).count()
}

#[test]
fn existing_buckets_never_become_bucket_resources() {
    let mut config = test_config();
    config.existing_buckets = vec!["spaceinvaders.app".into(), "spaceinvaders.raw".into()];
    let template = synth(&config);
    assert_eq!(count(&template, "AWS::S3::Bucket"), 0);
    // still usable as a firehose destination
    assert_eq!(template.outputs["RawDataBucketArn"].value, "arn:aws:s3:::spaceinvaders.raw");

    config.existing_buckets = vec!["spaceinvaders.raw".into()];
    let template = synth(&config);
    let buckets: Vec<_> = template.resources_of_type("AWS::S3::Bucket")
        .map(|(_, r)| r.properties["BucketName"].clone())
        .collect();
    assert_eq!(buckets, ["spaceinvaders.app"]);
}

#[test]
fn every_verb_method_has_one_options_on_its_resource() {
    let template = synth(&test_config());
    let mut per_resource: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for (_, props) in methods(&template) {
        let resource = props["ResourceId"].to_string();
        let entry = per_resource.entry(resource).or_default();
        if props["HttpMethod"] == "OPTIONS" {
            entry.1 += 1;
        } else {
            entry.0 += 1;
        }
    }
    // session websocket config allocate deallocate scoreboard updatestatus
    assert_eq!(per_resource.len(), 7);
    for (resource, (verbs, options)) in per_resource {
        assert_eq!(verbs, 1, "{resource}");
        assert_eq!(options, 1, "{resource}");
    }
}

#[test]
fn options_methods_are_unauthenticated_and_verbs_use_cognito() {
    let template = synth(&test_config());
    for (id, props) in methods(&template) {
        let expected = if props["HttpMethod"] == "OPTIONS" || id.ends_with("configGET") {
            "NONE"
        } else {
            "COGNITO_USER_POOLS"
        };
        assert_eq!(props["AuthorizationType"], expected, "{id}");
    }
}

#[test]
fn deployment_depends_on_exactly_the_verb_methods() {
    let template = synth(&test_config());
    let verbs: BTreeSet<String> = methods(&template).into_iter()
        .filter(|(_, props)| props["HttpMethod"] != "OPTIONS")
        .map(|(id, _)| id.clone())
        .collect();
    assert_eq!(verbs.len(), 7);

    let (_, deployment) = template.resources_of_type("AWS::ApiGateway::Deployment").next().unwrap();
    let depends_on: BTreeSet<String> = deployment.depends_on.iter().cloned().collect();
    assert_eq!(depends_on, verbs);
    assert_eq!(depends_on.len(), deployment.depends_on.len());
    assert_eq!(deployment.properties["StageName"], "prod");
}

#[test]
fn firehose_flag_controls_delivery_resources() {
    let firehose_types = [
        "AWS::KinesisFirehose::DeliveryStream",
        "AWS::Logs::LogGroup",
        "AWS::Logs::LogStream",
    ];

    let mut config = test_config();
    let off = synth(&config);
    for ty in firehose_types {
        assert_eq!(count(&off, ty), 0, "{ty}");
    }
    // only the API role
    assert_eq!(count(&off, "AWS::IAM::Role"), 1);

    config.features = StreamFeatures { firehose: true, ..Default::default() };
    let on = synth(&config);
    for ty in firehose_types {
        assert_eq!(count(&on, ty), 1, "{ty}");
    }
    assert_eq!(count(&on, "AWS::IAM::Role"), 2);
    let (_, delivery) = on.resources_of_type("AWS::KinesisFirehose::DeliveryStream").next().unwrap();
    assert_eq!(delivery.properties["S3DestinationConfiguration"]["BucketARN"], "arn:aws:s3:::spaceinvaders.raw");
    assert_eq!(delivery.depends_on, ["SpaceInvadersfirehoseloggroup"]);
}

#[test]
fn kinesis_integration_flag_binds_scoreboard_lambda() {
    let mut config = test_config();
    assert_eq!(count(&synth(&config), "AWS::Lambda::EventSourceMapping"), 0);
    config.features.kinesis_integration = true;
    let template = synth(&config);
    let (_, mapping) = template.resources_of_type("AWS::Lambda::EventSourceMapping").next().unwrap();
    assert_eq!(mapping.properties["FunctionName"], "arn:aws:lambda:us-east-1:123456789012:function:SpaceInvadersScoreboard");
    assert_eq!(mapping.properties["BatchSize"], 700);

    let (_, read) = template.resources_of_type("AWS::IAM::Policy")
        .find(|(_, p)| p.properties["Roles"] == serde_json::json!(["SpaceInvadersScoreboardRole"]))
        .unwrap();
    let statement = &read.properties["PolicyDocument"]["Statement"][0];
    assert_eq!(statement["Resource"][0], serde_json::json!({ "Fn::GetAtt": ["SpaceInvadersInputStream", "Arn"] }));
    for action in ["kinesis:DescribeStream", "kinesis:GetRecords", "kinesis:GetShardIterator", "kinesis:ListShards"] {
        assert!(statement["Action"].as_array().unwrap().contains(&Value::from(action)), "{action}");
    }

    config.references.scoreboard_lambda_role = None;
    let err = synthesize(&config).unwrap_err();
    assert!(matches!(err, crate::Error::MissingParameter(k) if k == "references.scoreboard_lambda_role"));
}

#[test]
fn config_request_template_follows_configuration_order() {
    let mut config = test_config();
    config.ssm_parameters.reverse();
    let template = synth(&config);
    let get = &template.resource("SpaceInvadersAPIv1configGET").unwrap().properties;
    assert_eq!(
        get["Integration"]["RequestTemplates"][JSON],
        r#"{"Names" : ["/spaceinvaders/session","/spaceinvaders/userpoolid","/spaceinvaders/clientid"]}"#
    );
}

#[test]
fn raw_bucket_arn_for_foo() {
    let mut config = test_config();
    config.application_name = "Foo".into();
    let template = synth(&config);
    assert_eq!(template.outputs["RawDataBucketArn"].value, "arn:aws:s3:::foo.raw");
    assert!(template.resource("fooraw").is_some());
}

#[test]
fn template_serializes_to_json_and_yaml() {
    let template = synth(&test_config());
    let json: Value = serde_json::from_str(&template.to_json_pretty().unwrap()).unwrap();
    assert_eq!(json["AWSTemplateFormatVersion"], "2010-09-09");
    assert!(json["Resources"].as_object().unwrap().len() > 20);
    let back: Template = serde_yaml::from_str(&template.to_yaml().unwrap()).unwrap();
    assert_eq!(back, template);
}
