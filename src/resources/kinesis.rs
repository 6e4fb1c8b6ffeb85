//! Kinesis stream -> (optional) Firehose -> S3.

use serde::Serialize;
use serde_json::Value;

use crate::cfn::{
    arn_lambda_function, assume_role_policy_doc, cfn_resource, LogicalId, PolicyStatement, Template,
};
use crate::config::StreamFeatures;
use crate::error::{Error, Result};
use crate::resources::{grant_to_external_role, InlinePolicy, Role};

pub const EVENT_SOURCE_BATCH_SIZE: u32 = 700;
pub const FIREHOSE_BUFFER_INTERVAL_S: u32 = 300;
pub const FIREHOSE_BUFFER_SIZE_MB: u32 = 1;
pub const FIREHOSE_ERROR_LOG_STREAM: &str = "error";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct KinesisStream {
    pub name: String,
    pub shard_count: u32,
}
cfn_resource!(KinesisStream, "AWS::Kinesis::Stream");

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventSourceMapping {
    pub batch_size: u32,
    pub event_source_arn: Value,
    pub function_name: String,
    pub starting_position: &'static str,
}
cfn_resource!(EventSourceMapping, "AWS::Lambda::EventSourceMapping");

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogGroup {
    pub log_group_name: String,
}
cfn_resource!(LogGroup, "AWS::Logs::LogGroup");

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogStream {
    pub log_group_name: Value,
    pub log_stream_name: String,
}
cfn_resource!(LogStream, "AWS::Logs::LogStream");

#[derive(Debug, Clone, Serialize)]
pub struct KinesisStreamSourceConfiguration {
    #[serde(rename = "KinesisStreamARN")]
    pub kinesis_stream_arn: Value,
    #[serde(rename = "RoleARN")]
    pub role_arn: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct BufferingHints {
    #[serde(rename = "IntervalInSeconds")]
    pub interval_in_seconds: u32,
    #[serde(rename = "SizeInMBs")]
    pub size_in_mbs: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CloudWatchLoggingOptions {
    pub enabled: bool,
    pub log_group_name: String,
    pub log_stream_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct S3DestinationConfiguration {
    #[serde(rename = "BucketARN")]
    pub bucket_arn: String,
    #[serde(rename = "BufferingHints")]
    pub buffering_hints: BufferingHints,
    #[serde(rename = "CompressionFormat")]
    pub compression_format: &'static str,
    #[serde(rename = "RoleARN")]
    pub role_arn: Value,
    #[serde(rename = "CloudWatchLoggingOptions")]
    pub cloud_watch_logging_options: CloudWatchLoggingOptions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeliveryStream {
    pub delivery_stream_name: String,
    pub delivery_stream_type: &'static str,
    pub kinesis_stream_source_configuration: KinesisStreamSourceConfiguration,
    pub s3_destination_configuration: S3DestinationConfiguration,
}
cfn_resource!(DeliveryStream, "AWS::KinesisFirehose::DeliveryStream");

pub struct KinesisStreamFirehoseS3Props<'a> {
    pub application_name: &'a str,
    pub region: &'a str,
    pub account_id: &'a str,
    pub features: StreamFeatures,
    /// bound to the stream when `features.kinesis_integration` is on.
    pub stream_consumer_lambda_arn: Option<&'a str>,
    /// execution role name of that lambda. granted read access to the stream.
    pub stream_consumer_role: Option<&'a str>,
    /// required when `features.firehose` is on.
    pub bucket_destination_arn: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct FirehoseDelivery {
    pub delivery_stream: LogicalId,
    pub delivery_stream_name: String,
    pub log_group: LogicalId,
    pub log_group_name: String,
    pub log_stream: LogicalId,
    pub role: LogicalId,
}

#[derive(Debug, Clone)]
pub struct KinesisStreamFirehoseS3 {
    pub stream: LogicalId,
    pub stream_name: String,
    pub event_source: Option<LogicalId>,
    pub firehose: Option<FirehoseDelivery>,
}

impl KinesisStreamFirehoseS3 {
    pub fn new(template: &mut Template, props: &KinesisStreamFirehoseS3Props) -> Result<Self> {
        let app = props.application_name;
        let stream = LogicalId::new(format!("{app}InputStream"))?;
        let stream_name = format!("{app}_InputStream");
        template.add_resource(&stream, &KinesisStream {
            name: stream_name.clone(),
            shard_count: 1,
        })?;
        let mut out = Self { stream, stream_name, event_source: None, firehose: None };

        if props.features.kinesis_integration {
            let lambda_arn = props.stream_consumer_lambda_arn
                .ok_or_else(|| Error::MissingParameter("references.scoreboard_lambda_arn".into()))?;
            let consumer_role = props.stream_consumer_role
                .ok_or_else(|| Error::MissingParameter("references.scoreboard_lambda_role".into()))?;
            let read_policy = LogicalId::new(format!("{app}InputStreamConsumerPolicy"))?;
            grant_to_external_role(template, &read_policy, consumer_role, vec![
                PolicyStatement::allow(&[
                    "kinesis:DescribeStream",
                    "kinesis:DescribeStreamSummary",
                    "kinesis:GetRecords",
                    "kinesis:GetShardIterator",
                    "kinesis:ListShards",
                    "kinesis:SubscribeToShard",
                ], vec![out.stream_arn()]),
            ])?;
            let id = LogicalId::new(format!("{app}InputStreamEventSource"))?;
            template.add_resource(&id, &EventSourceMapping {
                batch_size: EVENT_SOURCE_BATCH_SIZE,
                event_source_arn: out.stream_arn(),
                function_name: lambda_arn.to_string(),
                starting_position: "LATEST",
            })?;
            // lambda checks it can read the stream when the mapping is created
            template.add_dependency(&id, &read_policy)?;
            tracing::info!(stream = %out.stream_name, lambda = lambda_arn, "bound stream to lambda consumer");
            out.event_source = Some(id);
        }

        if props.features.firehose {
            let bucket_arn = props.bucket_destination_arn
                .ok_or_else(|| Error::MissingParameter("rawbucketarn".into()))?;
            let firehose = out.create_firehose(template, props, bucket_arn)?;
            tracing::info!(delivery_stream = %firehose.delivery_stream_name, bucket = bucket_arn, "created firehose delivery");
            out.firehose = Some(firehose);
        }
        Ok(out)
    }

    pub fn stream_arn(&self) -> Value {
        self.stream.get_att("Arn")
    }

    fn create_firehose(&self, template: &mut Template, props: &KinesisStreamFirehoseS3Props, bucket_arn: &str) -> Result<FirehoseDelivery> {
        let app = props.application_name;
        let delivery_stream_name = format!("{app}_Firehose");

        let log_group_name = format!("/aws/kinesisfirehose/{delivery_stream_name}");
        let log_group = LogicalId::new(format!("{app}firehoseloggroup"))?;
        template.add_resource(&log_group, &LogGroup { log_group_name: log_group_name.clone() })?;
        let log_stream = LogicalId::new(format!("{app}firehoselogstream"))?;
        template.add_resource(&log_stream, &LogStream {
            log_group_name: log_group.get_ref(),
            log_stream_name: FIREHOSE_ERROR_LOG_STREAM.to_string(),
        })?;

        let role = LogicalId::new(format!("{app}FirehoseToStreamsRole"))?;
        template.add_resource(&role, &self.firehose_role(props, bucket_arn, &log_group_name, role.as_str()))?;

        let delivery_stream = LogicalId::new(format!("{app}RawData"))?;
        template.add_resource(&delivery_stream, &DeliveryStream {
            delivery_stream_name: delivery_stream_name.clone(),
            delivery_stream_type: "KinesisStreamAsSource",
            kinesis_stream_source_configuration: KinesisStreamSourceConfiguration {
                kinesis_stream_arn: self.stream_arn(),
                role_arn: role.get_att("Arn"),
            },
            s3_destination_configuration: S3DestinationConfiguration {
                bucket_arn: bucket_arn.to_string(),
                buffering_hints: BufferingHints {
                    interval_in_seconds: FIREHOSE_BUFFER_INTERVAL_S,
                    size_in_mbs: FIREHOSE_BUFFER_SIZE_MB,
                },
                compression_format: "GZIP",
                role_arn: role.get_att("Arn"),
                cloud_watch_logging_options: CloudWatchLoggingOptions {
                    enabled: true,
                    log_group_name: log_group_name.clone(),
                    log_stream_name: FIREHOSE_ERROR_LOG_STREAM.to_string(),
                },
            },
        })?;
        // log group has to exist before firehose starts writing errors to it.
        template.add_dependency(&delivery_stream, &log_group)?;

        Ok(FirehoseDelivery {
            delivery_stream,
            delivery_stream_name,
            log_group,
            log_group_name,
            log_stream,
            role,
        })
    }

    fn firehose_role(&self, props: &KinesisStreamFirehoseS3Props, bucket_arn: &str, log_group_name: &str, role_name: &str) -> Role {
        let KinesisStreamFirehoseS3Props { region, account_id, .. } = *props;
        let default_lambda = arn_lambda_function(region, account_id, "%FIREHOSE_DEFAULT_FUNCTION%:%FIREHOSE_DEFAULT_VERSION%");
        let log_stream_arn = format!("arn:aws:logs:{region}:{account_id}:log-group:{log_group_name}:log-stream:*");
        Role {
            role_name: Some(role_name.to_string()),
            assume_role_policy_document: assume_role_policy_doc("firehose.amazonaws.com"),
            managed_policy_arns: vec![],
            policies: vec![
                InlinePolicy::new("GluePermissions", vec![
                    PolicyStatement::allow(&["glue:GetTableVersions"], vec!["*"]),
                ]),
                InlinePolicy::new("S3RawDataPermission", vec![
                    PolicyStatement::allow(&[
                        "s3:AbortMultipartUpload",
                        "s3:GetBucketLocation",
                        "s3:GetObject",
                        "s3:ListBucket",
                        "s3:ListBucketMultipartUploads",
                        "s3:PutObject",
                    ], vec![bucket_arn.to_string(), format!("{bucket_arn}/*")]),
                ]),
                InlinePolicy::new("DefaultFirehoseLambda", vec![
                    PolicyStatement::allow(&["lambda:InvokeFunction", "lambda:GetFunctionConfiguration"], vec![default_lambda]),
                ]),
                InlinePolicy::new("InputStreamReadPermissions", vec![
                    PolicyStatement::allow(&[
                        "kinesis:DescribeStream",
                        "kinesis:GetShardIterator",
                        "kinesis:GetRecords",
                    ], vec![self.stream_arn()]),
                ]),
                InlinePolicy::new("CloudWatchLogsPermissions", vec![
                    PolicyStatement::allow(&["logs:PutLogEvents"], vec![log_stream_arn]),
                ]),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(features: StreamFeatures) -> KinesisStreamFirehoseS3Props<'static> {
        KinesisStreamFirehoseS3Props {
            application_name: "Foo",
            region: "us-east-1",
            account_id: "123456789012",
            features,
            stream_consumer_lambda_arn: Some("arn:aws:lambda:us-east-1:123456789012:function:FooScoreboard"),
            stream_consumer_role: Some("FooScoreboardRole"),
            bucket_destination_arn: Some("arn:aws:s3:::foo.raw"),
        }
    }

    fn count(template: &Template, ty: &str) -> usize {
        template.resources_of_type(ty).count()
    }

    #[test]
    fn stream_only_by_default() {
        let mut template = Template::default();
        let k = KinesisStreamFirehoseS3::new(&mut template, &props(StreamFeatures::default())).unwrap();
        assert_eq!(template.resources.len(), 1);
        assert_eq!(k.stream_name, "Foo_InputStream");
        let stream = template.resource("FooInputStream").unwrap();
        assert_eq!(stream.properties, json!({ "Name": "Foo_InputStream", "ShardCount": 1 }));
        assert!(k.firehose.is_none());
        assert!(k.event_source.is_none());
    }

    #[test]
    fn firehose_flag_creates_exactly_one_of_each() {
        let mut template = Template::default();
        let features = StreamFeatures { firehose: true, kinesis_integration: false };
        let k = KinesisStreamFirehoseS3::new(&mut template, &props(features)).unwrap();
        assert_eq!(count(&template, "AWS::KinesisFirehose::DeliveryStream"), 1);
        assert_eq!(count(&template, "AWS::Logs::LogGroup"), 1);
        assert_eq!(count(&template, "AWS::Logs::LogStream"), 1);
        assert_eq!(count(&template, "AWS::IAM::Role"), 1);
        assert_eq!(count(&template, "AWS::Lambda::EventSourceMapping"), 0);

        let firehose = k.firehose.unwrap();
        let delivery = template.resource(firehose.delivery_stream.as_str()).unwrap();
        assert_eq!(delivery.depends_on, vec![firehose.log_group.to_string()]);
        let s3 = &delivery.properties["S3DestinationConfiguration"];
        assert_eq!(s3["BucketARN"], "arn:aws:s3:::foo.raw");
        assert_eq!(s3["BufferingHints"], json!({ "IntervalInSeconds": 300, "SizeInMBs": 1 }));
        assert_eq!(s3["CompressionFormat"], "GZIP");
        assert_eq!(s3["CloudWatchLoggingOptions"]["LogGroupName"], "/aws/kinesisfirehose/Foo_Firehose");
        assert_eq!(delivery.properties["KinesisStreamSourceConfiguration"]["KinesisStreamARN"], json!({ "Fn::GetAtt": ["FooInputStream", "Arn"] }));

        let role = template.resource("FooFirehoseToStreamsRole").unwrap();
        let names: Vec<_> = role.properties["Policies"].as_array().unwrap()
            .iter().map(|p| p["PolicyName"].as_str().unwrap()).collect();
        assert_eq!(names, [
            "GluePermissions",
            "S3RawDataPermission",
            "DefaultFirehoseLambda",
            "InputStreamReadPermissions",
            "CloudWatchLogsPermissions",
        ]);
    }

    #[test]
    fn firehose_needs_a_bucket() {
        let mut template = Template::default();
        let mut p = props(StreamFeatures { firehose: true, kinesis_integration: false });
        p.bucket_destination_arn = None;
        let err = KinesisStreamFirehoseS3::new(&mut template, &p).unwrap_err();
        assert!(matches!(err, Error::MissingParameter(k) if k == "rawbucketarn"));
    }

    #[test]
    fn kinesis_integration_binds_lambda() {
        let mut template = Template::default();
        let features = StreamFeatures { firehose: false, kinesis_integration: true };
        let k = KinesisStreamFirehoseS3::new(&mut template, &props(features)).unwrap();
        let mapping = template.resource(k.event_source.unwrap().as_str()).unwrap();
        assert_eq!(mapping.properties["BatchSize"], 700);
        assert_eq!(mapping.properties["StartingPosition"], "LATEST");
        assert_eq!(mapping.properties["FunctionName"], "arn:aws:lambda:us-east-1:123456789012:function:FooScoreboard");
        assert_eq!(mapping.depends_on, ["FooInputStreamConsumerPolicy"]);
        assert_eq!(count(&template, "AWS::KinesisFirehose::DeliveryStream"), 0);

        let policy = template.resource("FooInputStreamConsumerPolicy").unwrap();
        assert_eq!(policy.properties["Roles"], json!(["FooScoreboardRole"]));
        let statement = &policy.properties["PolicyDocument"]["Statement"][0];
        assert_eq!(statement["Resource"], json!([{ "Fn::GetAtt": ["FooInputStream", "Arn"] }]));
        assert!(statement["Action"].as_array().unwrap().contains(&json!("kinesis:GetRecords")));
    }

    #[test]
    fn kinesis_integration_needs_consumer_role() {
        let mut template = Template::default();
        let mut p = props(StreamFeatures { firehose: false, kinesis_integration: true });
        p.stream_consumer_role = None;
        let err = KinesisStreamFirehoseS3::new(&mut template, &p).unwrap_err();
        assert!(matches!(err, Error::MissingParameter(k) if k == "references.scoreboard_lambda_role"));
        assert_eq!(count(&template, "AWS::Lambda::EventSourceMapping"), 0);
    }
}
