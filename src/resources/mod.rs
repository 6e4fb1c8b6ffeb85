mod iam;
pub use iam::*;
mod ssm;
pub use ssm::*;
mod s3_bucket;
pub use s3_bucket::*;
mod api_gateway;
pub use api_gateway::*;

// higher level resources:
mod kinesis;
pub use kinesis::*;
mod api_ssm_config;
pub use api_ssm_config::*;
