use serde::{Serialize, Deserialize};
use serde_json::{json, Value as Json};
use std::fmt;

pub mod apigateway;
pub mod ec2;
pub mod iam;
pub mod lambda;
pub mod s3;
pub mod secretsmanager;

pub use apigateway::{ApiResource, Deployment, Method, RestApi, Stage};
pub use ec2::{EndpointPlacement, IngressRule, RouteTable, SecurityGroup, Subnet, SubnetRouteTableAssociation, Vpc, VpcEndpoint};
pub use iam::{Policy, Role, Statement};
pub use lambda::{Architecture, Function, FunctionCode, Permission, VpcPlacement};
pub use s3::Bucket;
pub use secretsmanager::{Secret, SecretTemplate};

/// External services a network can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AwsService { S3, SecretsManager }

impl AwsService {
    /// Suffix of `com.amazonaws.<region>.<suffix>`.
    pub fn endpoint_name(&self) -> &'static str {
        match self { AwsService::S3 => "s3", AwsService::SecretsManager => "secretsmanager" }
    }

    /// Whether the service offers a route-table (gateway) endpoint.
    pub fn has_gateway_endpoint(&self) -> bool { matches!(self, AwsService::S3) }
}

impl fmt::Display for AwsService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.endpoint_name()) }
}

pub(crate) fn name_tag(name: &str) -> Json { json!({ "Key": "Name", "Value": name }) }
