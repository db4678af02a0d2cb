use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use std::collections::{BTreeMap, BTreeSet};
use vpce_cfn::intrinsic::{get_att, reference, resource_references};
use vpce_core::{Resource, ResourceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Architecture {
    #[serde(rename = "arm64")]
    Arm64,
    #[serde(rename = "x86_64")]
    X86,
}

impl Architecture {
    pub fn as_str(&self) -> &'static str {
        match self { Architecture::Arm64 => "arm64", Architecture::X86 => "x86_64" }
    }
}

/// Location of the opaque handler artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCode {
    pub s3_bucket: String,
    pub s3_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcPlacement {
    pub subnets: Vec<ResourceId>,
    pub security_groups: Vec<ResourceId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub id: ResourceId,
    pub function_name: String,
    pub runtime: String,
    pub handler: String,
    pub memory_mb: u32,
    pub timeout_secs: u32,
    pub architecture: Architecture,
    pub role: ResourceId,
    pub code: FunctionCode,
    pub vpc: VpcPlacement,
    pub environment: BTreeMap<String, Json>,
    /// Ordering-only dependencies, e.g. the endpoint the function talks through.
    #[serde(default)]
    pub depends_on: BTreeSet<ResourceId>,
}

impl Resource for Function {
    fn id(&self) -> &ResourceId { &self.id }
    fn kind(&self) -> &'static str { "AWS::Lambda::Function" }
    fn deps(&self) -> BTreeSet<ResourceId> {
        let mut d = BTreeSet::from([self.role.clone()]);
        d.extend(self.vpc.subnets.iter().cloned());
        d.extend(self.vpc.security_groups.iter().cloned());
        d.extend(self.depends_on.iter().cloned());
        for v in self.environment.values() { d.extend(resource_references(v)); }
        d
    }
    fn properties(&self) -> Json {
        json!({
            "FunctionName": self.function_name,
            "Runtime": self.runtime,
            "Handler": self.handler,
            "MemorySize": self.memory_mb,
            "Timeout": self.timeout_secs,
            "Architectures": [self.architecture.as_str()],
            "Role": get_att(&self.role, "Arn"),
            "Code": { "S3Bucket": self.code.s3_bucket, "S3Key": self.code.s3_key },
            "VpcConfig": {
                "SubnetIds": self.vpc.subnets.iter().map(reference).collect::<Vec<_>>(),
                "SecurityGroupIds": self.vpc.security_groups.iter()
                    .map(|g| get_att(g, "GroupId")).collect::<Vec<_>>(),
            },
            "Environment": { "Variables": self.environment },
        })
    }
}

/// Resource-based permission letting a service principal invoke a function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: ResourceId,
    pub function: ResourceId,
    pub principal: String,
    pub source_arn: Json,
}

impl Resource for Permission {
    fn id(&self) -> &ResourceId { &self.id }
    fn kind(&self) -> &'static str { "AWS::Lambda::Permission" }
    fn deps(&self) -> BTreeSet<ResourceId> {
        let mut d = BTreeSet::from([self.function.clone()]);
        d.extend(resource_references(&self.source_arn));
        d
    }
    fn properties(&self) -> Json {
        json!({
            "Action": "lambda:InvokeFunction",
            "FunctionName": get_att(&self.function, "Arn"),
            "Principal": self.principal,
            "SourceArn": self.source_arn,
        })
    }
}
