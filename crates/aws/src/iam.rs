use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use std::collections::BTreeSet;
use vpce_cfn::intrinsic::{join, pseudo, reference, resource_references, PARTITION};
use vpce_core::{Resource, ResourceId};

pub const LAMBDA_BASIC_EXECUTION: &str = "service-role/AWSLambdaBasicExecutionRole";
pub const LAMBDA_VPC_ACCESS: &str = "service-role/AWSLambdaVPCAccessExecutionRole";

/// Execution identity assumed by a service principal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: ResourceId,
    pub service_principal: String,
    /// AWS-managed policy names, e.g. `service-role/AWSLambdaBasicExecutionRole`.
    #[serde(default)]
    pub managed_policies: Vec<String>,
}

impl Role {
    pub fn for_lambda(id: ResourceId) -> Self {
        Self {
            id,
            service_principal: "lambda.amazonaws.com".to_string(),
            managed_policies: vec![LAMBDA_BASIC_EXECUTION.to_string(), LAMBDA_VPC_ACCESS.to_string()],
        }
    }
}

impl Resource for Role {
    fn id(&self) -> &ResourceId { &self.id }
    fn kind(&self) -> &'static str { "AWS::IAM::Role" }
    fn properties(&self) -> Json {
        json!({
            "AssumeRolePolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Action": "sts:AssumeRole",
                    "Effect": "Allow",
                    "Principal": { "Service": self.service_principal },
                }],
            },
            "ManagedPolicyArns": self.managed_policies.iter().map(|p| join("", vec![
                json!("arn:"), pseudo(PARTITION), json!(format!(":iam::aws:policy/{p}")),
            ])).collect::<Vec<_>>(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub actions: Vec<String>,
    pub resources: Vec<Json>,
}

/// Inline policy attached to exactly one role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: ResourceId,
    pub policy_name: String,
    pub role: ResourceId,
    pub statements: Vec<Statement>,
}

impl Resource for Policy {
    fn id(&self) -> &ResourceId { &self.id }
    fn kind(&self) -> &'static str { "AWS::IAM::Policy" }
    /// The role plus every resource the statements are scoped to.
    fn deps(&self) -> BTreeSet<ResourceId> {
        let mut d = BTreeSet::from([self.role.clone()]);
        for s in &self.statements {
            for r in &s.resources { d.extend(resource_references(r)); }
        }
        d
    }
    fn properties(&self) -> Json {
        json!({
            "PolicyName": self.policy_name,
            "PolicyDocument": {
                "Version": "2012-10-17",
                "Statement": self.statements.iter().map(|s| json!({
                    "Action": s.actions,
                    "Effect": "Allow",
                    "Resource": s.resources,
                })).collect::<Vec<_>>(),
            },
            "Roles": [reference(&self.role)],
        })
    }
}
