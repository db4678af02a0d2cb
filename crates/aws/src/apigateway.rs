use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use std::collections::BTreeSet;
use vpce_cfn::intrinsic::{get_att, join, pseudo, reference, PARTITION, REGION};
use vpce_core::{Resource, ResourceId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestApi {
    pub id: ResourceId,
    pub name: String,
}

impl Resource for RestApi {
    fn id(&self) -> &ResourceId { &self.id }
    fn kind(&self) -> &'static str { "AWS::ApiGateway::RestApi" }
    fn properties(&self) -> Json { json!({ "Name": self.name }) }
}

/// Path segment under the API root, e.g. `{proxy+}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResource {
    pub id: ResourceId,
    pub rest_api: ResourceId,
    pub path_part: String,
}

impl Resource for ApiResource {
    fn id(&self) -> &ResourceId { &self.id }
    fn kind(&self) -> &'static str { "AWS::ApiGateway::Resource" }
    fn deps(&self) -> BTreeSet<ResourceId> { BTreeSet::from([self.rest_api.clone()]) }
    fn properties(&self) -> Json {
        json!({
            "ParentId": get_att(&self.rest_api, "RootResourceId"),
            "PathPart": self.path_part,
            "RestApiId": reference(&self.rest_api),
        })
    }
}

/// Lambda proxy method. `resource: None` binds the API root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Method {
    pub id: ResourceId,
    pub rest_api: ResourceId,
    pub resource: Option<ResourceId>,
    pub http_method: String,
    pub function: ResourceId,
}

impl Resource for Method {
    fn id(&self) -> &ResourceId { &self.id }
    fn kind(&self) -> &'static str { "AWS::ApiGateway::Method" }
    fn deps(&self) -> BTreeSet<ResourceId> {
        let mut d = BTreeSet::from([self.rest_api.clone(), self.function.clone()]);
        if let Some(r) = &self.resource { d.insert(r.clone()); }
        d
    }
    fn properties(&self) -> Json {
        let resource_id = match &self.resource {
            Some(r) => reference(r),
            None => get_att(&self.rest_api, "RootResourceId"),
        };
        json!({
            "AuthorizationType": "NONE",
            "HttpMethod": self.http_method,
            "Integration": {
                "IntegrationHttpMethod": "POST",
                "Type": "AWS_PROXY",
                "Uri": join("", vec![
                    json!("arn:"), pseudo(PARTITION), json!(":apigateway:"), pseudo(REGION),
                    json!(":lambda:path/2015-03-31/functions/"), get_att(&self.function, "Arn"),
                    json!("/invocations"),
                ]),
            },
            "ResourceId": resource_id,
            "RestApiId": reference(&self.rest_api),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: ResourceId,
    pub rest_api: ResourceId,
    /// A deployment snapshots the methods, so it must come after all of them.
    pub methods: Vec<ResourceId>,
}

impl Resource for Deployment {
    fn id(&self) -> &ResourceId { &self.id }
    fn kind(&self) -> &'static str { "AWS::ApiGateway::Deployment" }
    fn deps(&self) -> BTreeSet<ResourceId> {
        let mut d = BTreeSet::from([self.rest_api.clone()]);
        d.extend(self.methods.iter().cloned());
        d
    }
    fn properties(&self) -> Json {
        json!({ "Description": "Automatically created by vpce", "RestApiId": reference(&self.rest_api) })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub id: ResourceId,
    pub rest_api: ResourceId,
    pub deployment: ResourceId,
    pub stage_name: String,
}

impl Resource for Stage {
    fn id(&self) -> &ResourceId { &self.id }
    fn kind(&self) -> &'static str { "AWS::ApiGateway::Stage" }
    fn deps(&self) -> BTreeSet<ResourceId> {
        BTreeSet::from([self.rest_api.clone(), self.deployment.clone()])
    }
    fn properties(&self) -> Json {
        json!({
            "DeploymentId": reference(&self.deployment),
            "RestApiId": reference(&self.rest_api),
            "StageName": self.stage_name,
        })
    }
}
