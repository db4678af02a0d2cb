//! Public HTTP front doors. Each one proxies every method and path to exactly
//! one function and exports its invoke URL.

use serde_json::json;
use tracing::debug;
use vpce_aws::{ApiResource, Deployment, Method, Permission, RestApi, Stage};
use vpce_cfn::intrinsic::{join, pseudo, reference, sub, REGION, URL_SUFFIX};
use vpce_cfn::{CfnExport, CfnOutput};
use vpce_core::{Graph, ResourceId};

use crate::error::{Result, TopologyError};
use crate::function::FunctionHandle;

pub const STAGE_NAME: &str = "prod";
const PROXY_PATH: &str = "{proxy+}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontDoor {
    pub rest_api: ResourceId,
    pub name: String,
    pub bound_function: ResourceId,
    pub stage: ResourceId,
    pub permission: ResourceId,
    pub output_key: String,
    pub export_name: String,
}

impl FrontDoor {
    /// `https://<api>.execute-api.<region>.<suffix>/<stage>/`
    pub fn url(&self) -> serde_json::Value {
        join("", vec![
            json!("https://"), reference(&self.rest_api), json!(".execute-api."), pseudo(REGION),
            json!("."), pseudo(URL_SUFFIX), json!("/"), reference(&self.stage), json!("/"),
        ])
    }

    pub fn output(&self) -> CfnOutput {
        CfnOutput {
            description: Some(format!("Invoke URL of {}", self.name)),
            value: self.url(),
            export: Some(CfnExport { name: self.export_name.clone() }),
        }
    }
}

/// Adds a REST API routing `ANY /` and `ANY /{proxy+}` to `function`, its
/// deployment and stage, and the permission letting the API invoke it.
pub fn add_front_door(
    graph: &mut Graph,
    id: ResourceId,
    name: &str,
    function: &FunctionHandle,
    export_name: &str,
) -> Result<FrontDoor> {
    if name.is_empty() || export_name.is_empty() {
        return Err(TopologyError::missing_input(format!("{id}: front door and export names")));
    }
    let api = graph.add(RestApi { id: id.clone(), name: name.to_string() })?;
    let proxy = graph.add(ApiResource { id: id.child("Proxy")?, rest_api: api.clone(), path_part: PROXY_PATH.to_string() })?;
    let root_any = graph.add(Method {
        id: id.child("RootAny")?,
        rest_api: api.clone(),
        resource: None,
        http_method: "ANY".to_string(),
        function: function.id.clone(),
    })?;
    let proxy_any = graph.add(Method {
        id: id.child("ProxyAny")?,
        rest_api: api.clone(),
        resource: Some(proxy),
        http_method: "ANY".to_string(),
        function: function.id.clone(),
    })?;
    let deployment = graph.add(Deployment {
        id: id.child("Deployment")?,
        rest_api: api.clone(),
        methods: vec![root_any, proxy_any],
    })?;
    let stage = graph.add(Stage {
        id: deployment.child("StageProd")?,
        rest_api: api.clone(),
        deployment,
        stage_name: STAGE_NAME.to_string(),
    })?;
    let permission = graph.add(Permission {
        id: id.child("InvokePermission")?,
        function: function.id.clone(),
        principal: "apigateway.amazonaws.com".to_string(),
        source_arn: sub(format!(
            "arn:${{AWS::Partition}}:execute-api:${{AWS::Region}}:${{AWS::AccountId}}:${{{api}}}/*/*"
        )),
    })?;
    debug!(api = %api, function = %function.id, "front door added");
    Ok(FrontDoor {
        output_key: format!("{api}Endpoint"),
        rest_api: api,
        name: name.to_string(),
        bound_function: function.id.clone(),
        stage,
        permission,
        export_name: export_name.to_string(),
    })
}
