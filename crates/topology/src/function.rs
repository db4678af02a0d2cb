//! Functions placed in the isolated subnets, and their least-privilege grants.

use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use vpce_aws::{Function, FunctionCode, Role, SecurityGroup, Statement, VpcPlacement};
use vpce_core::{Graph, ResourceId};

use crate::config::FunctionConfig;
use crate::error::{Result, TopologyError};
use crate::network::Network;

/// What a path keeps about its function after adding it to the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionHandle {
    pub id: ResourceId,
    pub role: ResourceId,
}

/// Adds the execution role, the function's security group and the function
/// itself. `env_value` is the literal name of the one resource the function
/// reads; `depends_on` must already be in the graph (the attachment and the
/// named resource), otherwise the add fails.
pub fn add_function(
    graph: &mut Graph,
    network: &Network,
    id: ResourceId,
    cfg: &FunctionConfig,
    code_bucket: &str,
    env_value: &str,
    depends_on: BTreeSet<ResourceId>,
) -> Result<FunctionHandle> {
    if env_value.is_empty() {
        return Err(TopologyError::missing_input(format!("{}: value of {}", cfg.name, cfg.env_var)));
    }
    let role = graph.add(Role::for_lambda(id.child("ServiceRole")?))?;
    let security_group = graph.add(SecurityGroup {
        id: id.child("SecurityGroup")?,
        vpc: network.vpc.clone(),
        description: format!("Automatic security group for {}", cfg.name),
        ingress: Vec::new(),
    })?;
    let environment = BTreeMap::from([(cfg.env_var.clone(), json!(env_value))]);
    let function = Function {
        id,
        function_name: cfg.name.clone(),
        runtime: cfg.runtime.clone(),
        handler: cfg.handler.clone(),
        memory_mb: cfg.memory_mb,
        timeout_secs: cfg.timeout_secs,
        architecture: cfg.architecture,
        role: role.clone(),
        code: FunctionCode { s3_bucket: code_bucket.to_string(), s3_key: cfg.code_key.clone() },
        vpc: VpcPlacement { subnets: network.subnet_ids(), security_groups: vec![security_group] },
        environment,
        depends_on,
    };
    let id = graph.add(function)?;
    debug!(function = %id, name = %cfg.name, env_var = %cfg.env_var, "function added");
    Ok(FunctionHandle { id, role })
}

/// Attaches an inline policy to the function's role. Every resource the
/// statements scope to must already be in the graph.
pub fn add_grant(
    graph: &mut Graph,
    function: &FunctionHandle,
    suffix: &str,
    statements: Vec<Statement>,
) -> Result<ResourceId> {
    if statements.is_empty() || statements.iter().any(|s| s.actions.is_empty() || s.resources.is_empty()) {
        return Err(TopologyError::validation(format!("{}: grant {suffix} has an empty statement", function.id)));
    }
    let id = function.id.child(suffix)?;
    let grant = vpce_aws::Policy {
        id: id.clone(),
        policy_name: id.as_str().to_string(),
        role: function.role.clone(),
        statements,
    };
    Ok(graph.add(grant)?)
}
