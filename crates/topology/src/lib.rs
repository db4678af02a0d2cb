//! Isolated-network topology: one network with no route out, two independent
//! paths reaching S3 and Secrets Manager through VPC endpoints, each fronted
//! by its own HTTP API.

pub mod config;
pub mod error;
pub mod front_door;
pub mod function;
pub mod naming;
pub mod network;
pub mod secret;
pub mod storage;

pub use config::{
    FunctionConfig, HandlerBundle, HandlerConfig, NetworkConfig, SecretConfig, StorageConfig, Teardown, TopologyConfig,
    DEFAULT_STACK_NAME,
};
pub use error::{Result, TopologyError};
pub use front_door::FrontDoor;
pub use function::FunctionHandle;
pub use network::{Cidr, IsolatedSubnet, Network};
pub use secret::SecretPath;
pub use storage::{ContentSeed, StoragePath};

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};
use vpce_cfn::intrinsic::resource_references;
use vpce_cfn::CfnTemplate;
use vpce_core::{Graph, ResourceId};

pub const DESCRIPTION: &str =
    "Functions in isolated subnets reading S3 and Secrets Manager through VPC endpoints";

#[derive(Debug)]
pub struct Topology {
    pub environment_id: String,
    pub graph: Graph,
    pub network: Network,
    pub storage: StoragePath,
    pub secret: SecretPath,
}

impl Topology {
    /// Validates the config and builds network, storage path and secret path
    /// in that order, then checks the wiring.
    pub fn build(cfg: &TopologyConfig) -> Result<Self> {
        cfg.validate()?;
        let code_bucket = cfg.code_bucket()?;
        let mut graph = Graph::new();
        let network = Network::build(&mut graph, &cfg.network)?;
        let storage = StoragePath::build(&mut graph, &network, &cfg.storage, &cfg.environment_id, &code_bucket)?;
        let secret = SecretPath::build(&mut graph, &network, &cfg.secret, &code_bucket)?;
        let topology = Self { environment_id: cfg.environment_id.clone(), graph, network, storage, secret };
        topology.check_wiring()?;
        info!(
            environment_id = %topology.environment_id,
            resources = topology.graph.len(),
            "topology built"
        );
        Ok(topology)
    }

    pub fn front_doors(&self) -> [&FrontDoor; 2] { [&self.storage.front_door, &self.secret.front_door] }

    pub fn functions(&self) -> [&FunctionHandle; 2] { [&self.storage.function, &self.secret.function] }

    /// Each front door reaches only the function built in its own path, no
    /// function sits behind two front doors, and each grant is scoped to the
    /// one resource its path created.
    pub fn check_wiring(&self) -> Result<()> {
        let paths = [
            (&self.storage.front_door, &self.storage.function, &self.storage.grant, &self.storage.bucket),
            (&self.secret.front_door, &self.secret.function, &self.secret.grant, &self.secret.secret),
        ];
        let mut bound = BTreeSet::new();
        for (door, function, grant, scope) in paths {
            if door.bound_function != function.id {
                return Err(TopologyError::wiring(format!(
                    "{} routes to {}, expected {}", door.rest_api, door.bound_function, function.id
                )));
            }
            if !bound.insert(function.id.clone()) {
                return Err(TopologyError::wiring(format!("{} sits behind two front doors", function.id)));
            }
            let targets = self.integration_targets(&door.rest_api);
            if targets != BTreeSet::from([function.id.clone()]) {
                return Err(TopologyError::wiring(format!(
                    "{} integrates {:?}, expected only {}", door.rest_api, targets, function.id
                )));
            }
            let scoped = self.grant_scope(grant, &function.role);
            if scoped != BTreeSet::from([scope.clone()]) {
                return Err(TopologyError::wiring(format!("{grant} is scoped to {scoped:?}, expected only {scope}")));
            }
        }
        debug!("wiring checked");
        Ok(())
    }

    /// Functions targeted by the methods of one REST API.
    fn integration_targets(&self, api: &ResourceId) -> BTreeSet<ResourceId> {
        self.graph
            .of_kind("AWS::ApiGateway::Method")
            .filter(|m| m.deps().contains(api))
            .flat_map(|m| resource_references(&m.properties()["Integration"]["Uri"]))
            .collect()
    }

    fn grant_scope(&self, grant: &ResourceId, role: &ResourceId) -> BTreeSet<ResourceId> {
        match self.graph.get(grant) {
            Some(g) => g.deps().into_iter().filter(|d| d != role).collect(),
            None => BTreeSet::new(),
        }
    }

    /// Renders the CloudFormation template with one exported URL per front door.
    pub fn template(&self) -> Result<CfnTemplate> {
        let outputs: BTreeMap<_, _> = self.front_doors()
            .into_iter()
            .map(|d| (d.output_key.clone(), d.output()))
            .collect();
        Ok(CfnTemplate::from_graph(&self.graph, DESCRIPTION, outputs)?)
    }
}
