use serde::{Serialize, Deserialize};
use serde_json::Value as Json;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use thiserror::Error;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::algo::toposort;
use tracing::debug;

/// Logical id of a resource inside the deployment graph (the template key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub String);

impl ResourceId {
    /// Logical ids are ASCII alphanumeric, 1..=255 chars.
    pub fn new(id: impl Into<String>) -> Result<Self, GraphError> {
        let id = id.into();
        if id.is_empty() || id.len() > 255 || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(GraphError::InvalidId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str { &self.0 }

    /// Derives a child id by appending a suffix, e.g. `Vpc` + `Subnet1`.
    pub fn child(&self, suffix: &str) -> Result<Self, GraphError> {
        Self::new(format!("{}{}", self.0, suffix))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionPolicy { Delete, Retain }

impl DeletionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self { DeletionPolicy::Delete => "Delete", DeletionPolicy::Retain => "Retain" }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("dependency cycle detected at {0}")]
    Cycle(ResourceId),
    #[error("duplicate resource id {0}")]
    Duplicate(ResourceId),
    #[error("{from} depends on {to}, which has not been constructed")]
    Dangling { from: ResourceId, to: ResourceId },
    #[error("invalid logical id '{0}': use 1-255 ASCII letters and digits")]
    InvalidId(String),
}

/// A declarative resource descriptor. Nothing here talks to a cloud API; the
/// provisioning engine consumes the rendered properties.
pub trait Resource: fmt::Debug + Send + Sync {
    fn id(&self) -> &ResourceId;
    /// Provider type name, e.g. `AWS::S3::Bucket`.
    fn kind(&self) -> &'static str;
    fn deps(&self) -> BTreeSet<ResourceId> { BTreeSet::new() }
    fn properties(&self) -> Json;
    fn deletion_policy(&self) -> Option<DeletionPolicy> { None }
}

/// Append-only dependency graph. A resource can only be added once everything
/// it depends on is already present, so insertion order is a valid
/// construction order and no reference can dangle.
#[derive(Debug, Default)]
pub struct Graph {
    g: DiGraph<ResourceId, ()>,
    index: HashMap<ResourceId, NodeIndex>,
    nodes: Vec<Box<dyn Resource>>,
}

impl Graph {
    pub fn new() -> Self { Self::default() }

    pub fn add<R: Resource + 'static>(&mut self, r: R) -> Result<ResourceId, GraphError> {
        let id = r.id().clone();
        if self.index.contains_key(&id) {
            return Err(GraphError::Duplicate(id));
        }
        let deps = r.deps();
        if let Some(missing) = deps.iter().find(|d| !self.index.contains_key(*d)) {
            return Err(GraphError::Dangling { from: id, to: missing.clone() });
        }
        let ix = self.g.add_node(id.clone());
        for d in &deps {
            self.g.add_edge(self.index[d], ix, ());
        }
        debug!(id = %id, kind = r.kind(), deps = deps.len(), "resource added");
        self.index.insert(id.clone(), ix);
        self.nodes.push(Box::new(r));
        Ok(id)
    }

    pub fn contains(&self, id: &ResourceId) -> bool { self.index.contains_key(id) }

    pub fn get(&self, id: &ResourceId) -> Option<&dyn Resource> {
        self.index.get(id).map(|ix| self.nodes[ix.index()].as_ref())
    }

    /// Insertion position, i.e. when the resource was constructed.
    pub fn position(&self, id: &ResourceId) -> Option<usize> {
        self.index.get(id).map(|ix| ix.index())
    }

    pub fn len(&self) -> usize { self.nodes.len() }
    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    /// Resources in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Resource> + '_ {
        self.nodes.iter().map(|b| b.as_ref())
    }

    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a dyn Resource> + 'a {
        self.iter().filter(move |r| r.kind() == kind)
    }

    /// Resources in dependency order (dependencies first).
    pub fn ordered(&self) -> Result<Vec<&dyn Resource>, GraphError> {
        let ordered_ix = toposort(&self.g, None)
            .map_err(|c| GraphError::Cycle(self.g[c.node_id()].clone()))?;
        Ok(ordered_ix.into_iter().map(|ix| self.nodes[ix.index()].as_ref()).collect())
    }
}
