//! Error types for topology construction.
//!
//! Every variant is a static failure raised before anything is handed to the
//! provisioning engine.

use std::path::PathBuf;
use thiserror::Error;
use vpce_cfn::RenderError;
use vpce_core::GraphError;

pub type Result<T> = std::result::Result<T, TopologyError>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TopologyError {
    /// A configured value is malformed (names, address space, sizes).
    #[error("validation error: {0}")]
    Validation(String),

    /// A required input is absent, e.g. the content-seed directory.
    #[error("missing required input: {0}")]
    MissingInput(String),

    /// A front door or grant is wired to the wrong resource.
    #[error("wiring error: {0}")]
    Wiring(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl TopologyError {
    pub fn validation(msg: impl Into<String>) -> Self { Self::Validation(msg.into()) }

    pub fn missing_input(msg: impl Into<String>) -> Self { Self::MissingInput(msg.into()) }

    pub fn wiring(msg: impl Into<String>) -> Self { Self::Wiring(msg.into()) }
}
