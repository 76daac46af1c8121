use thiserror::Error;

/// Failure to obtain a container snapshot from the runtime.
#[derive(Debug, Error)]
pub enum InspectError {
    #[error("docker: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("container {0} not found")]
    NotFound(String),
}

/// Failure reported by a registry backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry backend is closed")]
    Closed,
    #[error("registry rejected request: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("unable to inspect container {container}: {source}")]
    Inspection {
        container: String,
        #[source]
        source: InspectError,
    },
}
