use async_trait::async_trait;

use crate::error::RegistryError;
use crate::types::Service;

pub mod channel;
pub use channel::{run_publisher, Catalog, ChannelRegistry};

/// A service registry backend.
///
/// Both calls may be retried, so implementations must tolerate seeing the
/// same service more than once.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    async fn register(&self, service: &Service) -> Result<(), RegistryError>;
    async fn deregister(&self, service: &Service) -> Result<(), RegistryError>;
}
