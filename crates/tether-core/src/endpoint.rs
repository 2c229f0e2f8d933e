//! Closable endpoint contract shared by pipes, punch clients and relay sessions.

use async_trait::async_trait;

use crate::errors::TetherError;

/// Anything a node holds open and must release on shutdown.
#[async_trait]
pub trait Closable: Send + Sync {
    /// Release the underlying resources.
    async fn close(&self) -> Result<(), TetherError>;

    /// Short label used in logs.
    fn label(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}
