use async_trait::async_trait;

use crate::db::models::{CredentialSet, NewCredentialSet};
use crate::error::BrokerError;

/// Token-indexed credential storage.
///
/// Every lookup by token fails with `BrokerError::NotFound` when the token is
/// unknown. `resolve` reports a secret that cannot be opened as
/// `BrokerError::Decrypt`, distinct from an unknown token.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Register a new credential-set and return its freshly issued token.
    /// Fails with `Duplicate` if `(address, schema)` is already registered.
    async fn register(&self, data: NewCredentialSet) -> Result<String, BrokerError>;

    /// Overwrite every field of the row behind `token`.
    async fn update(&self, token: &str, data: NewCredentialSet) -> Result<(), BrokerError>;

    async fn resolve(&self, token: &str) -> Result<CredentialSet, BrokerError>;

    /// Remove the row behind `token` together with its bookmarks.
    async fn unregister(&self, token: &str) -> Result<(), BrokerError>;

    async fn bookmark(&self, token: &str, account: &str) -> Result<(), BrokerError>;

    /// Removing a bookmark that does not exist is not an error; an unknown token is.
    async fn unbookmark(&self, token: &str, account: &str) -> Result<(), BrokerError>;

    /// Accounts bookmarked under `token`, oldest first.
    async fn bookmarks(&self, token: &str) -> Result<Vec<String>, BrokerError>;
}
