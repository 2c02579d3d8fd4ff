//! Target databases: where accounts are actually provisioned.
//!
//! A `TargetConnector` turns a resolved credential-set into a live
//! `TargetSession` scoped to one request. Sessions expose the individual DDL
//! steps; sequencing and cleanup live in `service::provisioner`.

pub mod ident;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error as ThisError;

use crate::db::CredentialSet;
use crate::error::BrokerError;
pub use ident::AccountName;
pub use postgres::PgConnector;

/// Failure of a single statement against the target.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum TargetError {
    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    Statement(String),
}

#[async_trait]
pub trait TargetConnector: Send + Sync {
    /// Engine identifier recorded on stored credential rows (e.g. "postgres").
    fn kind(&self) -> &'static str;

    /// Connect and probe the connection before returning it.
    /// Failures are `BrokerError::Connect` and never carry the secret.
    async fn open(&self, creds: &CredentialSet) -> Result<Box<dyn TargetSession>, BrokerError>;
}

/// One live connection to a target database.
#[async_trait]
pub trait TargetSession: Send {
    /// Allocate the storage object backing `name`.
    async fn create_tablespace(&mut self, name: &AccountName) -> Result<(), TargetError>;

    async fn drop_tablespace(&mut self, name: &AccountName) -> Result<(), TargetError>;

    /// Create the login bound to its own tablespace, with the fixed account
    /// policy and unlimited use of that tablespace. All or nothing.
    async fn create_login(&mut self, name: &AccountName, secret: &str) -> Result<(), TargetError>;

    async fn drop_login(&mut self, name: &AccountName) -> Result<(), TargetError>;

    /// Grant the configured role to `name`.
    async fn grant_role(&mut self, name: &AccountName) -> Result<(), TargetError>;

    fn granted_role(&self) -> &str;

    /// Release the connection. Safe to call more than once.
    async fn close(&mut self);
}
