//! Credential store: registered credential-sets keyed by token, plus the
//! bookmarks of accounts provisioned under each token.
//!
//! Layout:
//! - `models.rs`: row structs and the resolved `CredentialSet`
//! - `schema.rs`: SQL DDL for initializing the database (SQLite)
//! - `traits.rs`: the `TokenStore` contract the broker depends on
//! - `sqlite.rs`: the sqlx/SQLite implementation

pub mod models;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use models::{CredentialSet, DbTokenRow, NewCredentialSet};
pub use schema::SQLITE_INIT;
pub use sqlite::{SqlitePool, SqliteTokenStore};
pub use traits::TokenStore;
