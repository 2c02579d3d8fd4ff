use std::fmt;
use zeroize::Zeroizing;

/// The `tokens` columns `resolve` needs; `secret` is still sealed.
#[derive(Debug, Clone)]
pub struct DbTokenRow {
    pub token: String,
    pub kind: String,
    pub address: String,
    pub schema_name: String,
    pub login: String,
    pub secret: Vec<u8>,
}

/// Caller-supplied connection details for `register` / `update`.
#[derive(Clone)]
pub struct NewCredentialSet {
    pub address: String,
    pub schema: String,
    pub login: String,
    pub secret: Zeroizing<String>,
}

impl NewCredentialSet {
    pub fn new(
        address: impl Into<String>,
        schema: impl Into<String>,
        login: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            schema: schema.into(),
            login: login.into(),
            secret: Zeroizing::new(secret.into()),
        }
    }
}

impl fmt::Debug for NewCredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewCredentialSet")
            .field("address", &self.address)
            .field("schema", &self.schema)
            .field("login", &self.login)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// A resolved credential-set with its secret decrypted.
/// Only built right before a target connection is opened.
#[derive(Clone)]
pub struct CredentialSet {
    pub token: String,
    pub kind: String,
    pub address: String,
    pub schema: String,
    pub login: String,
    pub secret: Zeroizing<String>,
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("kind", &self.kind)
            .field("address", &self.address)
            .field("schema", &self.schema)
            .field("login", &self.login)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
