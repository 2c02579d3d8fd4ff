//! Names and literals spliced into target-database DDL.
//!
//! DDL cannot take bind parameters, so account names are restricted to plain
//! identifiers and always emitted double-quoted, and secrets are emitted as
//! single-quoted literals with embedded quotes doubled.

use std::fmt;

use crate::error::BrokerError;

/// Longest identifier PostgreSQL keeps without truncation.
pub const MAX_IDENT_LEN: usize = 63;

/// A validated account name; the backing tablespace shares it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountName(String);

impl AccountName {
    pub fn parse(raw: &str) -> Result<Self, BrokerError> {
        if raw.is_empty() {
            return Err(BrokerError::missing("name"));
        }
        if raw.len() > MAX_IDENT_LEN {
            return Err(BrokerError::Validation(format!(
                "name must be at most {MAX_IDENT_LEN} characters"
            )));
        }
        let mut chars = raw.chars();
        let head_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let tail_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
        if !head_ok || !tail_ok {
            return Err(BrokerError::Validation(format!(
                "name {raw:?} is not a valid identifier"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `"name"`, safe to splice into DDL.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Single-quoted SQL string literal. NUL cannot be represented and is rejected.
pub fn quote_literal(value: &str) -> Result<String, BrokerError> {
    if value.contains('\0') {
        return Err(BrokerError::Validation(
            "value must not contain NUL characters".to_string(),
        ));
    }
    Ok(format!("'{}'", value.replace('\'', "''")))
}
