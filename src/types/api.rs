use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::NewCredentialSet;

/// `POST /api/v1/token`
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    #[serde(alias = "dbaddr")]
    pub address: String,
    #[serde(alias = "dbname")]
    pub schema: String,
    #[serde(alias = "username")]
    pub login: String,
    #[serde(alias = "password")]
    pub secret: String,
}

impl From<RegisterRequest> for NewCredentialSet {
    fn from(req: RegisterRequest) -> Self {
        NewCredentialSet::new(req.address, req.schema, req.login, req.secret)
    }
}

/// `PATCH /api/v1/token`
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct UpdateRequest {
    pub token: String,
    #[serde(flatten)]
    pub credentials: RegisterRequest,
}

/// `DELETE /api/v1/token`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TokenRequest {
    pub token: String,
}

/// `POST /api/v1/account`
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct CreateAccountRequest {
    pub token: String,
    pub name: String,
    #[serde(alias = "password")]
    pub secret: String,
}

/// `DELETE /api/v1/account`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DropAccountRequest {
    pub token: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            warning: None,
        }
    }
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("address", &self.address)
            .field("schema", &self.schema)
            .field("login", &self.login)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for UpdateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateRequest")
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for CreateAccountRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateAccountRequest")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_field_names_are_accepted() {
        let req: UpdateRequest = serde_json::from_str(
            r#"{"token":"t","dbaddr":"db1","dbname":"s1","username":"u","password":"p"}"#,
        )
        .unwrap();
        assert_eq!(req.token, "t");
        assert_eq!(req.credentials.address, "db1");
        assert_eq!(req.credentials.schema, "s1");
        assert_eq!(req.credentials.login, "u");
        assert_eq!(req.credentials.secret, "p");
    }

    #[test]
    fn absent_fields_deserialize_empty() {
        let req: CreateAccountRequest = serde_json::from_str(r#"{"token":"t"}"#).unwrap();
        assert!(req.name.is_empty());
        assert!(req.secret.is_empty());
    }

    #[test]
    fn debug_hides_secrets() {
        let req: RegisterRequest =
            serde_json::from_str(r#"{"address":"a","schema":"s","login":"l","secret":"hunter2"}"#)
                .unwrap();
        assert!(!format!("{req:?}").contains("hunter2"));
    }
}
