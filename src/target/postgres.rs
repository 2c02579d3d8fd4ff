//! PostgreSQL target driver.
//!
//! The registered address is `host[:port]` (IPv6 hosts in brackets) and the
//! registered schema is the database to connect to. Each session owns a single
//! `PgConnection`; nothing is pooled across requests.
//!
//! Statement mapping:
//! - tablespace: `CREATE TABLESPACE "<name>" LOCATION '<root>/<name>'`
//! - login: `CREATE ROLE ... LOGIN`, its `default_tablespace`, and `CREATE` on
//!   its own tablespace, sent as one simple-query batch so PostgreSQL runs it in
//!   a single implicit transaction
//! - grant: `GRANT "<role>" TO "<name>"`

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection, Executor};
use tracing::{debug, warn};

use crate::config::TargetConfig;
use crate::db::CredentialSet;
use crate::error::BrokerError;
use crate::target::ident::{AccountName, quote_literal};
use crate::target::{TargetConnector, TargetError, TargetSession};

/// SQLSTATE `duplicate_object`.
const DUPLICATE_OBJECT: &str = "42710";

pub struct PgConnector {
    cfg: TargetConfig,
    granted_role: AccountName,
}

impl PgConnector {
    pub fn new(cfg: TargetConfig) -> Result<Self, BrokerError> {
        let granted_role = AccountName::parse(&cfg.granted_role).map_err(|_| {
            BrokerError::Validation(format!(
                "target.granted_role {:?} is not a valid identifier",
                cfg.granted_role
            ))
        })?;
        Ok(Self { cfg, granted_role })
    }

    fn connect_options(&self, creds: &CredentialSet) -> Result<PgConnectOptions, BrokerError> {
        let (host, port) = split_address(&creds.address, self.cfg.default_port)?;
        Ok(PgConnectOptions::new()
            .host(&host)
            .port(port)
            .database(&creds.schema)
            .username(&creds.login)
            .password(creds.secret.as_str())
            // statements may carry password literals
            .disable_statement_logging())
    }
}

#[async_trait]
impl TargetConnector for PgConnector {
    fn kind(&self) -> &'static str {
        "postgres"
    }

    async fn open(&self, creds: &CredentialSet) -> Result<Box<dyn TargetSession>, BrokerError> {
        let opts = self
            .connect_options(creds)
            .map_err(|e| BrokerError::Connect(e.to_string()))?;

        let mut conn = tokio::time::timeout(
            self.cfg.connect_timeout(),
            PgConnection::connect_with(&opts),
        )
        .await
        .map_err(|_| BrokerError::Connect("connection attempt timed out".to_string()))?
        .map_err(|e| BrokerError::Connect(e.to_string()))?;

        if let Err(e) = conn.ping().await {
            let _ = conn.close().await;
            return Err(BrokerError::Connect(e.to_string()));
        }
        debug!(address = %creds.address, schema = %creds.schema, "target connection opened");

        Ok(Box::new(PgSession {
            conn: Some(conn),
            tablespace_root: self.cfg.tablespace_root.trim_end_matches('/').to_string(),
            granted_role: self.granted_role.clone(),
            connection_limit: self.cfg.connection_limit,
        }))
    }
}

pub struct PgSession {
    conn: Option<PgConnection>,
    tablespace_root: String,
    granted_role: AccountName,
    connection_limit: i32,
}

impl PgSession {
    async fn exec(&mut self, sql: &str) -> Result<(), TargetError> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| TargetError::Statement("session already closed".to_string()))?;
        conn.execute(sqlx::raw_sql(sql))
            .await
            .map(|_| ())
            .map_err(statement_error)
    }

    fn tablespace_location(&self, name: &AccountName) -> Result<String, TargetError> {
        quote_literal(&format!("{}/{}", self.tablespace_root, name.as_str()))
            .map_err(|e| TargetError::Statement(e.to_string()))
    }
}

#[async_trait]
impl TargetSession for PgSession {
    async fn create_tablespace(&mut self, name: &AccountName) -> Result<(), TargetError> {
        let location = self.tablespace_location(name)?;
        let sql = format!("CREATE TABLESPACE {} LOCATION {}", name.quoted(), location);
        self.exec(&sql).await
    }

    async fn drop_tablespace(&mut self, name: &AccountName) -> Result<(), TargetError> {
        self.exec(&format!("DROP TABLESPACE {}", name.quoted())).await
    }

    async fn create_login(&mut self, name: &AccountName, secret: &str) -> Result<(), TargetError> {
        let password = quote_literal(secret).map_err(|e| TargetError::Statement(e.to_string()))?;
        let tablespace = quote_literal(name.as_str())
            .map_err(|e| TargetError::Statement(e.to_string()))?;
        let ident = name.quoted();
        let sql = format!(
            "CREATE ROLE {ident} LOGIN PASSWORD {password} CONNECTION LIMIT {limit}; \
             ALTER ROLE {ident} SET default_tablespace = {tablespace}; \
             GRANT CREATE ON TABLESPACE {ident} TO {ident}",
            limit = self.connection_limit,
        );
        self.exec(&sql).await
    }

    async fn drop_login(&mut self, name: &AccountName) -> Result<(), TargetError> {
        self.exec(&format!("DROP ROLE {}", name.quoted())).await
    }

    async fn grant_role(&mut self, name: &AccountName) -> Result<(), TargetError> {
        let sql = format!("GRANT {} TO {}", self.granted_role.quoted(), name.quoted());
        self.exec(&sql).await
    }

    fn granted_role(&self) -> &str {
        self.granted_role.as_str()
    }

    async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                warn!(error = %e, "closing target connection failed");
            }
        }
    }
}

/// Map a driver error, keeping the server's message but never the statement
/// text (which may contain a password literal).
fn statement_error(e: sqlx::Error) -> TargetError {
    match e.as_database_error() {
        Some(db) if db.code().as_deref() == Some(DUPLICATE_OBJECT) => {
            TargetError::AlreadyExists(db.message().to_string())
        }
        Some(db) => TargetError::Statement(db.message().to_string()),
        None => TargetError::Statement(e.to_string()),
    }
}

/// Split `host[:port]` / `[v6]:port`, falling back to `default_port`.
pub fn split_address(address: &str, default_port: u16) -> Result<(String, u16), BrokerError> {
    let invalid = || BrokerError::Validation(format!("invalid address {address:?}"));

    let (host, port) = if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
        match tail {
            "" => (host, None),
            t => (host, Some(t.strip_prefix(':').ok_or_else(invalid)?)),
        }
    } else {
        match address.split_once(':') {
            Some((host, port)) if !port.contains(':') => (host, Some(port)),
            Some(_) => (address, None), // bare IPv6
            None => (address, None),
        }
    };

    if host.is_empty() {
        return Err(invalid());
    }
    let port = match port {
        Some(p) => p.parse::<u16>().map_err(|_| invalid())?,
        None => default_port,
    };
    Ok((host.to_string(), port))
}
