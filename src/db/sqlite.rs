use crate::crypto::{SecretCipher, generate_token};
use crate::db::models::{CredentialSet, DbTokenRow, NewCredentialSet};
use crate::db::schema::SQLITE_INIT;
use crate::db::traits::TokenStore;
use crate::error::BrokerError;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use tracing::{debug, info};

pub type SqlitePool = Pool<Sqlite>;

#[derive(Clone)]
pub struct SqliteTokenStore {
    pool: SqlitePool,
    cipher: SecretCipher,
    kind: String,
}

impl SqliteTokenStore {
    /// `kind` is recorded on every row written; it names the target engine
    /// the registered credentials are for.
    pub fn new(pool: SqlitePool, cipher: SecretCipher, kind: impl Into<String>) -> Self {
        Self {
            pool,
            cipher,
            kind: kind.into(),
        }
    }

    /// Open (creating if missing) the database at `database_url` and apply the schema.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        cipher: SecretCipher,
        kind: impl Into<String>,
    ) -> Result<Self, BrokerError> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(connect_opts)
            .await?;
        let storage = Self::new(pool, cipher, kind);
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Private in-memory database; a single connection keeps it alive for the pool's lifetime.
    pub async fn in_memory(cipher: SecretCipher, kind: impl Into<String>) -> Result<Self, BrokerError> {
        let connect_opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_opts)
            .await?;
        let storage = Self::new(pool, cipher, kind);
        storage.init_schema().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), BrokerError> {
        // sqlx::query runs one statement at a time
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Internal row id behind a token. Every token-addressed write goes
    /// through this existence check first.
    async fn token_id(&self, token: &str) -> Result<i64, BrokerError> {
        let rec: Option<(i64,)> = sqlx::query_as("SELECT id FROM tokens WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        match rec {
            Some((id,)) => Ok(id),
            None => {
                debug!("token lookup missed");
                Err(BrokerError::bad_token())
            }
        }
    }

    async fn get_row(&self, token: &str) -> Result<DbTokenRow, BrokerError> {
        let row = sqlx::query(
            r#"SELECT token, kind, address, schema_name, login, secret
               FROM tokens WHERE token = ?"#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(BrokerError::bad_token)?;
        Self::row_to_model(row)
    }

    fn row_to_model(row: SqliteRow) -> Result<DbTokenRow, BrokerError> {
        Ok(DbTokenRow {
            token: row.try_get("token")?,
            kind: row.try_get("kind")?,
            address: row.try_get("address")?,
            schema_name: row.try_get("schema_name")?,
            login: row.try_get("login")?,
            secret: row.try_get("secret")?,
        })
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn register(&self, data: NewCredentialSet) -> Result<String, BrokerError> {
        let token = generate_token(&data.address, &data.schema);
        let sealed = self.cipher.encrypt(&data.secret)?;
        let now = Utc::now().to_rfc3339();

        // Check and insert in one statement so concurrent registrations of
        // the same target cannot both succeed.
        let result = sqlx::query(
            r#"
            INSERT INTO tokens (
                token, kind, address, schema_name, login, secret, created_at, updated_at
            )
            SELECT ?, ?, ?, ?, ?, ?, ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM tokens WHERE address = ? AND schema_name = ?
            )
            "#,
        )
        .bind(&token)
        .bind(&self.kind)
        .bind(&data.address)
        .bind(&data.schema)
        .bind(&data.login)
        .bind(sealed)
        .bind(&now)
        .bind(&now)
        .bind(&data.address)
        .bind(&data.schema)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BrokerError::Duplicate(
                "database token already exists".to_string(),
            ));
        }
        info!(address = %data.address, schema = %data.schema, "credential-set registered");
        Ok(token)
    }

    async fn update(&self, token: &str, data: NewCredentialSet) -> Result<(), BrokerError> {
        let id = self.token_id(token).await?;
        let sealed = self.cipher.encrypt(&data.secret)?;
        sqlx::query(
            r#"UPDATE tokens SET
                kind = ?,
                address = ?,
                schema_name = ?,
                login = ?,
                secret = ?,
                updated_at = ?
              WHERE id = ?"#,
        )
        .bind(&self.kind)
        .bind(&data.address)
        .bind(&data.schema)
        .bind(&data.login)
        .bind(sealed)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        info!(id, address = %data.address, schema = %data.schema, "credential-set updated");
        Ok(())
    }

    async fn resolve(&self, token: &str) -> Result<CredentialSet, BrokerError> {
        let row = self.get_row(token).await?;
        let secret = self.cipher.decrypt(&row.secret)?;
        Ok(CredentialSet {
            token: row.token,
            kind: row.kind,
            address: row.address,
            schema: row.schema_name,
            login: row.login,
            secret,
        })
    }

    async fn unregister(&self, token: &str) -> Result<(), BrokerError> {
        let id = self.token_id(token).await?;
        let mut tx = self.pool.begin().await?;
        let dropped = sqlx::query("DELETE FROM bookmarks WHERE token_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM tokens WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(id, bookmarks = dropped, "credential-set unregistered");
        Ok(())
    }

    async fn bookmark(&self, token: &str, account: &str) -> Result<(), BrokerError> {
        let id = self.token_id(token).await?;
        sqlx::query("INSERT INTO bookmarks (token_id, account, created_at) VALUES (?, ?, ?)")
            .bind(id)
            .bind(account)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        debug!(id, account, "account bookmarked");
        Ok(())
    }

    async fn unbookmark(&self, token: &str, account: &str) -> Result<(), BrokerError> {
        let id = self.token_id(token).await?;
        let removed = sqlx::query("DELETE FROM bookmarks WHERE token_id = ? AND account = ?")
            .bind(id)
            .bind(account)
            .execute(&self.pool)
            .await?
            .rows_affected();
        debug!(id, account, removed, "account unbookmarked");
        Ok(())
    }

    async fn bookmarks(&self, token: &str) -> Result<Vec<String>, BrokerError> {
        let id = self.token_id(token).await?;
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT account FROM bookmarks WHERE token_id = ? ORDER BY id")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(account,)| account).collect())
    }
}
