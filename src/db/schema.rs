//! SQL DDL for initializing the token store (SQLite).

/// - `tokens.id` is the internal row id bookmarks point at; `token` is the opaque public handle
/// - `(address, schema_name)` is indexed for the duplicate check on register; it is not
///   UNIQUE because an update may overwrite a row with any pair
/// - `tokens.secret` holds `nonce || ciphertext || tag`
/// - deleting a token removes its bookmarks (`ON DELETE CASCADE`)
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS tokens (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    token TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL,
    address TEXT NOT NULL,
    schema_name TEXT NOT NULL,
    login TEXT NOT NULL,
    secret BLOB NOT NULL,
    created_at TEXT NOT NULL, -- RFC3339
    updated_at TEXT NOT NULL  -- RFC3339
);

CREATE INDEX IF NOT EXISTS idx_tokens_target ON tokens(address, schema_name);

CREATE TABLE IF NOT EXISTS bookmarks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    token_id INTEGER NOT NULL REFERENCES tokens(id) ON DELETE CASCADE,
    account TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_bookmarks_token_account ON bookmarks(token_id, account);
"#;
