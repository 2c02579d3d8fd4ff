#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use banquette::BrokerError;
use banquette::crypto::SecretCipher;
use banquette::db::{CredentialSet, NewCredentialSet, SqliteTokenStore, TokenStore};
use banquette::service::Broker;
use banquette::target::{AccountName, TargetConnector, TargetError, TargetSession};

pub const ROLE: &str = "app_users";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Connect,
    CreateTablespace,
    DropTablespace,
    CreateLogin,
    DropLogin,
    GrantRole,
}

/// What an in-memory target database currently holds.
#[derive(Debug, Default)]
pub struct FakeDb {
    pub tablespaces: HashSet<String>,
    pub logins: HashSet<String>,
    pub grants: HashSet<String>,
    pub statements: Vec<Op>,
    pub opened: usize,
    pub closed: usize,
    failing: HashSet<Op>,
    delays: HashMap<Op, Duration>,
}

#[derive(Clone, Default)]
pub struct FakeTarget {
    db: Arc<Mutex<FakeDb>>,
}

impl FakeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, op: Op) {
        self.db.lock().unwrap().failing.insert(op);
    }

    /// Make every `op` statement take `delay` before it runs.
    pub fn slow(&self, op: Op, delay: Duration) {
        self.db.lock().unwrap().delays.insert(op, delay);
    }

    pub fn heal(&self, op: Op) {
        self.db.lock().unwrap().failing.remove(&op);
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FakeDb) -> R) -> R {
        f(&mut self.db.lock().unwrap())
    }

    pub fn has_tablespace(&self, name: &str) -> bool {
        self.with(|db| db.tablespaces.contains(name))
    }

    pub fn has_login(&self, name: &str) -> bool {
        self.with(|db| db.logins.contains(name))
    }

    pub fn is_granted(&self, name: &str) -> bool {
        self.with(|db| db.grants.contains(name))
    }

    pub fn statements(&self) -> Vec<Op> {
        self.with(|db| db.statements.clone())
    }

    /// (opened, closed) connection counts.
    pub fn connections(&self) -> (usize, usize) {
        self.with(|db| (db.opened, db.closed))
    }

    pub fn session(&self) -> FakeSession {
        self.with(|db| db.opened += 1);
        FakeSession {
            db: self.db.clone(),
            closed: false,
        }
    }
}

#[async_trait]
impl TargetConnector for FakeTarget {
    fn kind(&self) -> &'static str {
        "postgres"
    }

    async fn open(&self, _creds: &CredentialSet) -> Result<Box<dyn TargetSession>, BrokerError> {
        if self.with(|db| db.failing.contains(&Op::Connect)) {
            return Err(BrokerError::Connect("connection refused by db1:5432".to_string()));
        }
        Ok(Box::new(self.session()))
    }
}

pub struct FakeSession {
    db: Arc<Mutex<FakeDb>>,
    closed: bool,
}

impl FakeSession {
    async fn pause(&self, op: Op) {
        let delay = self.db.lock().unwrap().delays.get(&op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn apply(
        &self,
        op: Op,
        f: impl FnOnce(&mut FakeDb) -> Result<(), TargetError>,
    ) -> Result<(), TargetError> {
        let mut db = self.db.lock().unwrap();
        db.statements.push(op);
        if db.failing.contains(&op) {
            return Err(TargetError::Statement(format!("injected {op:?} failure")));
        }
        f(&mut db)
    }
}

fn missing(what: &str, name: &AccountName) -> TargetError {
    TargetError::Statement(format!("{what} \"{name}\" does not exist"))
}

#[async_trait]
impl TargetSession for FakeSession {
    async fn create_tablespace(&mut self, name: &AccountName) -> Result<(), TargetError> {
        self.pause(Op::CreateTablespace).await;
        self.apply(Op::CreateTablespace, |db| {
            if !db.tablespaces.insert(name.to_string()) {
                return Err(TargetError::AlreadyExists(format!(
                    "tablespace \"{name}\" already exists"
                )));
            }
            Ok(())
        })
    }

    async fn drop_tablespace(&mut self, name: &AccountName) -> Result<(), TargetError> {
        self.pause(Op::DropTablespace).await;
        self.apply(Op::DropTablespace, |db| {
            if !db.tablespaces.remove(name.as_str()) {
                return Err(missing("tablespace", name));
            }
            Ok(())
        })
    }

    async fn create_login(&mut self, name: &AccountName, secret: &str) -> Result<(), TargetError> {
        assert!(!secret.is_empty());
        self.pause(Op::CreateLogin).await;
        self.apply(Op::CreateLogin, |db| {
            if !db.tablespaces.contains(name.as_str()) {
                return Err(missing("tablespace", name));
            }
            if !db.logins.insert(name.to_string()) {
                return Err(TargetError::AlreadyExists(format!(
                    "role \"{name}\" already exists"
                )));
            }
            Ok(())
        })
    }

    async fn drop_login(&mut self, name: &AccountName) -> Result<(), TargetError> {
        self.pause(Op::DropLogin).await;
        self.apply(Op::DropLogin, |db| {
            if !db.logins.remove(name.as_str()) {
                return Err(missing("role", name));
            }
            db.grants.remove(name.as_str());
            Ok(())
        })
    }

    async fn grant_role(&mut self, name: &AccountName) -> Result<(), TargetError> {
        self.pause(Op::GrantRole).await;
        self.apply(Op::GrantRole, |db| {
            if !db.logins.contains(name.as_str()) {
                return Err(missing("role", name));
            }
            db.grants.insert(name.to_string());
            Ok(())
        })
    }

    fn granted_role(&self) -> &str {
        ROLE
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.db.lock().unwrap().closed += 1;
        }
    }
}

/// Token store whose bookmark writes can be made to fail.
pub struct FlakyStore {
    inner: SqliteTokenStore,
    fail_bookmark: AtomicBool,
    fail_unbookmark: AtomicBool,
}

impl FlakyStore {
    pub fn fail_bookmark(&self, on: bool) {
        self.fail_bookmark.store(on, Ordering::SeqCst);
    }

    pub fn fail_unbookmark(&self, on: bool) {
        self.fail_unbookmark.store(on, Ordering::SeqCst);
    }
}

fn injected() -> BrokerError {
    BrokerError::Internal("injected store failure".to_string())
}

#[async_trait]
impl TokenStore for FlakyStore {
    async fn register(&self, data: NewCredentialSet) -> Result<String, BrokerError> {
        self.inner.register(data).await
    }

    async fn update(&self, token: &str, data: NewCredentialSet) -> Result<(), BrokerError> {
        self.inner.update(token, data).await
    }

    async fn resolve(&self, token: &str) -> Result<CredentialSet, BrokerError> {
        self.inner.resolve(token).await
    }

    async fn unregister(&self, token: &str) -> Result<(), BrokerError> {
        self.inner.unregister(token).await
    }

    async fn bookmark(&self, token: &str, account: &str) -> Result<(), BrokerError> {
        if self.fail_bookmark.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.bookmark(token, account).await
    }

    async fn unbookmark(&self, token: &str, account: &str) -> Result<(), BrokerError> {
        if self.fail_unbookmark.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.unbookmark(token, account).await
    }

    async fn bookmarks(&self, token: &str) -> Result<Vec<String>, BrokerError> {
        self.inner.bookmarks(token).await
    }
}

pub async fn store() -> SqliteTokenStore {
    let cipher = SecretCipher::from_passphrase("test secret key").expect("cipher");
    SqliteTokenStore::in_memory(cipher, "postgres")
        .await
        .expect("in-memory store")
}

pub struct Harness {
    pub broker: Broker,
    pub target: FakeTarget,
    pub store: Arc<FlakyStore>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30)).await
    }

    pub async fn with_timeout(timeout: Duration) -> Self {
        let store = Arc::new(FlakyStore {
            inner: store().await,
            fail_bookmark: AtomicBool::new(false),
            fail_unbookmark: AtomicBool::new(false),
        });
        let target = FakeTarget::new();
        let broker = Broker::new(store.clone(), Arc::new(target.clone()), timeout);
        Self {
            broker,
            target,
            store,
        }
    }

    pub async fn register(&self) -> String {
        self.broker
            .register(NewCredentialSet::new("db1", "s1", "u", "p"))
            .await
            .expect("register")
    }
}
