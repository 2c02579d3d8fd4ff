//! Account provisioning against one open target session.
//!
//! Create is a three-step saga:
//! 1. allocate the account's tablespace (undo: drop it)
//! 2. create the login bound to it (pivot: from here on nothing is rolled back)
//! 3. grant the configured role
//!
//! Drop removes the login, then its tablespace; the second step only runs if
//! the first succeeded.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::info;
use zeroize::Zeroizing;

use crate::db::CredentialSet;
use crate::error::{BrokerError, DropStage};
use crate::service::saga::{FailureCause, Saga, SagaFailure, SagaStep};
use crate::target::{AccountName, TargetConnector, TargetError, TargetSession};

const ALLOCATE_TABLESPACE: &str = "allocate tablespace";
const CREATE_LOGIN: &str = "create login";
const GRANT_ROLE: &str = "grant role";

type Session = dyn TargetSession;

#[derive(Clone)]
pub struct Provisioner {
    connector: Arc<dyn TargetConnector>,
}

impl Provisioner {
    pub fn new(connector: Arc<dyn TargetConnector>) -> Self {
        Self { connector }
    }

    pub async fn open(&self, creds: &CredentialSet) -> Result<Box<Session>, BrokerError> {
        if creds.kind != self.connector.kind() {
            return Err(BrokerError::Connect(format!(
                "no driver for target kind {:?}",
                creds.kind
            )));
        }
        self.connector.open(creds).await
    }

    /// Create `name` with its tablespace and role grant. Inputs are validated
    /// before anything is sent to the target.
    pub async fn create_account(
        &self,
        session: &mut Session,
        name: &str,
        secret: &str,
        deadline: Option<Instant>,
    ) -> Result<(), BrokerError> {
        let name = AccountName::parse(name)?;
        if secret.is_empty() {
            return Err(BrokerError::missing("secret"));
        }
        let role = session.granted_role().to_string();

        let saga = Saga::new("create_account")
            .step(AllocateTablespace { name: name.clone() })
            .step(CreateLogin {
                name: name.clone(),
                secret: Zeroizing::new(secret.to_string()),
            })
            .step(GrantRole { name: name.clone() });

        saga.run(session, deadline)
            .await
            .map_err(|failure| create_failure(&name, &role, failure))?;

        info!(account = %name, role = %role, "account created");
        Ok(())
    }

    pub async fn drop_account(&self, session: &mut Session, name: &str) -> Result<(), BrokerError> {
        let name = AccountName::parse(name)?;

        session
            .drop_login(&name)
            .await
            .map_err(|e| drop_failure(&name, DropStage::Account, e))?;
        session
            .drop_tablespace(&name)
            .await
            .map_err(|e| drop_failure(&name, DropStage::Tablespace, e))?;

        info!(account = %name, "account dropped");
        Ok(())
    }
}

fn drop_failure(name: &AccountName, stage: DropStage, e: TargetError) -> BrokerError {
    BrokerError::Drop {
        account: name.to_string(),
        stage,
        reason: e.to_string(),
    }
}

fn create_failure(name: &AccountName, role: &str, failure: SagaFailure<TargetError>) -> BrokerError {
    let SagaFailure {
        step,
        cause,
        compensation_error,
        ..
    } = failure;

    if let Some(comp) = compensation_error {
        let original = match &cause {
            FailureCause::Step(e) => format!("{step}: {e}"),
            FailureCause::Cancelled => format!("deadline exceeded before {step}"),
        };
        return BrokerError::Compensation {
            // only the tablespace allocation is ever undone
            action: format!("drop tablespace {name}"),
            reason: comp.error.to_string(),
            original,
        };
    }

    let e = match cause {
        FailureCause::Step(e) => e,
        FailureCause::Cancelled => return BrokerError::Cancelled { stage: step },
    };
    match (step, e) {
        (ALLOCATE_TABLESPACE | CREATE_LOGIN, TargetError::AlreadyExists(_)) => {
            BrokerError::Duplicate(format!("account {name} already exists"))
        }
        (GRANT_ROLE, e) => BrokerError::Grant {
            account: name.to_string(),
            role: role.to_string(),
            reason: e.to_string(),
        },
        (step, e) => BrokerError::AccountCreate {
            account: name.to_string(),
            reason: format!("{step}: {e}"),
        },
    }
}

struct AllocateTablespace {
    name: AccountName,
}

#[async_trait]
impl SagaStep<Session, TargetError> for AllocateTablespace {
    fn name(&self) -> &'static str {
        ALLOCATE_TABLESPACE
    }

    async fn execute(&self, session: &mut Session) -> Result<(), TargetError> {
        session.create_tablespace(&self.name).await
    }

    fn compensable(&self) -> bool {
        true
    }

    async fn compensate(&self, session: &mut Session) -> Result<(), TargetError> {
        session.drop_tablespace(&self.name).await
    }
}

struct CreateLogin {
    name: AccountName,
    secret: Zeroizing<String>,
}

#[async_trait]
impl SagaStep<Session, TargetError> for CreateLogin {
    fn name(&self) -> &'static str {
        CREATE_LOGIN
    }

    async fn execute(&self, session: &mut Session) -> Result<(), TargetError> {
        session.create_login(&self.name, &self.secret).await
    }

    fn is_pivot(&self) -> bool {
        true
    }
}

struct GrantRole {
    name: AccountName,
}

#[async_trait]
impl SagaStep<Session, TargetError> for GrantRole {
    fn name(&self) -> &'static str {
        GRANT_ROLE
    }

    async fn execute(&self, session: &mut Session) -> Result<(), TargetError> {
        session.grant_role(&self.name).await
    }
}
