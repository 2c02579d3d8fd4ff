use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::db::{NewCredentialSet, TokenStore};
use crate::error::BrokerError;
use crate::service::provisioner::Provisioner;
use crate::target::{AccountName, TargetConnector, TargetSession};

/// Where a create/drop request currently is. Every failure is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Resolving,
    Connecting,
    Provisioning,
    Bookmarking,
    /// Entered only when bookmarking fails after a successful create.
    Compensating,
    Done,
}

impl FlowState {
    fn stage(self) -> &'static str {
        match self {
            FlowState::Idle => "start",
            FlowState::Resolving => "resolve",
            FlowState::Connecting => "connect",
            FlowState::Provisioning => "provision",
            FlowState::Bookmarking => "bookmark",
            FlowState::Compensating => "compensate",
            FlowState::Done => "done",
        }
    }
}

struct Flow<'a> {
    name: &'static str,
    account: &'a str,
    state: FlowState,
    deadline: Instant,
}

impl<'a> Flow<'a> {
    fn new(name: &'static str, account: &'a str, deadline: Instant) -> Self {
        Self {
            name,
            account,
            state: FlowState::Idle,
            deadline,
        }
    }

    /// Move to the next forward state, refusing once the deadline has passed.
    fn advance(&mut self, next: FlowState) -> Result<(), BrokerError> {
        if Instant::now() >= self.deadline {
            debug!(flow = self.name, account = self.account, stage = next.stage(), "deadline passed");
            return Err(BrokerError::Cancelled { stage: next.stage() });
        }
        self.set(next);
        Ok(())
    }

    /// Transition without a deadline check; cleanup is never cut short.
    fn set(&mut self, next: FlowState) {
        debug!(
            flow = self.name,
            account = self.account,
            from = ?self.state,
            to = ?next,
            "flow transition"
        );
        self.state = next;
    }

    fn finish<T>(&mut self, result: &Result<T, BrokerError>) {
        let failed_in = self.state;
        self.set(FlowState::Done);
        match result {
            Ok(_) => info!(flow = self.name, account = self.account, "flow completed"),
            Err(e) if e.is_client_error() => {
                debug!(flow = self.name, account = self.account, error = %e, "flow rejected")
            }
            Err(e) => error!(
                flow = self.name,
                account = self.account,
                stage = failed_in.stage(),
                error = %e,
                "flow failed"
            ),
        }
    }
}

/// Result of a successful drop. The account is gone either way; `warning`
/// is set when its bookmark could not be removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DropOutcome {
    pub warning: Option<String>,
}

/// Ties the credential store to the account provisioner.
#[derive(Clone)]
pub struct Broker {
    store: Arc<dyn TokenStore>,
    provisioner: Provisioner,
    request_timeout: Duration,
}

fn require(field: &str, value: &str) -> Result<(), BrokerError> {
    if value.is_empty() {
        return Err(BrokerError::missing(field));
    }
    Ok(())
}

fn require_credentials(data: &NewCredentialSet) -> Result<(), BrokerError> {
    require("address", &data.address)?;
    require("schema", &data.schema)?;
    require("login", &data.login)?;
    require("secret", &data.secret)
}

impl Broker {
    pub fn new(
        store: Arc<dyn TokenStore>,
        connector: Arc<dyn TargetConnector>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            store,
            provisioner: Provisioner::new(connector),
            request_timeout,
        }
    }

    pub async fn register(&self, data: NewCredentialSet) -> Result<String, BrokerError> {
        require_credentials(&data)?;
        self.store.register(data).await
    }

    pub async fn update(&self, token: &str, data: NewCredentialSet) -> Result<(), BrokerError> {
        require("token", token)?;
        require_credentials(&data)?;
        self.store.update(token, data).await
    }

    pub async fn unregister(&self, token: &str) -> Result<(), BrokerError> {
        require("token", token)?;
        self.store.unregister(token).await
    }

    /// Accounts provisioned (and not yet dropped) under `token`.
    pub async fn accounts(&self, token: &str) -> Result<Vec<String>, BrokerError> {
        require("token", token)?;
        self.store.bookmarks(token).await
    }

    /// resolve → connect → create → bookmark. A failed bookmark drops the
    /// account again so nothing is left untracked.
    pub async fn create_account(
        &self,
        token: &str,
        name: &str,
        secret: &str,
    ) -> Result<(), BrokerError> {
        require("token", token)?;
        AccountName::parse(name)?;
        require("secret", secret)?;

        let mut flow = Flow::new("create_account", name, Instant::now() + self.request_timeout);
        let result = self.run_create(&mut flow, token, name, secret).await;
        flow.finish(&result);
        result
    }

    async fn run_create(
        &self,
        flow: &mut Flow<'_>,
        token: &str,
        name: &str,
        secret: &str,
    ) -> Result<(), BrokerError> {
        flow.advance(FlowState::Resolving)?;
        let creds = self.store.resolve(token).await?;

        flow.advance(FlowState::Connecting)?;
        let mut session = self.provisioner.open(&creds).await?;
        drop(creds);

        let result = self.provision_and_bookmark(flow, &mut session, token, name, secret).await;
        session.close().await;
        result
    }

    async fn provision_and_bookmark(
        &self,
        flow: &mut Flow<'_>,
        session: &mut Box<dyn TargetSession>,
        token: &str,
        name: &str,
        secret: &str,
    ) -> Result<(), BrokerError> {
        flow.advance(FlowState::Provisioning)?;
        self.provisioner
            .create_account(session.as_mut(), name, secret, Some(flow.deadline))
            .await?;

        let bookmarked = match flow.advance(FlowState::Bookmarking) {
            Ok(()) => self.store.bookmark(token, name).await,
            Err(e) => Err(e),
        };
        let Err(cause) = bookmarked else {
            return Ok(());
        };

        flow.set(FlowState::Compensating);
        warn!(account = name, error = %cause, "bookmark failed; dropping account again");
        match self.provisioner.drop_account(session.as_mut(), name).await {
            Ok(()) => match cause {
                BrokerError::Cancelled { .. } => Err(cause),
                _ => Err(BrokerError::Bookmark {
                    account: name.to_string(),
                }),
            },
            Err(drop_err) => Err(BrokerError::Compensation {
                action: format!("drop account {name}"),
                reason: drop_err.to_string(),
                original: cause.to_string(),
            }),
        }
    }

    /// resolve → connect → drop → unbookmark. The bookmark is only removed
    /// once the account is gone; failing to remove it is a warning.
    pub async fn drop_account(&self, token: &str, name: &str) -> Result<DropOutcome, BrokerError> {
        require("token", token)?;
        AccountName::parse(name)?;

        let mut flow = Flow::new("drop_account", name, Instant::now() + self.request_timeout);
        let result = self.run_drop(&mut flow, token, name).await;
        flow.finish(&result);
        result
    }

    async fn run_drop(
        &self,
        flow: &mut Flow<'_>,
        token: &str,
        name: &str,
    ) -> Result<DropOutcome, BrokerError> {
        flow.advance(FlowState::Resolving)?;
        let creds = self.store.resolve(token).await?;

        flow.advance(FlowState::Connecting)?;
        let mut session = self.provisioner.open(&creds).await?;
        drop(creds);

        let dropped = match flow.advance(FlowState::Provisioning) {
            Ok(()) => self.provisioner.drop_account(session.as_mut(), name).await,
            Err(e) => Err(e),
        };
        session.close().await;
        dropped?;

        flow.set(FlowState::Bookmarking);
        match self.store.unbookmark(token, name).await {
            Ok(()) => Ok(DropOutcome::default()),
            Err(e) => {
                warn!(account = name, error = %e, "account dropped but bookmark left behind");
                Ok(DropOutcome {
                    warning: Some(format!("could not remove bookmark for account {name}")),
                })
            }
        }
    }
}
