mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use banquette::BrokerError;
use banquette::db::{NewCredentialSet, TokenStore};
use banquette::error::DropStage;
use banquette::service::Provisioner;
use banquette::target::TargetSession;
use common::{FakeTarget, Op, ROLE};

fn provisioner(target: &FakeTarget) -> Provisioner {
    Provisioner::new(Arc::new(target.clone()))
}

#[tokio::test]
async fn create_allocates_tablespace_login_and_grant() {
    let target = FakeTarget::new();
    let mut session = target.session();

    provisioner(&target)
        .create_account(&mut session, "alice", "pw", None)
        .await
        .unwrap();

    assert!(target.has_tablespace("alice"));
    assert!(target.has_login("alice"));
    assert!(target.is_granted("alice"));
    assert_eq!(
        target.statements(),
        [Op::CreateTablespace, Op::CreateLogin, Op::GrantRole]
    );
}

#[tokio::test]
async fn taken_name_is_duplicate_and_stops_at_first_step() {
    let target = FakeTarget::new();
    target.with(|db| db.tablespaces.insert("bob".to_string()));
    let mut session = target.session();

    let err = provisioner(&target)
        .create_account(&mut session, "bob", "pw", None)
        .await
        .unwrap_err();

    assert!(matches!(err, BrokerError::Duplicate(_)), "{err:?}");
    assert!(!target.has_login("bob"));
    assert!(target.has_tablespace("bob"), "existing tablespace must be left alone");
    assert_eq!(target.statements(), [Op::CreateTablespace]);
}

#[tokio::test]
async fn login_failure_removes_the_tablespace_again() {
    let target = FakeTarget::new();
    let prov = provisioner(&target);
    let mut session = target.session();

    target.fail(Op::CreateLogin);
    let err = prov
        .create_account(&mut session, "carol", "pw", None)
        .await
        .unwrap_err();
    assert!(
        matches!(err, BrokerError::AccountCreate { ref account, .. } if account == "carol"),
        "{err:?}"
    );
    assert!(!target.has_tablespace("carol"));

    // Nothing orphaned: the same name gets past allocation on the next try.
    target.heal(Op::CreateLogin);
    prov.create_account(&mut session, "carol", "pw", None)
        .await
        .unwrap();
    assert!(target.has_login("carol"));
}

#[tokio::test]
async fn failed_cleanup_after_login_failure_is_escalated() {
    let target = FakeTarget::new();
    target.fail(Op::CreateLogin);
    target.fail(Op::DropTablespace);
    let mut session = target.session();

    let err = provisioner(&target)
        .create_account(&mut session, "dave", "pw", None)
        .await
        .unwrap_err();

    match err {
        BrokerError::Compensation {
            action,
            reason,
            original,
        } => {
            assert_eq!(action, "drop tablespace dave");
            assert!(reason.contains("DropTablespace"), "{reason}");
            assert!(original.contains("create login"), "{original}");
        }
        other => panic!("expected compensation error, got {other:?}"),
    }
    assert!(target.has_tablespace("dave"));
}

#[tokio::test]
async fn grant_failure_leaves_account_in_place() {
    let target = FakeTarget::new();
    target.fail(Op::GrantRole);
    let mut session = target.session();

    let err = provisioner(&target)
        .create_account(&mut session, "erin", "pw", None)
        .await
        .unwrap_err();

    match err {
        BrokerError::Grant { account, role, .. } => {
            assert_eq!(account, "erin");
            assert_eq!(role, ROLE);
        }
        other => panic!("expected grant error, got {other:?}"),
    }
    assert!(target.has_tablespace("erin"));
    assert!(target.has_login("erin"));
    assert!(!target.is_granted("erin"));
}

#[tokio::test]
async fn invalid_input_never_reaches_the_target() {
    let target = FakeTarget::new();
    let prov = provisioner(&target);
    let mut session = target.session();

    let cases = [
        ("", "pw", "name is missing"),
        ("frank", "", "secret is missing"),
    ];
    for (name, secret, message) in cases {
        let err = prov
            .create_account(&mut session, name, secret, None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), message);
    }

    let err = prov
        .create_account(&mut session, "x\"; DROP ROLE postgres; --", "pw", None)
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::Validation(_)));

    let err = prov.drop_account(&mut session, "").await.unwrap_err();
    assert_eq!(err.to_string(), "name is missing");

    assert!(target.statements().is_empty());
}

#[tokio::test]
async fn expired_deadline_creates_nothing() {
    let target = FakeTarget::new();
    let mut session = target.session();
    let past = Instant::now() - Duration::from_millis(1);

    let err = provisioner(&target)
        .create_account(&mut session, "gina", "pw", Some(past))
        .await
        .unwrap_err();

    assert!(matches!(err, BrokerError::Cancelled { .. }), "{err:?}");
    assert!(target.statements().is_empty());
}

#[tokio::test]
async fn drop_removes_login_then_tablespace() {
    let target = FakeTarget::new();
    let prov = provisioner(&target);
    let mut session = target.session();
    prov.create_account(&mut session, "hank", "pw", None)
        .await
        .unwrap();

    prov.drop_account(&mut session, "hank").await.unwrap();

    assert!(!target.has_login("hank"));
    assert!(!target.has_tablespace("hank"));
    assert_eq!(
        target.statements()[3..],
        [Op::DropLogin, Op::DropTablespace]
    );
}

#[tokio::test]
async fn failed_login_drop_skips_tablespace() {
    let target = FakeTarget::new();
    let prov = provisioner(&target);
    let mut session = target.session();
    prov.create_account(&mut session, "ivy", "pw", None)
        .await
        .unwrap();

    target.fail(Op::DropLogin);
    let err = prov.drop_account(&mut session, "ivy").await.unwrap_err();

    assert!(
        matches!(err, BrokerError::Drop { stage: DropStage::Account, .. }),
        "{err:?}"
    );
    assert!(target.has_tablespace("ivy"));
    assert!(!target.statements().contains(&Op::DropTablespace));
}

#[tokio::test]
async fn failed_tablespace_drop_is_reported_after_login_is_gone() {
    let target = FakeTarget::new();
    let prov = provisioner(&target);
    let mut session = target.session();
    prov.create_account(&mut session, "jack", "pw", None)
        .await
        .unwrap();

    target.fail(Op::DropTablespace);
    let err = prov.drop_account(&mut session, "jack").await.unwrap_err();

    assert!(
        matches!(err, BrokerError::Drop { stage: DropStage::Tablespace, .. }),
        "{err:?}"
    );
    assert!(!target.has_login("jack"));
    assert!(target.has_tablespace("jack"));
}

#[tokio::test]
async fn open_refuses_credentials_for_another_engine() {
    let target = FakeTarget::new();
    let store = common::store().await;
    let token = store
        .register(NewCredentialSet::new("db1", "s1", "u", "p"))
        .await
        .unwrap();
    let mut creds = store.resolve(&token).await.unwrap();
    creds.kind = "oracle".to_string();

    let err = provisioner(&target).open(&creds).await.err().unwrap();
    assert!(matches!(err, BrokerError::Connect(_)));
    assert_eq!(target.connections(), (0, 0));
}

#[tokio::test]
async fn session_close_is_idempotent() {
    let target = FakeTarget::new();
    let mut session = target.session();
    session.close().await;
    session.close().await;
    assert_eq!(target.connections(), (1, 1));
}

#[tokio::test]
async fn deadline_passing_after_allocation_removes_the_tablespace() {
    let target = FakeTarget::new();
    target.slow(Op::CreateTablespace, Duration::from_millis(50));
    let mut session = target.session();
    let deadline = Instant::now() + Duration::from_millis(10);

    let err = provisioner(&target)
        .create_account(&mut session, "kate", "pw", Some(deadline))
        .await
        .unwrap_err();

    assert!(
        matches!(err, BrokerError::Cancelled { stage: "create login" }),
        "{err:?}"
    );
    assert!(!target.has_tablespace("kate"));
    assert_eq!(
        target.statements(),
        [Op::CreateTablespace, Op::DropTablespace]
    );
}

#[tokio::test]
async fn deadline_passing_during_login_still_grants_the_role() {
    let target = FakeTarget::new();
    target.slow(Op::CreateLogin, Duration::from_millis(50));
    let mut session = target.session();
    let deadline = Instant::now() + Duration::from_millis(10);

    provisioner(&target)
        .create_account(&mut session, "liam", "pw", Some(deadline))
        .await
        .unwrap();

    assert!(target.has_login("liam"));
    assert!(target.is_granted("liam"));
}
