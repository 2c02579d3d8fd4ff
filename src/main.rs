use mimalloc::MiMalloc;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use banquette::config::Config;
use banquette::crypto::SecretCipher;
use banquette::db::SqliteTokenStore;
use banquette::router::{BrokerState, broker_router};
use banquette::service::Broker;
use banquette::target::{PgConnector, TargetConnector};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = Config::load()?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        listen_addr = %cfg.basic.listen_addr,
        database_url = %cfg.store.database_url,
        target = %cfg.target.kind,
        loglevel = %cfg.basic.loglevel,
        api_key = cfg.basic.api_key.is_some(),
        request_timeout_secs = cfg.basic.request_timeout_secs,
    );

    let cipher = SecretCipher::from_passphrase(&cfg.store.secret_key)?;

    let connector: Arc<dyn TargetConnector> = match cfg.target.kind.as_str() {
        "postgres" => Arc::new(PgConnector::new(cfg.target.clone())?),
        other => return Err(format!("unsupported target.kind {other:?}").into()),
    };

    let store = SqliteTokenStore::connect(
        &cfg.store.database_url,
        cfg.store.max_connections,
        cipher,
        connector.kind(),
    )
    .await?;

    let broker = Broker::new(Arc::new(store), connector, cfg.request_timeout());
    if cfg.basic.api_key.is_none() {
        warn!("basic.api_key is not set; the API is open to anyone who can reach it");
    }
    let state = BrokerState::new(broker, cfg.basic.api_key.as_deref().map(Arc::from));
    let app = broker_router(state);

    let listener = TcpListener::bind(&cfg.basic.listen_addr).await?;
    info!("HTTP server listening on {}", cfg.basic.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
