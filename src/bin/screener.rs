// src/bin/screener.rs

use anyhow::Result;
use cpmm_screener::{
    config::Config,
    keepalive::KeepAlive,
    monitoring,
    persist::PoolUpdateStore,
    rpc::{LedgerTransport, Scheduler, SolanaTransport},
    screener::Screener,
    state::{account_stream::AccountStreams, pool_view::PoolViews},
    webserver::{self, AppState},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

// La limite du fournisseur RPC : au plus ~10 requêtes sortantes par seconde.
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    monitoring::logging::setup_logging();
    let config = Config::load()?;

    let transport: Arc<dyn LedgerTransport> = Arc::new(
        SolanaTransport::connect(&config.solana_rpc_url, &config.solana_ws_url).await?,
    );
    let scheduler = Arc::new(Scheduler::new(MIN_REQUEST_INTERVAL));
    let streams = Arc::new(AccountStreams::new(transport.clone(), scheduler.clone()));
    let views = Arc::new(PoolViews::new(streams));
    let store = Arc::new(PoolUpdateStore::new(&config.pools_file));

    let screener = Arc::new(Screener::new(transport, scheduler, views, store.clone()));
    let keepalive = Arc::new(KeepAlive::new(config.base_url.clone()));

    if config.auto_enable_screener {
        screener.start().await?;
    }
    if config.auto_enable_keepalive {
        if let Err(error) = keepalive.enable() {
            warn!(error = ?error, "keep-alive non démarré");
        }
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    webserver::serve(
        addr,
        AppState {
            screener,
            store,
            keepalive,
        },
    )
    .await
}
