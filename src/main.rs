// Start-up sequence:
// - logging and configuration
// - index store and shared state
// - one poller per configured chain
// - HTTP server until Ctrl-C, then pollers and store are shut down

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hexsearch::{
    api,
    blockchain::{BitcoinClient, BlockIndexer, ChainClient, ChainPoller, EthereumClient},
    config::{ChainKind, Config},
    db, AppState,
};

/// Pollers started for this process, at most one per chain.
#[derive(Default)]
struct Pollers {
    ethereum: Option<Arc<ChainPoller<EthereumClient>>>,
    bitcoin: Option<Arc<ChainPoller<BitcoinClient>>>,
}

impl Pollers {
    async fn stop(&self) {
        if let Some(poller) = &self.ethereum {
            poller.stop().await;
        }
        if let Some(poller) = &self.bitcoin {
            poller.stop().await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting hexsearch");

    let config = Config::from_env();
    tracing::info!("Configuration loaded: {:?}", config);

    let store = db::connection::establish_connection(&config.database_url).await?;
    let app_state = Arc::new(AppState::new(config.clone(), store.clone()));
    tracing::info!(
        "Cache initialized with TTL: {:?} and capacity: {}",
        config.cache_ttl,
        config.cache_max_capacity
    );

    let pollers = start_pollers(&config, &app_state).await;

    let app = api::create_router(app_state);
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Starting server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pollers.stop().await;
    store.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn start_pollers(config: &Config, state: &AppState) -> Pollers {
    let mut pollers = Pollers::default();

    for chain in &config.chains {
        match chain {
            ChainKind::Ethereum if pollers.ethereum.is_none() => {
                match EthereumClient::new(&config.ethereum.rpc_url, config.rpc_timeout()) {
                    Ok(client) => pollers.ethereum = launch(client, *chain, config, state).await,
                    Err(e) => tracing::error!("Failed to create Ethereum client: {}", e),
                }
            }
            ChainKind::Bitcoin if pollers.bitcoin.is_none() => {
                let bitcoin = &config.bitcoin;
                match BitcoinClient::new(
                    &bitcoin.rpc_url,
                    bitcoin.rpc_user.clone(),
                    bitcoin.rpc_password.clone(),
                    config.rpc_timeout(),
                ) {
                    Ok(client) => pollers.bitcoin = launch(client, *chain, config, state).await,
                    Err(e) => tracing::error!("Failed to create Bitcoin client: {}", e),
                }
            }
            _ => tracing::warn!("Poller for {} configured twice", chain.as_str()),
        }
    }

    pollers
}

/// Start one chain's poller. A chain whose provider is unreachable at
/// start-up is left idle; the API keeps serving what is already indexed.
async fn launch<C: ChainClient>(
    client: C,
    chain: ChainKind,
    config: &Config,
    state: &AppState,
) -> Option<Arc<ChainPoller<C>>> {
    let indexer = BlockIndexer::new(state.store.clone(), config.fragment_scheme());
    let poller = Arc::new(ChainPoller::new(
        Arc::new(client),
        indexer,
        config.poller_config(chain),
    ));

    match poller.start().await {
        Ok(()) => Some(poller),
        Err(e) => {
            tracing::error!("{} poller not started: {}", chain.as_str(), e);
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
