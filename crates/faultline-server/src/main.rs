use anyhow::Result;
use chrono::Utc;
use faultline_event::cache::ActiveEventCache;
use faultline_event::engine::LifecycleEngine;
use faultline_event::silence::SilenceSet;
use faultline_notify::dispatcher::Dispatcher;
use faultline_notify::plugin::ChannelRegistry;
use faultline_storage::AlertStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use faultline_server::app;
use faultline_server::bootstrap;
use faultline_server::config;
use faultline_server::state::AppState;
use faultline_server::target_seed;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  faultline-server [config.toml]                          Start the server");
    eprintln!("  faultline-server init-targets <config.toml> <seed.json> Initialize notification targets from seed file");
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|e| anyhow::anyhow!("Failed to install default CryptoProvider: {e:?}"))?;

    faultline_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("faultline=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("init-targets") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-targets requires <config.toml> and <seed.json> arguments")
            })?;
            let seed_path = args.get(3).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-targets requires <seed.json> argument")
            })?;
            target_seed::run_init_targets(config_path, seed_path).await
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or("config/server.toml");
            run_server(config_path).await
        }
    }
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = config::ServerConfig::load(config_path)?;

    tracing::info!(
        http_port = config.http_port,
        db = %config.database.redacted_url(),
        "faultline-server starting"
    );

    let store = Arc::new(AlertStore::new(config.database.connection_url()).await?);

    // In-memory working set, rebuilt from the durable mirror.
    let cache = Arc::new(ActiveEventCache::new());
    let silences = Arc::new(SilenceSet::new());
    match bootstrap::hydrate_active_events(&store, &cache).await {
        Ok(loaded) => tracing::info!(loaded, "Active events restored from mirror"),
        Err(e) => tracing::error!(error = %e, "Failed to restore active events"),
    }
    match bootstrap::hydrate_silences(&store, &silences).await {
        Ok(loaded) => tracing::info!(loaded, "Silences restored"),
        Err(e) => tracing::error!(error = %e, "Failed to restore silences"),
    }

    let registry = Arc::new(ChannelRegistry::default());
    bootstrap::configure_channels(&registry, &config.channels);
    let dispatcher = Arc::new(Dispatcher::new(registry));

    let engine = Arc::new(LifecycleEngine::new(cache, silences));

    let state = AppState {
        store,
        engine,
        dispatcher,
        start_time: Utc::now(),
        config: Arc::new(config.clone()),
    };

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let app = app::build_http_app(state);
    let listener = tokio::net::TcpListener::bind(http_addr).await?;

    tracing::info!(http = %http_addr, "Server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
            tracing::info!("Shutting down gracefully");
        })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
