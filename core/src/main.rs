/// walletfeed daemon - serves recorded chain data through the activity engine
use std::env;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walletfeed_core::chain::fixture::FixtureFile;
use walletfeed_core::{api, ActivityEngine, ChainRegistry, Config, StreamKey};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse configuration
    let args: Vec<String> = env::args().collect();
    let config =
        Config::from_args(&args).map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let fixtures_path = config
        .fixtures_path
        .clone()
        .ok_or_else(|| anyhow::anyhow!("No fixtures file given"))?;
    let fixtures = FixtureFile::load(&fixtures_path)
        .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", fixtures_path.display(), e))?;
    let (accounts, chains) = fixtures.into_chains().await;

    let mut registry = ChainRegistry::new();
    for chain in chains {
        registry.register(Arc::new(chain));
    }

    let engine = ActivityEngine::new(config.clone(), registry)?;
    info!("Starting walletfeed ({})", config.network);

    for account in accounts {
        let account_id = account.id.clone();
        engine.add_account(account).await?;
        if !engine.load_initial_activities(&account_id).await? {
            warn!("Initial activities of {} unavailable, watcher will retry", account_id);
        }
        engine
            .trigger_past_activities(&account_id, &StreamKey::All, false)
            .await;
    }

    // Newest-page watcher
    let watcher = {
        let engine = engine.clone();
        let interval = config.refresh_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                for account_id in engine.account_ids().await {
                    let loaded = engine
                        .store()
                        .read(|s| s.is_initial_load_settled(&account_id))
                        .await;
                    let result = if loaded {
                        engine.refresh_latest(&account_id).await.map(|_| true)
                    } else {
                        engine.load_initial_activities(&account_id).await
                    };
                    if let Err(e) = result {
                        warn!("Watcher failed for {}: {}", account_id, e);
                    }
                }
            }
        })
    };

    let api_addr = config.api_addr_or_default();
    let server = tokio::spawn(api::start_api_server(engine.clone(), api_addr));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
        result = server => match result {
            Ok(Err(e)) => warn!("API server stopped: {}", e),
            Ok(Ok(())) => {}
            Err(e) => warn!("API server task failed: {}", e),
        },
    }

    watcher.abort();
    engine.flush()?;
    Ok(())
}
