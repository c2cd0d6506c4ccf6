// Draft server entry point.
//
// Startup sequence:
// 1. Initialize tracing (stderr, env-filtered)
// 2. Load config
// 3. Open database
// 4. Load the card pool
// 5. Build the session store, restore unfinished sessions
// 6. Restart bot loops for restored sessions
// 7. Run the WebSocket server until Ctrl+C

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use packrat::app::Server;
use packrat::cards::CardPool;
use packrat::config::Config;
use packrat::db::Database;
use packrat::draft::store::SessionStore;
use packrat::ws_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    info!("packrat starting up");

    // Optional config path as the sole argument.
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config =
        Config::load(config_path.as_deref()).context("failed to load configuration")?;
    info!(
        "config loaded: ws_port={}, pool={}, db={}",
        config.server.ws_port, config.server.pool_path, config.server.db_path
    );

    let db = Arc::new(
        Database::open(&config.server.db_path).context("failed to open database")?,
    );

    let pool = Arc::new(load_pool(&config.server.pool_path).context("failed to load card pool")?);
    info!("card pool loaded: {} cards", pool.len());

    let store = Arc::new(SessionStore::new(
        pool,
        db,
        config.weight_overrides(),
        config.draft.mainboard_size,
    ));

    let restored = store
        .restore_from_db()
        .await
        .context("failed to restore sessions")?;
    if restored > 0 {
        info!("restored {restored} unfinished sessions");
    }

    let server = Arc::new(Server::new(config.clone(), store));

    // Restored sessions need their bot loops back.
    for session in server.store.active_sessions().await {
        server.spawn_bot_loop(session);
    }

    let listener = ws_server::bind(config.server.ws_port)
        .await
        .context("failed to bind WebSocket server")?;
    let ws_handle = {
        let server = server.clone();
        tokio::spawn(async move {
            if let Err(e) = ws_server::run(listener, server).await {
                error!("WebSocket server error: {e}");
            }
        })
    };

    info!("ready; listening on 127.0.0.1:{}", config.server.ws_port);
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");

    ws_handle.abort();
    Ok(())
}

fn load_pool(path: &str) -> anyhow::Result<CardPool> {
    let path = Path::new(path);
    let pool = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => CardPool::from_json_path(path)?,
        _ => CardPool::from_csv_path(path)?,
    };
    Ok(pool)
}

fn init_tracing() {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("packrat=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("tracing subscriber already set");
    }
}
