use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use palaver_db::Store;
use palaver_gateway::broadcast::Broadcaster;
use palaver_gateway::connection::{ActiveConnections, RelayServer};
use palaver_gateway::dispatcher::Dispatcher;
use palaver_gateway::registry::SessionRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "palaver=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("PALAVER_DB_PATH").unwrap_or_else(|_| "palaver.db".into());
    let host = std::env::var("PALAVER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PALAVER_PORT")
        .unwrap_or_else(|_| "7600".into())
        .parse()?;

    let store = Arc::new(Store::open(&PathBuf::from(&db_path))?);

    let registry = SessionRegistry::new();
    let connections = ActiveConnections::new();
    let broadcaster = Broadcaster::new(store.clone(), registry.clone(), connections.clone());
    let dispatcher = Dispatcher::new(store, registry.clone(), broadcaster);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!("palaver relay listening on {}", listener.local_addr()?);

    let server = RelayServer::start(listener, dispatcher, registry, connections);

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    server.stop();
    server.stopped().await;

    Ok(())
}
