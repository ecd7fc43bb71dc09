//! Rockboard signaling relay entry point.

use clap::Parser;
use rockboard_server::{AppState, router};
use std::{net::SocketAddr, sync::Arc};
use tracing::info;

#[derive(Parser)]
#[command(name = "rockboard-server", about = "WebSocket signaling relay for Rockboard", version)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "ROCKBOARD_BIND", default_value = "0.0.0.0:3030")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rockboard_server=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();
    let app = router(Arc::new(AppState::new()));

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    info!("Rockboard relay listening on {}", args.bind);
    info!("WebSocket endpoint: ws://{}/ws", args.bind);

    axum::serve(listener, app).await
}
