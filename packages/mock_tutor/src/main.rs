use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

use mock_tutor::{DEFAULT_PORT, MockConfig, create_router};

#[derive(Parser)]
#[command(name = "mock-tutor")]
#[command(about = "Mock WebSocket tutor with canned, subject-keyed replies")]
struct Args {
    /// Port for the WebSocket server
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Host to bind to
    #[arg(short = 'b', long, default_value = "127.0.0.1")]
    host: String,

    /// Delay before each reply, in milliseconds
    #[arg(long, default_value = "1000")]
    delay_ms: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let default_directive = if args.debug {
        "mock_tutor=debug,tower_http=debug"
    } else {
        "mock_tutor=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .context("Invalid host or port")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let local = listener.local_addr()?;

    let config = MockConfig {
        reply_delay: Duration::from_millis(args.delay_ms),
    };
    info!(
        "Mock tutor running at ws://{} (reply delay {:?})",
        local, config.reply_delay
    );

    axum::serve(listener, create_router(config))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Mock tutor stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
