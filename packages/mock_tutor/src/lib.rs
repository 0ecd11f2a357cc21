// Library interface for mock_tutor
// Exposes the router so tests and other binaries can embed the mock server

pub mod reply;
pub mod websocket;

pub use reply::reply_for;

use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub const DEFAULT_PORT: u16 = 8081;
pub const DEFAULT_REPLY_DELAY: Duration = Duration::from_millis(1000);

#[derive(Clone, Debug)]
pub struct MockConfig {
    /// Fixed pause before each reply is sent
    pub reply_delay: Duration,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            reply_delay: DEFAULT_REPLY_DELAY,
        }
    }
}

// Socket upgrade on both "/" and "/ws"
pub fn create_router(config: MockConfig) -> Router {
    Router::new()
        .route("/", get(websocket_handler))
        .route("/ws", get(websocket_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(config)
}

// Serve on an already-bound listener until the future is dropped
pub async fn serve(listener: TcpListener, config: MockConfig) -> std::io::Result<()> {
    axum::serve(listener, create_router(config)).await
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn websocket_handler(
    State(config): State<MockConfig>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket::handle_websocket(socket, config.reply_delay))
}
