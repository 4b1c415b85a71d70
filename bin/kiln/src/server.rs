//! Embedded development server with live reload support

use std::{convert::Infallible, path::Path, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use color_eyre::eyre::{Result, WrapErr};
use kiln_core::{config::ServerConfig, livereload::LIVERELOAD_PATH};
use tokio::{net::TcpListener, sync::broadcast};
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::{info, warn};

/// Live reload message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadMessage {
    /// Full page reload.
    Reload,
    /// Re-fetch stylesheets without reloading the page.
    CssReload,
}

impl ReloadMessage {
    /// SSE payload understood by the injected client.
    #[must_use]
    pub fn as_event_data(self) -> &'static str {
        match self {
            Self::Reload => "reload",
            Self::CssReload => "css-reload",
        }
    }
}

/// Server state containing the reload broadcaster.
#[derive(Clone)]
pub struct ServerState {
    /// Broadcast channel for live reload events.
    pub reload_tx: broadcast::Sender<ReloadMessage>,
}

impl ServerState {
    /// Create a new server state.
    #[must_use]
    pub fn new() -> Self {
        let (reload_tx, _) = broadcast::channel(16);
        Self { reload_tx }
    }

    /// Send `message` to all connected clients. Without clients this is a
    /// no-op.
    pub fn send(&self, message: ReloadMessage) {
        let clients = self.reload_tx.send(message).unwrap_or(0);
        info!(event = message.as_event_data(), clients, "live reload");
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the development server router.
pub fn create_router(root: &Path, state: Arc<ServerState>, cors: bool) -> Router {
    let router = Router::new()
        .route(LIVERELOAD_PATH, get(livereload_handler))
        .fallback_service(ServeDir::new(root))
        .with_state(state);

    if cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Server-Sent Events handler for live reload.
async fn livereload_handler(
    State(state): State<Arc<ServerState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.reload_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| {
        // Lagged receivers skip missed messages.
        msg.ok()
            .map(|message| Ok(Event::default().data(message.as_event_data())))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    )
}

/// Serve `root` until Ctrl+C.
pub async fn serve(root: &Path, state: Arc<ServerState>, options: &ServerConfig) -> Result<()> {
    let app = create_router(root, state, options.cors);
    let addr = format!("{}:{}", options.host, options.port);

    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind to {addr}"))?;

    println!();
    println!("  Dev server running at http://{addr}");
    println!("  Serving {}", root.display());
    println!("  Press Ctrl+C to stop");
    println!();

    if options.open {
        if let Err(e) = open::that(format!("http://{addr}")) {
            warn!(error = %e, "failed to open browser");
        }
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("Server error")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
