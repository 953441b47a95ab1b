use std::sync::Arc;

use {
    anyhow::Context,
    axum::{
        Router,
        routing::{get, post},
    },
    fieldgate_config::FieldgateConfig,
    tokio::net::TcpListener,
    tokio_util::sync::CancellationToken,
    tower_http::trace::TraceLayer,
    tracing::info,
};

use crate::{
    routes::{graphql_handler, health_handler, subscribe_handler},
    state::GatewayState,
};

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/graphql", post(graphql_handler))
        .route("/api/graphql/subscribe", get(subscribe_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway and run it until Ctrl-C / SIGTERM.
pub async fn start_gateway(config: &FieldgateConfig) -> anyhow::Result<()> {
    let state = GatewayState::from_config(&config.upstream)
        .context("failed to set up upstream client")?;
    let app = build_gateway_app(Arc::clone(&state));

    let listener = TcpListener::bind((config.server.bind.as_str(), config.server.port))
        .await
        .with_context(|| {
            format!(
                "failed to bind {}:{}",
                config.server.bind, config.server.port
            )
        })?;
    let addr = listener.local_addr()?;

    // Startup banner.
    let lines = [
        format!("fieldgate v{}", state.version),
        format!("listening on {addr}"),
        format!("upstream: {}", state.upstream.host()),
        format!(
            "subscription events: {}",
            state.upstream.data_events().join(", ")
        ),
    ];
    let width = lines.iter().map(String::len).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown requested, closing subscriptions");
        shutdown.cancel();
    });

    serve(listener, app, state.shutdown.clone()).await
}

/// Serve `app` until `shutdown` is cancelled.
///
/// Relays opened by the app must hang off the same token: graceful shutdown
/// waits for open responses, and a subscription only ends once its relay is
/// cancelled.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
