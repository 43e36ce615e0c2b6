use std::{net::SocketAddr, sync::Arc};

use {
    agentgate_config::GatewayConfig,
    axum::{
        Router,
        extract::State,
        response::{IntoResponse, Json},
        routing::{get, patch, post},
    },
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{info, warn},
};

use crate::{api, state::GatewayState};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayState>,
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let app_state = AppState { gateway: state };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/auth/check", get(api::auth_check))
        .route(
            "/threads",
            get(api::list_threads).post(api::create_thread),
        )
        .route(
            "/threads/{thread_id}",
            patch(api::update_thread).delete(api::delete_thread),
        )
        .route("/threads/{thread_id}/runs/wait", post(api::run_wait))
        .route("/threads/{thread_id}/runs/stream", post(api::run_stream))
        .route("/threads/{thread_id}/history", get(api::history))
        .route(
            "/threads/{thread_id}/state",
            get(api::get_state).patch(api::patch_state),
        )
        .route("/usage", get(api::list_usage));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the gateway HTTP server.
pub async fn start_gateway(config: GatewayConfig) -> anyhow::Result<()> {
    let state = GatewayState::from_config(&config).await?;
    let app = build_gateway_app(Arc::clone(&state));

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Startup banner.
    let lines = [
        format!("agentgate gateway v{}", state.version),
        format!("listening on {addr}"),
        format!("upstream: {}", state.upstream.base_url()),
        format!("database: {}", config.database.path),
        format!("default assistant: {}", state.default_assistant_id),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => {
            warn!(error = %e, "cannot listen for ctrl-c, running until killed");
            std::future::pending::<()>().await;
        },
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.gateway.version,
    }))
}
