pub mod handlers;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

/// The full `/api` router.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/daemon/shutdown", post(handlers::handle_shutdown))
        .route("/peers", get(handlers::handle_peers))
        .route("/peers/{id}/invite", post(handlers::handle_invite))
        .route("/peers/{id}/disconnect", post(handlers::handle_disconnect))
        .route(
            "/discovery/{side}/{action}",
            post(handlers::handle_discovery),
        )
        .route(
            "/permission",
            get(handlers::handle_permission_get).post(handlers::handle_permission_respond),
        )
        .route("/messages", get(handlers::handle_get_messages))
        .route("/messages/send", post(handlers::handle_send_message))
        .route(
            "/blocklist",
            get(handlers::handle_blocklist_get).put(handlers::handle_blocklist_replace),
        )
        .route("/blocklist/add", post(handlers::handle_blocklist_add))
        .route("/blocklist/{index}", delete(handlers::handle_blocklist_remove))
        .route(
            "/filter",
            get(handlers::handle_filter_get).post(handlers::handle_filter_set),
        )
        .route("/filter/check", get(handlers::handle_filter_check))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

/// Serve the API on localhost until the daemon's shutdown signal fires.
pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let mut shutdown = state.shutdown_tx.subscribe();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!(port, "API listening on 127.0.0.1");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;
    Ok(())
}
