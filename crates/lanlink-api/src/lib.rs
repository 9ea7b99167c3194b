pub mod handlers;
pub mod ws;

use std::net::{IpAddr, SocketAddr};

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route(
            "/peers",
            get(handlers::handle_peers).post(handlers::handle_register_peer),
        )
        .route("/messages/send", post(handlers::handle_send_message))
        .route("/calls/request", post(handlers::handle_call_request))
        .route("/daemon/shutdown", post(handlers::handle_shutdown))
        .with_state(state.clone());

    Router::new()
        .route("/ws/chat", get(ws::handle_ws))
        .with_state(state)
        .nest("/api", api_routes)
        .layer(cors)
}

/// Serve until the daemon's shutdown channel fires.
pub async fn serve(state: ApiState, bind: IpAddr, port: u16) -> anyhow::Result<()> {
    let mut shutdown = state.shutdown_tx.subscribe();
    let app = router(state);

    let addr = SocketAddr::new(bind, port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;
    Ok(())
}
