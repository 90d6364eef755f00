use std::future::Future;
use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{services, state::AppState};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(services::health))
        .route("/cities", get(services::list_cities).post(services::create_city))
        .route(
            "/cities/{city_id}",
            get(services::get_city)
                .put(services::update_city)
                .delete(services::delete_city),
        )
        .route("/cities/{city_id}/sync", post(services::start_sync))
        .route("/syncs", get(services::list_syncs))
        .route("/syncs/{sync_id}", get(services::get_sync))
        .route("/logs", get(services::logs))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve the admin API until `shutdown` resolves.
pub async fn serve<F>(address: SocketAddr, state: AppState, shutdown: F) -> Result<(), AnyError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "Admin API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
