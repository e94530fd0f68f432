//! JSON-over-HTTP binding of the queue engine.

mod http;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio_util::sync::CancellationToken;

use queue_engine::MicroQueue;

pub use http::{ApiError, PayloadEncoding, status_of};

#[derive(Clone)]
struct AppState {
    queue: Arc<MicroQueue>,
}

/// All queue routes over one engine instance.
pub fn router(queue: Arc<MicroQueue>) -> Router {
    let state = AppState { queue };

    Router::new()
        .route("/health", get(http::handle_health))
        .route("/api/topics", get(http::handle_list_topics).post(http::handle_create_topic))
        .route("/api/topic-names/{name}", get(http::handle_get_topic_by_name))
        .route(
            "/api/topics/{topic_id}",
            get(http::handle_get_topic)
                .patch(http::handle_update_topic)
                .delete(http::handle_delete_topic),
        )
        .route(
            "/api/topics/{topic_id}/messages",
            get(http::handle_list_messages).post(http::handle_publish),
        )
        .route(
            "/api/topics/{topic_id}/consumer-groups",
            get(http::handle_list_groups).post(http::handle_create_group),
        )
        .route(
            "/api/topics/{topic_id}/consumer-groups/{group_id}",
            get(http::handle_get_group).delete(http::handle_delete_group),
        )
        .route(
            "/api/topics/{topic_id}/consumer-groups/{group_id}/offset",
            get(http::handle_get_offset),
        )
        .route(
            "/api/topics/{topic_id}/consumer-groups/{group_id}/consume",
            post(http::handle_consume),
        )
        .route(
            "/api/topics/{topic_id}/consumer-groups/{group_id}/reset",
            post(http::handle_reset_offset),
        )
        .with_state(state)
}

/// Serve the queue API on `0.0.0.0:{port}` until `shutdown` fires.
pub async fn run(
    port: u16,
    queue: Arc<MicroQueue>,
    shutdown: CancellationToken,
) -> Result<(), String> {
    let app = router(queue);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .map_err(|e| format!("bind api :{port}: {e}"))?;
    tracing::info!(port, "queue api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| format!("axum serve: {e}"))?;

    Ok(())
}
