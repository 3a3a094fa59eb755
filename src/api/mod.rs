mod handlers;
mod resp;

use std::sync::Arc;

use axum::routing::{get, patch, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::bot::BotService;
use crate::essay::EssayService;

#[derive(Clone)]
pub struct AppState {
    pub essays: EssayService,
    pub bot: Arc<BotService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/bot/start", post(handlers::start_bot))
        .route("/api/v1/bot/stop", post(handlers::stop_bot))
        .route("/api/v1/bot/notify", post(handlers::notify))
        .route(
            "/api/v1/essays",
            post(handlers::add_essay).get(handlers::list_essays),
        )
        .route(
            "/api/v1/essays/{id}",
            get(handlers::essay_detail).delete(handlers::delete_essay),
        )
        .route("/api/v1/essays/{id}/file_id", put(handlers::update_file_id))
        .route("/api/v1/tasks", get(handlers::task_stats))
        .route("/api/collections/essay/records", post(handlers::create_record))
        .route(
            "/api/collections/essay/records/{id}",
            patch(handlers::update_record),
        )
        .route(
            "/api/files/{collection}/{id}/{name}",
            get(handlers::serve_file),
        )
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
