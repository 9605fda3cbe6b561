use axum::Router;
use axum::routing::{get, put};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::state::AppState;
use super::{chat, conversations, files, identity};

/// Build the complete axum Router with all API routes.
pub fn build(state: AppState) -> Router {
    Router::new()
        .nest("/api", routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/conversations",
            get(conversations::list_handler).post(conversations::create_handler),
        )
        .route(
            "/conversations/:id",
            get(conversations::get_handler)
                .put(conversations::update_handler)
                .delete(conversations::delete_handler),
        )
        .route("/files/:filename", put(files::upload_handler))
        .route("/userinfo", get(identity::userinfo_handler))
        .route("/healthz", get(healthz_handler))
        .route("/chat", get(chat::ws_handler))
}

async fn healthz_handler() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}
