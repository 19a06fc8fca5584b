mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::Database;

pub fn create_router(db: Database) -> Router {
    let api = Router::new()
        // Items
        .route("/items", get(handlers::list_items).post(handlers::create_item))
        .route(
            "/items/{key}",
            get(handlers::get_item)
                .patch(handlers::update_item)
                .delete(handlers::delete_item),
        )
        .route("/items/{key}/status", post(handlers::set_status))
        // Progress
        .route("/progress", get(handlers::overall_progress))
        .route("/progress/epics", get(handlers::epic_progress))
        .route("/current-work", get(handlers::current_work))
        // Health
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(db)
}
