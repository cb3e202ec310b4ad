pub mod auth;
pub mod config;
pub mod config_cache;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod ordering;
pub mod propagation;
pub mod store;
pub mod visibility;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use config::Settings;
use db::DbPool;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub password_hash: Arc<String>,
    pub settings: Arc<Settings>,
}

pub fn create_app(state: AppState) -> Router {
    let base_path = state.settings.base_path.clone();

    let app_routes = Router::new()
        .route("/api/login", post(handlers::auth::login))
        .route("/api/logout", post(handlers::auth::logout))
        .route("/api/me", get(handlers::auth::me))
        .route("/api/config", get(handlers::config::runtime_config))
        .route(
            "/api/tokens",
            get(handlers::auth::list_tokens).post(handlers::auth::create_token),
        )
        .route("/api/tokens/{id}", delete(handlers::auth::revoke_token))
        .route(
            "/api/todos",
            get(handlers::api::list_todos).post(handlers::api::create_todo),
        )
        .route("/api/todos/reorder", put(handlers::api::reorder))
        .route("/api/todos/plain", get(handlers::api::plain_text_todos))
        .route(
            "/api/todos/{id}",
            get(handlers::api::get_todo)
                .put(handlers::api::update_todo)
                .delete(handlers::api::delete_todo),
        )
        .route("/api/admin/users", get(handlers::admin::users))
        .route(
            "/api/admin/todos",
            get(handlers::admin::list_default_tasks).post(handlers::admin::create_default_task),
        )
        .route(
            "/api/admin/todos/reorder",
            put(handlers::admin::reorder_default_tasks),
        )
        .route(
            "/api/admin/todos/{id}",
            get(handlers::admin::get_default_task)
                .put(handlers::admin::update_default_task)
                .delete(handlers::admin::delete_default_task),
        )
        .route(
            "/api/admin/users/{user_id}/todos",
            get(handlers::admin::list_user_todos).post(handlers::admin::create_user_todo),
        )
        .route(
            "/api/admin/users/{user_id}/todos/reorder",
            put(handlers::admin::reorder_user_todos),
        )
        .route(
            "/api/admin/users/{user_id}/todos/{id}",
            get(handlers::admin::get_user_todo)
                .put(handlers::admin::update_user_todo)
                .delete(handlers::admin::delete_user_todo),
        )
        .layer(
            tower::ServiceBuilder::new()
                .layer(tower_http::trace::TraceLayer::new_for_http())
                .layer(tower_http::compression::CompressionLayer::new()),
        )
        .with_state(state);

    tracing::info!("base_path: {base_path:?}");

    if base_path.is_empty() {
        app_routes
    } else {
        Router::new().nest(&base_path, app_routes)
    }
}
