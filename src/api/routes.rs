use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::auth::{auth_middleware, AuthService};
use crate::service::LinkService;

use super::handlers::{
    admin_export, admin_stats, admin_user_links, admin_users, auth_not_implemented, cleanup,
    create_url, dashboard, delete_url, export_stats, get_stats, list_urls, AppState,
};

/// Routes served under `/api`.
pub fn create_api_router(service: Arc<LinkService>, auth_service: Arc<AuthService>) -> Router {
    let state = Arc::new(AppState { service });

    let identified_routes = Router::new()
        .route("/urls", post(create_url).get(list_urls))
        .route("/urls/cleanup", post(cleanup))
        .route("/urls/{code}", delete(delete_url))
        .route("/urls/{code}/stats", get(get_stats))
        .route("/urls/{code}/export", get(export_stats))
        .route("/dashboard", get(dashboard))
        .route("/admin/stats", get(admin_stats))
        .route("/admin/users", get(admin_users))
        .route("/admin/users/{id}/links", get(admin_user_links))
        .route("/admin/export", get(admin_export))
        .route_layer(middleware::from_fn(move |req, next| {
            let auth = Arc::clone(&auth_service);
            auth_middleware(auth, req, next)
        }))
        .with_state(state);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/auth/login", post(auth_not_implemented))
        .route("/auth/register", post(auth_not_implemented))
        .merge(identified_routes)
        .layer(cors)
}
