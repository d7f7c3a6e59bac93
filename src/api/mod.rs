//! HTTP surface: routing, middleware stack and shared response shapes.

pub mod auth;
pub mod contact;
pub mod error;
pub mod favorites;
pub mod properties;
pub mod rate_limit;
pub mod response;
pub mod search;
pub mod upload;
pub mod users;
pub mod validation;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer, cors::Any, cors::CorsLayer, services::ServeDir,
    trace::TraceLayer,
};

use crate::AppState;
use error::ApiError;
use response::ApiResponse;

/// Build the full application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let general = Router::new()
        .route("/health", get(health))
        .route(
            "/properties",
            get(properties::list_properties).post(properties::create_property),
        )
        .route("/properties/featured", get(properties::featured_properties))
        .route(
            "/properties/:id",
            get(properties::get_property)
                .put(properties::update_property)
                .delete(properties::delete_property),
        )
        .route("/properties/:id/reviews", post(properties::add_review))
        .route(
            "/favorites",
            get(favorites::list_favorites).delete(favorites::clear_favorites),
        )
        .route(
            "/favorites/:id",
            post(favorites::add_favorite).delete(favorites::remove_favorite),
        )
        .route("/favorites/:id/check", get(favorites::check_favorite))
        .route(
            "/users/profile",
            get(users::get_profile).put(users::update_profile),
        )
        .route("/users/properties", get(users::my_properties))
        .route("/users/stats", get(users::my_stats))
        .route("/users", get(users::admin_list_users))
        .route(
            "/users/:id",
            get(users::admin_get_user)
                .put(users::admin_update_user)
                .delete(users::admin_delete_user),
        )
        .route(
            "/contact",
            post(contact::submit_contact).get(contact::list_contacts),
        )
        .route("/contact/stats", get(contact::contact_stats))
        .route(
            "/contact/:id",
            get(contact::get_contact)
                .put(contact::update_contact)
                .delete(contact::delete_contact),
        )
        .route("/upload", post(upload::upload_images))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_api,
        ));

    // Login and register share a tighter rate limit tier
    let auth_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ));

    let body_limit = (state.config.uploads.max_size_mb as usize + 1) * 1024 * 1024;
    let cors = cors_layer(&state.config.cors.origin);

    Router::new()
        .nest("/api", general.merge(auth_routes))
        .nest_service("/uploads", ServeDir::new(&state.config.uploads.dir))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
    if origin == "*" {
        return layer.allow_origin(Any);
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => layer.allow_origin(value),
        Err(_) => {
            tracing::warn!("Invalid CORS origin {:?}, allowing any origin", origin);
            layer.allow_origin(Any)
        }
    }
}

async fn health() -> Json<ApiResponse<serde_json::Value>> {
    Json(ApiResponse::data(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}
