// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, attempt, auth},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, attempts, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (engine, store, config).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let attempt_routes = Router::new()
        .route("/", post(attempt::start_attempt))
        .route(
            "/{id}",
            get(attempt::get_attempt).put(attempt::update_attempt),
        )
        .route("/{id}/answers", post(attempt::submit_answer))
        .route("/{id}/submit", post(attempt::submit_evaluation))
        .route("/{id}/results", get(attempt::get_results))
        .route("/user/current", get(attempt::list_my_attempts))
        .route("/user/{user_id}", get(attempt::list_user_attempts))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/evaluations", post(admin::create_evaluation))
        .route("/evaluations/{id}", get(admin::get_evaluation))
        .route("/evaluations/{id}/questions", post(admin::add_question))
        .route(
            "/evaluations/{id}/attempts",
            get(admin::list_evaluation_attempts),
        )
        .route("/attempts/{id}", delete(admin::delete_attempt))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/attempts", attempt_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
