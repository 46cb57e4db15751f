// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, health, user},
    realtime::socket,
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, admin, user, health) plus the
///   realtime websocket endpoint.
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (pool, config, event router, session locks).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/admin-login", post(auth::admin_login))
        .route("/user-join", post(auth::user_join));

    let user_routes = Router::new()
        .route("/questions/{session_id}", get(user::get_questions))
        .route("/auto-save", post(user::auto_save))
        .route("/submit-exam", post(user::submit_exam));

    let admin_routes = Router::new()
        .route(
            "/questions",
            get(admin::list_questions).post(admin::create_question),
        )
        .route(
            "/questions/{id}",
            put(admin::update_question).delete(admin::delete_question),
        )
        .route(
            "/sessions",
            get(admin::list_sessions).post(admin::create_session),
        )
        .route("/sessions/{id}", delete(admin::delete_session))
        .route("/sessions/{id}/activate", post(admin::activate_session))
        .route("/sessions/{id}/terminate", post(admin::terminate_session))
        .route(
            "/sessions/{id}/attach-questions",
            put(admin::attach_questions),
        )
        .route("/reports", get(admin::list_reports))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/user", user_routes)
        .nest("/api/admin", admin_routes)
        .route("/api/health", get(health::health))
        .route("/ws", get(socket::ws_handler))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
