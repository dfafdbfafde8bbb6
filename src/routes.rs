use crate::errors::AppError;
use crate::handlers::{self, AppState};
use crate::metrics::track_requests;
use axum::{
    middleware,
    response::{IntoResponse, Response},
    routing::{get, put},
    Router,
};
use std::any::Any;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Request bodies above this size are rejected before reaching a handler.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Turns a handler panic into the generic 500 body.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");

    AppError::InternalError(format!("handler panicked: {}", detail)).into_response()
}

/// Builds the full HTTP surface.
pub fn app(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route(
            "/api/usuarios",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route(
            "/api/usuarios/:id",
            put(handlers::update_user).delete(handlers::delete_user),
        )
        .route(
            "/api/usuarios/:id/enderecos",
            get(handlers::list_addresses).post(handlers::create_address),
        )
        .route(
            "/api/usuarios/:id/enderecos/:endereco_id",
            put(handlers::update_address).delete(handlers::delete_address),
        );

    Router::new()
        .route("/", get(handlers::root))
        .route("/metrics", get(handlers::metrics_endpoint))
        .merge(api)
        // route_layer so the middleware sees the matched route template
        .route_layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
}
