//! Prometheus metrics for the HTTP surface and the data access layer.
//!
//! The collector is created once in `main` and shared through `AppState`.
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use prometheus_client::encoding::{text::encode, EncodeLabelSet};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::handlers::AppState;

/// Labels for HTTP request timing
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabels {
    pub method: String,
    /// Matched route template, e.g. `/api/usuarios/:id`
    pub route: String,
    pub status: String,
}

/// Labels for user CRUD outcomes
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OperationLabels {
    /// "create", "read", "update" or "delete"
    pub operation: String,
    /// "success" or "error"
    pub status: String,
}

/// Labels for database statements
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DbLabels {
    pub r#type: String,
    pub table: String,
}

/// Central metrics collector with Prometheus registry
pub struct Metrics {
    registry: Registry,

    /// Request latency by method, route and status
    pub http_requests_duration_seconds: Family<HttpLabels, Histogram>,

    /// User CRUD operations by outcome
    pub user_operations_total: Family<OperationLabels, Counter>,

    /// Successful database statements by type and table
    pub db_operations_total: Family<DbLabels, Counter>,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let http_requests_duration_seconds =
            Family::<HttpLabels, Histogram>::new_with_constructor(|| {
                // 5ms .. ~10s
                Histogram::new(exponential_buckets(0.005, 2.0, 12))
            });
        registry.register(
            "http_requests_duration_seconds",
            "Duration of HTTP requests in seconds",
            http_requests_duration_seconds.clone(),
        );

        let user_operations_total = Family::<OperationLabels, Counter>::default();
        registry.register(
            "user_operations",
            "Total user CRUD operations",
            user_operations_total.clone(),
        );

        let db_operations_total = Family::<DbLabels, Counter>::default();
        registry.register(
            "db_operations",
            "Database operations",
            db_operations_total.clone(),
        );

        Self {
            registry,
            http_requests_duration_seconds,
            user_operations_total,
            db_operations_total,
        }
    }

    pub fn observe_request(&self, method: &str, route: &str, status: u16, elapsed: Duration) {
        self.http_requests_duration_seconds
            .get_or_create(&HttpLabels {
                method: method.to_string(),
                route: route.to_string(),
                status: status.to_string(),
            })
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_user_operation(&self, operation: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        self.user_operations_total
            .get_or_create(&OperationLabels {
                operation: operation.to_string(),
                status: status.to_string(),
            })
            .inc();
    }

    pub fn record_db_operation(&self, kind: &str, table: &str) {
        self.db_operations_total
            .get_or_create(&DbLabels {
                r#type: kind.to_string(),
                table: table.to_string(),
            })
            .inc();
    }

    /// Encode metrics in the Prometheus text exposition format
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Middleware timing every routed request.
///
/// Installed with `route_layer` so `MatchedPath` is already resolved.
pub async fn track_requests(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let response = next.run(req).await;

    state
        .metrics
        .observe_request(&method, &route, response.status().as_u16(), start.elapsed());

    response
}
