//! axum middleware hook
//!
//! Install with `axum::middleware::from_fn_with_state(state, embargo_middleware)`.
//! As a `route_layer` the matched route pattern is used for catalog lookups; as a
//! plain `layer` it also sees unrouted requests and falls back to the raw path.

use crate::gate::{BlockedResponse, Decision, EmbargoGate};
use crate::metrics::Metrics;
use crate::request::{RequestFacts, RouteCatalog};
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::sync::Arc;

/// State shared by every invocation of [`embargo_middleware`]
#[derive(Clone)]
pub struct EmbargoState {
    gate: Arc<EmbargoGate>,
    catalog: Arc<RouteCatalog>,
    metrics: Metrics,
}

impl EmbargoState {
    pub fn new(gate: EmbargoGate) -> Self {
        Self {
            gate: Arc::new(gate),
            catalog: Arc::new(RouteCatalog::new()),
            metrics: Metrics::new(),
        }
    }

    pub fn with_catalog(mut self, catalog: RouteCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn gate(&self) -> &EmbargoGate {
        &self.gate
    }

    pub fn catalog(&self) -> &RouteCatalog {
        &self.catalog
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

impl IntoResponse for BlockedResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.body,
        )
            .into_response()
    }
}

/// Admit or short-circuit one request
pub async fn embargo_middleware(
    State(state): State<EmbargoState>,
    req: Request,
    next: Next,
) -> Response {
    let facts = RequestFacts::from_request(&req, Some(&state.catalog), Utc::now());

    let decision = match state.gate.evaluate(&facts).await {
        Ok(decision) => decision,
        Err(e) => {
            state.metrics.record_resolution_failure();
            match state.gate.fallback(&e, &facts) {
                Some(decision) => decision,
                None => {
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Embargo deadline unavailable",
                    )
                        .into_response()
                }
            }
        }
    };

    state.metrics.record_decision(&decision);

    match decision {
        Decision::Pass(_) => next.run(req).await,
        Decision::Block(blocked) => blocked.into_response(),
    }
}
