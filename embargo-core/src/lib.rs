// SPDX-License-Identifier: MIT
//
// Embargo Gate: Time-Gated Request Admission
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara

//! Embargo Core Library
//!
//! This crate provides the request-gating engine used to hold back content until a
//! configured instant. It sits early in an axum request pipeline and, per request,
//! either lets processing continue or short-circuits with a fixed embargo response.
//!
//! # Architecture
//!
//! The library is organized into modules representing core concerns:
//! - `config`: Registration-time configuration with validation
//! - `deadline`: Deadline parsing and resolution (fixed or per-request)
//! - `source`: HTTP-backed dynamic deadline source
//! - `request`: Per-request facts extracted from the host request
//! - `gate`: The admission decision (bypass, scope, deadline)
//! - `metrics`: Decision counters with Prometheus exposition
//! - `middleware`: axum middleware hook
//! - `error`: Unified error types
//!
//! # Example
//!
//! ```no_run
//! use axum::{middleware, routing::get, Router};
//! use embargo_core::{EmbargoGate, EmbargoState, ScopeSelector, RouteCatalog, RouteMeta};
//!
//! # fn build() -> embargo_core::Result<Router> {
//! let gate = EmbargoGate::builder()
//!     .deadline_literal("2025-06-01 09:00:00 PST")
//!     .bypass_token("preview")
//!     .scope(ScopeSelector::Tagged("embargo".into()))
//!     .build()?;
//!
//! let mut catalog = RouteCatalog::new();
//! catalog.insert("/", RouteMeta::view().with_tag("embargo"));
//!
//! let state = EmbargoState::new(gate).with_catalog(catalog);
//! let app = Router::new()
//!     .route("/", get(|| async { "launched" }))
//!     .route_layer(middleware::from_fn_with_state(state, embargo_core::embargo_middleware));
//! # Ok(app)
//! # }
//! ```

pub mod config;
pub mod deadline;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod middleware;
pub mod request;
pub mod source;

pub use crate::config::{EmbargoConfig, ResolverFailurePolicy, ScopeSelector};
pub use crate::deadline::{parse_deadline, resolver_fn, Deadline, DeadlineResolver};
pub use crate::error::{Error, Result};
pub use crate::gate::{BlockedResponse, Decision, EmbargoBuilder, EmbargoGate, PassReason};
pub use crate::metrics::Metrics;
pub use crate::middleware::{embargo_middleware, EmbargoState};
pub use crate::request::{RequestFacts, RouteCatalog, RouteMeta};
pub use crate::source::HttpDeadlineSource;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default query-parameter name carrying the bypass token
pub const DEFAULT_BYPASS_PARAM: &str = "bypass";

/// Default payload returned while embargoed
pub const DEFAULT_BLOCKED_BODY: &str = "Page Unavailable";

/// Default status returned while embargoed (503 Service Unavailable)
pub const DEFAULT_BLOCKED_STATUS: u16 = 503;

/// Default bounded wait for a dynamic deadline resolution (5 s)
pub const DEFAULT_RESOLVER_TIMEOUT_MS: u64 = 5_000;
