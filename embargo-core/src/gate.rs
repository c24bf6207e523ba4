//! Admission gate
//!
//! Decides, per request, whether normal processing continues or the embargo
//! payload is returned instead. Evaluation runs in a fixed order:
//!
//! 1. Bypass: a matching bypass token always passes.
//! 2. Scope: requests the scope selector excludes always pass.
//! 3. Deadline: in-scope requests strictly before the deadline are blocked.
//!
//! Steps 1 and 2 never touch the deadline, so a failing dynamic resolver cannot
//! block bypassed or out-of-scope traffic.

use crate::config::{EmbargoConfig, ResolverFailurePolicy, ScopeSelector};
use crate::deadline::{parse_deadline, Deadline, DeadlineResolver};
use crate::request::RequestFacts;
use crate::source::HttpDeadlineSource;
use crate::{Error, Result};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

/// Why a request was let through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReason {
    /// Request carried the bypass token
    Bypass,
    /// Request is not covered by the scope selector
    OutOfScope,
    /// Deadline has passed
    Lifted,
    /// Deadline could not be resolved and the gate is configured to fail open
    ResolverFailOpen,
}

/// Substitute response sent while embargoed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Outcome of evaluating one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Pass(PassReason),
    Block(BlockedResponse),
}

impl Decision {
    pub fn is_pass(&self) -> bool {
        matches!(self, Decision::Pass(_))
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Decision::Block(_))
    }
}

/// Registered embargo gate
///
/// Immutable after registration; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct EmbargoGate {
    deadline: Deadline,
    bypass_token: Option<String>,
    bypass_param: String,
    scope: ScopeSelector,
    blocked: BlockedResponse,
    on_resolver_failure: ResolverFailurePolicy,
}

impl EmbargoGate {
    pub fn builder() -> EmbargoBuilder {
        EmbargoBuilder::default()
    }

    /// Register a gate from loaded configuration
    ///
    /// A `deadline_url` installs an [`HttpDeadlineSource`] as the resolver.
    pub fn from_config(config: &EmbargoConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = Self::builder()
            .bypass_param(config.bypass_param.clone())
            .scope(config.scope())
            .blocked_body(config.blocked_body.clone())
            .blocked_status(config.blocked_status)
            .resolver_timeout(config.resolver_timeout())
            .on_resolver_failure(config.on_resolver_failure);

        if let Some(literal) = &config.embargo_end {
            builder = builder.deadline_literal(literal.clone());
        }

        if let Some(token) = &config.bypass_token {
            builder = builder.bypass_token(token.clone());
        }

        if let Some(url) = &config.deadline_url {
            let url = Url::parse(url)
                .map_err(|e| Error::Config(format!("Invalid deadline_url '{}': {}", url, e)))?;
            let source = HttpDeadlineSource::new(url, config.resolver_timeout())?;
            builder = builder.deadline_resolver(Arc::new(source));
        }

        builder.build()
    }

    /// Evaluate a request
    ///
    /// Errors are resolution errors for this request only; see [`EmbargoGate::fallback`].
    pub async fn evaluate(&self, facts: &RequestFacts) -> Result<Decision> {
        if let Some(decision) = self.screen(facts) {
            return Ok(decision);
        }

        let deadline = self.deadline.current().await?;
        Ok(self.decide_at(facts.now, deadline))
    }

    /// Bypass and scope checks, which need no deadline
    pub fn screen(&self, facts: &RequestFacts) -> Option<Decision> {
        if self.is_bypassed(facts) {
            audit_bypass(facts);
            return Some(Decision::Pass(PassReason::Bypass));
        }

        if !self.scope.includes(&facts.route) {
            return Some(Decision::Pass(PassReason::OutOfScope));
        }

        None
    }

    /// Deadline comparison for an in-scope request
    ///
    /// The boundary instant itself is not embargoed.
    pub fn decide_at(&self, now: DateTime<Utc>, deadline: DateTime<Utc>) -> Decision {
        if now < deadline {
            Decision::Block(self.blocked.clone())
        } else {
            Decision::Pass(PassReason::Lifted)
        }
    }

    /// Decision to apply when the deadline could not be resolved
    ///
    /// Returns `None` under [`ResolverFailurePolicy::Error`]; the host should then
    /// answer that single request with an internal error.
    pub fn fallback(&self, err: &Error, facts: &RequestFacts) -> Option<Decision> {
        match self.on_resolver_failure {
            ResolverFailurePolicy::Error => {
                error!(route = %facts.route_path, "Embargo deadline unavailable: {}", err);
                None
            }
            ResolverFailurePolicy::Open => {
                warn!(route = %facts.route_path, "Embargo deadline unavailable, failing open: {}", err);
                Some(Decision::Pass(PassReason::ResolverFailOpen))
            }
            ResolverFailurePolicy::Closed => {
                warn!(route = %facts.route_path, "Embargo deadline unavailable, failing closed: {}", err);
                Some(Decision::Block(self.blocked.clone()))
            }
        }
    }

    /// Returns true if the embargo no longer applies at `now`
    pub async fn is_lifted_at(&self, now: DateTime<Utc>) -> Result<bool> {
        Ok(now >= self.deadline.current().await?)
    }

    pub fn deadline(&self) -> &Deadline {
        &self.deadline
    }

    pub fn scope(&self) -> &ScopeSelector {
        &self.scope
    }

    pub fn blocked_response(&self) -> &BlockedResponse {
        &self.blocked
    }

    pub fn failure_policy(&self) -> ResolverFailurePolicy {
        self.on_resolver_failure
    }

    fn is_bypassed(&self, facts: &RequestFacts) -> bool {
        self.bypass_token
            .as_deref()
            .is_some_and(|token| facts.query_contains(&self.bypass_param, token))
    }
}

fn audit_bypass(facts: &RequestFacts) {
    info!(
        url = %facts.url,
        route = %facts.route_path,
        referrer = facts.referrer.as_deref().unwrap_or("-"),
        client = facts.client_addr.as_deref().unwrap_or("-"),
        user_agent = facts.user_agent.as_deref().unwrap_or("-"),
        "Embargo bypassed"
    );
}

/// Registration-time builder for [`EmbargoGate`]
#[derive(Default)]
pub struct EmbargoBuilder {
    literal: Option<String>,
    instant: Option<DateTime<Utc>>,
    resolver: Option<Arc<dyn DeadlineResolver>>,
    resolver_timeout: Option<Duration>,
    bypass_token: Option<String>,
    bypass_param: Option<String>,
    scope: ScopeSelector,
    blocked_body: Option<String>,
    blocked_status: Option<u16>,
    on_resolver_failure: ResolverFailurePolicy,
}

impl EmbargoBuilder {
    /// Deadline as a literal with an explicit zone, parsed at `build`
    pub fn deadline_literal(mut self, literal: impl Into<String>) -> Self {
        self.literal = Some(literal.into());
        self
    }

    /// Deadline as an absolute instant
    pub fn deadline_at(mut self, at: DateTime<Utc>) -> Self {
        self.instant = Some(at);
        self
    }

    /// Resolve the deadline on every gated request; takes precedence over a literal
    pub fn deadline_resolver(mut self, resolver: Arc<dyn DeadlineResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn resolver_timeout(mut self, timeout: Duration) -> Self {
        self.resolver_timeout = Some(timeout);
        self
    }

    pub fn bypass_token(mut self, token: impl Into<String>) -> Self {
        self.bypass_token = Some(token.into());
        self
    }

    pub fn bypass_param(mut self, param: impl Into<String>) -> Self {
        self.bypass_param = Some(param.into());
        self
    }

    pub fn scope(mut self, scope: ScopeSelector) -> Self {
        self.scope = scope;
        self
    }

    /// Gate only rendered views, unless a route tag is already selected
    pub fn views_only(mut self) -> Self {
        if !matches!(self.scope, ScopeSelector::Tagged(_)) {
            self.scope = ScopeSelector::ViewOnly;
        }
        self
    }

    /// Gate only routes carrying `tag`
    pub fn route_tag(mut self, tag: impl Into<String>) -> Self {
        self.scope = ScopeSelector::Tagged(tag.into());
        self
    }

    pub fn blocked_body(mut self, body: impl Into<String>) -> Self {
        self.blocked_body = Some(body.into());
        self
    }

    pub fn blocked_status(mut self, status: u16) -> Self {
        self.blocked_status = Some(status);
        self
    }

    pub fn on_resolver_failure(mut self, policy: ResolverFailurePolicy) -> Self {
        self.on_resolver_failure = policy;
        self
    }

    /// Register the gate
    ///
    /// Fails if no deadline source is configured or the literal does not parse.
    pub fn build(self) -> Result<EmbargoGate> {
        let parsed = self.literal.as_deref().map(parse_deadline).transpose()?;

        let deadline = match (self.resolver, self.instant.or(parsed)) {
            (Some(resolver), fixed) => {
                if fixed.is_some() {
                    warn!("Both a deadline resolver and a fixed deadline were configured; using the resolver");
                }
                let timeout = self
                    .resolver_timeout
                    .unwrap_or(Duration::from_millis(crate::DEFAULT_RESOLVER_TIMEOUT_MS));
                if timeout.is_zero() {
                    return Err(Error::Config("resolver timeout must be > 0".to_string()));
                }
                Deadline::Dynamic { resolver, timeout }
            }
            (None, Some(at)) => Deadline::Fixed(at),
            (None, None) => {
                return Err(Error::Config(
                    "an embargo deadline must be supplied, either as a deadline literal or a deadline resolver"
                        .to_string(),
                ))
            }
        };

        if matches!(self.bypass_token.as_deref(), Some("")) {
            return Err(Error::Config("bypass token cannot be empty".to_string()));
        }

        let status_code = self.blocked_status.unwrap_or(crate::DEFAULT_BLOCKED_STATUS);
        let status = StatusCode::from_u16(status_code).map_err(|_| {
            Error::Config(format!("blocked status {} is not a valid HTTP status code", status_code))
        })?;

        match &deadline {
            Deadline::Fixed(at) => info!(
                deadline = %at,
                "Embargo will be lifted at {}, time is now {}",
                at,
                Utc::now()
            ),
            Deadline::Dynamic { timeout, .. } => info!(
                timeout_ms = timeout.as_millis() as u64,
                "Embargo deadline will be resolved on every gated request"
            ),
        }

        Ok(EmbargoGate {
            deadline,
            bypass_token: self.bypass_token,
            bypass_param: self
                .bypass_param
                .unwrap_or_else(|| crate::DEFAULT_BYPASS_PARAM.to_string()),
            scope: self.scope,
            blocked: BlockedResponse {
                status,
                body: self
                    .blocked_body
                    .unwrap_or_else(|| crate::DEFAULT_BLOCKED_BODY.to_string()),
            },
            on_resolver_failure: self.on_resolver_failure,
        })
    }
}
