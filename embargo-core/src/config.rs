//! Configuration management for the embargo gate

use crate::request::RouteMeta;
use crate::{Error, Result};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Which requests are subject to gating
///
/// Built from the `views_only` / `route_tag` configuration keys via [`ScopeSelector::from_signals`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeSelector {
    /// Every request is gated
    All,
    /// Only requests whose response is a rendered view
    ViewOnly,
    /// Only requests whose route carries the given tag
    Tagged(String),
}

impl Default for ScopeSelector {
    fn default() -> Self {
        Self::All
    }
}

impl ScopeSelector {
    /// Fold the two legacy scope signals into one selector.
    ///
    /// A route tag always wins over `views_only`.
    pub fn from_signals(views_only: bool, route_tag: Option<&str>) -> Self {
        match route_tag {
            Some(tag) => Self::Tagged(tag.to_string()),
            None if views_only => Self::ViewOnly,
            None => Self::All,
        }
    }

    /// Returns true if a route with this metadata is gated
    pub fn includes(&self, meta: &RouteMeta) -> bool {
        match self {
            Self::All => true,
            Self::ViewOnly => meta.renders_view,
            Self::Tagged(tag) => meta.has_tag(tag),
        }
    }
}

/// What to do with a request when the dynamic resolver fails or times out
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResolverFailurePolicy {
    /// Respond 500 for that request only
    Error,
    /// Let the request through
    Open,
    /// Respond with the embargo payload
    Closed,
}

impl Default for ResolverFailurePolicy {
    fn default() -> Self {
        Self::Error
    }
}

/// Embargo configuration as loaded from file or environment
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbargoConfig {
    /// Deadline literal, e.g. `2025-06-01 09:00:00 PST`
    #[serde(default)]
    pub embargo_end: Option<String>,

    /// URL of an external deadline service, resolved on every gated request
    #[serde(default)]
    pub deadline_url: Option<String>,

    /// Token that unconditionally passes the gate
    #[serde(default)]
    pub bypass_token: Option<String>,

    /// Query parameter carrying the bypass token
    #[serde(default = "default_bypass_param")]
    pub bypass_param: String,

    /// Gate only rendered views
    #[serde(default)]
    pub views_only: bool,

    /// Gate only routes carrying this tag (takes precedence over `views_only`)
    #[serde(default)]
    pub route_tag: Option<String>,

    /// Payload returned while embargoed
    #[serde(default = "default_blocked_body")]
    pub blocked_body: String,

    /// HTTP status returned while embargoed
    #[serde(default = "default_blocked_status")]
    pub blocked_status: u16,

    /// Bounded wait for a dynamic resolution in milliseconds
    #[serde(default = "default_resolver_timeout_ms")]
    pub resolver_timeout_ms: u64,

    /// Behavior when the dynamic resolver fails at request time
    #[serde(default)]
    pub on_resolver_failure: ResolverFailurePolicy,
}

impl Default for EmbargoConfig {
    fn default() -> Self {
        Self {
            embargo_end: None,
            deadline_url: None,
            bypass_token: None,
            bypass_param: default_bypass_param(),
            views_only: false,
            route_tag: None,
            blocked_body: default_blocked_body(),
            blocked_status: default_blocked_status(),
            resolver_timeout_ms: default_resolver_timeout_ms(),
            on_resolver_failure: ResolverFailurePolicy::default(),
        }
    }
}

impl EmbargoConfig {
    /// Load configuration from a YAML file, overlaid by `EMBARGO_*` variables
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix("EMBARGO"))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config: Self = envy::prefixed("EMBARGO_")
            .from_env()
            .map_err(|e| Error::Config(format!("Failed to parse environment variables: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// The presence of a deadline source is checked at registration, not here.
    pub fn validate(&self) -> Result<()> {
        StatusCode::from_u16(self.blocked_status).map_err(|_| {
            Error::Config(format!(
                "blocked_status {} is not a valid HTTP status code",
                self.blocked_status
            ))
        })?;

        if let Some(url) = &self.deadline_url {
            Url::parse(url)
                .map_err(|e| Error::Config(format!("Invalid deadline_url '{}': {}", url, e)))?;
        }

        if matches!(self.bypass_token.as_deref(), Some("")) {
            return Err(Error::Config("bypass_token cannot be empty".to_string()));
        }

        if self.bypass_param.is_empty() {
            return Err(Error::Config("bypass_param cannot be empty".to_string()));
        }

        if matches!(self.route_tag.as_deref(), Some("")) {
            return Err(Error::Config("route_tag cannot be empty".to_string()));
        }

        if self.resolver_timeout_ms == 0 {
            return Err(Error::Config("resolver_timeout_ms must be > 0".to_string()));
        }

        Ok(())
    }

    pub fn scope(&self) -> ScopeSelector {
        ScopeSelector::from_signals(self.views_only, self.route_tag.as_deref())
    }

    pub fn resolver_timeout(&self) -> Duration {
        Duration::from_millis(self.resolver_timeout_ms)
    }
}

// Default value functions
fn default_bypass_param() -> String {
    crate::DEFAULT_BYPASS_PARAM.to_string()
}

fn default_blocked_body() -> String {
    crate::DEFAULT_BLOCKED_BODY.to_string()
}

fn default_blocked_status() -> u16 {
    crate::DEFAULT_BLOCKED_STATUS
}

fn default_resolver_timeout_ms() -> u64 {
    crate::DEFAULT_RESOLVER_TIMEOUT_MS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_from_yaml() {
        let config = EmbargoConfig::from_yaml_str("embargo_end: \"2030-01-01T00:00:00Z\"\n").unwrap();
        assert_eq!(config.blocked_body, "Page Unavailable");
        assert_eq!(config.blocked_status, 503);
        assert_eq!(config.bypass_param, "bypass");
        assert_eq!(config.scope(), ScopeSelector::All);
        assert_eq!(config.on_resolver_failure, ResolverFailurePolicy::Error);
        assert_eq!(config.resolver_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_tag_takes_precedence_over_views_only() {
        let config = EmbargoConfig {
            views_only: true,
            route_tag: Some("embargo".to_string()),
            ..Default::default()
        };
        assert_eq!(config.scope(), ScopeSelector::Tagged("embargo".to_string()));

        let config = EmbargoConfig {
            views_only: true,
            ..Default::default()
        };
        assert_eq!(config.scope(), ScopeSelector::ViewOnly);
    }

    #[test]
    fn test_scope_includes() {
        let view = RouteMeta::view();
        let tagged_api = RouteMeta::default().with_tag("embargo");

        assert!(ScopeSelector::All.includes(&RouteMeta::default()));
        assert!(ScopeSelector::ViewOnly.includes(&view));
        assert!(!ScopeSelector::ViewOnly.includes(&tagged_api));

        let tagged = ScopeSelector::Tagged("embargo".to_string());
        assert!(tagged.includes(&tagged_api));
        assert!(!tagged.includes(&view));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let bad_status = EmbargoConfig {
            blocked_status: 42,
            ..Default::default()
        };
        assert!(bad_status.validate().is_err());

        let bad_url = EmbargoConfig {
            deadline_url: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(bad_url.validate().is_err());

        let empty_token = EmbargoConfig {
            bypass_token: Some(String::new()),
            ..Default::default()
        };
        assert!(empty_token.validate().is_err());

        let zero_timeout = EmbargoConfig {
            resolver_timeout_ms: 0,
            ..Default::default()
        };
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn test_failure_policy_parsing() {
        let config = EmbargoConfig::from_yaml_str("on_resolver_failure: closed\n").unwrap();
        assert_eq!(config.on_resolver_failure, ResolverFailurePolicy::Closed);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "embargo_end: \"2031-03-01 01:00:00 PST\"\nbypass_token: theKey\nviews_only: true\nblocked_status: 403"
        )
        .unwrap();

        let config = EmbargoConfig::from_file(file.path()).unwrap();
        assert_eq!(config.embargo_end.as_deref(), Some("2031-03-01 01:00:00 PST"));
        assert_eq!(config.bypass_token.as_deref(), Some("theKey"));
        assert_eq!(config.blocked_status, 403);
        assert_eq!(config.scope(), ScopeSelector::ViewOnly);
    }
}
