//! Per-request facts the gate decides on
//!
//! Facts are extracted once per request from the host's `http::Request` and are
//! read-only for the remainder of the decision.

use axum::extract::{ConnectInfo, MatchedPath};
use axum::http::{header, HeaderMap, Request};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;

/// Route metadata relevant to scope selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMeta {
    /// Tags declared on the route
    pub tags: BTreeSet<String>,
    /// Whether the route responds with a rendered view
    pub renders_view: bool,
}

impl RouteMeta {
    /// Metadata for a route that renders a view
    pub fn view() -> Self {
        Self {
            renders_view: true,
            ..Default::default()
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Route metadata keyed by route path pattern (e.g. `/press/:slug`)
#[derive(Debug, Clone, Default)]
pub struct RouteCatalog {
    routes: HashMap<String, RouteMeta>,
}

impl RouteCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, meta: RouteMeta) -> &mut Self {
        self.routes.insert(path.into(), meta);
        self
    }

    pub fn get(&self, path: &str) -> Option<&RouteMeta> {
        self.routes.get(path)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Read-only facts about one inbound request
#[derive(Debug, Clone)]
pub struct RequestFacts {
    /// Request arrival time
    pub now: DateTime<Utc>,
    /// Decoded query pairs in arrival order
    pub query: Vec<(String, String)>,
    /// Request URL as received
    pub url: String,
    /// Matched route pattern, or the raw path when unrouted
    pub route_path: String,
    pub route: RouteMeta,
    pub referrer: Option<String>,
    pub client_addr: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestFacts {
    /// Empty facts for a request to `/` arriving at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            query: Vec::new(),
            url: "/".to_string(),
            route_path: "/".to_string(),
            route: RouteMeta::default(),
            referrer: None,
            client_addr: None,
            user_agent: None,
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_route(mut self, path: impl Into<String>, meta: RouteMeta) -> Self {
        self.route_path = path.into();
        self.url = self.route_path.clone();
        self.route = meta;
        self
    }

    /// Returns true if any value of query parameter `name` equals `value`
    pub fn query_contains(&self, name: &str, value: &str) -> bool {
        self.query.iter().any(|(k, v)| k == name && v == value)
    }

    /// Extract facts from a host request
    ///
    /// Route metadata comes from a `RouteMeta` request extension if present,
    /// otherwise from `catalog` by matched route pattern, then by raw path.
    pub fn from_request<B>(
        req: &Request<B>,
        catalog: Option<&RouteCatalog>,
        now: DateTime<Utc>,
    ) -> Self {
        let query: Vec<(String, String)> = req
            .uri()
            .query()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        let route_path = req
            .extensions()
            .get::<MatchedPath>()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| req.uri().path().to_string());

        let route = req
            .extensions()
            .get::<RouteMeta>()
            .cloned()
            .or_else(|| {
                catalog.and_then(|c| {
                    c.get(&route_path)
                        .or_else(|| c.get(req.uri().path()))
                        .cloned()
                })
            })
            .unwrap_or_default();

        let headers = req.headers();
        let client_addr = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .or_else(|| forwarded_for(headers));

        Self {
            now,
            query,
            url: req.uri().to_string(),
            route_path,
            route,
            referrer: header_value(headers, header::REFERER.as_str()),
            client_addr,
            user_agent: header_value(headers, header::USER_AGENT.as_str()),
        }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// First hop of `X-Forwarded-For`
fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    header_value(headers, "x-forwarded-for").and_then(|v| {
        v.split(',')
            .next()
            .map(|hop| hop.trim().to_string())
            .filter(|hop| !hop.is_empty())
    })
}
