//! HTTP client for fetching the embargo deadline from an external service
//!
//! The service answers either with JSON `{"embargo_end": "<literal>"}` or with a
//! bare deadline literal. Every call is a fresh request; nothing is cached.

use crate::deadline::{parse_deadline, DeadlineResolver};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

#[derive(Debug, Deserialize)]
struct DeadlineDocument {
    embargo_end: String,
}

/// Resolver that looks the deadline up over HTTP
#[derive(Debug, Clone)]
pub struct HttpDeadlineSource {
    client: Client,
    url: Url,
}

impl HttpDeadlineSource {
    /// Create a source for `url` with a per-request `timeout`
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .use_rustls_tls()
            .build()
            .map_err(Error::Network)?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Fetch and parse the current deadline
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn fetch(&self) -> Result<DateTime<Utc>> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to fetch deadline from {}: {}", self.url, e);
                Error::Network(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("HTTP error {}: {}", status, body);
            return Err(Error::Resolution(format!("HTTP {}: {}", status, body)));
        }

        let body = response.text().await.map_err(Error::Network)?;
        let deadline = Self::parse_body(&body)?;

        debug!("Fetched embargo deadline {}", deadline);
        Ok(deadline)
    }

    fn parse_body(body: &str) -> Result<DateTime<Utc>> {
        let body = body.trim();
        if body.is_empty() {
            return Err(Error::Resolution("deadline service returned an empty body".to_string()));
        }

        let literal = if body.starts_with('{') {
            serde_json::from_str::<DeadlineDocument>(body)
                .map_err(|e| Error::Resolution(format!("malformed deadline document: {}", e)))?
                .embargo_end
        } else {
            body.trim_matches('"').to_string()
        };

        parse_deadline(&literal).map_err(|e| Error::Resolution(e.to_string()))
    }
}

impl DeadlineResolver for HttpDeadlineSource {
    fn resolve(&self) -> BoxFuture<'_, Result<DateTime<Utc>>> {
        Box::pin(self.fetch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(server: &mockito::ServerGuard) -> HttpDeadlineSource {
        let url = Url::parse(&format!("{}/deadline", server.url())).unwrap();
        HttpDeadlineSource::new(url, Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_parse_body() {
        let expected = parse_deadline("2030-01-01T00:00:00Z").unwrap();
        assert_eq!(
            HttpDeadlineSource::parse_body(r#"{"embargo_end": "2030-01-01T00:00:00Z"}"#).unwrap(),
            expected
        );
        assert_eq!(
            HttpDeadlineSource::parse_body("2030-01-01T00:00:00Z\n").unwrap(),
            expected
        );
        assert!(HttpDeadlineSource::parse_body("").is_err());
        assert!(HttpDeadlineSource::parse_body(r#"{"other": 1}"#).is_err());
    }

    #[tokio::test]
    async fn test_fetch_json_document() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/deadline")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"embargo_end": "2030-01-15 01:00:00 PST"}"#)
            .expect(2)
            .create_async()
            .await;

        let source = source(&server);
        let expected = parse_deadline("2030-01-15T09:00:00Z").unwrap();
        assert_eq!(source.resolve().await.unwrap(), expected);
        assert_eq!(source.resolve().await.unwrap(), expected);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/deadline")
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let err = source(&server).fetch().await.unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
        assert!(err.is_resolution_error());
    }
}
