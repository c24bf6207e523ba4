//! Deadline parsing and resolution
//!
//! A deadline is either fixed at registration or resolved fresh on every gated
//! request through a [`DeadlineResolver`]. Dynamic results are never cached.

use crate::{Error, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Source of a deadline that may change without a restart
pub trait DeadlineResolver: Send + Sync {
    fn resolve(&self) -> BoxFuture<'_, Result<DateTime<Utc>>>;
}

/// Adapter turning an async closure into a [`DeadlineResolver`]
pub struct FnResolver<F>(F);

/// Wrap an async closure as a resolver
///
/// ```
/// use chrono::Utc;
/// use embargo_core::resolver_fn;
///
/// let resolver = resolver_fn(|| async { Ok(Utc::now()) });
/// ```
pub fn resolver_fn<F, Fut>(f: F) -> FnResolver<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<DateTime<Utc>>> + Send + 'static,
{
    FnResolver(f)
}

impl<F, Fut> DeadlineResolver for FnResolver<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<DateTime<Utc>>> + Send + 'static,
{
    fn resolve(&self) -> BoxFuture<'_, Result<DateTime<Utc>>> {
        Box::pin((self.0)())
    }
}

/// The embargo deadline as registered
#[derive(Clone)]
pub enum Deadline {
    /// Parsed once at registration and kept for the process lifetime
    Fixed(DateTime<Utc>),
    /// Resolved on every gated request, bounded by `timeout`
    Dynamic {
        resolver: Arc<dyn DeadlineResolver>,
        timeout: Duration,
    },
}

impl fmt::Debug for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(at) => f.debug_tuple("Fixed").field(at).finish(),
            Self::Dynamic { timeout, .. } => f
                .debug_struct("Dynamic")
                .field("timeout", timeout)
                .finish_non_exhaustive(),
        }
    }
}

impl Deadline {
    /// Current deadline instant
    pub async fn current(&self) -> Result<DateTime<Utc>> {
        match self {
            Self::Fixed(at) => Ok(*at),
            Self::Dynamic { resolver, timeout } => {
                let at = tokio::time::timeout(*timeout, resolver.resolve())
                    .await
                    .map_err(|_| Error::Timeout)??;
                debug!(deadline = %at, "Resolved dynamic embargo deadline");
                Ok(at)
            }
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic { .. })
    }
}

/// Named zones accepted after a `YYYY-MM-DD HH:MM:SS` literal, as UTC offsets in minutes
///
/// Abbreviations shared by several zones (IST, AST, ...) are left out; use a numeric offset.
const NAMED_ZONES: &[(&str, i32)] = &[
    ("UTC", 0),
    ("UT", 0),
    ("GMT", 0),
    ("Z", 0),
    ("PST", -8 * 60),
    ("PDT", -7 * 60),
    ("MST", -7 * 60),
    ("MDT", -6 * 60),
    ("CST", -6 * 60),
    ("CDT", -5 * 60),
    ("EST", -5 * 60),
    ("EDT", -4 * 60),
    ("BST", 60),
    ("CET", 60),
    ("CEST", 2 * 60),
    ("EET", 2 * 60),
    ("EEST", 3 * 60),
    ("JST", 9 * 60),
    ("ACST", 9 * 60 + 30),
    ("AEST", 10 * 60),
];

const LOCAL_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse a deadline literal into an absolute instant
///
/// Literals must carry their zone; a zone-less literal is rejected so the result
/// never depends on the server-local timezone.
pub fn parse_deadline(literal: &str) -> Result<DateTime<Utc>> {
    let literal = literal.trim();
    if literal.is_empty() {
        return Err(Error::Parse("deadline literal is empty".to_string()));
    }

    if let Ok(at) = DateTime::parse_from_rfc3339(literal) {
        return Ok(at.with_timezone(&Utc));
    }

    if let Ok(at) = DateTime::parse_from_rfc2822(literal) {
        return Ok(at.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S %z", "%Y-%m-%d %H:%M:%S %:z"] {
        if let Ok(at) = DateTime::parse_from_str(literal, format) {
            return Ok(at.with_timezone(&Utc));
        }
    }

    if let Some(at) = parse_named_zone(literal)? {
        return Ok(at);
    }

    // Unix seconds only in the explicit `@<secs>` form, so a bare year is not an epoch
    if let Some(secs) = literal.strip_prefix('@') {
        let secs = secs
            .parse::<i64>()
            .map_err(|_| Error::Parse(format!("'{}' is not a valid Unix timestamp", literal)))?;
        return Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| Error::Parse(format!("'{}' is out of range", literal)));
    }

    if LOCAL_FORMATS
        .iter()
        .any(|format| NaiveDateTime::parse_from_str(literal, format).is_ok())
    {
        return Err(Error::Parse(format!(
            "'{}' has no timezone; append one such as UTC, PST or +0100",
            literal
        )));
    }

    Err(Error::Parse(format!("'{}' is not a recognised date", literal)))
}

fn parse_named_zone(literal: &str) -> Result<Option<DateTime<Utc>>> {
    let Some((local, zone)) = literal.rsplit_once(' ') else {
        return Ok(None);
    };

    let Some(&(_, minutes)) = NAMED_ZONES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(zone))
    else {
        return Ok(None);
    };

    let Some(naive) = LOCAL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(local.trim(), format).ok())
    else {
        return Ok(None);
    };

    let offset = FixedOffset::east_opt(minutes * 60)
        .ok_or_else(|| Error::Parse(format!("invalid offset for zone {}", zone)))?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|at| Some(at.with_timezone(&Utc)))
        .ok_or_else(|| Error::Parse(format!("'{}' is ambiguous", literal)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_parse_rfc3339() {
        assert_eq!(
            parse_deadline("2030-01-01T09:00:00+01:00").unwrap(),
            utc("2030-01-01T08:00:00Z")
        );
    }

    #[test]
    fn test_parse_named_zone_is_absolute() {
        // 01:00 PST is 09:00 UTC regardless of where the server runs
        assert_eq!(
            parse_deadline("2030-01-15 01:00:00 PST").unwrap(),
            utc("2030-01-15T09:00:00Z")
        );
        assert_eq!(
            parse_deadline("2030-01-15 01:00:00 pst").unwrap(),
            utc("2030-01-15T09:00:00Z")
        );
        assert_eq!(
            parse_deadline("2030-07-15 01:00:00 EDT").unwrap(),
            utc("2030-07-15T05:00:00Z")
        );
    }

    #[test]
    fn test_parse_rfc2822_and_offsets() {
        assert_eq!(
            parse_deadline("Tue, 15 Jan 2030 01:00:00 PST").unwrap(),
            utc("2030-01-15T09:00:00Z")
        );
        assert_eq!(
            parse_deadline("2030-01-15 01:00:00 -0800").unwrap(),
            utc("2030-01-15T09:00:00Z")
        );
    }

    #[test]
    fn test_parse_unix_seconds() {
        assert_eq!(parse_deadline("@1893456000").unwrap(), utc("2030-01-01T00:00:00Z"));
        assert!(matches!(parse_deadline("@soon"), Err(Error::Parse(_))));
    }

    #[test]
    fn test_parse_rejects_bare_numbers() {
        assert!(matches!(parse_deadline("2030"), Err(Error::Parse(_))));
        assert!(matches!(parse_deadline("1893456000"), Err(Error::Parse(_))));
    }

    #[test]
    fn test_parse_half_hour_offsets() {
        assert_eq!(
            parse_deadline("2030-01-15 09:30:00 ACST").unwrap(),
            utc("2030-01-15T00:00:00Z")
        );
        assert_eq!(
            parse_deadline("2030-01-15 05:30:00 +0530").unwrap(),
            utc("2030-01-15T00:00:00Z")
        );
        // Ambiguous abbreviation, must be given as an offset
        assert!(matches!(parse_deadline("2030-01-15 05:30:00 IST"), Err(Error::Parse(_))));
    }

    #[test]
    fn test_parse_rejects_zoneless_and_garbage() {
        let err = parse_deadline("2030-01-15 01:00:00").unwrap_err();
        assert!(err.to_string().contains("no timezone"));

        assert!(matches!(parse_deadline("next tuesday"), Err(Error::Parse(_))));
        assert!(matches!(parse_deadline("   "), Err(Error::Parse(_))));
        assert!(matches!(parse_deadline("2030-01-15 01:00:00 XYZ"), Err(Error::Parse(_))));
    }

    #[tokio::test]
    async fn test_fixed_deadline() {
        let at = utc("2030-01-01T00:00:00Z");
        assert_eq!(Deadline::Fixed(at).current().await.unwrap(), at);
    }

    #[tokio::test]
    async fn test_dynamic_deadline_is_resolved_every_time() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let resolver = resolver_fn(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(Utc.timestamp_opt(1_000 + n as i64, 0).unwrap()) }
        });

        let deadline = Deadline::Dynamic {
            resolver: Arc::new(resolver),
            timeout: Duration::from_secs(1),
        };

        let first = deadline.current().await.unwrap();
        let second = deadline.current().await.unwrap();
        assert_ne!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dynamic_failure_propagates() {
        let deadline = Deadline::Dynamic {
            resolver: Arc::new(resolver_fn(|| async {
                Err(Error::Resolution("no deadline published".to_string()))
            })),
            timeout: Duration::from_secs(1),
        };
        assert!(matches!(deadline.current().await, Err(Error::Resolution(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dynamic_timeout() {
        let deadline = Deadline::Dynamic {
            resolver: Arc::new(resolver_fn(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Utc::now())
            })),
            timeout: Duration::from_millis(100),
        };
        assert!(matches!(deadline.current().await, Err(Error::Timeout)));
    }
}
