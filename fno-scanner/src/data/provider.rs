//! Quote source abstraction for the acquisition cascade.
//!
//! Defines the `QuoteSource` trait that every upstream provider implements,
//! so the orchestrator can walk the cascade without knowing which provider
//! it is talking to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, warn};

use super::pacing::RequestPacer;
use super::QuoteRecord;

// ============================================================================
// Source Capabilities
// ============================================================================

/// Fields and operations a source can supply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCapabilities {
    /// Supplies futures open interest
    pub open_interest: bool,
    /// Supplies previous-session OHLC from a historical endpoint
    pub prev_day_history: bool,
    /// Can enumerate the F&O universe
    pub discovery: bool,
    /// Overrides batch fetching with a bulk endpoint
    pub bulk_quotes: bool,
}

// ============================================================================
// Source Error
// ============================================================================

/// Errors specific to quote sources.
///
/// These never cross the `QuoteSource` boundary; the provided trait methods
/// log them and degrade to "no data".
#[derive(Debug, Clone)]
pub enum SourceError {
    /// Network error (connection failed, timeout)
    Network(String),
    /// Authentication error (invalid token, expired)
    Auth(String),
    /// Rate limit exceeded
    RateLimited { retry_after_secs: Option<u64> },
    /// Browsing session could not be established
    SessionUnavailable,
    /// Provider has no data for the request
    DataNotAvailable(String),
    /// Payload did not match the expected shape
    Malformed(String),
    /// Internal provider error
    Internal(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::Auth(msg) => write!(f, "Authentication error: {}", msg),
            Self::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited")?;
                if let Some(secs) = retry_after_secs {
                    write!(f, ", retry after {} seconds", secs)?;
                }
                Ok(())
            }
            Self::SessionUnavailable => write!(f, "Session unavailable"),
            Self::DataNotAvailable(msg) => write!(f, "Data not available: {}", msg),
            Self::Malformed(msg) => write!(f, "Malformed payload: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for SourceError {}

impl SourceError {
    /// Check if the error is transient (the next cycle may succeed)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::SessionUnavailable
        )
    }

    /// Classify a transport error.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Network("Request timeout".into())
        } else if e.is_connect() {
            Self::Network("Connection failed".into())
        } else if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        match status {
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Self::Auth(format!("HTTP {}", status))
            }
            reqwest::StatusCode::TOO_MANY_REQUESTS => Self::RateLimited {
                retry_after_secs: None,
            },
            reqwest::StatusCode::NOT_FOUND => Self::DataNotAvailable(format!("HTTP {}", status)),
            _ => Self::Internal(format!("HTTP {}", status)),
        }
    }
}

// ============================================================================
// Source Info
// ============================================================================

/// Summary of a registered source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    pub name: String,
    pub priority: u8,
    pub configured: bool,
    pub capabilities: SourceCapabilities,
}

// ============================================================================
// Quote Source Trait
// ============================================================================

/// Trait for upstream quote providers.
///
/// Implementors supply the fallible `try_*` operations. The provided
/// `discover_universe`, `fetch_quote` and `fetch_quotes_batch` methods wrap
/// them so that failures never escape a source.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Provenance tag written into every record (e.g., "nse_api")
    fn name(&self) -> &'static str;

    /// Cascade position (lower = tried earlier)
    fn priority(&self) -> u8;

    /// Fields and operations this source supports
    fn capabilities(&self) -> SourceCapabilities;

    /// Whether the source can be used at all (e.g., credentials present).
    ///
    /// Unconfigured sources are skipped by the orchestrator, not failed.
    fn is_configured(&self) -> bool {
        true
    }

    /// Request pacing for sequential calls to this source
    fn pacer(&self) -> RequestPacer {
        RequestPacer::immediate()
    }

    /// Enumerate the F&O universe.
    async fn try_discover(&self) -> Result<HashSet<String>, SourceError> {
        Ok(HashSet::new())
    }

    /// Fetch one snapshot. `Ok(None)` means the provider had nothing.
    async fn try_fetch_quote(&self, symbol: &str) -> Result<Option<QuoteRecord>, SourceError>;

    /// Best-effort universe discovery; failures degrade to an empty set.
    async fn discover_universe(&self) -> HashSet<String> {
        if !self.capabilities().discovery || !self.is_configured() {
            return HashSet::new();
        }
        match self.try_discover().await {
            Ok(symbols) => symbols,
            Err(e) => {
                warn!(source = self.name(), error = %e, "Universe discovery failed");
                HashSet::new()
            }
        }
    }

    /// Best-effort single snapshot; failures degrade to `None`.
    async fn fetch_quote(&self, symbol: &str) -> Option<QuoteRecord> {
        match self.try_fetch_quote(symbol).await {
            Ok(record) => record,
            Err(SourceError::DataNotAvailable(msg)) => {
                debug!(source = self.name(), symbol, reason = %msg, "No data");
                None
            }
            Err(e) => {
                warn!(source = self.name(), symbol, error = %e, "Quote fetch failed");
                None
            }
        }
    }

    /// Fetch a batch sequentially with paced calls.
    async fn fetch_quotes_batch(&self, symbols: &[String]) -> Vec<QuoteRecord> {
        let pacer = self.pacer();
        let mut records = Vec::with_capacity(symbols.len());

        for (i, symbol) in symbols.iter().enumerate() {
            if i > 0 {
                pacer.between_calls().await;
            }
            if let Some(record) = self.fetch_quote(symbol).await {
                records.push(record);
            }
        }

        records
    }

    /// Descriptor for reports.
    fn info(&self) -> SourceInfo {
        SourceInfo {
            name: self.name().to_string(),
            priority: self.priority(),
            configured: self.is_configured(),
            capabilities: self.capabilities(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource {
        fail: bool,
    }

    #[async_trait]
    impl QuoteSource for FixedSource {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn priority(&self) -> u8 {
            1
        }

        fn capabilities(&self) -> SourceCapabilities {
            SourceCapabilities {
                discovery: true,
                ..Default::default()
            }
        }

        async fn try_discover(&self) -> Result<HashSet<String>, SourceError> {
            if self.fail {
                Err(SourceError::Network("down".into()))
            } else {
                Ok(["ABC".to_string()].into_iter().collect())
            }
        }

        async fn try_fetch_quote(&self, symbol: &str) -> Result<Option<QuoteRecord>, SourceError> {
            match (self.fail, symbol) {
                (true, _) => Err(SourceError::Malformed("bad json".into())),
                (false, "MISSING") => Err(SourceError::DataNotAvailable("no row".into())),
                (false, _) => Ok(Some(QuoteRecord::new(symbol, "fixed"))),
            }
        }
    }

    #[tokio::test]
    async fn test_failures_degrade_to_empty() {
        let source = FixedSource { fail: true };
        assert!(source.discover_universe().await.is_empty());
        assert!(source.fetch_quote("ABC").await.is_none());
        assert!(source
            .fetch_quotes_batch(&["ABC".into(), "DEF".into()])
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_batch_skips_missing_symbols() {
        let source = FixedSource { fail: false };
        let records = source
            .fetch_quotes_batch(&["ABC".into(), "MISSING".into(), "DEF".into()])
            .await;
        let symbols: Vec<_> = records.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["ABC", "DEF"]);
        assert_eq!(source.discover_universe().await.len(), 1);
    }

    #[test]
    fn test_error_classification() {
        assert!(SourceError::SessionUnavailable.is_recoverable());
        assert!(!SourceError::Auth("x".into()).is_recoverable());
        assert!(matches!(
            SourceError::from_status(reqwest::StatusCode::FORBIDDEN),
            SourceError::Auth(_)
        ));
        assert!(matches!(
            SourceError::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS),
            SourceError::RateLimited { .. }
        ));
        assert_eq!(
            SourceError::RateLimited { retry_after_secs: Some(2) }.to_string(),
            "Rate limited, retry after 2 seconds"
        );
    }
}
