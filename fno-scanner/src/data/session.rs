//! Browser-like session management for the scraped exchange website.
//!
//! The exchange API only answers clients that carry the cookies handed out
//! by its HTML pages. `SessionManager` visits those pages the way a browser
//! would, keeps the cookie jar inside its own `reqwest::Client`, and
//! re-establishes the session once the staleness window has passed.
//!
//! # Strategies (tried in order)
//! 1. Landing page, then a lightweight API probe
//! 2. Alternate entry pages, rotating the browser signature between attempts
//! 3. Direct API warm-up without a page visit

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::pacing::RequestPacer;
use super::provider::SourceError;

// ============================================================================
// Constants
// ============================================================================

/// Exchange website base URL
pub const NSE_BASE_URL: &str = "https://www.nseindia.com";

const LANDING_PATH: &str = "/";
const PROBE_PATH: &str = "/api/marketStatus";
const WARMUP_PATH: &str = "/api/allIndices";
const ENTRY_PATHS: &[&str] = &[
    "/market-data/live-equity-market",
    "/get-quotes/equity?symbol=RELIANCE",
    "/option-chain",
];

const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const API_ACCEPT: &str = "application/json, text/plain, */*";

/// Identifying headers of a desktop browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrowserSignature {
    pub user_agent: &'static str,
    pub accept_language: &'static str,
}

/// Signatures rotated between entry attempts.
pub const BROWSER_SIGNATURES: &[BrowserSignature] = &[
    BrowserSignature {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        accept_language: "en-US,en;q=0.9",
    },
    BrowserSignature {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
        accept_language: "en-US,en;q=0.5",
    },
    BrowserSignature {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
        accept_language: "en-GB,en;q=0.9",
    },
    BrowserSignature {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
        accept_language: "en-IN,en;q=0.9",
    },
];

// ============================================================================
// Session State
// ============================================================================

/// How the current session was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStrategy {
    LandingPage,
    AlternateEntry,
    DirectWarmup,
}

#[derive(Debug, Default)]
struct SessionState {
    established_at: Option<Instant>,
    signature: usize,
    strategy: Option<SessionStrategy>,
}

// ============================================================================
// Session Manager
// ============================================================================

/// Cookie and header state for one scraped source.
///
/// Each source owns its own instance; nothing is shared across sources.
pub struct SessionManager {
    base_url: String,
    client: reqwest::Client,
    refresh_after: Duration,
    settle: RequestPacer,
    state: Mutex<SessionState>,
}

impl SessionManager {
    /// Create a session against `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration, refresh_after: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .gzip(true)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            refresh_after,
            settle: RequestPacer::immediate(),
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Pause between the page visit and the API probe.
    pub fn with_settle(mut self, settle: RequestPacer) -> Self {
        self.settle = settle;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Make sure a fresh session exists.
    ///
    /// Returns `false` when every strategy failed; callers treat that as
    /// "source unavailable this cycle".
    pub async fn ensure_session(&self) -> bool {
        let mut state = self.state.lock().await;

        if let Some(at) = state.established_at {
            if at.elapsed() < self.refresh_after {
                return true;
            }
            debug!(base_url = %self.base_url, "Session stale, re-establishing");
        }
        state.established_at = None;
        state.strategy = None;

        for strategy in [
            SessionStrategy::LandingPage,
            SessionStrategy::AlternateEntry,
            SessionStrategy::DirectWarmup,
        ] {
            if self.try_strategy(strategy, &mut state).await {
                state.established_at = Some(Instant::now());
                state.strategy = Some(strategy);
                info!(
                    base_url = %self.base_url,
                    strategy = ?strategy,
                    signature = state.signature,
                    "Session established"
                );
                return true;
            }
            debug!(base_url = %self.base_url, strategy = ?strategy, "Session strategy failed");
        }

        warn!(base_url = %self.base_url, "All session strategies exhausted");
        false
    }

    /// Drop the current session so the next `ensure_session` rebuilds it.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        state.established_at = None;
        state.strategy = None;
    }

    /// Strategy that established the current session, if any.
    pub async fn current_strategy(&self) -> Option<SessionStrategy> {
        self.state.lock().await.strategy
    }

    /// GET a JSON API path using the session's headers.
    ///
    /// A 401/403 answer invalidates the session.
    pub async fn get_json<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T, SourceError> {
        let signature = self.state.lock().await.signature;
        let url = format!("{}{}", self.base_url, path_and_query);

        let response = self
            .client
            .get(&url)
            .headers(self.headers(signature, API_ACCEPT, Some(LANDING_PATH)))
            .send()
            .await
            .map_err(SourceError::from_reqwest)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            self.invalidate().await;
            return Err(SourceError::Auth(format!("HTTP {} from {}", status, path_and_query)));
        }
        if !status.is_success() {
            return Err(SourceError::from_status(status));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SourceError::Malformed(format!("{}: {}", path_and_query, e)))
    }

    async fn try_strategy(&self, strategy: SessionStrategy, state: &mut SessionState) -> bool {
        match strategy {
            SessionStrategy::LandingPage => {
                if !self.visit(LANDING_PATH, state.signature, HTML_ACCEPT, None).await {
                    return false;
                }
                self.settle.between_calls().await;
                self.visit(PROBE_PATH, state.signature, API_ACCEPT, Some(LANDING_PATH)).await
            }
            SessionStrategy::AlternateEntry => {
                for path in ENTRY_PATHS {
                    state.signature = (state.signature + 1) % BROWSER_SIGNATURES.len();
                    if !self.visit(path, state.signature, HTML_ACCEPT, Some(LANDING_PATH)).await {
                        continue;
                    }
                    self.settle.between_calls().await;
                    if self.visit(PROBE_PATH, state.signature, API_ACCEPT, Some(path)).await {
                        return true;
                    }
                }
                false
            }
            SessionStrategy::DirectWarmup => {
                self.visit(WARMUP_PATH, state.signature, API_ACCEPT, None).await
            }
        }
    }

    async fn visit(
        &self,
        path: &str,
        signature: usize,
        accept: &'static str,
        referer: Option<&str>,
    ) -> bool {
        let url = format!("{}{}", self.base_url, path);
        match self
            .client
            .get(&url)
            .headers(self.headers(signature, accept, referer))
            .send()
            .await
        {
            Ok(response) => {
                let ok = response.status().is_success();
                if !ok {
                    debug!(url = %url, status = %response.status(), "Session request rejected");
                }
                ok
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Session request failed");
                false
            }
        }
    }

    fn headers(&self, signature: usize, accept: &'static str, referer: Option<&str>) -> HeaderMap {
        let sig = BROWSER_SIGNATURES[signature % BROWSER_SIGNATURES.len()];
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(sig.user_agent));
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(sig.accept_language));
        if let Some(path) = referer {
            if let Ok(value) = HeaderValue::from_str(&format!("{}{}", self.base_url, path)) {
                headers.insert(REFERER, value);
            }
        }
        headers
    }
}
