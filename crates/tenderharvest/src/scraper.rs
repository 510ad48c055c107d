use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Relative links starting with this segment are relative to the application root, not the host.
const APP_PREFIX: &str = "app";
const APP_ROOT: &str = "/nicgep/";

#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Page not found: {0}")]
    NotFound(String),
}

/// A tender portal that hands out independent browsing sessions.
pub trait Portal {
    type Session: PortalSession;

    /// Start a session that shares no cookies or other state with earlier ones.
    fn open_session(&self) -> Result<Self::Session, ScraperError>;

    fn base_url(&self) -> &str;

    fn index_url(&self) -> String {
        format!("{}{}", self.base_url(), crate::INDEX_PATH)
    }

    /// Absolute URL for an `href` found on one of the portal's pages.
    fn resolve_url(&self, href: &str) -> Result<String, ScraperError> {
        resolve_url(self.base_url(), href)
    }
}

pub trait PortalSession {
    fn get_html(&self, url: &str) -> impl Future<Output = Result<String, ScraperError>> + Send;
}

pub fn resolve_url(base_url: &str, href: &str) -> Result<String, ScraperError> {
    let href = href.trim();
    let base = base_url.trim_end_matches('/');
    if href.is_empty() {
        return Err(ScraperError::InvalidUrl("empty href".to_string()));
    }
    let url = if href.starts_with("http") {
        href.to_string()
    } else if href.starts_with(APP_PREFIX) {
        format!("{base}{APP_ROOT}{href}")
    } else if href.starts_with('/') {
        format!("{base}{href}")
    } else {
        format!("{base}/{href}")
    };
    Ok(url)
}

#[derive(Debug, Clone)]
pub struct WebPortal {
    base_url: String,
    timeout: Duration,
}

impl WebPortal {
    pub fn new() -> Self {
        Self::with_base_url(crate::BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for WebPortal {
    fn default() -> Self {
        Self::new()
    }
}

impl Portal for WebPortal {
    type Session = HttpSession;

    fn open_session(&self) -> Result<HttpSession, ScraperError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()?;
        Ok(HttpSession { client })
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// One cookie-carrying HTTP session against the portal.
#[derive(Debug, Clone)]
pub struct HttpSession {
    client: Client,
}

impl PortalSession for HttpSession {
    async fn get_html(&self, url: &str) -> Result<String, ScraperError> {
        log::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ScraperError::NotFound(url.into()));
        }
        Ok(response
            .error_for_status()?
            .text()
            .await
            .inspect_err(|e| log::error!("Decode error: {e:?}"))?)
    }
}
