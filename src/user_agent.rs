//! User-Agent sent on every Drive request.
//!
//! Drive serves the download interstitial and the export endpoints reliably
//! only to browser-like clients, so requests present themselves as desktop Chrome.

/// Browser User-Agent used for all requests.
pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Default User-Agent for download requests.
#[must_use]
pub(crate) fn default_download_user_agent() -> &'static str {
    BROWSER_USER_AGENT
}
