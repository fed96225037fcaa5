//! Detection of the "file too large to scan" interstitial and its token.
//!
//! Drive answers large downloads with an HTML warning page instead of the file.
//! Downloading the real bytes requires replaying the request with the
//! `confirm=<token>` parameter found in that page.

use std::sync::LazyLock;

use regex::Regex;

/// Body markers that identify the warning page.
const INTERSTITIAL_MARKERS: &[&str] = &["download_warning", "uc-download-link", r#"name="confirm""#];

#[allow(clippy::expect_used)]
static CONFIRM_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"confirm=([^&"'<>\s]+)"#).expect("confirm param pattern is valid")
});

#[allow(clippy::expect_used)]
static CONFIRM_INPUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"name="confirm" value="([^"]+)""#).expect("confirm input pattern is valid")
});

/// Returns true when the final response URL already carries a confirmation parameter.
#[must_use]
pub fn url_requests_confirmation(response_url: &str) -> bool {
    response_url.contains("confirm=")
}

/// Returns true when the response looks like the warning page.
#[must_use]
pub fn is_interstitial(response_url: &str, body: &str) -> bool {
    url_requests_confirmation(response_url)
        || INTERSTITIAL_MARKERS.iter().any(|marker| body.contains(marker))
}

/// Extracts the confirmation token from the warning page.
///
/// The `confirm=` query parameter is tried first; the hidden form input is
/// the fallback.
///
/// # Examples
///
/// ```
/// use gdl_core::drive::extract_confirm_token;
///
/// let page = r#"<a href="/uc?export=download&amp;confirm=Xy12&amp;id=abc">Download anyway</a>"#;
/// assert_eq!(extract_confirm_token(page).as_deref(), Some("Xy12"));
///
/// let form = r#"<input type="hidden" name="confirm" value="t">"#;
/// assert_eq!(extract_confirm_token(form).as_deref(), Some("t"));
/// ```
#[must_use]
pub fn extract_confirm_token(body: &str) -> Option<String> {
    [&*CONFIRM_PARAM, &*CONFIRM_INPUT]
        .into_iter()
        .find_map(|pattern| pattern.captures(body))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
