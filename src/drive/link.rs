//! Share-link parsing and direct download URL construction.
//!
//! Drive and Docs links come in several shapes (`/file/d/<id>/view`,
//! `/open?id=<id>`, `/document/d/<id>/edit`, ...). The file identifier is
//! extracted with an ordered list of patterns where the first match wins.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Host serving regular Drive files.
pub const DRIVE_HOST: &str = "drive.google.com";

/// Host serving Docs, Sheets and Slides documents.
pub const DOCS_HOST: &str = "docs.google.com";

/// Identifier patterns in priority order.
///
/// The generic `id=` pattern must stay last: `/open?id=` links also satisfy it.
#[allow(clippy::expect_used)]
static FILE_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"/file/d/([A-Za-z0-9_-]+)",
        r"/open\?id=([A-Za-z0-9_-]+)",
        r"/document/d/([A-Za-z0-9_-]+)",
        r"/spreadsheets/d/([A-Za-z0-9_-]+)",
        r"/presentation/d/([A-Za-z0-9_-]+)",
        r"id=([A-Za-z0-9_-]+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("file id pattern is valid"))
    .collect()
});

/// Path fragments that identify an exportable Docs document.
const DOCS_PATH_MARKERS: &[&str] = &[
    "docs.google.com/document",
    "docs.google.com/spreadsheets",
    "docs.google.com/presentation",
];

/// Returns the host of `url` when it is one of the recognized Drive hosts.
fn recognized_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?.to_ascii_lowercase();
    matches!(host.as_str(), DRIVE_HOST | DOCS_HOST).then_some(host)
}

/// Returns true when `url` is an http(s) link on a recognized Drive host.
///
/// # Examples
///
/// ```
/// use gdl_core::drive::validate_url;
///
/// assert!(validate_url("https://drive.google.com/file/d/abc/view"));
/// assert!(!validate_url("ftp://drive.google.com/file/d/abc/view"));
/// assert!(!validate_url("https://example.com/file/d/abc/view"));
/// assert!(!validate_url(""));
/// ```
#[must_use]
pub fn validate_url(url: &str) -> bool {
    !url.trim().is_empty() && recognized_host(url).is_some()
}

/// Extracts the file identifier from a share link.
///
/// Returns `None` when the host is not recognized or no pattern matches.
#[must_use]
pub fn extract_file_id(url: &str) -> Option<String> {
    recognized_host(url)?;
    FILE_ID_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}

/// Returns true for Docs, Sheets and Slides links, which support export formats.
#[must_use]
pub fn is_docs_url(url: &str) -> bool {
    DOCS_PATH_MARKERS.iter().any(|marker| url.contains(marker))
}

/// Builds the direct download URL for `file_id` on the production hosts.
#[must_use]
pub fn build_download_url(file_id: &str, export_format: Option<&str>) -> String {
    Endpoints::default().download_url(file_id, export_format)
}

/// Builds the confirmation URL that bypasses the virus-scan interstitial.
#[must_use]
pub fn build_confirm_url(file_id: &str, token: &str) -> String {
    Endpoints::default().confirm_url(file_id, token)
}

/// Base URLs the downloader talks to.
///
/// Production code uses [`Endpoints::default`]; tests point both bases at a
/// local mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    drive_base: String,
    docs_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            drive_base: format!("https://{DRIVE_HOST}"),
            docs_base: format!("https://{DOCS_HOST}"),
        }
    }
}

impl Endpoints {
    /// Creates endpoints with custom base URLs (scheme and authority, no trailing slash needed).
    #[must_use]
    pub fn new(drive_base: impl Into<String>, docs_base: impl Into<String>) -> Self {
        Self {
            drive_base: drive_base.into().trim_end_matches('/').to_string(),
            docs_base: docs_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Direct download URL; export requests go to the Docs host.
    #[must_use]
    pub fn download_url(&self, file_id: &str, export_format: Option<&str>) -> String {
        match export_format {
            Some(format) => format!(
                "{}/uc?export=download&format={format}&id={file_id}",
                self.docs_base
            ),
            None => format!("{}/uc?export=download&id={file_id}", self.drive_base),
        }
    }

    /// Download URL carrying a confirmation token.
    #[must_use]
    pub fn confirm_url(&self, file_id: &str, token: &str) -> String {
        format!(
            "{}/uc?export=download&confirm={token}&id={file_id}",
            self.drive_base
        )
    }
}
