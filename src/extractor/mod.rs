//! Page extraction contract and its browser-backed implementation.
//!
//! Everything that touches a live page goes through [`PageExtractor`];
//! the rest of the pipeline (matching, reconciliation, orchestration)
//! only sees this trait, which is what the integration tests mock.

mod browser;

pub use browser::{BrowserSession, IMDB_BASE_URL};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ListingRef, RatingFields, RawDetails};

/// Errors from remote extraction. All variants are transient from the
/// pipeline's point of view: they are retried, then demoted to a
/// per-listing failure, never run-fatal.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// An expected element never became present within its fixed wait.
    #[error("timed out waiting for {selector:?} at {url}")]
    ElementTimeout { url: String, selector: String },

    /// Browser/CDP transport failure.
    #[error("browser error: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),

    /// The session is gone (teardown observed mid-run).
    #[error("browser session is not running")]
    SessionDown,

    /// A present page was missing a required field.
    #[error("page field missing: {0}")]
    MissingField(&'static str),

    /// In-page evaluation returned something undecodable.
    #[error("decoding page data: {0}")]
    Decode(#[from] serde_json::Error),

    /// Session teardown/relaunch failed.
    #[error("session restart failed: {0}")]
    Restart(String),
}

/// One entry from an external-database search results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub display_title: String,
    pub url: String,
}

/// Narrow contract over the browser session. Methods take `&mut self`:
/// the session is a single exclusive resource and navigation mutates it.
#[async_trait]
pub trait PageExtractor: Send {
    /// Enumerate the billboard's listing URLs in page order.
    async fn enumerate_listings(&mut self, base_url: &str) -> Result<Vec<ListingRef>, ExtractError>;

    /// Scrape one listing's detail page.
    async fn extract_details(&mut self, href: &str) -> Result<RawDetails, ExtractError>;

    /// Search the external movie database for a title.
    async fn search_external(&mut self, query: &str) -> Result<Vec<SearchHit>, ExtractError>;

    /// Principal-credits text of an external title page, for director
    /// disambiguation.
    async fn fetch_credits_text(&mut self, url: &str) -> Result<String, ExtractError>;

    /// Rating fields of an external title page; each is individually
    /// optional on the page.
    async fn extract_rating_fields(&mut self, url: &str) -> Result<RatingFields, ExtractError>;

    /// Tear the session down and bring up a fresh one. Teardown errors
    /// are ignored; only relaunch failure is reported.
    async fn restart(&mut self) -> Result<(), ExtractError>;
}

/// Search-results URL for a query. Doubles as the fallback sentinel when
/// no candidate resolves; distinguishable from a title URL by shape.
pub fn search_results_url(query: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
    format!("{IMDB_BASE_URL}/find/?q={encoded}&s=tt")
}

/// Whether a URL points at a resolved external title (as opposed to the
/// search-results sentinel or the not-available sentinel).
pub fn is_title_url(url: &str) -> bool {
    url.contains("/title/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_url_is_encoded() {
        let url = search_results_url("Dune: Part Two");
        assert!(url.starts_with("https://www.imdb.com/find/?q="));
        assert!(url.contains("Dune%3A+Part+Two"));
        assert!(url.ends_with("&s=tt"));
    }

    #[test]
    fn test_title_url_shape() {
        assert!(is_title_url("https://www.imdb.com/title/tt15239678/"));
        assert!(!is_title_url(&search_results_url("Dune")));
        assert!(!is_title_url("N/A"));
    }
}
