//! Candidate selection against the external movie database.
//!
//! The cinema page gives a title (and sometimes a director); the search
//! results give several near-identical candidates. Selection prefers an
//! exact display-title match, disambiguates ties by director surname in
//! the candidate's principal credits, and otherwise degrades to the
//! first candidate or to the search-results URL itself. A failed match
//! is never an error, only a sentinel.

use std::time::Duration;

use tracing::{debug, warn};

use crate::extractor::{search_results_url, PageExtractor, SearchHit};
use crate::models::NOT_AVAILABLE;

/// Outcome of a title lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleMatch {
    /// A resolved external title page.
    Resolved(String),
    /// No confident candidate; the search-results URL stands in so the
    /// record still points somewhere auditable.
    SearchFallback(String),
    /// Empty query, nothing to search for.
    NotFound,
}

impl TitleMatch {
    /// Only resolved matches authorize downstream rating extraction.
    pub fn is_resolved(&self) -> bool {
        matches!(self, TitleMatch::Resolved(_))
    }

    /// URL to record in the catalog; `NotFound` becomes the sentinel.
    pub fn into_record_url(self) -> String {
        match self {
            TitleMatch::Resolved(url) | TitleMatch::SearchFallback(url) => url,
            TitleMatch::NotFound => NOT_AVAILABLE.to_string(),
        }
    }
}

/// Retry bounds for the search step only; per-candidate credit checks
/// are not retried.
#[derive(Debug, Clone)]
pub struct SearchRetry {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for SearchRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

/// Find the external-database entry for a normalized title.
pub async fn find_match<E: PageExtractor>(
    extractor: &mut E,
    query_title: &str,
    director_hint: Option<&str>,
    retry: &SearchRetry,
) -> TitleMatch {
    let query = query_title.trim();
    if query.is_empty() {
        return TitleMatch::NotFound;
    }

    let hits = match search_with_retry(extractor, query, retry).await {
        Some(hits) => hits,
        None => return TitleMatch::SearchFallback(search_results_url(query)),
    };

    select_candidate(extractor, query, director_hint, &hits).await
}

/// Issue the search, retrying transient failures a bounded number of
/// times. `None` means retries were exhausted.
async fn search_with_retry<E: PageExtractor>(
    extractor: &mut E,
    query: &str,
    retry: &SearchRetry,
) -> Option<Vec<SearchHit>> {
    let max_attempts = retry.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        match extractor.search_external(query).await {
            Ok(hits) => return Some(hits),
            Err(e) => {
                warn!(
                    "External search for {:?} failed (attempt {}/{}): {}",
                    query, attempt, max_attempts, e
                );
                if attempt < max_attempts {
                    tokio::time::sleep(retry.delay).await;
                }
            }
        }
    }
    None
}

async fn select_candidate<E: PageExtractor>(
    extractor: &mut E,
    query: &str,
    director_hint: Option<&str>,
    hits: &[SearchHit],
) -> TitleMatch {
    let fallback = hits.first();
    let exact: Vec<&SearchHit> = hits
        .iter()
        .filter(|hit| hit.display_title.to_lowercase() == query.to_lowercase())
        .collect();

    match (exact.as_slice(), director_hint) {
        ([only], _) => TitleMatch::Resolved(only.url.clone()),
        ([first, ..], None) => TitleMatch::Resolved(first.url.clone()),
        ([first, ..], Some(hint)) => {
            match verify_by_director(extractor, &exact, hint).await {
                Some(url) => TitleMatch::Resolved(url),
                None => TitleMatch::Resolved(first.url.clone()),
            }
        }
        ([], _) => match fallback {
            Some(hit) => {
                debug!("No exact match for {:?}, using first candidate", query);
                TitleMatch::Resolved(hit.url.clone())
            }
            None => TitleMatch::SearchFallback(search_results_url(query)),
        },
    }
}

/// Visit each exact-match candidate and return the first whose
/// principal credits mention the director's surname. Credit-page
/// failures skip the candidate rather than aborting the match.
async fn verify_by_director<E: PageExtractor>(
    extractor: &mut E,
    candidates: &[&SearchHit],
    director_hint: &str,
) -> Option<String> {
    let surname = director_hint.split_whitespace().next_back()?.to_lowercase();

    for candidate in candidates {
        match extractor.fetch_credits_text(&candidate.url).await {
            Ok(credits) => {
                if credits.to_lowercase().contains(&surname) {
                    debug!(
                        "Director surname {:?} verified for {}",
                        surname, candidate.url
                    );
                    return Some(candidate.url.clone());
                }
            }
            Err(e) => warn!("Credits check failed for {}: {}", candidate.url, e),
        }
    }
    None
}
