//! Record types for scraped movies and run accounting.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::extractor::ExtractError;

/// Sentinel for rating fields that could not be obtained.
pub const NOT_AVAILABLE: &str = "N/A";

/// Stable identifier for one showcase listing (the detail-page URL).
pub type ListingRef = String;

/// Showtimes for one day, keyed by format label ("2D", "3D CAS", ...),
/// each holding the times in on-page order.
pub type DayShowtimes = HashMap<String, Vec<String>>;

/// One fully-scraped movie. Constructed once all fields are known and
/// never mutated afterwards; the serialized field set is the on-disk
/// catalog contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieRecord {
    pub title: String,
    pub href: String,
    pub original_title: String,
    pub poster_url: String,
    /// Raw duration string as shown on the cinema page ("170 minutos").
    pub duration: String,
    pub showing_days: Vec<String>,
    /// Date token -> format label -> ordered times.
    pub showtimes: HashMap<String, DayShowtimes>,
    pub imdb_url: String,
    pub imdb_rating: String,
    pub metascore: String,
    pub imdb_duration: String,
}

/// Raw fields pulled from one cinema detail page, before IMDb
/// reconciliation. Internal to the scrape of a single listing.
#[derive(Debug, Clone, Default)]
pub struct RawDetails {
    pub title: String,
    pub original_title: String,
    pub poster_url: String,
    pub duration: String,
    pub showing_days: Vec<String>,
    pub showtimes: HashMap<String, DayShowtimes>,
    pub director: Option<String>,
}

/// Rating fields scraped from an IMDb title page. Each is optional on
/// the page; absent values become [`NOT_AVAILABLE`] in the record.
#[derive(Debug, Clone, Default)]
pub struct RatingFields {
    pub rating: Option<String>,
    pub metascore: Option<String>,
    pub duration: Option<String>,
}

/// Working accumulator for one run. Folded into the persisted catalog
/// (successes only) when the success-rate gate passes.
#[derive(Debug, Default)]
pub struct ScrapeOutcome {
    pub succeeded: Vec<MovieRecord>,
    pub failed: Vec<(ListingRef, ExtractError)>,
}

impl ScrapeOutcome {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Fraction of listings that produced a record; 0.0 for an empty run.
    pub fn success_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.succeeded.len() as f64 / self.total() as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(href: &str) -> MovieRecord {
        MovieRecord {
            title: "Dune".to_string(),
            href: href.to_string(),
            original_title: "Dune: Part Two".to_string(),
            poster_url: String::new(),
            duration: "166 minutos".to_string(),
            showing_days: vec![],
            showtimes: HashMap::new(),
            imdb_url: NOT_AVAILABLE.to_string(),
            imdb_rating: NOT_AVAILABLE.to_string(),
            metascore: NOT_AVAILABLE.to_string(),
            imdb_duration: NOT_AVAILABLE.to_string(),
        }
    }

    #[test]
    fn test_success_rate_empty_run() {
        let outcome = ScrapeOutcome::default();
        assert_eq!(outcome.success_rate(), 0.0);
    }

    #[test]
    fn test_success_rate_mixed() {
        let mut outcome = ScrapeOutcome::default();
        outcome.succeeded.push(record("a"));
        outcome
            .failed
            .push(("b".to_string(), ExtractError::MissingField("title")));
        assert_eq!(outcome.success_rate(), 0.5);
    }

    #[test]
    fn test_record_json_field_names() {
        let json = serde_json::to_value(record("https://example.com/m/1")).unwrap();
        let obj = json.as_object().unwrap();
        for key in [
            "title",
            "href",
            "original_title",
            "poster_url",
            "duration",
            "showing_days",
            "showtimes",
            "imdb_url",
            "imdb_rating",
            "metascore",
            "imdb_duration",
        ] {
            assert!(obj.contains_key(key), "missing key {key}");
        }
        assert_eq!(obj.len(), 11);
    }
}
