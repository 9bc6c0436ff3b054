//! Run sequencing: enumerate the billboard, decide whether a heavy pass
//! is warranted, scrape each listing under the session supervisor,
//! apply the success-rate gate, persist.

use futures::FutureExt;
use tracing::{error, info, warn};

use crate::catalog;
use crate::change;
use crate::config::Settings;
use crate::duration::{parse_external_duration, parse_local_duration, reconcile, within_tolerance};
use crate::extractor::{ExtractError, PageExtractor};
use crate::matcher::{self, TitleMatch};
use crate::models::{MovieRecord, RatingFields, RawDetails, ScrapeOutcome, NOT_AVAILABLE};
use crate::normalize::normalize;
use crate::retry::SessionSupervisor;

/// Minimum fraction of listings that must scrape successfully for the
/// run's catalog to be trusted and persisted.
pub const SUCCESS_RATE_FLOOR: f64 = 0.5;

/// What a run did, for the CLI summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub success_rate: f64,
    /// Catalog was replaced on disk.
    pub persisted: bool,
    /// Light pass found no change; nothing was scraped.
    pub skipped: bool,
}

/// Whether the outcome is trustworthy enough to overwrite the catalog.
/// An empty billboard is vacuously successful.
pub fn gate_passes(outcome: &ScrapeOutcome) -> bool {
    outcome.total() == 0 || outcome.success_rate() >= SUCCESS_RATE_FLOOR
}

/// Owns the exclusive browser session and the run accumulator for the
/// duration of one run.
pub struct Orchestrator<E: PageExtractor> {
    extractor: E,
    settings: Settings,
    supervisor: SessionSupervisor,
}

impl<E: PageExtractor> Orchestrator<E> {
    pub fn new(extractor: E, settings: Settings) -> Self {
        let supervisor = SessionSupervisor::new(settings.retry.policy());
        Self {
            extractor,
            settings,
            supervisor,
        }
    }

    pub fn into_extractor(self) -> E {
        self.extractor
    }

    /// Execute one run. `light` first compares the enumerated refs to
    /// the persisted catalog and escalates to a heavy pass only on
    /// change. Errors here are run-level (enumeration exhausted,
    /// catalog not writable), never per-listing.
    pub async fn run(&mut self, light: bool) -> anyhow::Result<RunSummary> {
        let base_url = self.settings.base_url.clone();
        let refs = self
            .supervisor
            .run(&mut self.extractor, base_url.as_str(), enumerate_op)
            .await?;
        info!("Enumerated {} listings from {}", refs.len(), base_url);

        if light {
            let previous = change::catalog_refs(&catalog::load(&self.settings.catalog_path));
            if !change::listing_changed(&refs, &previous) {
                info!("Billboard unchanged since last run, skipping heavy pass");
                return Ok(RunSummary {
                    skipped: true,
                    ..RunSummary::default()
                });
            }
            info!("Billboard changed, escalating to heavy pass");
        }

        let mut outcome = ScrapeOutcome::default();
        for href in &refs {
            let job = ListingJob {
                href,
                settings: &self.settings,
            };
            let result = self
                .supervisor
                .run(&mut self.extractor, &job, scrape_op)
                .await;
            match result {
                Ok(record) => {
                    info!("Scraped {:?} ({})", record.title, href);
                    outcome.succeeded.push(record);
                }
                Err(e) => {
                    warn!("Listing {} failed after retries: {}", href, e);
                    outcome.failed.push((href.clone(), e));
                }
            }
        }

        let mut summary = RunSummary {
            total: outcome.total(),
            succeeded: outcome.succeeded.len(),
            failed: outcome.failed.len(),
            success_rate: outcome.success_rate(),
            persisted: false,
            skipped: false,
        };

        if gate_passes(&outcome) {
            catalog::save(&self.settings.catalog_path, &outcome.succeeded)?;
            summary.persisted = true;
        } else {
            error!(
                "Success rate {:.0}% below {:.0}% floor, keeping previous catalog",
                summary.success_rate * 100.0,
                SUCCESS_RATE_FLOOR * 100.0
            );
        }
        Ok(summary)
    }
}

fn enumerate_op<'a, E: PageExtractor>(
    extractor: &'a mut E,
    base_url: &'a str,
) -> futures::future::BoxFuture<'a, Result<Vec<String>, ExtractError>> {
    extractor.enumerate_listings(base_url)
}

/// Everything one supervised scrape attempt needs besides the session.
struct ListingJob<'r> {
    href: &'r str,
    settings: &'r Settings,
}

fn scrape_op<'a, E: PageExtractor>(
    extractor: &'a mut E,
    job: &'a ListingJob<'_>,
) -> futures::future::BoxFuture<'a, Result<MovieRecord, ExtractError>> {
    scrape_listing(extractor, job.href, job.settings).boxed()
}

/// Scrape one listing end to end: detail page, title lookup, duration
/// reconciliation, rating extraction. This is the unit the session
/// supervisor retries.
async fn scrape_listing<E: PageExtractor>(
    extractor: &mut E,
    href: &str,
    settings: &Settings,
) -> Result<MovieRecord, ExtractError> {
    let details = extractor.extract_details(href).await?;

    let query = normalize(&details.original_title);
    let matched = matcher::find_match(
        extractor,
        &query,
        details.director.as_deref(),
        &settings.search.retry(),
    )
    .await;

    let (imdb_rating, metascore, imdb_duration) = match &matched {
        TitleMatch::Resolved(url) => {
            let fields = extractor.extract_rating_fields(url).await?;
            apply_duration_gate(&details, fields, settings.duration_tolerance_minutes)
        }
        // Sentinel URLs never get rating extraction.
        _ => (
            NOT_AVAILABLE.to_string(),
            NOT_AVAILABLE.to_string(),
            NOT_AVAILABLE.to_string(),
        ),
    };

    Ok(MovieRecord {
        title: normalize(&details.title),
        href: href.to_string(),
        original_title: details.original_title,
        poster_url: details.poster_url,
        duration: details.duration,
        showing_days: details.showing_days,
        showtimes: details.showtimes,
        imdb_url: matched.into_record_url(),
        imdb_rating,
        metascore,
        imdb_duration,
    })
}

/// Ratings are kept only when the cinema and IMDb durations agree
/// within tolerance; the IMDb duration string is recorded either way
/// for audit. Unparseable durations count as a maximal mismatch.
fn apply_duration_gate(
    details: &RawDetails,
    fields: RatingFields,
    tolerance_minutes: u32,
) -> (String, String, String) {
    let external_raw = fields.duration.clone();
    let authorized = match (
        parse_local_duration(&details.duration),
        external_raw.as_deref().map(parse_external_duration),
    ) {
        (Ok(local), Some(Ok(external))) => {
            let difference = reconcile(local, external);
            if !within_tolerance(difference, tolerance_minutes) {
                info!(
                    "Duration mismatch of {} minutes for {:?}, withholding ratings",
                    difference, details.title
                );
            }
            within_tolerance(difference, tolerance_minutes)
        }
        _ => false,
    };

    let not_available = || NOT_AVAILABLE.to_string();
    let (rating, metascore) = if authorized {
        (
            fields.rating.unwrap_or_else(not_available),
            fields.metascore.unwrap_or_else(not_available),
        )
    } else {
        (not_available(), not_available())
    };
    (rating, metascore, external_raw.unwrap_or_else(not_available))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(succeeded: usize, failed: usize) -> ScrapeOutcome {
        let mut o = ScrapeOutcome::default();
        for i in 0..succeeded {
            o.succeeded.push(MovieRecord {
                title: format!("m{i}"),
                href: format!("h{i}"),
                original_title: String::new(),
                poster_url: String::new(),
                duration: String::new(),
                showing_days: vec![],
                showtimes: Default::default(),
                imdb_url: NOT_AVAILABLE.to_string(),
                imdb_rating: NOT_AVAILABLE.to_string(),
                metascore: NOT_AVAILABLE.to_string(),
                imdb_duration: NOT_AVAILABLE.to_string(),
            });
        }
        for i in 0..failed {
            o.failed
                .push((format!("f{i}"), ExtractError::MissingField("title")));
        }
        o
    }

    #[test]
    fn test_gate_40_percent_aborts() {
        assert!(!gate_passes(&outcome(4, 6)));
    }

    #[test]
    fn test_gate_50_percent_persists() {
        assert!(gate_passes(&outcome(5, 5)));
    }

    #[test]
    fn test_gate_empty_run_vacuously_passes() {
        assert!(gate_passes(&outcome(0, 0)));
    }

    fn details(duration: &str) -> RawDetails {
        RawDetails {
            title: "Dune".to_string(),
            duration: duration.to_string(),
            ..RawDetails::default()
        }
    }

    #[test]
    fn test_duration_gate_authorizes_within_tolerance() {
        let fields = RatingFields {
            rating: Some("8.5".to_string()),
            metascore: Some("79".to_string()),
            duration: Some("2h 50m".to_string()),
        };
        let (rating, metascore, duration) = apply_duration_gate(&details("170 minutos"), fields, 10);
        assert_eq!(rating, "8.5");
        assert_eq!(metascore, "79");
        assert_eq!(duration, "2h 50m");
    }

    #[test]
    fn test_duration_gate_withholds_on_mismatch() {
        let fields = RatingFields {
            rating: Some("8.5".to_string()),
            metascore: Some("79".to_string()),
            duration: Some("2h".to_string()),
        };
        let (rating, metascore, duration) = apply_duration_gate(&details("170 minutos"), fields, 10);
        assert_eq!(rating, NOT_AVAILABLE);
        assert_eq!(metascore, NOT_AVAILABLE);
        // External duration still recorded for audit.
        assert_eq!(duration, "2h");
    }

    #[test]
    fn test_duration_gate_parse_failure_is_mismatch() {
        let fields = RatingFields {
            rating: Some("8.5".to_string()),
            metascore: None,
            duration: Some("TV-MA".to_string()),
        };
        let (rating, _, duration) = apply_duration_gate(&details("170 minutos"), fields, 10);
        assert_eq!(rating, NOT_AVAILABLE);
        assert_eq!(duration, "TV-MA");
    }

    #[test]
    fn test_duration_gate_missing_external_duration() {
        let fields = RatingFields {
            rating: Some("8.5".to_string()),
            metascore: None,
            duration: None,
        };
        let (rating, metascore, duration) = apply_duration_gate(&details("170 minutos"), fields, 10);
        assert_eq!(rating, NOT_AVAILABLE);
        assert_eq!(metascore, NOT_AVAILABLE);
        assert_eq!(duration, NOT_AVAILABLE);
    }
}
