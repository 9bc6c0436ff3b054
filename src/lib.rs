//! Cartelera - cinema showtime scraper with IMDb cross-referencing.
//!
//! Scrapes the billboard of a single cinema site, reconciles each title
//! against IMDb for ratings, and persists a consolidated JSON catalog.
//! The pipeline is built for an unreliable remote session: bounded
//! retries with session restart, duration-validated matching, and a
//! success-rate gate in front of persistence.

pub mod catalog;
pub mod change;
pub mod cli;
pub mod config;
pub mod duration;
pub mod extractor;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod retry;
