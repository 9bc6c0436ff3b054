//! Persisted catalog: a single pretty-printed JSON array of movie
//! records, replaced whole or not at all.

use std::path::Path;

use anyhow::Context;
use tracing::{debug, warn};

use crate::models::MovieRecord;

/// Load the last persisted catalog. A missing file or malformed JSON is
/// an empty catalog, not an error; the light pass must still be able to
/// run on a fresh install.
pub fn load(path: &Path) -> Vec<MovieRecord> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            debug!("No readable catalog at {}: {}", path.display(), e);
            return Vec::new();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(records) => records,
        Err(e) => {
            warn!(
                "Catalog at {} is malformed ({}), treating as empty",
                path.display(),
                e
            );
            Vec::new()
        }
    }
}

/// Atomically replace the catalog: write to a temp file in the target
/// directory, then rename over the old file. The previous catalog stays
/// intact on any failure.
pub fn save(path: &Path, records: &[MovieRecord]) -> anyhow::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating catalog directory {}", dir.display()))?;

    let json = serde_json::to_string_pretty(records).context("serializing catalog")?;

    let tmp = tempfile::NamedTempFile::new_in(dir).context("creating catalog temp file")?;
    std::fs::write(tmp.path(), json.as_bytes()).context("writing catalog temp file")?;
    tmp.persist(path)
        .with_context(|| format!("replacing catalog at {}", path.display()))?;

    debug!("Persisted {} records to {}", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::tempdir;

    use super::*;
    use crate::models::NOT_AVAILABLE;

    fn record(href: &str) -> MovieRecord {
        MovieRecord {
            title: "Wicked".to_string(),
            href: href.to_string(),
            original_title: "Wicked".to_string(),
            poster_url: String::new(),
            duration: "160 minutos".to_string(),
            showing_days: vec!["2026-08-30".to_string()],
            showtimes: HashMap::new(),
            imdb_url: NOT_AVAILABLE.to_string(),
            imdb_rating: NOT_AVAILABLE.to_string(),
            metascore: NOT_AVAILABLE.to_string(),
            imdb_duration: NOT_AVAILABLE.to_string(),
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        assert!(load(&dir.path().join("data.json")).is_empty());
    }

    #[test]
    fn test_malformed_json_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load(&path).is_empty());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docs").join("data.json");
        let records = vec![record("https://example.com/m/1"), record("https://example.com/m/2")];

        save(&path, &records).unwrap();
        assert_eq!(load(&path), records);
    }

    #[test]
    fn test_save_replaces_whole_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");

        save(&path, &[record("a"), record("b")]).unwrap();
        save(&path, &[record("c")]).unwrap();

        let reloaded = load(&path);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded[0].href, "c");
    }

    #[test]
    fn test_output_is_pretty_printed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        save(&path, &[record("a")]).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\n  "));
    }
}
