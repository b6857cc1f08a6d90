//! Reference Opening Database adapters.

use std::collections::HashMap;
use std::path::Path;

use analysis::{RatingBand, ReferenceError, ReferenceOpeningDatabase, ReferenceRates};
use serde::{Deserialize, Serialize};

/// One row of `reference_openings.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub code: String,
    pub rating_band: RatingBand,
    #[serde(flatten)]
    pub rates: ReferenceRates,
}

/// Population statistics loaded from a JSON file.
#[derive(Debug, Default)]
pub struct JsonReferenceDatabase {
    rates: HashMap<(String, RatingBand), ReferenceRates>,
}

impl JsonReferenceDatabase {
    pub fn from_entries(entries: impl IntoIterator<Item = ReferenceEntry>) -> Self {
        Self {
            rates: entries
                .into_iter()
                .map(|e| ((e.code, e.rating_band), e.rates))
                .collect(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ReferenceError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ReferenceError::Unavailable(format!("{}: {}", path.display(), e)))?;
        let entries: Vec<ReferenceEntry> = serde_json::from_str(&contents)
            .map_err(|e| ReferenceError::Unavailable(format!("{}: {}", path.display(), e)))?;
        tracing::info!(entries = entries.len(), "Loaded reference opening database");
        Ok(Self::from_entries(entries))
    }
}

impl ReferenceOpeningDatabase for JsonReferenceDatabase {
    fn reference_rates(
        &self,
        code: &str,
        band: RatingBand,
    ) -> Result<Option<ReferenceRates>, ReferenceError> {
        Ok(self.rates.get(&(code.to_string(), band)).copied())
    }
}

/// Used when no reference data is configured; every bucket falls back to the
/// configured colour baselines.
pub struct NoReference;

impl ReferenceOpeningDatabase for NoReference {
    fn reference_rates(&self, _: &str, _: RatingBand) -> Result<Option<ReferenceRates>, ReferenceError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_code_and_band() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reference_openings.json");
        std::fs::write(
            &path,
            r#"[{"code": "C50", "rating_band": 1600, "white_win_pct": 48.0, "draw_pct": 6.0, "black_win_pct": 46.0}]"#,
        )
        .unwrap();

        let db = JsonReferenceDatabase::load(&path).unwrap();
        let rates = db
            .reference_rates("C50", RatingBand::from_rating(1650))
            .unwrap()
            .unwrap();
        assert_eq!(rates.white_win_pct, 48.0);
        assert!(db.reference_rates("C50", RatingBand::from_rating(2000)).unwrap().is_none());
        assert!(db.reference_rates("B20", RatingBand::default()).unwrap().is_none());
    }

    #[test]
    fn test_unreadable_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(JsonReferenceDatabase::load(&dir.path().join("missing.json")).is_err());
    }
}
