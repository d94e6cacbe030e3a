/// Gridded ensemble sources.
///
/// Seasonal rainfall and river discharge ensembles arrive as decoded
/// `GriddedEnsembleField`s. The on-disk layout used by scheduled runs is one
/// JSON file per (country, kind, issue month) under a data directory:
///
/// ```text
/// {root}/{ISO3}/{kind}_{YYYY}-{MM}.json
/// ```
///
/// A missing file means the provider has not released that month yet and is
/// reported as `DataUnavailable`, which skips the country.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Months, NaiveDate};

use crate::model::{GriddedEnsembleField, PipelineError, Unit};

// ---------------------------------------------------------------------------
// Source abstraction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridKind {
    /// Historical re-forecasts, members pooled over years.
    Hindcast,
    /// The current forecast ensemble.
    Forecast,
}

impl GridKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GridKind::Hindcast => "hindcast",
            GridKind::Forecast => "forecast",
        }
    }
}

/// Supplies decoded ensemble fields for a country and issue month.
pub trait EnsembleSource {
    fn load(&self, country: &str, kind: GridKind, issue: NaiveDate) -> Result<GriddedEnsembleField, PipelineError>;
}

/// Ensemble fields stored as JSON files in a directory tree.
#[derive(Debug, Clone)]
pub struct JsonGridDirectory {
    root: PathBuf,
}

impl JsonGridDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        JsonGridDirectory { root: root.into() }
    }

    pub fn path_for(&self, country: &str, kind: GridKind, issue: NaiveDate) -> PathBuf {
        self.root
            .join(country.to_ascii_uppercase())
            .join(format!("{}_{}.json", kind.as_str(), issue.format("%Y-%m")))
    }

    /// Writes a field where `load` will find it, creating directories.
    pub fn store(
        &self,
        country: &str,
        kind: GridKind,
        issue: NaiveDate,
        field: &GriddedEnsembleField,
    ) -> Result<PathBuf, PipelineError> {
        let path = self.path_for(country, kind, issue);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string(field)?)?;
        Ok(path)
    }
}

fn read_field(path: &Path) -> Result<GriddedEnsembleField, PipelineError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PipelineError::DataUnavailable(format!(
                "grid file {} not found",
                path.display()
            )));
        }
        Err(e) => return Err(e.into()),
    };
    let field: GriddedEnsembleField = serde_json::from_str(&text)?;
    // Re-validate the shape; serde does not know the invariant.
    GriddedEnsembleField::new(
        field.members,
        field.lead_times,
        field.latitudes,
        field.longitudes,
        field.unit,
        field.values,
    )
}

impl EnsembleSource for JsonGridDirectory {
    fn load(&self, country: &str, kind: GridKind, issue: NaiveDate) -> Result<GriddedEnsembleField, PipelineError> {
        read_field(&self.path_for(country, kind, issue))
    }
}

// ---------------------------------------------------------------------------
// Unit conversion
// ---------------------------------------------------------------------------

const SECONDS_PER_DAY: f64 = 86_400.0;
const MILLIMETRES_PER_METRE: f64 = 1_000.0;

/// Number of days in a calendar month.
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = first.checked_add_months(Months::new(1))?;
    u32::try_from((next - first).num_days()).ok()
}

/// Converts a precipitation rate (m/s) into accumulated millimetres per
/// lead-time month. Lead time `l` covers the `l`-th month after the issue
/// month, crossing year boundaries as needed. Fields already in millimetres
/// are returned unchanged.
pub fn rate_to_accumulation(
    field: &GriddedEnsembleField,
    issue: NaiveDate,
) -> Result<GriddedEnsembleField, PipelineError> {
    match field.unit {
        Unit::Millimetres => return Ok(field.clone()),
        Unit::MetresPerSecond => {}
        other => {
            return Err(PipelineError::IncompatibleGrid(format!(
                "cannot convert {:?} to a precipitation accumulation",
                other
            )));
        }
    }

    let first_of_issue = issue.with_day(1).unwrap_or(issue);
    let mut factors = Vec::with_capacity(field.lead_times.len());
    for &lead in &field.lead_times {
        let valid = first_of_issue
            .checked_add_months(Months::new(lead))
            .ok_or_else(|| PipelineError::IncompatibleGrid(format!("lead time {} out of range", lead)))?;
        let days = days_in_month(valid.year(), valid.month())
            .ok_or_else(|| PipelineError::IncompatibleGrid(format!("invalid valid month {}", valid)))?;
        factors.push(f64::from(days) * SECONDS_PER_DAY * MILLIMETRES_PER_METRE);
    }

    let mut out = field.clone();
    out.unit = Unit::Millimetres;
    for m in 0..field.members {
        for (l, factor) in factors.iter().enumerate() {
            for y in 0..field.latitudes.len() {
                for x in 0..field.longitudes.len() {
                    out.set(m, l, y, x, field.get(m, l, y, x) * factor);
                }
            }
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn rate_field() -> GriddedEnsembleField {
        GriddedEnsembleField::from_fn(
            1,
            vec![0, 1, 2],
            vec![0.0],
            vec![0.0],
            Unit::MetresPerSecond,
            |_, _, _, _| 1e-8,
        )
        .unwrap()
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2024, 2), Some(29));
        assert_eq!(days_in_month(2025, 2), Some(28));
        assert_eq!(days_in_month(2025, 12), Some(31));
        assert_eq!(days_in_month(2025, 13), None);
    }

    #[test]
    fn test_rate_to_accumulation_crosses_year() {
        let issue = NaiveDate::from_ymd_opt(2024, 12, 5).unwrap();
        let mm = rate_to_accumulation(&rate_field(), issue).unwrap();
        assert_eq!(mm.unit, Unit::Millimetres);
        // Dec 2024 (31 days), Jan 2025 (31), Feb 2025 (28).
        let per_day = 1e-8 * 86_400.0 * 1_000.0;
        assert!((mm.get(0, 0, 0, 0) - 31.0 * per_day).abs() < 1e-9);
        assert!((mm.get(0, 1, 0, 0) - 31.0 * per_day).abs() < 1e-9);
        assert!((mm.get(0, 2, 0, 0) - 28.0 * per_day).abs() < 1e-9);
    }

    #[test]
    fn test_rate_to_accumulation_rejects_discharge() {
        let mut field = rate_field();
        field.unit = Unit::CubicMetresPerSecond;
        let issue = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert!(matches!(
            rate_to_accumulation(&field, issue),
            Err(PipelineError::IncompatibleGrid(_))
        ));
    }

    #[test]
    fn test_json_directory_round_trip_and_missing_month() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonGridDirectory::new(dir.path());
        let issue = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();

        let path = source.store("ken", GridKind::Forecast, issue, &rate_field()).unwrap();
        assert!(path.ends_with("KEN/forecast_2025-03.json"));
        assert_eq!(source.load("KEN", GridKind::Forecast, issue).unwrap(), rate_field());

        let err = source.load("KEN", GridKind::Hindcast, issue).unwrap_err();
        assert!(err.is_country_fatal());
        assert!(matches!(err, PipelineError::DataUnavailable(_)));
    }
}
