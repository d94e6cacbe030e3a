//! Audit exports of published events.
//!
//! Every run writes what it announced next to its logs:
//! `events.json` (full events), `events.csv` (one row per event) and
//! `alert-areas.csv` (one row per event and place code).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::{Event, Indicator, PipelineError};

pub const EVENTS_JSON: &str = "events.json";
pub const EVENTS_CSV: &str = "events.csv";
pub const ALERT_AREAS_CSV: &str = "alert-areas.csv";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
    pub event_name: String,
    pub date: String,
    pub country: String,
    pub hazard: String,
    pub lead_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertAreaRow {
    pub event_name: String,
    pub admin_level: u8,
    pub place_code: String,
    pub population_affected: u64,
    pub forecast_severity: u64,
    pub forecast_trigger: u64,
}

pub fn event_rows(events: &[Event]) -> Vec<EventRow> {
    events
        .iter()
        .map(|e| EventRow {
            event_name: e.event_name.clone(),
            date: e.date.clone(),
            country: e.country.clone(),
            hazard: e.hazard.as_str().to_string(),
            lead_time: e.lead_time.clone(),
        })
        .collect()
}

pub fn alert_area_rows(events: &[Event]) -> Vec<AlertAreaRow> {
    let mut rows = Vec::new();
    for event in events {
        for (pcode, area) in &event.alert_areas {
            rows.push(AlertAreaRow {
                event_name: event.event_name.clone(),
                admin_level: area.admin_level,
                place_code: pcode.clone(),
                population_affected: area.amount(Indicator::PopulationAffected),
                forecast_severity: area.amount(Indicator::ForecastSeverity),
                forecast_trigger: area.amount(Indicator::ForecastTrigger),
            });
        }
    }
    rows
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T], header: &[&str]) -> Result<(), PipelineError> {
    let mut writer = csv::Writer::from_path(path)?;
    if rows.is_empty() {
        // Headers come from the first serialized record; runs without
        // events still get the header line.
        writer.write_record(header)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the three audit files into `dir` and returns their paths.
pub fn export_events(dir: &Path, events: &[Event]) -> Result<Vec<PathBuf>, PipelineError> {
    fs::create_dir_all(dir)?;

    let json_path = dir.join(EVENTS_JSON);
    fs::write(&json_path, serde_json::to_string_pretty(events)?)?;

    let events_path = dir.join(EVENTS_CSV);
    write_csv(
        &events_path,
        &event_rows(events),
        &["event_name", "date", "country", "hazard", "lead_time"],
    )?;

    let areas_path = dir.join(ALERT_AREAS_CSV);
    write_csv(
        &areas_path,
        &alert_area_rows(events),
        &[
            "event_name",
            "admin_level",
            "place_code",
            "population_affected",
            "forecast_severity",
            "forecast_trigger",
        ],
    )?;

    Ok(vec![json_path, events_path, areas_path])
}

pub fn read_events_json(path: &Path) -> Result<Vec<Event>, PipelineError> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn read_csv<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>, PipelineError> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

pub fn read_events_csv(path: &Path) -> Result<Vec<EventRow>, PipelineError> {
    read_csv(path)
}

pub fn read_alert_areas_csv(path: &Path) -> Result<Vec<AlertAreaRow>, PipelineError> {
    read_csv(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AlertArea, Hazard};
    use std::collections::BTreeMap;

    fn sample_event() -> Event {
        Event {
            event_name: "Coast OND_Coast".to_string(),
            date: "2025-08-17T06:05:04Z".to_string(),
            country: "KEN".to_string(),
            hazard: Hazard::Drought,
            lead_time: "2-month".to_string(),
            alert_areas: BTreeMap::from([
                (
                    "KE01".to_string(),
                    AlertArea { admin_level: 1, population_affected: 900, forecast_severity: 1, forecast_trigger: 1 },
                ),
                (
                    "KE02".to_string(),
                    AlertArea { admin_level: 1, population_affected: 0, forecast_severity: 0, forecast_trigger: 0 },
                ),
            ]),
        }
    }

    #[test]
    fn test_alert_area_rows_one_per_place_code() {
        let rows = alert_area_rows(&[sample_event()]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].place_code, "KE01");
        assert_eq!(rows[0].population_affected, 900);
        assert_eq!(rows[1].forecast_severity, 0);
    }

    #[test]
    fn test_export_without_events_keeps_headers() {
        let dir = tempfile::tempdir().unwrap();
        export_events(dir.path(), &[]).unwrap();
        let events_csv = fs::read_to_string(dir.path().join(EVENTS_CSV)).unwrap();
        assert_eq!(events_csv.trim(), "event_name,date,country,hazard,lead_time");
        assert!(read_events_csv(&dir.path().join(EVENTS_CSV)).unwrap().is_empty());
        assert_eq!(fs::read_to_string(dir.path().join(EVENTS_JSON)).unwrap(), "[]");
    }
}
