/// End-to-end tests of drought and flood runs
///
/// Tests verify:
/// 1. A synthetic country with one triggered climate region produces one
///    event, exposure payloads, extent rasters and audit exports
/// 2. A region whose place codes match no boundary is dropped, not defaulted,
///    and so is a region failing at any single lead time
/// 3. A run without alerts sends empty exposure
/// 4. Audit exports re-parse to the same events and alert areas
/// 5. River-flood runs publish one event per triggered lead time
///
/// Every collaborator is in memory or in a temporary directory; no network
/// or database access.
///
/// Run with: cargo test --test pipeline_integration

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use geo::{LineString, MultiPolygon, Polygon};

use hazard_trigger_service::config::{PipelineConfig, Scenario};
use hazard_trigger_service::ingest::boundaries::{AdminBoundaries, AdminFeature, BoundarySource};
use hazard_trigger_service::ingest::grid::{GridKind, JsonGridDirectory};
use hazard_trigger_service::model::{GriddedEnsembleField, Hazard, PipelineError, Unit};
use hazard_trigger_service::pipeline::Pipeline;
use hazard_trigger_service::publish::DryRunPublisher;
use hazard_trigger_service::publish::audit;
use hazard_trigger_service::reference::{InMemoryReferenceStore, ReferenceRow};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const LATITUDES: [f64; 2] = [0.0, 1.0];
const LONGITUDES: [f64; 2] = [36.0, 37.0];

fn issue() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 17, 6, 0, 0).unwrap()
}

fn field(members: usize, lead_times: Vec<u32>, unit: Unit, value: impl Fn(usize) -> f64) -> GriddedEnsembleField {
    GriddedEnsembleField::from_fn(
        members,
        lead_times,
        LATITUDES.to_vec(),
        LONGITUDES.to_vec(),
        unit,
        |m, _, _, _| value(m),
    )
    .unwrap()
}

fn square(min_lon: f64, max_lon: f64) -> MultiPolygon<f64> {
    MultiPolygon(vec![Polygon::new(
        LineString::from(vec![
            (min_lon, -0.5),
            (max_lon, -0.5),
            (max_lon, 1.5),
            (min_lon, 1.5),
            (min_lon, -0.5),
        ]),
        vec![],
    )])
}

struct StaticBoundaries(BTreeMap<u8, AdminBoundaries>);

impl BoundarySource for StaticBoundaries {
    fn admin_boundaries(&self, _country: &str, adm_level: u8) -> Result<AdminBoundaries, PipelineError> {
        self.0
            .get(&adm_level)
            .cloned()
            .ok_or_else(|| PipelineError::DataUnavailable(format!("no boundaries at level {}", adm_level)))
    }
}

fn boundaries() -> StaticBoundaries {
    let level1 = AdminBoundaries::new(
        1,
        vec![
            AdminFeature {
                pcode: "KE01".to_string(),
                name: Some("Mombasa".to_string()),
                population: 1000,
                geometry: square(35.5, 36.5),
            },
            AdminFeature {
                pcode: "KE02".to_string(),
                name: Some("Kwale".to_string()),
                population: 2000,
                geometry: square(36.5, 37.5),
            },
        ],
    );
    StaticBoundaries(BTreeMap::from([(1, level1)]))
}

fn reference_rows() -> Vec<ReferenceRow> {
    let row = |code: &str, name: &str, pcodes: &str| ReferenceRow {
        country: "KEN".to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap(),
        climate_region_code: code.to_string(),
        climate_region_name: name.to_string(),
        adm_level: 1,
        pcodes: pcodes.to_string(),
    };
    vec![
        row("1", "Coast", r#"{"1": ["KE01", "KE02"]}"#),
        // No boundary carries UG01: dropped from the run.
        row("2", "Border", r#"{"1": ["UG01"]}"#),
    ]
}

const LEADTIME_TABLE: &str = r#"
Jan = [{ MAM = "2-month" }]
Feb = [{ MAM = "1-month" }]
Mar = [{ MAM = "0-month" }]
Apr = [{ MAM = "0-month" }]
May = [{ MAM = "0-month" }]
Jun = [{ OND = "4-month" }]
Jul = [{ OND = "3-month" }]
Aug = [{ OND = "2-month" }]
Sep = [{ OND = "1-month" }]
Oct = [{ OND = "0-month" }]
Nov = [{ OND = "0-month" }]
Dec = [{ OND = "0-month" }]
"#;

fn config() -> PipelineConfig {
    let text = format!(
        r#"
[[countries]]
name = "KEN"
admin_levels = [1]
pipeline_will_trigger_portal = "enabled"

[countries.trigger_model]
model = "seasonal_rainfall_forecast"
tercile_threshold = 0.33
trigger_on_minimum_probability = 0.3
trigger_on_minimum_admin_area_in_drought_extent = 0.5

[[countries.climate_region]]
climate_region_code = "1"

[countries.climate_region.leadtime]
{table}

[[countries.climate_region]]
climate_region_code = "2"

[countries.climate_region.leadtime]
{table}

[countries.flood]
return_period_quantile = 0.9
trigger_on_minimum_probability = 0.6
trigger_on_minimum_admin_area_in_flood_extent = 0.1
lead_times_days = [0, 1]
"#,
        table = LEADTIME_TABLE
    );
    PipelineConfig::from_toml_str(&text).unwrap()
}

/// 30 hindcast members valued 0..29; 26 of 51 forecast members at 0 mm
/// (below the lower tercile), the rest at 100 mm.
fn drought_grids(dir: &std::path::Path) -> JsonGridDirectory {
    let grids = JsonGridDirectory::new(dir);
    let leads: Vec<u32> = (0..=5).collect();
    grids
        .store("KEN", GridKind::Hindcast, issue(), &field(30, leads.clone(), Unit::Millimetres, |m| m as f64))
        .unwrap();
    grids
        .store(
            "KEN",
            GridKind::Forecast,
            issue(),
            &field(51, leads, Unit::Millimetres, |m| if m < 26 { 0.0 } else { 100.0 }),
        )
        .unwrap();
    grids
}

// ---------------------------------------------------------------------------
// Drought
// ---------------------------------------------------------------------------

#[test]
fn test_drought_run_publishes_triggered_region() {
    let data_dir = tempfile::tempdir().unwrap();
    let audit_dir = tempfile::tempdir().unwrap();
    let grids = drought_grids(data_dir.path());
    let boundaries = boundaries();
    let config = config();
    let mut reference = InMemoryReferenceStore::new(reference_rows());
    let mut publisher = DryRunPublisher::new();

    let mut pipeline = Pipeline {
        grids: &grids,
        boundaries: &boundaries,
        reference: &mut reference,
        publisher: &mut publisher,
        audit_dir: Some(audit_dir.path().to_path_buf()),
        scenario: Scenario::Forecast,
    };
    let report = pipeline
        .run_drought(config.country("KEN").unwrap(), issue(), now())
        .unwrap();

    assert_eq!(report.hazard, Hazard::Drought);
    assert_eq!(report.units_total, 2);
    assert_eq!(report.units_ok, 1, "region without boundaries is dropped");
    assert_eq!(report.events, 1);
    assert_eq!(report.rasters, 4);
    assert_eq!(report.timestamp, Utc.with_ymd_and_hms(2025, 3, 17, 6, 0, 0).unwrap());

    // One event at 0-month: 3 indicators x 1 admin level.
    assert_eq!(publisher.exposures.len(), 3);
    for payload in &publisher.exposures {
        assert_eq!(payload.event_name.as_deref(), Some("Coast MAM_Coast"));
        assert_eq!(payload.lead_time, "0-month");
        assert_eq!(payload.date, "2025-03-17T06:00:00Z");
        assert_eq!(payload.exposure_place_codes.len(), 2);
    }
    let population = &publisher.exposures[0];
    assert_eq!(population.dynamic_indicator, "population_affected");
    assert_eq!(population.exposure_place_codes[0].place_code, "KE01");
    assert_eq!(population.exposure_place_codes[0].amount, 1000);
    assert_eq!(population.exposure_place_codes[1].amount, 2000);
    let trigger = &publisher.exposures[2];
    assert_eq!(trigger.dynamic_indicator, "forecast_trigger");
    assert!(trigger.exposure_place_codes.iter().all(|e| e.amount == 1));

    let rasters: Vec<&str> = publisher.rasters.iter().map(|r| r.file_name.as_str()).collect();
    assert_eq!(
        rasters,
        vec![
            "drought_extent_0-month_KEN.asc",
            "drought_extent_1-month_KEN.asc",
            "drought_extent_2-month_KEN.asc",
            "drought_extent_3-month_KEN.asc",
        ]
    );
    assert_eq!(publisher.notifications.len(), 1);
    assert_eq!(publisher.notifications[0].disaster_type, "drought");
}

#[test]
fn test_region_failing_at_one_lead_time_is_not_published() {
    let data_dir = tempfile::tempdir().unwrap();
    let grids = JsonGridDirectory::new(data_dir.path());
    let leads: Vec<u32> = (0..=5).collect();
    // Hindcast missing everywhere at lead time 2 only: lead time 0 alone
    // would trigger, lead time 2 retains no valid cell.
    let hindcast = GriddedEnsembleField::from_fn(
        30,
        leads.clone(),
        LATITUDES.to_vec(),
        LONGITUDES.to_vec(),
        Unit::Millimetres,
        |m, l, _, _| if l == 2 { f64::NAN } else { m as f64 },
    )
    .unwrap();
    grids.store("KEN", GridKind::Hindcast, issue(), &hindcast).unwrap();
    grids
        .store(
            "KEN",
            GridKind::Forecast,
            issue(),
            &field(51, leads, Unit::Millimetres, |m| if m < 26 { 0.0 } else { 100.0 }),
        )
        .unwrap();

    let boundaries = boundaries();
    let config = config();
    let mut reference = InMemoryReferenceStore::new(reference_rows());
    let mut publisher = DryRunPublisher::new();
    let mut pipeline = Pipeline {
        grids: &grids,
        boundaries: &boundaries,
        reference: &mut reference,
        publisher: &mut publisher,
        audit_dir: None,
        scenario: Scenario::Forecast,
    };
    let report = pipeline
        .run_drought(config.country("KEN").unwrap(), issue(), now())
        .unwrap();

    assert_eq!(report.units_total, 2);
    assert_eq!(report.units_ok, 0);
    assert_eq!(report.events, 0);
    assert!(publisher.exposures.iter().all(|p| p.event_name.is_none()));
    assert!(
        publisher
            .exposures
            .iter()
            .flat_map(|p| &p.exposure_place_codes)
            .all(|e| e.amount == 0)
    );
    assert_eq!(publisher.notifications.len(), 1);
}

#[test]
fn test_drought_run_without_alerts_sends_empty_exposure() {
    let data_dir = tempfile::tempdir().unwrap();
    let grids = drought_grids(data_dir.path());
    let boundaries = boundaries();
    let config = config();
    let mut reference = InMemoryReferenceStore::new(reference_rows());
    let mut publisher = DryRunPublisher::new();

    // 0.99 is above every cell probability: nothing triggers.
    let mut pipeline = Pipeline {
        grids: &grids,
        boundaries: &boundaries,
        reference: &mut reference,
        publisher: &mut publisher,
        audit_dir: None,
        scenario: Scenario::NoWarning,
    };
    let report = pipeline
        .run_drought(config.country("KEN").unwrap(), issue(), now())
        .unwrap();

    assert_eq!(report.events, 0);
    assert!(report.audit_files.is_empty());
    // Possible lead times in March: {0}; 3 indicators x 1 admin level.
    assert_eq!(publisher.exposures.len(), 3);
    for payload in &publisher.exposures {
        assert_eq!(payload.event_name, None);
        assert_eq!(payload.lead_time, "0-month");
        let codes: Vec<&str> = payload.exposure_place_codes.iter().map(|e| e.place_code.as_str()).collect();
        assert_eq!(codes, vec!["KE01", "KE02"]);
        assert!(payload.exposure_place_codes.iter().all(|e| e.amount == 0));
    }
    assert_eq!(publisher.notifications.len(), 1);
}

#[test]
fn test_audit_exports_reparse_to_published_events() {
    let data_dir = tempfile::tempdir().unwrap();
    let audit_dir = tempfile::tempdir().unwrap();
    let grids = drought_grids(data_dir.path());
    let boundaries = boundaries();
    let config = config();
    let mut reference = InMemoryReferenceStore::new(reference_rows());
    let mut publisher = DryRunPublisher::new();

    let mut pipeline = Pipeline {
        grids: &grids,
        boundaries: &boundaries,
        reference: &mut reference,
        publisher: &mut publisher,
        audit_dir: Some(audit_dir.path().to_path_buf()),
        scenario: Scenario::Forecast,
    };
    let report = pipeline
        .run_drought(config.country("KEN").unwrap(), issue(), now())
        .unwrap();
    assert_eq!(report.audit_files.len(), 3);

    let country_dir = audit_dir.path().join("KEN");
    let events = audit::read_events_json(&country_dir.join(audit::EVENTS_JSON)).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].alert_areas.len(), 2);

    let event_rows = audit::read_events_csv(&country_dir.join(audit::EVENTS_CSV)).unwrap();
    assert_eq!(event_rows, audit::event_rows(&events));
    assert_eq!(event_rows[0].hazard, "drought");

    let area_rows = audit::read_alert_areas_csv(&country_dir.join(audit::ALERT_AREAS_CSV)).unwrap();
    assert_eq!(area_rows, audit::alert_area_rows(&events));
    assert_eq!(area_rows[1].place_code, "KE02");
    assert_eq!(area_rows[1].population_affected, 2000);
}

#[test]
fn test_missing_grid_skips_country() {
    let data_dir = tempfile::tempdir().unwrap();
    let grids = JsonGridDirectory::new(data_dir.path());
    let boundaries = boundaries();
    let config = config();
    let mut reference = InMemoryReferenceStore::new(reference_rows());
    let mut publisher = DryRunPublisher::new();

    let mut pipeline = Pipeline {
        grids: &grids,
        boundaries: &boundaries,
        reference: &mut reference,
        publisher: &mut publisher,
        audit_dir: None,
        scenario: Scenario::Forecast,
    };
    let outcomes = pipeline.run_countries(&config, Hazard::Drought, &["KEN", "UGA"], issue(), now());

    let ken = outcomes.get("KEN").unwrap();
    assert!(matches!(ken, Err(PipelineError::DataUnavailable(_))));
    let uga = outcomes.get("UGA").unwrap();
    assert!(matches!(uga, Err(PipelineError::Configuration(_))));
    assert!(publisher.notifications.is_empty());
}

#[test]
fn test_run_configured_covers_every_country() {
    let data_dir = tempfile::tempdir().unwrap();
    let grids = JsonGridDirectory::new(data_dir.path());
    let boundaries = boundaries();
    let config = config();
    let mut reference = InMemoryReferenceStore::new(reference_rows());
    let mut publisher = DryRunPublisher::new();

    let mut pipeline = Pipeline {
        grids: &grids,
        boundaries: &boundaries,
        reference: &mut reference,
        publisher: &mut publisher,
        audit_dir: None,
        scenario: Scenario::Forecast,
    };
    let outcomes = pipeline.run_configured(&config, Hazard::Drought, issue(), now());

    assert_eq!(outcomes.keys().collect::<Vec<_>>(), vec!["KEN"]);
    assert!(matches!(outcomes["KEN"], Err(PipelineError::DataUnavailable(_))));
}

// ---------------------------------------------------------------------------
// Flood
// ---------------------------------------------------------------------------

#[test]
fn test_flood_run_publishes_event_per_lead_time() {
    let data_dir = tempfile::tempdir().unwrap();
    let grids = JsonGridDirectory::new(data_dir.path());
    let leads = vec![0, 1, 2];
    // Hindcast 0..19 m3/s: the 0.9 quantile is 17.1. 8 of 10 forecast
    // members exceed it.
    grids
        .store(
            "KEN",
            GridKind::Hindcast,
            issue(),
            &field(20, leads.clone(), Unit::CubicMetresPerSecond, |m| m as f64),
        )
        .unwrap();
    grids
        .store(
            "KEN",
            GridKind::Forecast,
            issue(),
            &field(10, leads, Unit::CubicMetresPerSecond, |m| if m < 8 { 50.0 } else { 0.0 }),
        )
        .unwrap();

    let boundaries = boundaries();
    let config = config();
    let mut reference = InMemoryReferenceStore::default();
    let mut publisher = DryRunPublisher::new();
    let mut pipeline = Pipeline {
        grids: &grids,
        boundaries: &boundaries,
        reference: &mut reference,
        publisher: &mut publisher,
        audit_dir: None,
        scenario: Scenario::Forecast,
    };
    let report = pipeline
        .run_flood(config.country("KEN").unwrap(), issue(), now())
        .unwrap();

    assert_eq!(report.hazard, Hazard::Flood);
    assert_eq!(report.units_total, 2);
    assert_eq!(report.units_ok, 2);
    assert_eq!(report.events, 2);
    assert_eq!(report.rasters, 2);

    // 2 events x 3 indicators x 1 admin level.
    assert_eq!(publisher.exposures.len(), 6);
    assert_eq!(publisher.exposures[0].event_name.as_deref(), Some("KEN_0-day"));
    assert_eq!(publisher.exposures[3].event_name.as_deref(), Some("KEN_1-day"));
    assert_eq!(publisher.exposures[0].disaster_type, "flood");
    assert_eq!(publisher.rasters[1].file_name, "flood_extent_1-day_KEN.asc");
}
