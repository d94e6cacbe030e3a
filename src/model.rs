/// Core data types for the hazard trigger service.
///
/// This module defines the shared domain model imported by all other modules:
/// gridded ensemble fields, region metadata, the per-hazard record shapes held
/// by the keyed dataset store, published events, and the error taxonomy.
/// It contains no I/O.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Hazards and lead times
// ---------------------------------------------------------------------------

/// Hazard handled by a pipeline run. Selects the record shape and the
/// lead-time unit used throughout the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hazard {
    Drought,
    Flood,
}

impl Hazard {
    pub fn as_str(&self) -> &'static str {
        match self {
            Hazard::Drought => "drought",
            Hazard::Flood => "flood",
        }
    }

    /// Seasonal drought forecasts are monthly; river discharge is daily.
    pub fn lead_time_unit(&self) -> LeadTimeUnit {
        match self {
            Hazard::Drought => LeadTimeUnit::Month,
            Hazard::Flood => LeadTimeUnit::Day,
        }
    }

    pub fn parse(name: &str) -> Result<Self, PipelineError> {
        match name.to_ascii_lowercase().as_str() {
            "drought" => Ok(Hazard::Drought),
            "flood" | "riverflood" => Ok(Hazard::Flood),
            other => Err(PipelineError::Configuration(format!(
                "hazard '{}' not supported",
                other
            ))),
        }
    }
}

impl fmt::Display for Hazard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadTimeUnit {
    Month,
    Day,
}

impl LeadTimeUnit {
    /// Label used by the early-warning platform, e.g. "2-month" or "5-day".
    pub fn label(&self, lead_time: u32) -> String {
        match self {
            LeadTimeUnit::Month => format!("{}-month", lead_time),
            LeadTimeUnit::Day => format!("{}-day", lead_time),
        }
    }
}

/// Parses a platform lead-time label ("0-month", "3-day") into its offset.
pub fn parse_lead_time_label(label: &str) -> Option<u32> {
    let (number, unit) = label.split_once('-')?;
    match unit {
        "month" | "day" => number.parse().ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Gridded fields
// ---------------------------------------------------------------------------

/// Physical unit carried by a gridded field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    /// Precipitation rate as delivered by seasonal models.
    MetresPerSecond,
    /// Accumulated precipitation over the lead-time bucket.
    Millimetres,
    /// River discharge.
    CubicMetresPerSecond,
    /// Dimensionless probability in [0, 1].
    Probability,
}

/// A 4-D ensemble array indexed by (member, lead-time step, latitude, longitude).
///
/// For hindcasts the member axis enumerates every (historical year, member)
/// realisation; see [`GriddedEnsembleField::stack`]. Values are stored
/// row-major with longitude varying fastest. Missing values are `NaN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GriddedEnsembleField {
    pub members: usize,
    pub lead_times: Vec<u32>,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub unit: Unit,
    #[serde(with = "nan_as_null")]
    pub values: Vec<f64>,
}

/// Missing values travel as JSON `null`.
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        let cells: Vec<Option<f64>> = values.iter().map(|&v| (!v.is_nan()).then_some(v)).collect();
        cells.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let cells = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(cells.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}

impl GriddedEnsembleField {
    pub fn new(
        members: usize,
        lead_times: Vec<u32>,
        latitudes: Vec<f64>,
        longitudes: Vec<f64>,
        unit: Unit,
        values: Vec<f64>,
    ) -> Result<Self, PipelineError> {
        let expected = members * lead_times.len() * latitudes.len() * longitudes.len();
        if members == 0 {
            return Err(PipelineError::IncompatibleGrid(
                "ensemble field must have at least one member".to_string(),
            ));
        }
        if values.len() != expected {
            return Err(PipelineError::IncompatibleGrid(format!(
                "expected {} values for {} members x {} lead times x {} x {} cells, got {}",
                expected,
                members,
                lead_times.len(),
                latitudes.len(),
                longitudes.len(),
                values.len()
            )));
        }
        Ok(Self { members, lead_times, latitudes, longitudes, unit, values })
    }

    /// Builds a field by evaluating `f(member, lead_index, lat_index, lon_index)`.
    pub fn from_fn(
        members: usize,
        lead_times: Vec<u32>,
        latitudes: Vec<f64>,
        longitudes: Vec<f64>,
        unit: Unit,
        mut f: impl FnMut(usize, usize, usize, usize) -> f64,
    ) -> Result<Self, PipelineError> {
        let mut values =
            Vec::with_capacity(members * lead_times.len() * latitudes.len() * longitudes.len());
        for m in 0..members {
            for l in 0..lead_times.len() {
                for y in 0..latitudes.len() {
                    for x in 0..longitudes.len() {
                        values.push(f(m, l, y, x));
                    }
                }
            }
        }
        Self::new(members, lead_times, latitudes, longitudes, unit, values)
    }

    pub fn cells(&self) -> usize {
        self.latitudes.len() * self.longitudes.len()
    }

    fn offset(&self, member: usize, lead: usize, lat: usize, lon: usize) -> usize {
        ((member * self.lead_times.len() + lead) * self.latitudes.len() + lat)
            * self.longitudes.len()
            + lon
    }

    pub fn get(&self, member: usize, lead: usize, lat: usize, lon: usize) -> f64 {
        self.values[self.offset(member, lead, lat, lon)]
    }

    pub fn set(&mut self, member: usize, lead: usize, lat: usize, lon: usize, value: f64) {
        let i = self.offset(member, lead, lat, lon);
        self.values[i] = value;
    }

    /// Position of `lead_time` on the lead-time axis.
    pub fn lead_index(&self, lead_time: u32) -> Option<usize> {
        self.lead_times.iter().position(|&l| l == lead_time)
    }

    /// All member values for one cell at one lead-time index.
    pub fn member_values(&self, lead: usize, lat: usize, lon: usize) -> Vec<f64> {
        (0..self.members).map(|m| self.get(m, lead, lat, lon)).collect()
    }

    /// The 2-D field of one member at one lead-time index.
    pub fn member_field(&self, member: usize, lead: usize) -> GriddedField {
        let start = self.offset(member, lead, 0, 0);
        GriddedField {
            latitudes: self.latitudes.clone(),
            longitudes: self.longitudes.clone(),
            values: self.values[start..start + self.cells()].to_vec(),
        }
    }

    /// Same lead times and the same spatial grid.
    pub fn is_compatible(&self, other: &GriddedEnsembleField) -> bool {
        self.lead_times == other.lead_times && same_grid(
            &self.latitudes,
            &self.longitudes,
            &other.latitudes,
            &other.longitudes,
        )
    }

    /// Pools several fields (e.g. one per hindcast year) along the member axis.
    pub fn stack(fields: &[GriddedEnsembleField]) -> Result<Self, PipelineError> {
        let first = fields.first().ok_or_else(|| {
            PipelineError::DataUnavailable("no ensemble fields to stack".to_string())
        })?;
        let mut values = Vec::new();
        let mut members = 0;
        for field in fields {
            if !first.is_compatible(field) || field.unit != first.unit {
                return Err(PipelineError::IncompatibleGrid(
                    "stacked ensemble fields must share lead times, grid and unit".to_string(),
                ));
            }
            members += field.members;
            values.extend_from_slice(&field.values);
        }
        Self::new(
            members,
            first.lead_times.clone(),
            first.latitudes.clone(),
            first.longitudes.clone(),
            first.unit,
            values,
        )
    }
}

/// A 2-D field on a regular latitude/longitude grid, row-major by latitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GriddedField {
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub values: Vec<f64>,
}

impl GriddedField {
    pub fn new(latitudes: Vec<f64>, longitudes: Vec<f64>, values: Vec<f64>) -> Result<Self, PipelineError> {
        if values.len() != latitudes.len() * longitudes.len() {
            return Err(PipelineError::IncompatibleGrid(format!(
                "expected {} x {} values, got {}",
                latitudes.len(),
                longitudes.len(),
                values.len()
            )));
        }
        Ok(Self { latitudes, longitudes, values })
    }

    pub fn from_fn(
        latitudes: Vec<f64>,
        longitudes: Vec<f64>,
        mut f: impl FnMut(usize, usize) -> f64,
    ) -> Self {
        let mut values = Vec::with_capacity(latitudes.len() * longitudes.len());
        for y in 0..latitudes.len() {
            for x in 0..longitudes.len() {
                values.push(f(y, x));
            }
        }
        Self { latitudes, longitudes, values }
    }

    /// Value at a cell; `None` outside the grid or past the end of `values`.
    pub fn get(&self, lat: usize, lon: usize) -> Option<f64> {
        if lat >= self.latitudes.len() || lon >= self.longitudes.len() {
            return None;
        }
        self.values.get(lat * self.longitudes.len() + lon).copied()
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> GriddedField {
        GriddedField {
            latitudes: self.latitudes.clone(),
            longitudes: self.longitudes.clone(),
            values: self.values.iter().map(|&v| f(v)).collect(),
        }
    }
}

/// A gridded layer cut to a polygon. Cells outside the polygon are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClippedRaster {
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub values: Vec<Option<f64>>,
}

impl ClippedRaster {
    /// Values of the cells retained by the clip, `NaN`s excluded.
    pub fn inside_values(&self) -> Vec<f64> {
        self.values
            .iter()
            .flatten()
            .copied()
            .filter(|v| !v.is_nan())
            .collect()
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> ClippedRaster {
        ClippedRaster {
            latitudes: self.latitudes.clone(),
            longitudes: self.longitudes.clone(),
            values: self.values.iter().map(|v| v.map(&f)).collect(),
        }
    }
}

fn same_grid(lat_a: &[f64], lon_a: &[f64], lat_b: &[f64], lon_b: &[f64]) -> bool {
    const EPS: f64 = 1e-9;
    lat_a.len() == lat_b.len()
        && lon_a.len() == lon_b.len()
        && lat_a.iter().zip(lat_b).all(|(a, b)| (a - b).abs() < EPS)
        && lon_a.iter().zip(lon_b).all(|(a, b)| (a - b).abs() < EPS)
}

// ---------------------------------------------------------------------------
// Regions
// ---------------------------------------------------------------------------

/// Static metadata of a climatological region, loaded from the reference store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateRegionRecord {
    pub region_code: String,
    pub name: String,
    /// Admin level whose boundaries delineate the region.
    pub adm_level: u8,
    /// Member place codes per admin level.
    pub pcodes: BTreeMap<u8, Vec<String>>,
}

impl ClimateRegionRecord {
    pub fn pcodes_at(&self, adm_level: u8) -> &[String] {
        self.pcodes.get(&adm_level).map(Vec::as_slice).unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// Forecast records
// ---------------------------------------------------------------------------

/// Alert class reported alongside the boolean trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertClass {
    No,
    Min,
    Med,
    Max,
}

impl AlertClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertClass::No => "no",
            AlertClass::Min => "min",
            AlertClass::Med => "med",
            AlertClass::Max => "max",
        }
    }

    pub fn is_alert(&self) -> bool {
        *self != AlertClass::No
    }
}

/// Identity shared by every per-region record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionHeader {
    pub region_code: String,
    pub name: String,
    pub lead_time: u32,
}

/// Identity shared by every per-admin-area record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminHeader {
    pub pcode: String,
    pub adm_level: u8,
    pub lead_time: u32,
}

/// Regional-mean rainfall of each forecast member, before any comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RainfallRegionRecord {
    pub header: RegionHeader,
    /// mm per forecast member.
    pub members: Vec<f64>,
    pub ensemble_mean: f64,
}

/// Seasonal rainfall outlook for one climate region and lead time (months).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroughtRegionRecord {
    pub header: RegionHeader,
    /// Regional hindcast anomaly at the 33rd percentile, mm.
    pub tercile_lower: f64,
    /// Regional hindcast anomaly at the 66th percentile, mm.
    pub tercile_upper: f64,
    /// Regional forecast anomaly per ensemble member, mm.
    pub forecast: Vec<f64>,
    /// Share of members whose anomaly is below `tercile_lower`.
    pub trigger_forecast: f64,
    pub likelihood: f64,
    pub triggered: bool,
    pub alert_class: AlertClass,
    pub season: Option<String>,
    pub pop_affected: u64,
    pub pop_affected_perc: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroughtAdminRecord {
    pub header: AdminHeader,
    pub region_code: String,
    pub likelihood: f64,
    /// Share of the admin area's cells inside the drought extent.
    pub extent_fraction: f64,
    pub triggered: bool,
    pub alert_class: AlertClass,
    pub pop_affected: u64,
    pub pop_affected_perc: f64,
}

/// River discharge outlook for one admin area and lead time (days).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloodAdminRecord {
    pub header: AdminHeader,
    /// Median probability of exceeding the return-period discharge.
    pub likelihood: f64,
    pub extent_fraction: f64,
    pub triggered: bool,
    pub alert_class: AlertClass,
    pub pop_affected: u64,
    pub pop_affected_perc: f64,
}

/// Per-admin-area record, tagged by hazard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "hazard", rename_all = "lowercase")]
pub enum AdminRecord {
    Drought(DroughtAdminRecord),
    Flood(FloodAdminRecord),
}

impl AdminRecord {
    pub fn hazard(&self) -> Hazard {
        match self {
            AdminRecord::Drought(_) => Hazard::Drought,
            AdminRecord::Flood(_) => Hazard::Flood,
        }
    }

    pub fn header(&self) -> &AdminHeader {
        match self {
            AdminRecord::Drought(r) => &r.header,
            AdminRecord::Flood(r) => &r.header,
        }
    }

    pub fn triggered(&self) -> bool {
        match self {
            AdminRecord::Drought(r) => r.triggered,
            AdminRecord::Flood(r) => r.triggered,
        }
    }

    pub fn alert_class(&self) -> AlertClass {
        match self {
            AdminRecord::Drought(r) => r.alert_class,
            AdminRecord::Flood(r) => r.alert_class,
        }
    }

    pub fn pop_affected(&self) -> u64 {
        match self {
            AdminRecord::Drought(r) => r.pop_affected,
            AdminRecord::Flood(r) => r.pop_affected,
        }
    }

    pub fn pop_affected_perc(&self) -> f64 {
        match self {
            AdminRecord::Drought(r) => r.pop_affected_perc,
            AdminRecord::Flood(r) => r.pop_affected_perc,
        }
    }
}

// ---------------------------------------------------------------------------
// Events and indicators
// ---------------------------------------------------------------------------

/// Dynamic indicators published per affected place code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Indicator {
    PopulationAffected,
    ForecastSeverity,
    ForecastTrigger,
}

impl Indicator {
    pub const ALL: [Indicator; 3] = [
        Indicator::PopulationAffected,
        Indicator::ForecastSeverity,
        Indicator::ForecastTrigger,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Indicator::PopulationAffected => "population_affected",
            Indicator::ForecastSeverity => "forecast_severity",
            Indicator::ForecastTrigger => "forecast_trigger",
        }
    }
}

/// Indicator values recorded for one place code of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertArea {
    pub admin_level: u8,
    pub population_affected: u64,
    pub forecast_severity: u8,
    pub forecast_trigger: u8,
}

impl AlertArea {
    pub fn amount(&self, indicator: Indicator) -> u64 {
        match indicator {
            Indicator::PopulationAffected => self.population_affected,
            Indicator::ForecastSeverity => u64::from(self.forecast_severity),
            Indicator::ForecastTrigger => u64::from(self.forecast_trigger),
        }
    }
}

/// A reported hazard event for one region and lead time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_name: String,
    pub date: String,
    pub country: String,
    pub hazard: Hazard,
    pub lead_time: String,
    pub alert_areas: BTreeMap<String, AlertArea>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised while computing or publishing a hazard forecast.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Unsupported trigger model, missing or invalid per-country settings,
    /// country absent from configuration. Aborts the run for that country.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Reference dataset or source grid missing for the requested country/date.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// No boundary feature matches a climate region's place codes.
    #[error("no boundary features match climate region {region} at admin level {adm_level}")]
    GeometryMismatch { region: String, adm_level: u8 },

    /// Composite-key lookup in a dataset found nothing.
    #[error("no data unit for key {0}")]
    DataUnitNotFound(String),

    #[error("incompatible grids: {0}")]
    IncompatibleGrid(String),

    /// Connection-level failure talking to the early-warning API.
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP error {status} for {url}: {body}")]
    Http { status: u16, url: String, body: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("database error: {0}")]
    Database(#[from] postgres::Error),
}

impl PipelineError {
    /// Errors that abort the run for the whole country.
    pub fn is_country_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::Configuration(_) | PipelineError::DataUnavailable(_)
        )
    }

    /// Errors that stop one region but leave the others running.
    pub fn is_region_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::GeometryMismatch { .. }
                | PipelineError::DataUnitNotFound(_)
                | PipelineError::IncompatibleGrid(_)
        )
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Parse(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn small_field(members: usize) -> GriddedEnsembleField {
        GriddedEnsembleField::from_fn(
            members,
            vec![0, 1],
            vec![1.0, 0.0],
            vec![30.0, 31.0, 32.0],
            Unit::Millimetres,
            |m, l, y, x| (m * 1000 + l * 100 + y * 10 + x) as f64,
        )
        .expect("shape is consistent")
    }

    #[test]
    fn test_field_rejects_wrong_value_count() {
        let result = GriddedEnsembleField::new(
            2,
            vec![0],
            vec![0.0],
            vec![0.0, 1.0],
            Unit::Millimetres,
            vec![1.0; 3],
        );
        assert!(matches!(result, Err(PipelineError::IncompatibleGrid(_))));
    }

    #[test]
    fn test_missing_values_survive_json() {
        let mut field = small_field(1);
        field.set(0, 1, 0, 0, f64::NAN);
        let text = serde_json::to_string(&field).unwrap();
        assert!(text.contains("null"));
        let back: GriddedEnsembleField = serde_json::from_str(&text).unwrap();
        assert!(back.get(0, 1, 0, 0).is_nan());
        assert_eq!(back.get(0, 1, 0, 1), field.get(0, 1, 0, 1));
    }

    #[test]
    fn test_gridded_field_validates_shape() {
        assert!(matches!(
            GriddedField::new(vec![0.0, 1.0], vec![0.0], vec![1.0]),
            Err(PipelineError::IncompatibleGrid(_))
        ));

        // Hand-built fields with a short value vector do not panic on lookup.
        let short = GriddedField { latitudes: vec![0.0, 1.0], longitudes: vec![0.0, 1.0], values: vec![1.0, 2.0, 3.0] };
        assert_eq!(short.get(1, 0), Some(3.0));
        assert_eq!(short.get(1, 1), None);
        assert_eq!(short.get(0, 2), None);
    }

    #[test]
    fn test_field_indexing_is_member_lead_lat_lon() {
        let field = small_field(2);
        assert_eq!(field.get(1, 1, 0, 2), 1102.0);
        assert_eq!(field.member_values(0, 1, 1), vec![11.0, 1011.0]);
        assert_eq!(field.member_field(1, 0).get(1, 0), Some(1010.0));
    }

    #[test]
    fn test_stack_pools_members() {
        let stacked = GriddedEnsembleField::stack(&[small_field(2), small_field(3)])
            .expect("compatible fields stack");
        assert_eq!(stacked.members, 5);
        assert_eq!(stacked.get(4, 0, 0, 0), 2000.0);
    }

    #[test]
    fn test_stack_rejects_different_grids() {
        let mut other = small_field(1);
        other.longitudes = vec![40.0, 41.0, 42.0];
        let result = GriddedEnsembleField::stack(&[small_field(1), other]);
        assert!(matches!(result, Err(PipelineError::IncompatibleGrid(_))));
    }

    #[test]
    fn test_lead_time_labels() {
        assert_eq!(LeadTimeUnit::Month.label(2), "2-month");
        assert_eq!(LeadTimeUnit::Day.label(5), "5-day");
        assert_eq!(parse_lead_time_label("0-month"), Some(0));
        assert_eq!(parse_lead_time_label("3-day"), Some(3));
        assert_eq!(parse_lead_time_label("month"), None);
        assert_eq!(parse_lead_time_label("x-month"), None);
    }

    #[test]
    fn test_hazard_parse() {
        assert_eq!(Hazard::parse("Drought").unwrap(), Hazard::Drought);
        assert_eq!(Hazard::parse("riverflood").unwrap(), Hazard::Flood);
        assert!(matches!(
            Hazard::parse("cyclone"),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_error_scope_classification() {
        assert!(PipelineError::Configuration("x".into()).is_country_fatal());
        assert!(PipelineError::DataUnavailable("x".into()).is_country_fatal());
        let geometry = PipelineError::GeometryMismatch { region: "r1".into(), adm_level: 1 };
        assert!(geometry.is_region_fatal());
        assert!(!geometry.is_country_fatal());
    }
}
