/// Reference store for climate-region metadata.
///
/// Climate regions (code, name, delineating admin level and member place
/// codes per level) are maintained outside the pipeline and versioned by
/// timestamp. A run loads the latest snapshot for its country once, as the
/// fourth dataset of the drought run.
///
/// Schema: `sql/001_climate_regions.sql`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use postgres::{Client, NoTls};

use crate::logging::{self, Stage};
use crate::model::{ClimateRegionRecord, PipelineError};
use crate::store::DataSet;

/// One stored climate region row.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRow {
    pub country: String,
    pub timestamp: DateTime<Utc>,
    pub climate_region_code: String,
    pub climate_region_name: String,
    pub adm_level: u8,
    /// JSON object mapping admin level (as string) to place codes.
    pub pcodes: String,
}

impl ReferenceRow {
    fn to_record(&self) -> Result<ClimateRegionRecord, PipelineError> {
        let raw: BTreeMap<String, Vec<String>> = serde_json::from_str(&self.pcodes)?;
        let mut pcodes = BTreeMap::new();
        for (level, codes) in raw {
            let level: u8 = level.trim().parse().map_err(|_| {
                PipelineError::Parse(format!(
                    "climate region {} lists place codes under non-numeric admin level '{}'",
                    self.climate_region_code, level
                ))
            })?;
            pcodes.insert(level, codes);
        }
        Ok(ClimateRegionRecord {
            region_code: self.climate_region_code.clone(),
            name: self.climate_region_name.clone(),
            adm_level: self.adm_level,
            pcodes,
        })
    }
}

/// Builds the dataset of the most recent snapshot among `rows`.
pub fn latest_snapshot(country: &str, rows: &[ReferenceRow]) -> Result<DataSet<ClimateRegionRecord>, PipelineError> {
    let rows: Vec<&ReferenceRow> = rows.iter().filter(|r| r.country == country).collect();
    let timestamps: BTreeSet<DateTime<Utc>> = rows.iter().map(|r| r.timestamp).collect();

    let latest = *timestamps.iter().next_back().ok_or_else(|| {
        PipelineError::DataUnavailable(format!("no climate-region dataset found for country {}", country))
    })?;
    if timestamps.len() > 1 {
        logging::warn(
            Stage::Extract,
            Some(country),
            &format!(
                "{} climate-region datasets found; using the latest ({})",
                timestamps.len(),
                latest.format("%Y-%m-%dT%H:%M:%S")
            ),
        );
    }

    let snapshot: Vec<&ReferenceRow> = rows.into_iter().filter(|r| r.timestamp == latest).collect();
    let adm_levels: Vec<u8> = snapshot
        .iter()
        .map(|r| r.adm_level)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut dataset = DataSet::new(country, latest, adm_levels);
    for row in snapshot {
        dataset.upsert_data_unit(row.to_record()?);
    }
    Ok(dataset)
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

pub trait ReferenceStore {
    /// Latest climate-region snapshot of `country`.
    fn climate_regions(&mut self, country: &str) -> Result<DataSet<ClimateRegionRecord>, PipelineError>;
}

/// Reference store backed by the `climate_regions` table.
pub struct PostgresReferenceStore {
    client: Client,
}

impl PostgresReferenceStore {
    pub fn connect(database_url: &str) -> Result<Self, PipelineError> {
        let client = Client::connect(database_url, NoTls)?;
        Ok(PostgresReferenceStore { client })
    }

    pub fn from_client(client: Client) -> Self {
        PostgresReferenceStore { client }
    }

    pub fn fetch_rows(&mut self, country: &str) -> Result<Vec<ReferenceRow>, PipelineError> {
        let rows = self.client.query(
            "SELECT country, timestamp, climate_region_code, climate_region_name, adm_level, pcodes::text
             FROM climate_regions
             WHERE country = $1
             ORDER BY timestamp, climate_region_code",
            &[&country],
        )?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let adm_level: i32 = row.get(4);
            out.push(ReferenceRow {
                country: row.get(0),
                timestamp: row.get(1),
                climate_region_code: row.get(2),
                climate_region_name: row.get(3),
                adm_level: u8::try_from(adm_level)
                    .map_err(|_| PipelineError::Parse(format!("invalid admin level {}", adm_level)))?,
                pcodes: row.get(5),
            });
        }
        Ok(out)
    }

    /// Inserts one snapshot row; used to seed environments.
    pub fn insert_row(&mut self, row: &ReferenceRow) -> Result<(), PipelineError> {
        self.client.execute(
            "INSERT INTO climate_regions
             (country, timestamp, climate_region_code, climate_region_name, adm_level, pcodes)
             VALUES ($1, $2, $3, $4, $5, $6::text::jsonb)
             ON CONFLICT (country, timestamp, climate_region_code) DO UPDATE
             SET climate_region_name = EXCLUDED.climate_region_name,
                 adm_level = EXCLUDED.adm_level,
                 pcodes = EXCLUDED.pcodes",
            &[
                &row.country,
                &row.timestamp,
                &row.climate_region_code,
                &row.climate_region_name,
                &i32::from(row.adm_level),
                &row.pcodes,
            ],
        )?;
        Ok(())
    }
}

impl ReferenceStore for PostgresReferenceStore {
    fn climate_regions(&mut self, country: &str) -> Result<DataSet<ClimateRegionRecord>, PipelineError> {
        let rows = self.fetch_rows(country)?;
        latest_snapshot(country, &rows)
    }
}

/// Reference rows held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReferenceStore {
    rows: Vec<ReferenceRow>,
}

impl InMemoryReferenceStore {
    pub fn new(rows: Vec<ReferenceRow>) -> Self {
        InMemoryReferenceStore { rows }
    }

    pub fn push(&mut self, row: ReferenceRow) {
        self.rows.push(row);
    }
}

impl ReferenceStore for InMemoryReferenceStore {
    fn climate_regions(&mut self, country: &str) -> Result<DataSet<ClimateRegionRecord>, PipelineError> {
        latest_snapshot(country, &self.rows)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
