//! Keyed dataset store.
//!
//! A `DataSet` is a timestamped, country-scoped collection of records keyed by
//! a deterministic identity: place code (or climate-region code) joined with
//! the dataset timestamp and, when the record has one, its lead time.
//! Upserting a record whose identity already exists replaces it in place.
//!
//! Composite lookups (`get_by_pcode`, `get_by_region`) return
//! `PipelineError::DataUnitNotFound` rather than a default so callers can tell
//! "nothing computed" apart from a real zero.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::model::{
    AdminRecord, ClimateRegionRecord, DroughtRegionRecord, PipelineError, RainfallRegionRecord,
};

/// Timestamp layout used inside identity keys.
pub const ID_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Attributes a record exposes to build its identity key.
///
/// The place code wins over the region code; a record with neither is keyed
/// by the timestamp alone.
pub trait DataUnit {
    fn pcode(&self) -> Option<&str> {
        None
    }

    fn region_code(&self) -> Option<&str> {
        None
    }

    fn lead_time(&self) -> Option<u32> {
        None
    }

    fn adm_level(&self) -> Option<u8> {
        None
    }

    /// The code used in the identity key.
    fn code(&self) -> Option<&str> {
        self.pcode().or_else(|| self.region_code())
    }
}

/// Builds the identity key for a code, timestamp and optional lead time.
pub fn data_unit_id(code: Option<&str>, timestamp: &DateTime<Utc>, lead_time: Option<u32>) -> String {
    let ts = timestamp.format(ID_TIMESTAMP_FORMAT);
    match (code, lead_time) {
        (Some(code), Some(lead)) => format!("{}_{}_{}", code, ts, lead),
        (Some(code), None) => format!("{}_{}", code, ts),
        (None, Some(lead)) => format!("{}_{}", ts, lead),
        (None, None) => ts.to_string(),
    }
}

impl DataUnit for ClimateRegionRecord {
    fn region_code(&self) -> Option<&str> {
        Some(&self.region_code)
    }

    fn adm_level(&self) -> Option<u8> {
        Some(self.adm_level)
    }
}

impl DataUnit for DroughtRegionRecord {
    fn region_code(&self) -> Option<&str> {
        Some(&self.header.region_code)
    }

    fn lead_time(&self) -> Option<u32> {
        Some(self.header.lead_time)
    }
}

impl DataUnit for RainfallRegionRecord {
    fn region_code(&self) -> Option<&str> {
        Some(&self.header.region_code)
    }

    fn lead_time(&self) -> Option<u32> {
        Some(self.header.lead_time)
    }
}

impl DataUnit for AdminRecord {
    fn pcode(&self) -> Option<&str> {
        Some(&self.header().pcode)
    }

    fn lead_time(&self) -> Option<u32> {
        Some(self.header().lead_time)
    }

    fn adm_level(&self) -> Option<u8> {
        Some(self.header().adm_level)
    }
}

// ---------------------------------------------------------------------------
// DataSet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DataSet<U> {
    pub country: String,
    timestamp: DateTime<Utc>,
    pub adm_levels: Vec<u8>,
    units: BTreeMap<String, U>,
}

impl<U: DataUnit> DataSet<U> {
    pub fn new(country: &str, timestamp: DateTime<Utc>, adm_levels: Vec<u8>) -> Self {
        Self {
            country: country.to_string(),
            timestamp,
            adm_levels,
            units: BTreeMap::new(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Moves the dataset to a new timestamp, re-keying every stored unit.
    pub fn set_timestamp(&mut self, timestamp: DateTime<Utc>) {
        if timestamp == self.timestamp {
            return;
        }
        self.timestamp = timestamp;
        let units = std::mem::take(&mut self.units);
        for unit in units.into_values() {
            self.upsert_data_unit(unit);
        }
    }

    pub fn id_for(&self, unit: &U) -> String {
        data_unit_id(unit.code(), &self.timestamp, unit.lead_time())
    }

    /// Inserts `unit`, replacing any unit with the same identity. Returns the key.
    pub fn upsert_data_unit(&mut self, unit: U) -> String {
        let id = self.id_for(&unit);
        self.units.insert(id.clone(), unit);
        id
    }

    /// Lookup by full identity key.
    pub fn get(&self, id: &str) -> Option<&U> {
        self.units.get(id)
    }

    /// Lookup of a unit without lead time (e.g. climate-region metadata) by its code.
    pub fn get_data_unit(&self, code: &str) -> Result<&U, PipelineError> {
        self.lookup(data_unit_id(Some(code), &self.timestamp, None))
    }

    pub fn get_by_pcode(&self, pcode: &str, lead_time: u32) -> Result<&U, PipelineError> {
        self.lookup(data_unit_id(Some(pcode), &self.timestamp, Some(lead_time)))
    }

    pub fn get_by_region(&self, region_code: &str, lead_time: u32) -> Result<&U, PipelineError> {
        self.lookup(data_unit_id(Some(region_code), &self.timestamp, Some(lead_time)))
    }

    fn lookup(&self, id: String) -> Result<&U, PipelineError> {
        self.units.get(&id).ok_or(PipelineError::DataUnitNotFound(id))
    }

    /// Distinct codes (place or region) present in the dataset, sorted.
    pub fn get_ids(&self) -> Vec<String> {
        self.units
            .values()
            .filter_map(|u| u.code().map(str::to_string))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct place codes stored for one admin level, sorted.
    pub fn get_pcodes(&self, adm_level: u8) -> Vec<String> {
        self.units
            .values()
            .filter(|u| u.adm_level() == Some(adm_level))
            .filter_map(|u| u.pcode().map(str::to_string))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }

    pub fn units(&self) -> impl Iterator<Item = &U> {
        self.units.values()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
