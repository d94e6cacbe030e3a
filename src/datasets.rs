//! Datasets produced by one country run.
//!
//! All datasets of a run share the same data timestamp, so records computed
//! in one stage can be looked up by composite key in the next.

use chrono::{DateTime, Utc};

use crate::model::{AdminRecord, ClimateRegionRecord, DroughtRegionRecord, RainfallRegionRecord};
use crate::store::DataSet;

/// The four datasets of a drought run.
#[derive(Debug, Clone)]
pub struct DroughtDataSets {
    /// Regional-mean rainfall per member and lead time.
    pub rainfall_region: DataSet<RainfallRegionRecord>,
    /// Terciles, trigger state and alert class per region and lead time.
    pub forecast_region: DataSet<DroughtRegionRecord>,
    /// Trigger state and exposure per admin area and lead time.
    pub forecast_admin: DataSet<AdminRecord>,
    /// Static climate-region metadata from the reference store.
    pub climate_regions: DataSet<ClimateRegionRecord>,
}

impl DroughtDataSets {
    pub fn new(
        country: &str,
        timestamp: DateTime<Utc>,
        adm_levels: Vec<u8>,
        climate_regions: DataSet<ClimateRegionRecord>,
    ) -> Self {
        DroughtDataSets {
            rainfall_region: DataSet::new(country, timestamp, adm_levels.clone()),
            forecast_region: DataSet::new(country, timestamp, adm_levels.clone()),
            forecast_admin: DataSet::new(country, timestamp, adm_levels),
            climate_regions,
        }
    }

    pub fn country(&self) -> &str {
        &self.forecast_region.country
    }

    /// Moves the computed datasets to a new timestamp. The reference snapshot
    /// keeps its own.
    pub fn set_timestamp(&mut self, timestamp: DateTime<Utc>) {
        self.rainfall_region.set_timestamp(timestamp);
        self.forecast_region.set_timestamp(timestamp);
        self.forecast_admin.set_timestamp(timestamp);
    }
}

/// Datasets of a river-flood run.
#[derive(Debug, Clone)]
pub struct FloodDataSets {
    pub forecast_admin: DataSet<AdminRecord>,
}

impl FloodDataSets {
    pub fn new(country: &str, timestamp: DateTime<Utc>, adm_levels: Vec<u8>) -> Self {
        FloodDataSets {
            forecast_admin: DataSet::new(country, timestamp, adm_levels),
        }
    }

    pub fn country(&self) -> &str {
        &self.forecast_admin.country
    }
}
