//! Country runs, end to end.
//!
//! A run goes through three steps:
//!
//! 1. **extract**: climate-region snapshot from the reference store and admin
//!    boundaries for every level the run touches;
//! 2. **forecast**: grids are loaded, compared to the hindcast, aggregated
//!    per region or admin area, classified and stored in the run's datasets;
//! 3. **publish**: events and exposure payloads are built from the datasets,
//!    sent to the publisher and exported for audit.
//!
//! A region that fails (no matching geometry, no grid cell, missing record)
//! is logged and left out of the datasets; it is never reported as "not
//! triggered". Configuration and missing-data errors abort the country.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::alert::seasons::{COMPUTED_LEAD_TIMES, EVENT_LEAD_TIMES};
use crate::alert::thresholds::{
    alert_class, classify_clipped, fraction_over_threshold, median, member_share_below, round2,
};
use crate::analysis::climatology::{Tail, anomalies, compare, nan_mean, regional_terciles};
use crate::analysis::spatial::{RegionalSeries, aggregate, clip, resample_nearest};
use crate::config::{CountryConfig, DroughtTriggerConfig, PipelineConfig, Scenario};
use crate::datasets::{DroughtDataSets, FloodDataSets};
use crate::ingest::boundaries::{BoundaryIndex, BoundarySource};
use crate::ingest::grid::{EnsembleSource, GridKind, days_in_month, rate_to_accumulation};
use crate::logging::{self, Stage};
use crate::model::{
    AdminHeader, AdminRecord, ClimateRegionRecord, DroughtAdminRecord, DroughtRegionRecord,
    FloodAdminRecord, GriddedEnsembleField, GriddedField, Hazard, PipelineError, RainfallRegionRecord, RegionHeader,
};
use crate::publish::exposure::{PublishPlan, plan_drought_publication, plan_flood_publication};
use crate::publish::raster::RasterLayer;
use crate::publish::{Publisher, audit, publish};
use crate::reference::ReferenceStore;
use crate::store::DataSet;

/// Probability rasters are resampled this many times finer before clipping.
pub const RESAMPLE_FACTOR: usize = 10;

/// Timestamp of a run's datasets: "now" moved to the issue year and month.
/// The day is capped at the length of the issue month.
pub fn data_timestamp(issue: NaiveDate, now: DateTime<Utc>) -> Result<DateTime<Utc>, PipelineError> {
    let last_day = days_in_month(issue.year(), issue.month())
        .ok_or_else(|| PipelineError::Configuration(format!("invalid issue date {}", issue)))?;
    let date = NaiveDate::from_ymd_opt(issue.year(), issue.month(), now.day().min(last_day))
        .ok_or_else(|| PipelineError::Configuration(format!("invalid issue date {}", issue)))?;
    Ok(date.and_time(now.time()).and_utc())
}

/// Counts and exports of one country run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub country: String,
    pub hazard: Hazard,
    pub timestamp: DateTime<Utc>,
    pub units_total: usize,
    pub units_ok: usize,
    pub events: usize,
    pub exposures: usize,
    pub rasters: usize,
    pub audit_files: Vec<PathBuf>,
}

fn extent_layer(probability: &GriddedField, prob_threshold: f64) -> GriddedField {
    probability.map(|p| if p.is_nan() { f64::NAN } else if p > prob_threshold { 1.0 } else { 0.0 })
}

fn population_affected(population: u64, extent_fraction: f64, triggered: bool) -> u64 {
    if triggered {
        (population as f64 * extent_fraction).round() as u64
    } else {
        0
    }
}

// ---------------------------------------------------------------------------
// Drought
// ---------------------------------------------------------------------------

/// Output of the drought forecast step.
#[derive(Debug, Clone)]
pub struct DroughtForecast {
    pub data: DroughtDataSets,
    pub rasters: Vec<RasterLayer>,
    pub regions_total: usize,
    pub regions_ok: usize,
}

/// Gridded inputs shared by every region of a drought run.
struct DroughtGrids {
    hindcast: GriddedEnsembleField,
    forecast: GriddedEnsembleField,
    forecast_anomaly: GriddedEnsembleField,
    /// Resampled probability per lead time.
    probability: BTreeMap<u32, GriddedField>,
}

fn load_drought_grids(
    config: &CountryConfig,
    trigger: &DroughtTriggerConfig,
    grids: &dyn EnsembleSource,
    issue: NaiveDate,
) -> Result<DroughtGrids, PipelineError> {
    let country = config.iso3.as_str();
    let hindcast = rate_to_accumulation(&grids.load(country, GridKind::Hindcast, issue)?, issue)?;
    let forecast = rate_to_accumulation(&grids.load(country, GridKind::Forecast, issue)?, issue)?;
    logging::info(
        Stage::Extract,
        Some(country),
        &format!(
            "hindcast {} members, forecast {} members, {} x {} cells",
            hindcast.members,
            forecast.members,
            forecast.latitudes.len(),
            forecast.longitudes.len()
        ),
    );

    let hindcast = trigger.model.prepare(&hindcast);
    let forecast = trigger.model.prepare(&forecast);
    let comparison = compare(&hindcast, &forecast, trigger.tercile_threshold, Tail::Lower)?;
    logging::info(
        Stage::Compare,
        Some(country),
        &format!(
            "{} at quantile {:.2} for lead times {:?}",
            trigger.model.name(),
            trigger.tercile_threshold,
            comparison.lead_times
        ),
    );

    let probability = COMPUTED_LEAD_TIMES
        .filter_map(|lead| comparison.probability(lead).map(|p| (lead, resample_nearest(p, RESAMPLE_FACTOR))))
        .collect();
    let forecast_anomaly = anomalies(&forecast, &hindcast)?;

    Ok(DroughtGrids { hindcast, forecast, forecast_anomaly, probability })
}

/// Records of one climate region over every lead time.
#[derive(Debug, Default)]
struct RegionForecast {
    rainfall: Vec<RainfallRegionRecord>,
    regions: Vec<DroughtRegionRecord>,
    admins: Vec<AdminRecord>,
}

impl RegionForecast {
    fn store(self, data: &mut DroughtDataSets) {
        for record in self.rainfall {
            data.rainfall_region.upsert_data_unit(record);
        }
        for record in self.admins {
            data.forecast_admin.upsert_data_unit(record);
        }
        for record in self.regions {
            data.forecast_region.upsert_data_unit(record);
        }
    }
}

/// Computes every lead time of one climate region. Nothing is returned
/// unless all lead times succeed.
fn forecast_region(
    config: &CountryConfig,
    trigger: &DroughtTriggerConfig,
    boundaries: &BoundaryIndex,
    grids: &DroughtGrids,
    region: &ClimateRegionRecord,
    issue: NaiveDate,
) -> Result<RegionForecast, PipelineError> {
    let code = region.region_code.as_str();
    let table = config.season_table(code)?;
    let geometry = boundaries
        .level(region.adm_level)?
        .select_region(code, region.pcodes_at(region.adm_level))?;

    let hindcast: RegionalSeries = aggregate(&grids.hindcast, &geometry)?;
    let forecast = aggregate(&grids.forecast, &geometry)?;
    let anomaly = aggregate(&grids.forecast_anomaly, &geometry)?;

    let mut out = RegionForecast::default();
    for lead_time in COMPUTED_LEAD_TIMES {
        let (Some(members), Some(hind), Some(anom), Some(probability)) = (
            forecast.at(lead_time),
            hindcast.at(lead_time),
            anomaly.at(lead_time),
            grids.probability.get(&lead_time),
        ) else {
            logging::debug(Stage::Aggregate, Some(code), &format!("no grid data at lead time {}", lead_time));
            continue;
        };
        let header = RegionHeader { region_code: code.to_string(), name: region.name.clone(), lead_time };

        out.rainfall.push(RainfallRegionRecord {
            header: header.clone(),
            members: members.to_vec(),
            ensemble_mean: nan_mean(members),
        });

        let terciles = regional_terciles(hind);
        let trigger_forecast = member_share_below(anom, terciles.lower);

        let clipped = clip(probability, &geometry);
        let decision = classify_clipped(
            &clipped,
            trigger.trigger_on_minimum_probability,
            trigger.min_area_fraction,
        )
        .ok_or_else(|| {
            PipelineError::IncompatibleGrid(format!("clip of region {} retained no valid cell", code))
        })?;
        let class = alert_class(decision.triggered, decision.likelihood, trigger.alert_on_minimum_probability);
        logging::debug(
            Stage::Classify,
            Some(code),
            &format!(
                "lead {}: likelihood {:.2}, extent {:.3}, triggered {}, alert {}",
                lead_time,
                decision.likelihood,
                decision.extent_fraction,
                decision.triggered,
                class.as_str()
            ),
        );

        // Admin areas of every configured level inherit the region's state.
        let mut region_population = 0u64;
        let mut region_affected = 0u64;
        for &adm_level in &config.admin_levels {
            let level = boundaries.level(adm_level)?;
            for pcode in region.pcodes_at(adm_level) {
                let Some(feature) = level.feature(pcode) else {
                    logging::warn(
                        Stage::Aggregate,
                        Some(pcode),
                        &format!("no admin-{} boundary; left out of region {}", adm_level, code),
                    );
                    continue;
                };
                let admin_clip = clip(probability, &feature.geometry);
                let admin_values = admin_clip.inside_values();
                let extent_fraction =
                    fraction_over_threshold(&admin_values, trigger.trigger_on_minimum_probability);
                let pop_affected = population_affected(feature.population, extent_fraction, decision.triggered);
                if adm_level == region.adm_level {
                    region_population += feature.population;
                    region_affected += pop_affected;
                }
                out.admins.push(AdminRecord::Drought(DroughtAdminRecord {
                    header: AdminHeader { pcode: pcode.clone(), adm_level, lead_time },
                    region_code: code.to_string(),
                    likelihood: median(&admin_values).map(round2).unwrap_or(decision.likelihood),
                    extent_fraction,
                    triggered: decision.triggered,
                    alert_class: class,
                    pop_affected,
                    pop_affected_perc: extent_fraction * 100.0,
                }));
            }
        }

        out.regions.push(DroughtRegionRecord {
            header,
            tercile_lower: terciles.lower,
            tercile_upper: terciles.upper,
            forecast: anom.to_vec(),
            trigger_forecast,
            likelihood: decision.likelihood,
            triggered: decision.triggered,
            alert_class: class,
            season: table.season_at(issue.month(), lead_time).map(str::to_string),
            pop_affected: region_affected,
            pop_affected_perc: if region_population == 0 {
                0.0
            } else {
                region_affected as f64 / region_population as f64 * 100.0
            },
        });
    }
    Ok(out)
}

/// Forecast step of a drought run: fills the datasets and builds the extent
/// layers for lead times 0 to 3.
pub fn run_drought_forecast(
    config: &CountryConfig,
    scenario: Scenario,
    grids: &dyn EnsembleSource,
    boundaries: &BoundaryIndex,
    climate_regions: DataSet<ClimateRegionRecord>,
    issue: NaiveDate,
    now: DateTime<Utc>,
) -> Result<DroughtForecast, PipelineError> {
    let country = config.iso3.as_str();
    let trigger = config.drought()?.clone().with_scenario(scenario);
    let loaded = load_drought_grids(config, &trigger, grids, issue)?;

    let timestamp = data_timestamp(issue, now)?;
    let mut data = DroughtDataSets::new(country, timestamp, config.admin_levels.clone(), climate_regions);

    let regions: Vec<ClimateRegionRecord> = data.climate_regions.units().cloned().collect();
    let mut regions_ok = 0;
    for region in &regions {
        match forecast_region(config, &trigger, boundaries, &loaded, region, issue) {
            Ok(records) => {
                records.store(&mut data);
                regions_ok += 1;
            }
            Err(e) if e.is_region_fatal() => logging::log_region_failure(&region.region_code, None, &e),
            Err(e) => return Err(e),
        }
    }
    logging::info(
        Stage::Store,
        Some(country),
        &format!(
            "{} regional and {} admin records at {}",
            data.forecast_region.len(),
            data.forecast_admin.len(),
            timestamp.format("%Y-%m-%dT%H:%M:%S")
        ),
    );

    let outline = boundaries.level(config.base_admin_level())?.outline();
    let mut rasters = Vec::new();
    for lead_time in EVENT_LEAD_TIMES {
        let Some(probability) = loaded.probability.get(&lead_time) else {
            continue;
        };
        let extent = clip(&extent_layer(probability, trigger.trigger_on_minimum_probability), &outline);
        if extent.values.is_empty() {
            logging::warn(
                Stage::Aggregate,
                Some(country),
                &format!("drought extent at lead time {} does not overlap the country", lead_time),
            );
            continue;
        }
        rasters.push(RasterLayer::new(Hazard::Drought, country, lead_time, extent));
    }

    Ok(DroughtForecast { data, rasters, regions_total: regions.len(), regions_ok })
}

// ---------------------------------------------------------------------------
// Flood
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FloodForecast {
    pub data: FloodDataSets,
    pub rasters: Vec<RasterLayer>,
    pub areas_total: usize,
    pub areas_ok: usize,
}

/// Forecast step of a river-flood run: discharge compared in the upper tail
/// at the return-period quantile and classified per admin area.
pub fn run_flood_forecast(
    config: &CountryConfig,
    grids: &dyn EnsembleSource,
    boundaries: &BoundaryIndex,
    issue: NaiveDate,
    now: DateTime<Utc>,
) -> Result<FloodForecast, PipelineError> {
    let country = config.iso3.as_str();
    let flood = config.flood()?;
    let hindcast = grids.load(country, GridKind::Hindcast, issue)?;
    let forecast = grids.load(country, GridKind::Forecast, issue)?;
    let comparison = compare(&hindcast, &forecast, flood.return_period_quantile, Tail::Upper)?;
    logging::info(
        Stage::Compare,
        Some(country),
        &format!("discharge at quantile {:.2} for lead times {:?}", flood.return_period_quantile, comparison.lead_times),
    );

    let timestamp = data_timestamp(issue, now)?;
    let mut data = FloodDataSets::new(country, timestamp, config.admin_levels.clone());
    let outline = boundaries.level(config.base_admin_level())?.outline();
    let mut rasters = Vec::new();
    let mut areas: BTreeSet<String> = BTreeSet::new();
    let mut failed: BTreeSet<String> = BTreeSet::new();
    // Kept back until every lead time is done: an area failing at any lead
    // time is left out entirely.
    let mut records: BTreeMap<String, Vec<AdminRecord>> = BTreeMap::new();

    for &lead_time in &flood.lead_times_days {
        let Some(probability) = comparison.probability(lead_time) else {
            logging::debug(Stage::Compare, Some(country), &format!("no discharge at lead time {} days", lead_time));
            continue;
        };
        let probability = resample_nearest(probability, RESAMPLE_FACTOR);

        for &adm_level in &config.admin_levels {
            let level = boundaries.level(adm_level)?;
            for pcode in level.pcodes() {
                areas.insert(pcode.to_string());
                let Some(feature) = level.feature(pcode) else { continue };
                let clipped = clip(&probability, &feature.geometry);
                let Some(decision) = classify_clipped(
                    &clipped,
                    flood.trigger_on_minimum_probability,
                    flood.min_area_fraction,
                ) else {
                    logging::debug(Stage::Aggregate, Some(pcode), "no grid cell inside admin area");
                    failed.insert(pcode.to_string());
                    continue;
                };
                records.entry(pcode.to_string()).or_default().push(AdminRecord::Flood(FloodAdminRecord {
                    header: AdminHeader { pcode: pcode.to_string(), adm_level, lead_time },
                    likelihood: decision.likelihood,
                    extent_fraction: decision.extent_fraction,
                    triggered: decision.triggered,
                    alert_class: alert_class(decision.triggered, decision.likelihood, None),
                    pop_affected: population_affected(feature.population, decision.extent_fraction, decision.triggered),
                    pop_affected_perc: decision.extent_fraction * 100.0,
                }));
            }
        }

        let extent = clip(&extent_layer(&probability, flood.trigger_on_minimum_probability), &outline);
        if !extent.values.is_empty() {
            rasters.push(RasterLayer::new(Hazard::Flood, country, lead_time, extent));
        }
    }

    let mut areas_ok = 0;
    for (pcode, area_records) in records {
        if failed.contains(&pcode) {
            logging::warn(Stage::Aggregate, Some(&pcode), "left out: not every lead time could be computed");
            continue;
        }
        for record in area_records {
            data.forecast_admin.upsert_data_unit(record);
        }
        areas_ok += 1;
    }

    Ok(FloodForecast { data, rasters, areas_total: areas.len(), areas_ok })
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Collaborators of a run, injected so tests can replace every one of them.
pub struct Pipeline<'a> {
    pub grids: &'a dyn EnsembleSource,
    pub boundaries: &'a dyn BoundarySource,
    pub reference: &'a mut dyn ReferenceStore,
    pub publisher: &'a mut dyn Publisher,
    /// Where audit exports go; `None` skips them.
    pub audit_dir: Option<PathBuf>,
    pub scenario: Scenario,
}

impl<'a> Pipeline<'a> {
    /// Climate regions and boundaries of every level the drought run needs.
    pub fn extract_drought(
        &mut self,
        config: &CountryConfig,
    ) -> Result<(DataSet<ClimateRegionRecord>, BoundaryIndex), PipelineError> {
        let country = config.iso3.as_str();
        let regions = self.reference.climate_regions(country)?;
        let levels: BTreeSet<u8> = regions
            .units()
            .map(|r| r.adm_level)
            .chain(config.admin_levels.iter().copied())
            .collect();
        let boundaries = BoundaryIndex::load(self.boundaries, country, levels)?;
        for code in config.climate_region_codes() {
            if regions.get_data_unit(code).is_err() {
                logging::warn(
                    Stage::Extract,
                    Some(country),
                    &format!("climate region {} has a lead-time table but no reference record", code),
                );
            }
        }
        logging::info(
            Stage::Extract,
            Some(country),
            &format!("{} climate regions", regions.len()),
        );
        Ok((regions, boundaries))
    }

    fn finish(
        &mut self,
        plan: &PublishPlan,
        mut report: RunReport,
    ) -> Result<RunReport, PipelineError> {
        publish(&mut *self.publisher, plan)?;
        if let Some(dir) = &self.audit_dir {
            report.audit_files = audit::export_events(&dir.join(&report.country), &plan.events)?;
        }
        report.events = plan.events.len();
        report.exposures = plan.exposures.len();
        report.rasters = plan.rasters.len();
        Ok(report)
    }

    pub fn run_drought(
        &mut self,
        config: &CountryConfig,
        issue: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<RunReport, PipelineError> {
        let (regions, boundaries) = self.extract_drought(config)?;
        let forecast = run_drought_forecast(config, self.scenario, self.grids, &boundaries, regions, issue, now)?;
        logging::log_run_summary(&config.iso3, Hazard::Drought.as_str(), forecast.regions_total, forecast.regions_ok);

        let timestamp = forecast.data.forecast_region.timestamp();
        let plan = plan_drought_publication(config, &forecast.data, forecast.rasters, timestamp, now)?;
        let report = RunReport {
            country: config.iso3.clone(),
            hazard: Hazard::Drought,
            timestamp,
            units_total: forecast.regions_total,
            units_ok: forecast.regions_ok,
            events: 0,
            exposures: 0,
            rasters: 0,
            audit_files: Vec::new(),
        };
        self.finish(&plan, report)
    }

    pub fn run_flood(
        &mut self,
        config: &CountryConfig,
        issue: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<RunReport, PipelineError> {
        let boundaries = BoundaryIndex::load(self.boundaries, &config.iso3, config.admin_levels.iter().copied())?;
        let forecast = run_flood_forecast(config, self.grids, &boundaries, issue, now)?;
        logging::log_run_summary(&config.iso3, Hazard::Flood.as_str(), forecast.areas_total, forecast.areas_ok);

        let timestamp = forecast.data.forecast_admin.timestamp();
        let plan = plan_flood_publication(config, &forecast.data, forecast.rasters, timestamp, now)?;
        let report = RunReport {
            country: config.iso3.clone(),
            hazard: Hazard::Flood,
            timestamp,
            units_total: forecast.areas_total,
            units_ok: forecast.areas_ok,
            events: 0,
            exposures: 0,
            rasters: 0,
            audit_files: Vec::new(),
        };
        self.finish(&plan, report)
    }

    /// Runs every configured country.
    pub fn run_configured(
        &mut self,
        config: &PipelineConfig,
        hazard: Hazard,
        issue: NaiveDate,
        now: DateTime<Utc>,
    ) -> BTreeMap<String, Result<RunReport, PipelineError>> {
        let countries: Vec<&str> = config.country_codes().collect();
        self.run_countries(config, hazard, &countries, issue, now)
    }

    /// Runs every listed country in turn. A failing country is logged and
    /// does not stop the others.
    pub fn run_countries(
        &mut self,
        config: &PipelineConfig,
        hazard: Hazard,
        countries: &[&str],
        issue: NaiveDate,
        now: DateTime<Utc>,
    ) -> BTreeMap<String, Result<RunReport, PipelineError>> {
        let mut outcomes = BTreeMap::new();
        for &iso3 in countries {
            let outcome = config.country(iso3).and_then(|country| match hazard {
                Hazard::Drought => self.run_drought(country, issue, now),
                Hazard::Flood => self.run_flood(country, issue, now),
            });
            if let Err(e) = &outcome {
                logging::log_failure(Stage::System, Some(iso3), &format!("{} run", hazard), e);
            }
            outcomes.insert(iso3.to_ascii_uppercase(), outcome);
        }
        outcomes
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_data_timestamp_moves_year_and_month() {
        let now = Utc.with_ymd_and_hms(2025, 4, 17, 6, 5, 4).unwrap();
        let issue = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(
            data_timestamp(issue, now).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 17, 6, 5, 4).unwrap()
        );
    }

    #[test]
    fn test_data_timestamp_caps_day() {
        let now = Utc.with_ymd_and_hms(2025, 3, 31, 12, 0, 0).unwrap();
        let issue = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert_eq!(
            data_timestamp(issue, now).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_population_affected_only_when_triggered() {
        assert_eq!(population_affected(1000, 0.25, true), 250);
        assert_eq!(population_affected(1000, 0.25, false), 0);
    }

    #[test]
    fn test_extent_layer_keeps_missing_cells() {
        let probability = GriddedField::new(vec![0.0], vec![0.0, 1.0, 2.0], vec![0.2, 0.5, f64::NAN]).unwrap();
        let extent = extent_layer(&probability, 0.3);
        assert_eq!(extent.values[0], 0.0);
        assert_eq!(extent.values[1], 1.0);
        assert!(extent.values[2].is_nan());
    }
}
