//! Exposure payloads and event construction.
//!
//! Turns the datasets of a run into what the early-warning portal receives:
//! one exposure payload per (event, indicator, admin level), the raster
//! layers, and a final "processed" notification. When no place code ends up
//! in any event, "empty exposure" payloads (every amount 0, no event name)
//! are sent instead so the portal can clear previous alerts.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::seasons::{EVENT_LEAD_TIMES, event_name, valid_events_and_lead_times};
use crate::alert::thresholds::forecast_trigger_status;
use crate::config::{CountryConfig, PortalTrigger};
use crate::datasets::{DroughtDataSets, FloodDataSets};
use crate::logging::{self, Stage};
use crate::model::{AdminRecord, AlertArea, Event, Hazard, Indicator, PipelineError};
use crate::publish::raster::RasterLayer;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposurePlaceCode {
    pub place_code: String,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposurePayload {
    #[serde(rename = "countryCodeISO3")]
    pub country_code_iso3: String,
    pub lead_time: String,
    pub dynamic_indicator: String,
    pub admin_level: u8,
    pub exposure_place_codes: Vec<ExposurePlaceCode>,
    pub disaster_type: String,
    /// `None` marks an empty exposure that clears the portal.
    pub event_name: Option<String>,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessNotification {
    #[serde(rename = "countryCodeISO3")]
    pub country_code_iso3: String,
    pub disaster_type: String,
    pub date: String,
}

/// Everything one country run hands to the publisher, in sending order.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishPlan {
    pub events: Vec<Event>,
    pub exposures: Vec<ExposurePayload>,
    pub rasters: Vec<RasterLayer>,
    pub notification: ProcessNotification,
}

impl PublishPlan {
    pub fn is_empty_exposure(&self) -> bool {
        self.events.is_empty()
    }
}

/// Upload date reported to the portal: the upload's year and month with
/// today's day and time, `YYYY-MM-DDTHH:MM:SSZ`.
pub fn upload_date_string(upload_time: DateTime<Utc>, now: DateTime<Utc>) -> String {
    format!(
        "{}-{:02}-{}",
        upload_time.year(),
        upload_time.month(),
        now.format("%dT%H:%M:%SZ")
    )
}

fn alert_area(record: &AdminRecord, portal: PortalTrigger) -> AlertArea {
    AlertArea {
        admin_level: record.header().adm_level,
        population_affected: record.pop_affected(),
        forecast_severity: u8::from(record.triggered()),
        forecast_trigger: forecast_trigger_status(record.triggered(), portal),
    }
}

/// One payload per (indicator, admin level) for the areas of an event.
fn event_payloads(
    country: &str,
    hazard: Hazard,
    lead_label: &str,
    event: &str,
    date: &str,
    admin_levels: &[u8],
    areas: &BTreeMap<String, AlertArea>,
) -> Vec<ExposurePayload> {
    let mut payloads = Vec::new();
    for indicator in Indicator::ALL {
        for &adm_level in admin_levels {
            let exposure_place_codes = areas
                .iter()
                .filter(|(_, area)| area.admin_level == adm_level)
                .map(|(pcode, area)| ExposurePlaceCode {
                    place_code: pcode.clone(),
                    amount: area.amount(indicator),
                })
                .collect();
            payloads.push(ExposurePayload {
                country_code_iso3: country.to_string(),
                lead_time: lead_label.to_string(),
                dynamic_indicator: indicator.as_str().to_string(),
                admin_level: adm_level,
                exposure_place_codes,
                disaster_type: hazard.as_str().to_string(),
                event_name: Some(event.to_string()),
                date: date.to_string(),
            });
        }
    }
    payloads
}

/// Empty exposure: every (lead time, indicator, admin level) with all known
/// place codes at amount 0 and no event name.
pub fn empty_exposure_payloads(
    country: &str,
    hazard: Hazard,
    lead_times: &BTreeSet<u32>,
    admin_levels: &[u8],
    pcodes_by_level: &BTreeMap<u8, Vec<String>>,
    date: &str,
) -> Vec<ExposurePayload> {
    let mut payloads = Vec::new();
    for &lead_time in lead_times {
        for indicator in Indicator::ALL {
            for &adm_level in admin_levels {
                let exposure_place_codes = pcodes_by_level
                    .get(&adm_level)
                    .map(Vec::as_slice)
                    .unwrap_or(&[])
                    .iter()
                    .map(|pcode| ExposurePlaceCode { place_code: pcode.clone(), amount: 0 })
                    .collect();
                payloads.push(ExposurePayload {
                    country_code_iso3: country.to_string(),
                    lead_time: hazard.lead_time_unit().label(lead_time),
                    dynamic_indicator: indicator.as_str().to_string(),
                    admin_level: adm_level,
                    exposure_place_codes,
                    disaster_type: hazard.as_str().to_string(),
                    event_name: None,
                    date: date.to_string(),
                });
            }
        }
    }
    payloads
}

fn notification(country: &str, hazard: Hazard, date: &str) -> ProcessNotification {
    ProcessNotification {
        country_code_iso3: country.to_string(),
        disaster_type: hazard.as_str().to_string(),
        date: date.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Drought
// ---------------------------------------------------------------------------

/// Builds the drought publication of one country run.
///
/// Events come from regions whose forecast at a valid lead time (0..=3) is
/// triggered or carries an alert class. Regions or admin areas missing from
/// the datasets were dropped earlier in the run and are skipped here.
pub fn plan_drought_publication(
    config: &CountryConfig,
    data: &DroughtDataSets,
    rasters: Vec<RasterLayer>,
    upload_time: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<PublishPlan, PipelineError> {
    let hazard = Hazard::Drought;
    let country = data.country().to_string();
    let date = upload_date_string(upload_time, now);

    let mut events = Vec::new();
    let mut exposures = Vec::new();
    let mut processed: BTreeSet<String> = BTreeSet::new();
    let mut possible_lead_times: BTreeSet<u32> = BTreeSet::new();

    for region_code in data.forecast_region.get_ids() {
        let region = match data.climate_regions.get_data_unit(&region_code) {
            Ok(region) => region,
            Err(e) => {
                logging::log_failure(Stage::Publish, Some(&region_code), "climate region lookup", &e);
                continue;
            }
        };
        let table = config.season_table(&region_code)?;
        let valid = valid_events_and_lead_times(table, upload_time)?;
        possible_lead_times.extend(valid.lead_times());

        for lead_time in EVENT_LEAD_TIMES {
            if !valid.contains_lead_time(lead_time) {
                continue;
            }
            let forecast = match data.forecast_region.get_by_region(&region_code, lead_time) {
                Ok(forecast) => forecast,
                Err(_) => {
                    logging::debug(
                        Stage::Publish,
                        Some(&region_code),
                        &format!("no regional forecast at lead time {}", lead_time),
                    );
                    continue;
                }
            };
            if !(forecast.triggered || forecast.alert_class.is_alert()) {
                continue;
            }

            let season = valid.season_for(lead_time).unwrap_or_default();
            let name = event_name(&region.name, season);
            let lead_label = hazard.lead_time_unit().label(lead_time);

            let mut areas = BTreeMap::new();
            for &adm_level in &config.admin_levels {
                for pcode in region.pcodes_at(adm_level) {
                    match data.forecast_admin.get_by_pcode(pcode, lead_time) {
                        Ok(record) => {
                            areas.insert(pcode.clone(), alert_area(record, config.portal_trigger));
                            processed.insert(pcode.clone());
                        }
                        Err(e) => logging::log_failure(Stage::Publish, Some(pcode), "admin forecast lookup", &e),
                    }
                }
            }

            logging::info(
                Stage::Publish,
                Some(&region_code),
                &format!("event {} at {} with {} alert areas", name, lead_label, areas.len()),
            );
            exposures.extend(event_payloads(
                &country,
                hazard,
                &lead_label,
                &name,
                &date,
                &config.admin_levels,
                &areas,
            ));
            events.push(Event {
                event_name: name,
                date: date.clone(),
                country: country.clone(),
                hazard,
                lead_time: lead_label,
                alert_areas: areas,
            });
        }
    }

    if processed.is_empty() {
        logging::info(Stage::Publish, Some(&country), "no alert areas; sending empty exposure");
        let pcodes_by_level = config
            .admin_levels
            .iter()
            .map(|&level| (level, data.forecast_admin.get_pcodes(level)))
            .collect();
        exposures = empty_exposure_payloads(
            &country,
            hazard,
            &possible_lead_times,
            &config.admin_levels,
            &pcodes_by_level,
            &date,
        );
    }

    Ok(PublishPlan {
        events,
        exposures,
        rasters,
        notification: notification(&country, hazard, &date),
    })
}

// ---------------------------------------------------------------------------
// Flood
// ---------------------------------------------------------------------------

/// Builds the river-flood publication: one event per lead time (days) at
/// which any admin area is triggered or alerted, covering every admin area
/// forecast at that lead time.
pub fn plan_flood_publication(
    config: &CountryConfig,
    data: &FloodDataSets,
    rasters: Vec<RasterLayer>,
    upload_time: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<PublishPlan, PipelineError> {
    let hazard = Hazard::Flood;
    let flood = config.flood()?;
    let country = data.country().to_string();
    let date = upload_date_string(upload_time, now);

    let mut events = Vec::new();
    let mut exposures = Vec::new();

    for &lead_time in &flood.lead_times_days {
        let records: Vec<&AdminRecord> = data
            .forecast_admin
            .units()
            .filter(|r| r.header().lead_time == lead_time)
            .collect();
        if !records.iter().any(|r| r.triggered() || r.alert_class().is_alert()) {
            continue;
        }

        let lead_label = hazard.lead_time_unit().label(lead_time);
        let name = format!("{}_{}", country, lead_label);
        let areas: BTreeMap<String, AlertArea> = records
            .iter()
            .map(|r| (r.header().pcode.clone(), alert_area(r, config.portal_trigger)))
            .collect();

        exposures.extend(event_payloads(
            &country,
            hazard,
            &lead_label,
            &name,
            &date,
            &config.admin_levels,
            &areas,
        ));
        events.push(Event {
            event_name: name,
            date: date.clone(),
            country: country.clone(),
            hazard,
            lead_time: lead_label,
            alert_areas: areas,
        });
    }

    if events.is_empty() {
        logging::info(Stage::Publish, Some(&country), "no flood events; sending empty exposure");
        let lead_times: BTreeSet<u32> = flood.lead_times_days.iter().copied().collect();
        let pcodes_by_level = config
            .admin_levels
            .iter()
            .map(|&level| (level, data.forecast_admin.get_pcodes(level)))
            .collect();
        exposures = empty_exposure_payloads(
            &country,
            hazard,
            &lead_times,
            &config.admin_levels,
            &pcodes_by_level,
            &date,
        );
    }

    Ok(PublishPlan {
        events,
        exposures,
        rasters,
        notification: notification(&country, hazard, &date),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
