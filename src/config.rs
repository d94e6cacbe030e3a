/// Pipeline configuration.
///
/// Per-country settings are read from a TOML file and validated once at load
/// time into a `CountryConfig`: trigger model names are resolved, probability
/// settings range-checked and every climate region's season table parsed.
/// Downstream code never sees raw configuration values.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::alert::seasons::SeasonTable;
use crate::analysis::climatology::TriggerModel;
use crate::model::PipelineError;

// ---------------------------------------------------------------------------
// Raw TOML shape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    countries: Vec<RawCountry>,
}

#[derive(Debug, Deserialize)]
struct RawCountry {
    name: String,
    admin_levels: Vec<u8>,
    #[serde(default)]
    pipeline_will_trigger_portal: PortalTrigger,
    trigger_model: Option<RawTriggerModel>,
    #[serde(default)]
    climate_region: Vec<RawClimateRegion>,
    flood: Option<RawFlood>,
}

#[derive(Debug, Deserialize)]
struct RawTriggerModel {
    model: String,
    tercile_threshold: f64,
    trigger_on_minimum_probability: f64,
    trigger_on_minimum_admin_area_in_drought_extent: f64,
    alert_on_minimum_probability: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawClimateRegion {
    climate_region_code: String,
    leadtime: BTreeMap<String, Vec<BTreeMap<String, String>>>,
}

#[derive(Debug, Deserialize)]
struct RawFlood {
    return_period_quantile: f64,
    trigger_on_minimum_probability: f64,
    trigger_on_minimum_admin_area_in_flood_extent: f64,
    #[serde(default = "default_flood_lead_times")]
    lead_times_days: Vec<u32>,
}

fn default_flood_lead_times() -> Vec<u32> {
    (0..=7).collect()
}

// ---------------------------------------------------------------------------
// Validated configuration
// ---------------------------------------------------------------------------

/// Whether a triggered forecast may switch the portal into trigger mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortalTrigger {
    Enabled,
    #[default]
    Disabled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DroughtTriggerConfig {
    pub model: TriggerModel,
    /// Hindcast quantile below which a month counts as dry.
    pub tercile_threshold: f64,
    pub trigger_on_minimum_probability: f64,
    /// Share of a region's cells that must exceed the probability.
    pub min_area_fraction: f64,
    pub alert_on_minimum_probability: Option<f64>,
}

impl DroughtTriggerConfig {
    /// Applies a debug scenario override to the trigger probability.
    pub fn with_scenario(mut self, scenario: Scenario) -> Self {
        if let Some(p) = scenario.probability_override() {
            self.trigger_on_minimum_probability = p;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FloodTriggerConfig {
    /// Hindcast quantile standing in for the return-period discharge.
    pub return_period_quantile: f64,
    pub trigger_on_minimum_probability: f64,
    pub min_area_fraction: f64,
    pub lead_times_days: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountryConfig {
    pub iso3: String,
    pub admin_levels: Vec<u8>,
    pub portal_trigger: PortalTrigger,
    drought: Option<DroughtTriggerConfig>,
    climate_regions: BTreeMap<String, SeasonTable>,
    flood: Option<FloodTriggerConfig>,
}

impl CountryConfig {
    pub fn drought(&self) -> Result<&DroughtTriggerConfig, PipelineError> {
        self.drought.as_ref().ok_or_else(|| {
            PipelineError::Configuration(format!("no drought trigger model for {}", self.iso3))
        })
    }

    pub fn flood(&self) -> Result<&FloodTriggerConfig, PipelineError> {
        self.flood.as_ref().ok_or_else(|| {
            PipelineError::Configuration(format!("no flood settings for {}", self.iso3))
        })
    }

    pub fn season_table(&self, region_code: &str) -> Result<&SeasonTable, PipelineError> {
        self.climate_regions.get(region_code).ok_or_else(|| {
            PipelineError::Configuration(format!(
                "no lead-time table for climate region {} of {}",
                region_code, self.iso3
            ))
        })
    }

    pub fn climate_region_codes(&self) -> impl Iterator<Item = &str> {
        self.climate_regions.keys().map(String::as_str)
    }

    /// Lowest configured admin level, used for country-wide layers.
    pub fn base_admin_level(&self) -> u8 {
        self.admin_levels.iter().copied().min().unwrap_or(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    countries: BTreeMap<String, CountryConfig>,
}

impl PipelineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, PipelineError> {
        let raw: RawConfig = toml::from_str(text)
            .map_err(|e| PipelineError::Configuration(format!("invalid configuration: {}", e)))?;

        let mut countries = BTreeMap::new();
        for country in raw.countries {
            let validated = validate_country(country)?;
            countries.insert(validated.iso3.clone(), validated);
        }
        Ok(PipelineConfig { countries })
    }

    pub fn country(&self, iso3: &str) -> Result<&CountryConfig, PipelineError> {
        self.countries
            .get(&iso3.to_ascii_uppercase())
            .ok_or_else(|| PipelineError::Configuration(format!("no config found for country {}", iso3)))
    }

    pub fn country_codes(&self) -> impl Iterator<Item = &str> {
        self.countries.keys().map(String::as_str)
    }
}

fn check_probability(iso3: &str, key: &str, value: f64) -> Result<f64, PipelineError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(PipelineError::Configuration(format!(
            "{} of {} must be within [0, 1], got {}",
            key, iso3, value
        )))
    }
}

fn validate_country(raw: RawCountry) -> Result<CountryConfig, PipelineError> {
    let iso3 = raw.name.to_ascii_uppercase();
    if raw.admin_levels.is_empty() {
        return Err(PipelineError::Configuration(format!(
            "admin_levels of {} must not be empty",
            iso3
        )));
    }

    let drought = match raw.trigger_model {
        Some(t) => Some(DroughtTriggerConfig {
            model: TriggerModel::from_name(&t.model)?,
            tercile_threshold: check_probability(&iso3, "tercile_threshold", t.tercile_threshold)?,
            trigger_on_minimum_probability: check_probability(
                &iso3,
                "trigger_on_minimum_probability",
                t.trigger_on_minimum_probability,
            )?,
            min_area_fraction: check_probability(
                &iso3,
                "trigger_on_minimum_admin_area_in_drought_extent",
                t.trigger_on_minimum_admin_area_in_drought_extent,
            )?,
            alert_on_minimum_probability: t
                .alert_on_minimum_probability
                .map(|p| check_probability(&iso3, "alert_on_minimum_probability", p))
                .transpose()?,
        }),
        None => None,
    };

    let mut climate_regions = BTreeMap::new();
    for region in raw.climate_region {
        let table = SeasonTable::from_labels(&region.climate_region_code, &region.leadtime)?;
        climate_regions.insert(region.climate_region_code, table);
    }

    let flood = match raw.flood {
        Some(f) => Some(FloodTriggerConfig {
            return_period_quantile: check_probability(
                &iso3,
                "return_period_quantile",
                f.return_period_quantile,
            )?,
            trigger_on_minimum_probability: check_probability(
                &iso3,
                "flood.trigger_on_minimum_probability",
                f.trigger_on_minimum_probability,
            )?,
            min_area_fraction: check_probability(
                &iso3,
                "trigger_on_minimum_admin_area_in_flood_extent",
                f.trigger_on_minimum_admin_area_in_flood_extent,
            )?,
            lead_times_days: f.lead_times_days,
        }),
        None => None,
    };

    Ok(CountryConfig {
        iso3,
        admin_levels: raw.admin_levels,
        portal_trigger: raw.pipeline_will_trigger_portal,
        drought,
        climate_regions,
        flood,
    })
}

// ---------------------------------------------------------------------------
// Debug scenarios
// ---------------------------------------------------------------------------

/// Debug-run scenario forcing the trigger probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scenario {
    #[default]
    Forecast,
    Warning,
    NoWarning,
}

impl Scenario {
    pub fn parse(name: &str) -> Self {
        match name {
            "Warning" => Scenario::Warning,
            "NoWarning" => Scenario::NoWarning,
            _ => Scenario::Forecast,
        }
    }

    /// Reads `SCENARIO` from the environment; unset means `Forecast`.
    pub fn from_env() -> Self {
        std::env::var("SCENARIO")
            .map(|s| Scenario::parse(&s))
            .unwrap_or_default()
    }

    pub fn probability_override(&self) -> Option<f64> {
        match self {
            Scenario::Forecast => None,
            Scenario::Warning => Some(0.3),
            Scenario::NoWarning => Some(0.99),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
