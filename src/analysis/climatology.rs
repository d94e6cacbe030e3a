//! Ensemble climatology comparison.
//!
//! Compares a forecast ensemble against a hindcast climatology: per lead time
//! and grid cell, the hindcast quantile (pooled over members and historical
//! years) becomes a threshold, and the share of forecast members beyond that
//! threshold becomes a probability in [0, 1].
//!
//! All functions are pure; persisting intermediate layers is up to callers.

use crate::model::{GriddedEnsembleField, GriddedField, PipelineError};

// ---------------------------------------------------------------------------
// Trigger models
// ---------------------------------------------------------------------------

/// Supported trigger models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerModel {
    /// Compares each monthly lead time on its own.
    SeasonalRainfall,
    /// Compares 3-month accumulations starting at each lead time.
    SeasonalRainfall3m,
}

impl TriggerModel {
    pub fn from_name(name: &str) -> Result<Self, PipelineError> {
        match name {
            "seasonal_rainfall_forecast" => Ok(TriggerModel::SeasonalRainfall),
            "seasonal_rainfall_forecast_3m" => Ok(TriggerModel::SeasonalRainfall3m),
            other => Err(PipelineError::Configuration(format!(
                "trigger model '{}' not supported",
                other
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TriggerModel::SeasonalRainfall => "seasonal_rainfall_forecast",
            TriggerModel::SeasonalRainfall3m => "seasonal_rainfall_forecast_3m",
        }
    }

    /// Applies the model's temporal aggregation to a field.
    pub fn prepare(&self, field: &GriddedEnsembleField) -> GriddedEnsembleField {
        match self {
            TriggerModel::SeasonalRainfall => field.clone(),
            TriggerModel::SeasonalRainfall3m => rolling_sum(field, 3),
        }
    }
}

/// Forward rolling sum over `window` consecutive lead-time steps.
///
/// Step `i` holds the sum of steps `i..i + window`; windows running past the
/// last step are truncated. `NaN`s are skipped; an all-`NaN` window stays `NaN`.
pub fn rolling_sum(field: &GriddedEnsembleField, window: usize) -> GriddedEnsembleField {
    let steps = field.lead_times.len();
    let mut out = field.clone();
    for m in 0..field.members {
        for l in 0..steps {
            let end = (l + window).min(steps);
            for y in 0..field.latitudes.len() {
                for x in 0..field.longitudes.len() {
                    let window_values: Vec<f64> = (l..end)
                        .map(|s| field.get(m, s, y, x))
                        .filter(|v| !v.is_nan())
                        .collect();
                    let sum = if window_values.is_empty() {
                        f64::NAN
                    } else {
                        window_values.iter().sum()
                    };
                    out.set(m, l, y, x, sum);
                }
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Which side of the threshold counts as "beyond".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tail {
    /// Members at or below the threshold (drought).
    Lower,
    /// Members strictly above the threshold (flood).
    Upper,
}

impl Tail {
    fn beyond(&self, value: f64, threshold: f64) -> bool {
        match self {
            Tail::Lower => value <= threshold,
            Tail::Upper => value > threshold,
        }
    }
}

/// Linear-interpolation quantile (the usual "type 7" definition), `NaN`s
/// skipped. Returns `NaN` when no valid value remains.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    let mut valid: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if valid.is_empty() {
        return f64::NAN;
    }
    valid.sort_by(|a, b| a.total_cmp(b));
    let q = q.clamp(0.0, 1.0);
    let h = (valid.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    valid[lo] + (h - lo as f64) * (valid[hi] - valid[lo])
}

/// Mean ignoring `NaN`s; `NaN` if nothing is left.
pub fn nan_mean(values: &[f64]) -> f64 {
    let valid: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if valid.is_empty() {
        f64::NAN
    } else {
        valid.iter().sum::<f64>() / valid.len() as f64
    }
}

/// Per-cell quantile over all samples of one lead-time index.
pub fn quantile_field(field: &GriddedEnsembleField, lead: usize, q: f64) -> GriddedField {
    GriddedField::from_fn(field.latitudes.clone(), field.longitudes.clone(), |y, x| {
        quantile(&field.member_values(lead, y, x), q)
    })
}

/// Per-cell mean over all samples of one lead-time index.
pub fn mean_field(field: &GriddedEnsembleField, lead: usize) -> GriddedField {
    GriddedField::from_fn(field.latitudes.clone(), field.longitudes.clone(), |y, x| {
        nan_mean(&field.member_values(lead, y, x))
    })
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// Thresholds and probabilities, one field per hindcast lead time.
#[derive(Debug, Clone, PartialEq)]
pub struct PerLeadTimeThresholds {
    pub lead_times: Vec<u32>,
    pub thresholds: Vec<GriddedField>,
    pub probabilities: Vec<GriddedField>,
}

impl PerLeadTimeThresholds {
    pub fn threshold(&self, lead_time: u32) -> Option<&GriddedField> {
        let i = self.lead_times.iter().position(|&l| l == lead_time)?;
        self.thresholds.get(i)
    }

    pub fn probability(&self, lead_time: u32) -> Option<&GriddedField> {
        let i = self.lead_times.iter().position(|&l| l == lead_time)?;
        self.probabilities.get(i)
    }
}

fn check_same_grid(a: &GriddedEnsembleField, b: &GriddedEnsembleField) -> Result<(), PipelineError> {
    let same = a.latitudes.len() == b.latitudes.len()
        && a.longitudes.len() == b.longitudes.len()
        && a.latitudes.iter().zip(&b.latitudes).all(|(p, q)| (p - q).abs() < 1e-9)
        && a.longitudes.iter().zip(&b.longitudes).all(|(p, q)| (p - q).abs() < 1e-9);
    if !same {
        return Err(PipelineError::IncompatibleGrid(
            "hindcast and forecast grids differ; resample before comparing".to_string(),
        ));
    }
    if a.unit != b.unit {
        return Err(PipelineError::IncompatibleGrid(format!(
            "hindcast unit {:?} differs from forecast unit {:?}",
            a.unit, b.unit
        )));
    }
    Ok(())
}

/// Compares a forecast ensemble to the hindcast climatology.
///
/// For each hindcast lead time: threshold = `q`-quantile of the hindcast per
/// cell; probability = share of forecast members beyond the threshold on the
/// given tail. Cells with no valid hindcast value get a `NaN` probability.
pub fn compare(
    hindcast: &GriddedEnsembleField,
    forecast: &GriddedEnsembleField,
    q: f64,
    tail: Tail,
) -> Result<PerLeadTimeThresholds, PipelineError> {
    check_same_grid(hindcast, forecast)?;

    let mut result = PerLeadTimeThresholds {
        lead_times: Vec::with_capacity(hindcast.lead_times.len()),
        thresholds: Vec::with_capacity(hindcast.lead_times.len()),
        probabilities: Vec::with_capacity(hindcast.lead_times.len()),
    };

    for (h_lead, &lead_time) in hindcast.lead_times.iter().enumerate() {
        let f_lead = forecast.lead_index(lead_time).ok_or_else(|| {
            PipelineError::IncompatibleGrid(format!(
                "forecast has no lead time {} present in the hindcast",
                lead_time
            ))
        })?;

        let threshold = quantile_field(hindcast, h_lead, q);
        let probability =
            GriddedField::from_fn(forecast.latitudes.clone(), forecast.longitudes.clone(), |y, x| {
                let Some(t) = threshold.get(y, x).filter(|t| !t.is_nan()) else {
                    return f64::NAN;
                };
                let beyond = (0..forecast.members)
                    .filter(|&m| tail.beyond(forecast.get(m, f_lead, y, x), t))
                    .count();
                beyond as f64 / forecast.members as f64
            });

        result.lead_times.push(lead_time);
        result.thresholds.push(threshold);
        result.probabilities.push(probability);
    }

    Ok(result)
}

/// Forecast anomalies: each forecast member minus the hindcast mean (over
/// members and years) of the same cell and lead time.
pub fn anomalies(
    forecast: &GriddedEnsembleField,
    hindcast: &GriddedEnsembleField,
) -> Result<GriddedEnsembleField, PipelineError> {
    check_same_grid(hindcast, forecast)?;
    let means = hindcast
        .lead_times
        .iter()
        .enumerate()
        .map(|(h_lead, &lead_time)| (lead_time, mean_field(hindcast, h_lead)))
        .collect::<Vec<_>>();

    let mut out = forecast.clone();
    for (f_lead, lead_time) in forecast.lead_times.iter().enumerate() {
        let mean = means
            .iter()
            .find(|(l, _)| l == lead_time)
            .map(|(_, m)| m)
            .ok_or_else(|| {
                PipelineError::IncompatibleGrid(format!(
                    "hindcast has no lead time {} present in the forecast",
                    lead_time
                ))
            })?;
        for m in 0..forecast.members {
            for y in 0..forecast.latitudes.len() {
                for x in 0..forecast.longitudes.len() {
                    out.set(m, f_lead, y, x, forecast.get(m, f_lead, y, x) - mean.get(y, x).unwrap_or(f64::NAN));
                }
            }
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Regional terciles
// ---------------------------------------------------------------------------

/// Regional climatology bounds of one lead time, as anomalies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TercileThresholds {
    pub min: f64,
    pub lower: f64,
    pub upper: f64,
    pub max: f64,
}

/// Terciles of regional hindcast means, taken as anomalies from their own mean.
pub fn regional_terciles(hindcast_regional_means: &[f64]) -> TercileThresholds {
    let mean = nan_mean(hindcast_regional_means);
    let anomalies: Vec<f64> = hindcast_regional_means.iter().map(|v| v - mean).collect();
    TercileThresholds {
        min: quantile(&anomalies, 0.0),
        lower: quantile(&anomalies, 1.0 / 3.0),
        upper: quantile(&anomalies, 2.0 / 3.0),
        max: quantile(&anomalies, 1.0),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
