//! Trigger classification.
//!
//! Turns a probability raster clipped to a region into a trigger decision:
//! the region triggers when the share of its cells whose probability exceeds
//! the configured minimum probability is larger than the configured minimum
//! area fraction. The extent test is purely areal, not population weighted.

use crate::config::PortalTrigger;
use crate::model::{AlertClass, ClippedRaster};

/// Outcome of classifying one region at one lead time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerDecision {
    pub triggered: bool,
    /// Median cell probability, rounded to 2 decimals.
    pub likelihood: f64,
    /// Share of in-polygon cells above the probability threshold.
    pub extent_fraction: f64,
}

/// Classifies the in-polygon cells of a clipped probability raster.
///
/// Returns `None` when the clip retained no valid cell, so a region with no
/// data is never reported as "not triggered".
pub fn classify_clipped(
    clipped: &ClippedRaster,
    prob_threshold: f64,
    min_area_fraction: f64,
) -> Option<TriggerDecision> {
    classify(&clipped.inside_values(), prob_threshold, min_area_fraction)
}

/// Classifies a set of cell probabilities.
pub fn classify(
    probabilities: &[f64],
    prob_threshold: f64,
    min_area_fraction: f64,
) -> Option<TriggerDecision> {
    let likelihood = median(probabilities)?;
    let extent_fraction = fraction_over_threshold(probabilities, prob_threshold);
    Some(TriggerDecision {
        triggered: is_triggered(extent_fraction, min_area_fraction),
        likelihood: round2(likelihood),
        extent_fraction,
    })
}

/// Strictly greater than: an extent equal to the minimum does not trigger.
pub fn is_triggered(percent_cells_over_threshold: f64, min_area_fraction: f64) -> bool {
    percent_cells_over_threshold > min_area_fraction
}

/// Share of values strictly above `threshold`. `NaN`s are ignored.
pub fn fraction_over_threshold(values: &[f64], threshold: f64) -> f64 {
    let valid: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if valid.is_empty() {
        return 0.0;
    }
    valid.iter().filter(|&&v| v > threshold).count() as f64 / valid.len() as f64
}

/// Share of ensemble members strictly below `threshold`, over all members.
pub fn member_share_below(members: &[f64], threshold: f64) -> f64 {
    if members.is_empty() {
        return 0.0;
    }
    members.iter().filter(|&&v| v < threshold).count() as f64 / members.len() as f64
}

/// Median ignoring `NaN`s; `None` if nothing is left.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut valid: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if valid.is_empty() {
        return None;
    }
    valid.sort_by(|a, b| a.total_cmp(b));
    let mid = valid.len() / 2;
    if valid.len() % 2 == 0 {
        Some((valid[mid - 1] + valid[mid]) / 2.0)
    } else {
        Some(valid[mid])
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Alert class for a region.
///
/// A trigger is always `Max`. Below trigger, a likelihood at or above the
/// optional alert probability gives `Med`; otherwise `No`.
pub fn alert_class(triggered: bool, likelihood: f64, alert_on_minimum_probability: Option<f64>) -> AlertClass {
    if triggered {
        return AlertClass::Max;
    }
    match alert_on_minimum_probability {
        Some(min) if likelihood >= min => AlertClass::Med,
        _ => AlertClass::No,
    }
}

/// Value of the `forecast_trigger` indicator: 1 only when the region
/// triggered and the country lets the pipeline trigger the portal.
pub fn forecast_trigger_status(triggered: bool, portal: PortalTrigger) -> u8 {
    match (triggered, portal) {
        (true, PortalTrigger::Enabled) => 1,
        _ => 0,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
