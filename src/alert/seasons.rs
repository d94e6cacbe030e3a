//! Season windowing for drought events.
//!
//! Every climate region carries a month-indexed table listing, for the issue
//! month, which rainy seasons are ahead and at what lead time. An event can
//! only be announced for a (season, lead time) listed for the current month.
//!
//! In-season events (lead time 0) are held back when the same season was
//! already at lead time 0 in the previous calendar month's table: exposure
//! figures must not be refreshed while a season is under way. The rule looks
//! only at the previous month's table, not at whether anything was actually
//! triggered last cycle.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use chrono::{DateTime, Datelike, Utc};

use crate::model::{PipelineError, parse_lead_time_label};

/// Lead times (months) that may become published events.
pub const EVENT_LEAD_TIMES: RangeInclusive<u32> = 0..=3;

/// Lead times (months) computed and persisted every cycle.
pub const COMPUTED_LEAD_TIMES: RangeInclusive<u32> = 0..=5;

pub const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// One season listed for a month, with its lead time in months.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonLead {
    pub season: String,
    pub lead_time: u32,
}

/// Month-indexed season/lead-time table of one climate region.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonTable {
    pub region_code: String,
    months: Vec<Vec<SeasonLead>>,
}

impl SeasonTable {
    /// `months[0]` is January. All twelve months are required.
    pub fn new(region_code: &str, months: Vec<Vec<SeasonLead>>) -> Result<Self, PipelineError> {
        if months.len() != 12 {
            return Err(PipelineError::Configuration(format!(
                "lead-time table of climate region {} has {} months, expected 12",
                region_code,
                months.len()
            )));
        }
        Ok(Self { region_code: region_code.to_string(), months })
    }

    /// Builds a table from configuration labels:
    /// `{ "Jan": [{ "MAM": "2-month" }], ... }`.
    pub fn from_labels(
        region_code: &str,
        labels: &BTreeMap<String, Vec<BTreeMap<String, String>>>,
    ) -> Result<Self, PipelineError> {
        let mut months = Vec::with_capacity(12);
        for abbreviation in MONTH_ABBREVIATIONS {
            let entries = labels.get(abbreviation).ok_or_else(|| {
                PipelineError::Configuration(format!(
                    "lead-time table of climate region {} is missing month {}",
                    region_code, abbreviation
                ))
            })?;
            let mut month = Vec::new();
            for entry in entries {
                for (season, label) in entry {
                    let lead_time = parse_lead_time_label(label).ok_or_else(|| {
                        PipelineError::Configuration(format!(
                            "invalid lead time '{}' for season {} in {} of climate region {}",
                            label, season, abbreviation, region_code
                        ))
                    })?;
                    month.push(SeasonLead { season: season.clone(), lead_time });
                }
            }
            months.push(month);
        }
        Self::new(region_code, months)
    }

    /// Entries for a calendar month (1 = January).
    pub fn entries(&self, month: u32) -> &[SeasonLead] {
        let index = (month.clamp(1, 12) - 1) as usize;
        &self.months[index]
    }

    pub fn lead_time_of(&self, month: u32, season: &str) -> Option<u32> {
        self.entries(month)
            .iter()
            .find(|e| e.season == season)
            .map(|e| e.lead_time)
    }

    /// First season listed for `lead_time` in the given month.
    pub fn season_at(&self, month: u32, lead_time: u32) -> Option<&str> {
        self.entries(month)
            .iter()
            .find(|e| e.lead_time == lead_time)
            .map(|e| e.season.as_str())
    }
}

/// Calendar month preceding `month` (January wraps to December).
pub fn previous_month(month: u32) -> u32 {
    if month <= 1 { 12 } else { month - 1 }
}

// ---------------------------------------------------------------------------
// Valid events
// ---------------------------------------------------------------------------

/// Seasons that may be announced this cycle, with their lead times, in
/// table order. A season listed twice keeps its last lead time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidEvents {
    entries: Vec<SeasonLead>,
}

impl ValidEvents {
    fn insert(&mut self, season: &str, lead_time: u32) {
        match self.entries.iter_mut().find(|e| e.season == season) {
            Some(existing) => existing.lead_time = lead_time,
            None => self.entries.push(SeasonLead { season: season.to_string(), lead_time }),
        }
    }

    pub fn contains_lead_time(&self, lead_time: u32) -> bool {
        self.entries.iter().any(|e| e.lead_time == lead_time)
    }

    pub fn lead_times(&self) -> Vec<u32> {
        self.entries.iter().map(|e| e.lead_time).collect()
    }

    /// Season announced at `lead_time`; one event per lead time is assumed.
    pub fn season_for(&self, lead_time: u32) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.lead_time == lead_time)
            .map(|e| e.season.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Valid (season, lead time) pairs for the month of `upload_time`.
///
/// A lead time of 0 is kept only if the season was not also at lead time 0
/// in the previous month. A season at lead time 0 that last month's table
/// does not list is a configuration error.
pub fn valid_events_and_lead_times(
    table: &SeasonTable,
    upload_time: DateTime<Utc>,
) -> Result<ValidEvents, PipelineError> {
    let month = upload_time.month();
    let last_month = previous_month(month);

    let mut valid = ValidEvents::default();
    for entry in table.entries(month) {
        if entry.lead_time != 0 {
            valid.insert(&entry.season, entry.lead_time);
            continue;
        }
        match table.lead_time_of(last_month, &entry.season) {
            Some(0) => {}
            Some(_) => valid.insert(&entry.season, entry.lead_time),
            None => {
                return Err(PipelineError::Configuration(format!(
                    "climate region {}: season {} is in season in {} but missing from {}",
                    table.region_code,
                    entry.season,
                    MONTH_ABBREVIATIONS[month as usize - 1],
                    MONTH_ABBREVIATIONS[last_month as usize - 1]
                )));
            }
        }
    }
    Ok(valid)
}

/// Event name for a season in a climate region.
///
/// Regions whose name starts with "national" (before any `_`) report
/// country-wide events.
pub fn event_name(region_name: &str, season: &str) -> String {
    let prefix = region_name.split('_').next().unwrap_or_default();
    if prefix.eq_ignore_ascii_case("national") {
        format!("{}_National", season)
    } else {
        format!("{} {}_{}", region_name, season, region_name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_month(month: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, month, 10, 8, 0, 0).unwrap()
    }

    /// Table where "OND" runs up to October, is in season Oct-Dec, and "MAM"
    /// follows the same pattern for March.
    fn sample_table() -> SeasonTable {
        let lead = |season: &str, lead_time: u32| SeasonLead { season: season.to_string(), lead_time };
        let months = vec![
            vec![lead("MAM", 2)],             // Jan
            vec![lead("MAM", 1)],             // Feb
            vec![lead("MAM", 0)],             // Mar
            vec![lead("MAM", 0)],             // Apr
            vec![lead("MAM", 0)],             // May
            vec![lead("OND", 4)],             // Jun
            vec![lead("OND", 3)],             // Jul
            vec![lead("OND", 2)],             // Aug
            vec![lead("OND", 1)],             // Sep
            vec![lead("OND", 0)],             // Oct
            vec![lead("OND", 0)],             // Nov
            vec![lead("OND", 0), lead("MAM", 3)], // Dec
        ];
        SeasonTable::new("R1", months).unwrap()
    }

    #[test]
    fn test_in_season_first_month_is_valid() {
        // Feb had MAM at 1-month, March has it at 0-month: announce.
        let valid = valid_events_and_lead_times(&sample_table(), at_month(3)).unwrap();
        assert!(valid.contains_lead_time(0));
        assert_eq!(valid.season_for(0), Some("MAM"));
    }

    #[test]
    fn test_in_season_second_month_is_excluded() {
        // March and April both list MAM at 0-month: suppressed.
        let valid = valid_events_and_lead_times(&sample_table(), at_month(4)).unwrap();
        assert!(!valid.contains_lead_time(0));
        assert!(valid.is_empty());
    }

    #[test]
    fn test_non_zero_lead_times_always_valid() {
        let valid = valid_events_and_lead_times(&sample_table(), at_month(7)).unwrap();
        assert_eq!(valid.lead_times(), vec![3]);
        assert_eq!(valid.season_for(3), Some("OND"));
    }

    #[test]
    fn test_january_looks_back_to_december() {
        let lead = |season: &str, lead_time: u32| SeasonLead { season: season.to_string(), lead_time };
        let mut months = vec![Vec::new(); 12];
        months[0] = vec![lead("DJF", 0)];
        months[11] = vec![lead("DJF", 0)];
        let table = SeasonTable::new("R2", months).unwrap();
        let valid = valid_events_and_lead_times(&table, at_month(1)).unwrap();
        assert!(!valid.contains_lead_time(0));
    }

    #[test]
    fn test_mixed_month_keeps_only_eligible_entries() {
        // December: OND still in season (excluded), MAM at 3 months (valid).
        let valid = valid_events_and_lead_times(&sample_table(), at_month(12)).unwrap();
        assert_eq!(valid.lead_times(), vec![3]);
        assert_eq!(valid.season_for(0), None);
    }

    #[test]
    fn test_season_absent_last_month_is_config_error() {
        let lead = |season: &str, lead_time: u32| SeasonLead { season: season.to_string(), lead_time };
        let mut months = vec![Vec::new(); 12];
        months[4] = vec![lead("JJA", 0)];
        months[5] = vec![lead("SON", 3)];
        let table = SeasonTable::new("R3", months).unwrap();
        let err = valid_events_and_lead_times(&table, at_month(5)).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert!(err.to_string().contains("missing from Apr"));

        // Only 0-month entries look back: June's SON is new at 3 months.
        let valid = valid_events_and_lead_times(&table, at_month(6)).unwrap();
        assert_eq!(valid.season_for(3), Some("SON"));
    }

    #[test]
    fn test_from_labels_requires_all_months() {
        let mut labels = BTreeMap::new();
        labels.insert(
            "Jan".to_string(),
            vec![BTreeMap::from([("MAM".to_string(), "2-month".to_string())])],
        );
        let err = SeasonTable::from_labels("R1", &labels).unwrap_err();
        assert!(err.to_string().contains("missing month Feb"));
    }

    #[test]
    fn test_from_labels_rejects_bad_lead_time() {
        let labels: BTreeMap<String, Vec<BTreeMap<String, String>>> = MONTH_ABBREVIATIONS
            .iter()
            .map(|m| {
                (
                    m.to_string(),
                    vec![BTreeMap::from([("MAM".to_string(), "two months".to_string())])],
                )
            })
            .collect();
        assert!(matches!(
            SeasonTable::from_labels("R1", &labels),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_previous_month_wraps() {
        assert_eq!(previous_month(1), 12);
        assert_eq!(previous_month(7), 6);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(event_name("National_Kenya", "MAM"), "MAM_National");
        assert_eq!(event_name("national", "OND"), "OND_National");
        assert_eq!(event_name("Coast", "OND"), "Coast OND_Coast");
    }
}
