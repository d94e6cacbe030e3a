//! Trigger decisions and event bookkeeping.
//!
//! Submodules:
//! - `thresholds`: probability/extent classification and alert classes.
//! - `seasons`: month-indexed season tables and in-season suppression.

pub mod seasons;
pub mod thresholds;
