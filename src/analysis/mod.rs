/// Numerical core of the trigger pipelines.
///
/// Everything here is a pure transform over gridded fields; loading,
/// persisting and publishing live elsewhere.
///
/// Submodules:
/// - `climatology`: hindcast quantiles, forecast probabilities, anomalies.
/// - `spatial`: regional weighted means, resampling and polygon clipping.

pub mod climatology;
pub mod spatial;
