/// Data sources feeding the pipelines.
///
/// Submodules:
/// - `grid`: decoded ensemble fields and rate-to-accumulation conversion.
/// - `boundaries`: GeoJSON admin boundaries per admin level.

pub mod boundaries;
pub mod grid;
