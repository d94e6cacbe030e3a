//! Raster layers uploaded to the early-warning portal.
//!
//! Layers are encoded as ESRI ASCII grids (`.asc`), rows north to south,
//! with cells outside the clip written as the NODATA value.

use std::fmt::Write as _;

use crate::model::{ClippedRaster, Hazard};

pub const NODATA: f64 = -9999.0;

/// One raster file for one lead time.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterLayer {
    pub hazard: Hazard,
    pub lead_time: u32,
    pub file_name: String,
    pub raster: ClippedRaster,
}

impl RasterLayer {
    /// `{prefix}_{lead}-{unit}_{ISO3}.asc`, e.g. `drought_extent_2-month_KEN.asc`.
    pub fn new(hazard: Hazard, country: &str, lead_time: u32, raster: ClippedRaster) -> Self {
        let prefix = match hazard {
            Hazard::Drought => "drought_extent",
            Hazard::Flood => "flood_extent",
        };
        RasterLayer {
            hazard,
            lead_time,
            file_name: format!("{}_{}_{}.asc", prefix, hazard.lead_time_unit().label(lead_time), country),
            raster,
        }
    }

    /// Encodes the layer as an ASCII grid. Empty rasters encode as a header
    /// without rows.
    pub fn to_ascii_grid(&self) -> String {
        let r = &self.raster;
        let spacing = |axis: &[f64]| match axis {
            [a, b, ..] => (b - a).abs(),
            _ => 1.0,
        };
        let dx = spacing(&r.longitudes);
        let dy = spacing(&r.latitudes);
        let min = |axis: &[f64]| axis.iter().copied().fold(f64::INFINITY, f64::min);
        let (x_min, y_min) = if r.values.is_empty() {
            (0.0, 0.0)
        } else {
            (min(&r.longitudes), min(&r.latitudes))
        };

        let mut out = String::new();
        let _ = writeln!(out, "ncols {}", r.longitudes.len());
        let _ = writeln!(out, "nrows {}", r.latitudes.len());
        let _ = writeln!(out, "xllcorner {}", x_min - dx / 2.0);
        let _ = writeln!(out, "yllcorner {}", y_min - dy / 2.0);
        if (dx - dy).abs() < 1e-12 {
            let _ = writeln!(out, "cellsize {}", dx);
        } else {
            let _ = writeln!(out, "dx {}", dx);
            let _ = writeln!(out, "dy {}", dy);
        }
        let _ = writeln!(out, "NODATA_value {}", NODATA);

        // Rows north to south, columns west to east.
        let mut rows: Vec<usize> = (0..r.latitudes.len()).collect();
        rows.sort_by(|&a, &b| r.latitudes[b].total_cmp(&r.latitudes[a]));
        let mut cols: Vec<usize> = (0..r.longitudes.len()).collect();
        cols.sort_by(|&a, &b| r.longitudes[a].total_cmp(&r.longitudes[b]));

        for y in rows {
            let line: Vec<String> = cols
                .iter()
                .map(|&x| {
                    let v = r.values[y * r.longitudes.len() + x]
                        .filter(|v| !v.is_nan())
                        .unwrap_or(NODATA);
                    format!("{}", v)
                })
                .collect();
            let _ = writeln!(out, "{}", line.join(" "));
        }
        out
    }
}
