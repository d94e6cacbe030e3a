//! Spatial aggregation over regions.
//!
//! Two ways of reducing a grid to a region are used:
//! - `aggregate`: cos(latitude)-weighted mean over the cells whose centre lies
//!   in the region's bounding box (regional rainfall series).
//! - `clip`: the cells inside or touching the region's polygons, kept as a
//!   cropped raster (probability and extent layers).
//!
//! Grid longitudes may come as 0..360 while boundaries use -180..180; both
//! paths normalise before comparing.

use geo::{BoundingRect, Intersects, MultiPolygon, Point, Rect, coord};

use crate::model::{ClippedRaster, GriddedEnsembleField, GriddedField, PipelineError};

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl Bounds {
    pub fn of(geometry: &MultiPolygon<f64>) -> Option<Bounds> {
        let rect = geometry.bounding_rect()?;
        Some(Bounds {
            min_lon: rect.min().x,
            min_lat: rect.min().y,
            max_lon: rect.max().x,
            max_lat: rect.max().y,
        })
    }

    /// True when the box spans every longitude.
    pub fn is_global(&self) -> bool {
        self.max_lon - self.min_lon >= 360.0
    }

    /// True when the box, taken on a 0..360 axis, wraps past 360.
    pub fn crosses_seam(&self) -> bool {
        !self.is_global() && self.max_lon.rem_euclid(360.0) < self.min_lon.rem_euclid(360.0)
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        if lat < self.min_lat || lat > self.max_lat {
            return false;
        }
        if self.is_global() {
            return true;
        }
        let lo = self.min_lon.rem_euclid(360.0);
        let hi = self.max_lon.rem_euclid(360.0);
        let lon = lon.rem_euclid(360.0);
        if hi >= lo {
            lon >= lo && lon <= hi
        } else {
            // Union of the two masks either side of the seam.
            lon >= lo || lon <= hi
        }
    }
}

/// Maps a longitude onto [-180, 180).
pub fn normalize_longitude(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// Row-major mask of the cells whose centre lies within `bounds`.
pub fn subset_mask(latitudes: &[f64], longitudes: &[f64], bounds: &Bounds) -> Vec<bool> {
    let mut mask = Vec::with_capacity(latitudes.len() * longitudes.len());
    for &lat in latitudes {
        for &lon in longitudes {
            mask.push(bounds.contains(lat, lon));
        }
    }
    mask
}

// ---------------------------------------------------------------------------
// Weighted aggregation
// ---------------------------------------------------------------------------

/// cos(latitude)-weighted mean of the masked cells, `NaN`s skipped.
/// `NaN` if no valid cell is selected.
pub fn weighted_mean(field: &GriddedField, mask: &[bool]) -> f64 {
    let mut sum = 0.0;
    let mut weights = 0.0;
    for (y, lat) in field.latitudes.iter().enumerate() {
        let w = lat.to_radians().cos();
        for x in 0..field.longitudes.len() {
            let i = y * field.longitudes.len() + x;
            let v = field.values.get(i).copied().unwrap_or(f64::NAN);
            if mask.get(i).copied().unwrap_or(false) && !v.is_nan() {
                sum += w * v;
                weights += w;
            }
        }
    }
    if weights == 0.0 { f64::NAN } else { sum / weights }
}

/// Regional means of every member at every lead time.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionalSeries {
    pub lead_times: Vec<u32>,
    /// Indexed `[lead][member]`.
    pub values: Vec<Vec<f64>>,
}

impl RegionalSeries {
    pub fn at(&self, lead_time: u32) -> Option<&[f64]> {
        let i = self.lead_times.iter().position(|&l| l == lead_time)?;
        self.values.get(i).map(Vec::as_slice)
    }
}

/// Weighted regional mean of an ensemble field over a region's bounding box.
pub fn aggregate(
    field: &GriddedEnsembleField,
    geometry: &MultiPolygon<f64>,
) -> Result<RegionalSeries, PipelineError> {
    let bounds = Bounds::of(geometry)
        .ok_or_else(|| PipelineError::IncompatibleGrid("region has an empty geometry".to_string()))?;
    let mask = subset_mask(&field.latitudes, &field.longitudes, &bounds);
    if !mask.iter().any(|&m| m) {
        return Err(PipelineError::IncompatibleGrid(format!(
            "no grid cell centre within [{:.2}, {:.2}] x [{:.2}, {:.2}]",
            bounds.min_lon, bounds.max_lon, bounds.min_lat, bounds.max_lat
        )));
    }

    let values = (0..field.lead_times.len())
        .map(|l| {
            (0..field.members)
                .map(|m| weighted_mean(&field.member_field(m, l), &mask))
                .collect()
        })
        .collect();

    Ok(RegionalSeries { lead_times: field.lead_times.clone(), values })
}

// ---------------------------------------------------------------------------
// Resampling
// ---------------------------------------------------------------------------

fn linspace(min: f64, max: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![min],
        _ => (0..n)
            .map(|i| min + (max - min) * i as f64 / (n - 1) as f64)
            .collect(),
    }
}

fn nearest_index(axis: &[f64], value: f64) -> usize {
    axis.iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (*a - value).abs().total_cmp(&(*b - value).abs()))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Nearest-neighbour resampling onto a grid `factor` times finer, spanning
/// the same coordinate range in ascending order.
pub fn resample_nearest(field: &GriddedField, factor: usize) -> GriddedField {
    let span = |axis: &[f64]| {
        let min = axis.iter().copied().fold(f64::INFINITY, f64::min);
        let max = axis.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        linspace(min, max, axis.len() * factor)
    };
    let latitudes = span(&field.latitudes);
    let longitudes = span(&field.longitudes);

    let lat_index: Vec<usize> = latitudes.iter().map(|&v| nearest_index(&field.latitudes, v)).collect();
    let lon_index: Vec<usize> = longitudes.iter().map(|&v| nearest_index(&field.longitudes, v)).collect();

    GriddedField::from_fn(latitudes, longitudes, |y, x| {
        field.get(lat_index[y], lon_index[x]).unwrap_or(f64::NAN)
    })
}

// ---------------------------------------------------------------------------
// Clipping
// ---------------------------------------------------------------------------

fn half_spacing(axis: &[f64]) -> f64 {
    match axis {
        [a, b, ..] => (b - a).abs() / 2.0,
        _ => 0.0,
    }
}

/// Keeps the cells inside or touching `geometry`, cropped to the smallest
/// window holding them. Cells of the window outside the geometry are `None`.
///
/// Longitudes are normalised to [-180, 180) and the columns put in ascending
/// order first, so a region across the 0/360 seam crops to one contiguous
/// window.
pub fn clip(field: &GriddedField, geometry: &MultiPolygon<f64>) -> ClippedRaster {
    let dy = half_spacing(&field.latitudes);
    let dx = half_spacing(&field.longitudes);

    let mut columns: Vec<(usize, f64)> = field
        .longitudes
        .iter()
        .enumerate()
        .map(|(x, &lon)| (x, normalize_longitude(lon)))
        .collect();
    columns.sort_by(|a, b| a.1.total_cmp(&b.1));

    let touches = |lat: f64, lon: f64| -> bool {
        if dx == 0.0 || dy == 0.0 {
            return geometry.intersects(&Point::new(lon, lat));
        }
        let cell = Rect::new(
            coord! { x: lon - dx, y: lat - dy },
            coord! { x: lon + dx, y: lat + dy },
        );
        geometry.intersects(&cell.to_polygon())
    };

    let width = columns.len();
    let height = field.latitudes.len();
    // Indexed by (row, sorted column).
    let inside: Vec<bool> = field
        .latitudes
        .iter()
        .flat_map(|&lat| columns.iter().map(move |&(_, lon)| (lat, lon)))
        .map(|(lat, lon)| touches(lat, lon))
        .collect();

    let rows: Vec<usize> = (0..height)
        .filter(|&y| (0..width).any(|c| inside[y * width + c]))
        .collect();
    let cols: Vec<usize> = (0..width)
        .filter(|&c| (0..height).any(|y| inside[y * width + c]))
        .collect();

    let (Some(&y0), Some(&y1), Some(&c0), Some(&c1)) =
        (rows.first(), rows.last(), cols.first(), cols.last())
    else {
        return ClippedRaster { latitudes: Vec::new(), longitudes: Vec::new(), values: Vec::new() };
    };

    let mut values = Vec::with_capacity((y1 - y0 + 1) * (c1 - c0 + 1));
    for y in y0..=y1 {
        for (c, &(x, _)) in columns.iter().enumerate().take(c1 + 1).skip(c0) {
            values.push(inside[y * width + c].then(|| field.get(y, x).unwrap_or(f64::NAN)));
        }
    }

    ClippedRaster {
        latitudes: field.latitudes[y0..=y1].to_vec(),
        longitudes: columns[c0..=c1].iter().map(|&(_, lon)| lon).collect(),
        values,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
