/// Administrative boundaries.
///
/// Boundaries come as GeoJSON feature collections, one per admin level, in
/// EPSG:4326. Each feature carries its place code either as
/// `adm{level}_pcode` or as `placeCode`, plus optional `name` and
/// `population` properties. Geometries are converted to `geo` multipolygons
/// for clipping and bounding-box queries.

use std::collections::BTreeMap;

use geo::{Geometry, MultiPolygon};
use geojson::{Feature, GeoJson};

use crate::model::PipelineError;

// ---------------------------------------------------------------------------
// Features
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct AdminFeature {
    pub pcode: String,
    pub name: Option<String>,
    pub population: u64,
    pub geometry: MultiPolygon<f64>,
}

/// All admin areas of one country at one admin level, keyed by place code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdminBoundaries {
    pub adm_level: u8,
    features: BTreeMap<String, AdminFeature>,
}

fn string_property(feature: &Feature, key: &str) -> Option<String> {
    match feature.property(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn to_multipolygon(geometry: geojson::Geometry) -> Result<MultiPolygon<f64>, PipelineError> {
    let converted = Geometry::<f64>::try_from(geometry)
        .map_err(|e| PipelineError::Parse(format!("invalid boundary geometry: {}", e)))?;
    match converted {
        Geometry::Polygon(p) => Ok(MultiPolygon(vec![p])),
        Geometry::MultiPolygon(mp) => Ok(mp),
        other => Err(PipelineError::Parse(format!(
            "boundary geometry must be a polygon, got {:?}",
            other
        ))),
    }
}

impl AdminBoundaries {
    pub fn new(adm_level: u8, features: Vec<AdminFeature>) -> Self {
        AdminBoundaries {
            adm_level,
            features: features.into_iter().map(|f| (f.pcode.clone(), f)).collect(),
        }
    }

    pub fn from_geojson_str(adm_level: u8, text: &str) -> Result<Self, PipelineError> {
        let geojson: GeoJson = text
            .parse()
            .map_err(|e| PipelineError::Parse(format!("invalid GeoJSON: {}", e)))?;
        let features = match geojson {
            GeoJson::FeatureCollection(fc) => fc.features,
            GeoJson::Feature(f) => vec![f],
            GeoJson::Geometry(_) => {
                return Err(PipelineError::Parse(
                    "admin boundaries must be features with a place code".to_string(),
                ));
            }
        };

        let pcode_key = format!("adm{}_pcode", adm_level);
        let mut parsed = Vec::with_capacity(features.len());
        for feature in features {
            let pcode = string_property(&feature, &pcode_key)
                .or_else(|| string_property(&feature, "placeCode"))
                .ok_or_else(|| {
                    PipelineError::Parse(format!("boundary feature without {} or placeCode", pcode_key))
                })?;
            let name = string_property(&feature, "name");
            let population = feature
                .property("population")
                .and_then(serde_json::Value::as_f64)
                .map(|p| p.max(0.0).round() as u64)
                .unwrap_or(0);
            let geometry = feature
                .geometry
                .clone()
                .ok_or_else(|| PipelineError::Parse(format!("boundary feature {} has no geometry", pcode)))?;
            parsed.push(AdminFeature {
                pcode,
                name,
                population,
                geometry: to_multipolygon(geometry)?,
            });
        }
        Ok(Self::new(adm_level, parsed))
    }

    pub fn feature(&self, pcode: &str) -> Option<&AdminFeature> {
        self.features.get(pcode)
    }

    pub fn pcodes(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Features whose place code is listed; unknown codes are skipped.
    pub fn select<'a>(&'a self, pcodes: &[String]) -> Vec<&'a AdminFeature> {
        pcodes.iter().filter_map(|p| self.features.get(p)).collect()
    }

    /// Union (as a multipolygon) of the listed features. No match at all is a
    /// geometry mismatch for the region.
    pub fn select_region(&self, region_code: &str, pcodes: &[String]) -> Result<MultiPolygon<f64>, PipelineError> {
        let selected = self.select(pcodes);
        if selected.is_empty() {
            return Err(PipelineError::GeometryMismatch {
                region: region_code.to_string(),
                adm_level: self.adm_level,
            });
        }
        Ok(MultiPolygon(
            selected
                .into_iter()
                .flat_map(|f| f.geometry.0.iter().cloned())
                .collect(),
        ))
    }

    /// Every feature as one multipolygon; the country outline at the base level.
    pub fn outline(&self) -> MultiPolygon<f64> {
        MultiPolygon(
            self.features
                .values()
                .flat_map(|f| f.geometry.0.iter().cloned())
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Supplies admin boundaries for a country and admin level.
pub trait BoundarySource {
    fn admin_boundaries(&self, country: &str, adm_level: u8) -> Result<AdminBoundaries, PipelineError>;
}

/// Boundaries of every level a run needs, fetched once.
#[derive(Debug, Clone, Default)]
pub struct BoundaryIndex {
    levels: BTreeMap<u8, AdminBoundaries>,
}

impl BoundaryIndex {
    pub fn load(
        source: &dyn BoundarySource,
        country: &str,
        adm_levels: impl IntoIterator<Item = u8>,
    ) -> Result<Self, PipelineError> {
        let mut levels = BTreeMap::new();
        for level in adm_levels {
            if !levels.contains_key(&level) {
                levels.insert(level, source.admin_boundaries(country, level)?);
            }
        }
        Ok(BoundaryIndex { levels })
    }

    pub fn from_levels(levels: impl IntoIterator<Item = AdminBoundaries>) -> Self {
        BoundaryIndex {
            levels: levels.into_iter().map(|b| (b.adm_level, b)).collect(),
        }
    }

    pub fn level(&self, adm_level: u8) -> Result<&AdminBoundaries, PipelineError> {
        self.levels.get(&adm_level).ok_or_else(|| {
            PipelineError::DataUnavailable(format!("admin boundaries for level {} not loaded", adm_level))
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "adm1_pcode": "KE01", "name": "Mombasa", "population": 1208333.4 },
                "geometry": { "type": "Polygon", "coordinates": [[[39.5,-4.2],[39.8,-4.2],[39.8,-3.9],[39.5,-3.9],[39.5,-4.2]]] }
            },
            {
                "type": "Feature",
                "properties": { "placeCode": "KE02" },
                "geometry": { "type": "MultiPolygon", "coordinates": [[[[39.0,-4.5],[39.4,-4.5],[39.4,-4.0],[39.0,-4.0],[39.0,-4.5]]]] }
            }
        ]
    }"#;

    #[test]
    fn test_parse_feature_collection() {
        let boundaries = AdminBoundaries::from_geojson_str(1, SAMPLE).unwrap();
        assert_eq!(boundaries.len(), 2);
        let mombasa = boundaries.feature("KE01").unwrap();
        assert_eq!(mombasa.name.as_deref(), Some("Mombasa"));
        assert_eq!(mombasa.population, 1_208_333);
        assert_eq!(mombasa.geometry.0.len(), 1);
        // placeCode fallback, missing population counts as 0.
        assert_eq!(boundaries.feature("KE02").unwrap().population, 0);
    }

    #[test]
    fn test_select_region_unions_matches() {
        let boundaries = AdminBoundaries::from_geojson_str(1, SAMPLE).unwrap();
        let region = boundaries
            .select_region("R1", &["KE01".to_string(), "KE99".to_string(), "KE02".to_string()])
            .unwrap();
        assert_eq!(region.0.len(), 2);
        assert_eq!(boundaries.outline().0.len(), 2);
    }

    #[test]
    fn test_select_region_without_match_is_geometry_mismatch() {
        let boundaries = AdminBoundaries::from_geojson_str(1, SAMPLE).unwrap();
        let err = boundaries.select_region("R7", &["UG01".to_string()]).unwrap_err();
        assert!(matches!(err, PipelineError::GeometryMismatch { ref region, adm_level: 1 } if region == "R7"));
        assert!(err.is_region_fatal());
    }

    #[test]
    fn test_feature_without_pcode_rejected() {
        let text = r#"{"type":"Feature","properties":{},"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}}"#;
        assert!(matches!(
            AdminBoundaries::from_geojson_str(1, text),
            Err(PipelineError::Parse(_))
        ));
    }

    #[test]
    fn test_index_loads_each_level_once() {
        use std::cell::Cell;

        struct Counting(Cell<usize>);
        impl BoundarySource for Counting {
            fn admin_boundaries(&self, _country: &str, adm_level: u8) -> Result<AdminBoundaries, PipelineError> {
                self.0.set(self.0.get() + 1);
                Ok(AdminBoundaries::new(adm_level, Vec::new()))
            }
        }

        let source = Counting(Cell::new(0));
        let index = BoundaryIndex::load(&source, "KEN", [1, 2, 1]).unwrap();
        assert_eq!(source.0.get(), 2);
        assert!(index.level(2).is_ok());
        assert!(matches!(index.level(3), Err(PipelineError::DataUnavailable(_))));
    }
}
