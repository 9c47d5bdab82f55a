//! Region boundaries loaded from a GeoJSON FeatureCollection.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use geo::{BoundingRect, Coord, LineString, MultiPolygon, Polygon, Rect};
use geojson::{Feature, FeatureCollection, GeoJson};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CatalogError;

/// Identifier property used when none is configured (Census TIGER files).
pub const DEFAULT_ID_FIELD: &str = "GEOID";

/// Where the region boundaries come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSource {
    /// GeoJSON file; a `.gz` extension is decompressed on read
    pub path: PathBuf,

    /// Feature property holding the region's stable code
    #[serde(default = "default_id_field")]
    pub id_field: String,
}

fn default_id_field() -> String {
    DEFAULT_ID_FIELD.to_string()
}

impl RegionSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            id_field: default_id_field(),
        }
    }

    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }
}

/// Handle to a region inside a [`RegionCatalog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionHandle(pub(crate) usize);

impl RegionHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A named polygonal boundary
#[derive(Debug, Clone)]
pub struct Region {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
    bbox: Rect<f64>,
}

impl Region {
    pub fn bbox(&self) -> Rect<f64> {
        self.bbox
    }

    /// Bounding box area, used to prefer the tightest region on ties
    pub fn bbox_area(&self) -> f64 {
        self.bbox.width() * self.bbox.height()
    }
}

/// Immutable set of regions. Handles are positions in load order.
#[derive(Debug, Default)]
pub struct RegionCatalog {
    regions: Vec<Region>,
    by_id: HashMap<String, Vec<RegionHandle>>,
}

impl RegionCatalog {
    /// Load every feature of a GeoJSON FeatureCollection.
    pub fn load(source: &RegionSource) -> Result<Self, CatalogError> {
        info!("Loading regions from {}", source.path.display());

        let text = read_source(&source.path)?;
        let geojson = text.parse::<GeoJson>()?;
        let collection = match geojson {
            GeoJson::FeatureCollection(collection) => collection,
            _ => return Err(CatalogError::NotAFeatureCollection),
        };

        let catalog = Self::from_feature_collection(&collection, &source.id_field)?;
        info!(
            "Loaded {} regions ({} distinct ids)",
            catalog.len(),
            catalog.by_id.len()
        );
        Ok(catalog)
    }

    /// Build from an already parsed collection, validating every feature.
    pub fn from_feature_collection(
        collection: &FeatureCollection,
        id_field: &str,
    ) -> Result<Self, CatalogError> {
        let regions = collection
            .features
            .iter()
            .enumerate()
            .map(|(i, feature)| {
                let id = feature_id(i, feature, id_field)?;
                let geometry = feature_geometry(i, feature)?;
                Ok((id, geometry))
            })
            .collect::<Result<Vec<_>, CatalogError>>()?;

        Self::from_regions(regions)
    }

    /// Build from `(id, geometry)` pairs, validating rings and coordinates.
    pub fn from_regions<I>(regions: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (String, MultiPolygon<f64>)>,
    {
        let mut catalog = Self::default();

        for (i, (id, geometry)) in regions.into_iter().enumerate() {
            validate_geometry(i, &geometry)?;
            let bbox = geometry
                .bounding_rect()
                .ok_or_else(|| malformed(i, "geometry has no vertices"))?;

            let handles = catalog.by_id.entry(id.clone()).or_default();
            if !handles.is_empty() {
                warn!("Region id '{}' appears in more than one feature", id);
            }
            handles.push(RegionHandle(catalog.regions.len()));

            debug!("Region {} -> {:?}", id, bbox);
            catalog.regions.push(Region { id, geometry, bbox });
        }

        Ok(catalog)
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// All handles, in load order
    pub fn handles(&self) -> impl Iterator<Item = RegionHandle> + '_ {
        (0..self.regions.len()).map(RegionHandle)
    }

    pub fn get(&self, handle: RegionHandle) -> &Region {
        &self.regions[handle.0]
    }

    pub fn bounding_box_of(&self, handle: RegionHandle) -> Rect<f64> {
        self.regions[handle.0].bbox
    }

    /// Regions carrying `id`, usually one
    pub fn find_by_id(&self, id: &str) -> &[RegionHandle] {
        self.by_id.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

fn read_source(path: &Path) -> Result<String, CatalogError> {
    let io_err = |source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(io_err)?;
    let mut reader: Box<dyn Read> = if path.extension().map_or(false, |e| e == "gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    let mut text = String::new();
    reader.read_to_string(&mut text).map_err(io_err)?;
    Ok(text)
}

fn malformed(feature: usize, reason: impl Into<String>) -> CatalogError {
    CatalogError::MalformedGeometry {
        feature,
        reason: reason.into(),
    }
}

/// Identifier property as a string; numeric codes are accepted as-is
fn feature_id(i: usize, feature: &Feature, id_field: &str) -> Result<String, CatalogError> {
    let missing = || CatalogError::MissingField {
        feature: i,
        field: id_field.to_string(),
    };

    match feature.property(id_field) {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
        Some(serde_json::Value::Null) | None => Err(missing()),
        Some(other) => Err(CatalogError::MalformedId {
            feature: i,
            field: id_field.to_string(),
            found: other.to_string(),
        }),
    }
}

fn feature_geometry(i: usize, feature: &Feature) -> Result<MultiPolygon<f64>, CatalogError> {
    let geometry = feature
        .geometry
        .as_ref()
        .ok_or_else(|| malformed(i, "feature has no geometry"))?;

    match &geometry.value {
        geojson::Value::Polygon(rings) => Ok(MultiPolygon::new(vec![to_polygon(i, rings)?])),
        geojson::Value::MultiPolygon(polygons) => polygons
            .iter()
            .map(|rings| to_polygon(i, rings))
            .collect::<Result<Vec<_>, _>>()
            .map(MultiPolygon::new),
        other => Err(malformed(
            i,
            format!("unsupported geometry type {}", other.type_name()),
        )),
    }
}

fn to_polygon(i: usize, rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>, CatalogError> {
    let mut rings = rings.iter().map(|ring| to_ring(i, ring));
    let exterior = rings
        .next()
        .ok_or_else(|| malformed(i, "polygon has no rings"))??;
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn to_ring(i: usize, positions: &[Vec<f64>]) -> Result<LineString<f64>, CatalogError> {
    positions
        .iter()
        .map(|position| match position.as_slice() {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => Err(malformed(i, "position has fewer than two coordinates")),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::new)
}

fn validate_geometry(i: usize, geometry: &MultiPolygon<f64>) -> Result<(), CatalogError> {
    if geometry.0.is_empty() {
        return Err(malformed(i, "geometry has no polygons"));
    }

    for polygon in geometry {
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            validate_ring(i, ring)?;
        }
    }
    Ok(())
}

fn validate_ring(i: usize, ring: &LineString<f64>) -> Result<(), CatalogError> {
    if let Some(c) = ring.0.iter().find(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(malformed(
            i,
            format!("non-finite coordinate ({}, {})", c.x, c.y),
        ));
    }

    let mut coords = ring.0.as_slice();
    if coords.len() > 1 && coords.first() == coords.last() {
        coords = &coords[..coords.len() - 1];
    }

    let mut distinct: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    for c in coords {
        if !distinct.contains(c) {
            distinct.push(*c);
            if distinct.len() >= 3 {
                return Ok(());
            }
        }
    }

    Err(malformed(
        i,
        format!("ring has {} distinct vertices, need at least 3", distinct.len()),
    ))
}
