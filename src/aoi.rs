//! AOI acquisition: ring closure and upload parsing.
//!
//! Uploads arrive as raw file bytes plus the original filename; the extension
//! decides the parser. GeoJSON text is handled directly, a `.zip` is treated
//! as a zipped shapefile bundle whose `.shp` member is decoded in memory.

use std::io::{Cursor, Read};

use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};
use thiserror::Error;

use crate::api_types::{LatLng, LatLngBounds};

#[derive(Debug, Error)]
pub enum AoiError {
    #[error("Invalid GeoJSON file: {0}")]
    InvalidGeoJson(String),
    #[error("Could not extract polygon coordinates from uploaded file.")]
    MissingPolygon,
    #[error("Could not extract polygon coordinates from uploaded shapefile.")]
    MissingShapefilePolygon,
    #[error(
        "Invalid or unsupported shapefile ZIP ({0}). \
         Ensure your ZIP contains .shp, .shx, and .dbf files."
    )]
    ShapefileZip(String),
    #[error(
        "Please upload a zipped shapefile (.zip) containing .shp, .shx, and .dbf files, \
         or a valid GeoJSON/JSON file."
    )]
    BareShapefile,
    #[error(
        "Unsupported file type \"{0}\". \
         Please upload a valid GeoJSON, JSON, or zipped shapefile (.zip)."
    )]
    UnsupportedExtension(String),
}

/// A successfully parsed upload: the full collection for the display layer
/// and the first polygon ring, normalized to closed (lat, lng) order, for
/// query construction.
#[derive(Debug, Clone)]
pub struct UploadedAoi {
    pub ring: Vec<LatLng>,
    pub display: GeoJson,
    pub bounds: Option<LatLngBounds>,
}

/// Append a copy of the first vertex when first != last. Closing an
/// already-closed ring returns it unchanged.
pub fn close_ring(mut ring: Vec<LatLng>) -> Vec<LatLng> {
    if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
        if first.lat != last.lat || first.lng != last.lng {
            ring.push(first);
        }
    }
    ring
}

/// Parse an uploaded file into an AOI. Any failure leaves no partial state
/// behind; the caller keeps whatever AOI it had.
pub fn parse_upload(filename: &str, bytes: &[u8]) -> Result<UploadedAoi, AoiError> {
    match extension_of(filename).as_str() {
        "geojson" | "json" => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| AoiError::InvalidGeoJson(e.to_string()))?;
            let geojson: GeoJson = text
                .parse()
                .map_err(|e: geojson::Error| AoiError::InvalidGeoJson(e.to_string()))?;
            finish_upload(geojson, AoiError::MissingPolygon)
        }
        "zip" => {
            let collection = shapefile_zip_to_collection(bytes)?;
            finish_upload(
                GeoJson::FeatureCollection(collection),
                AoiError::MissingShapefilePolygon,
            )
        }
        "shp" => Err(AoiError::BareShapefile),
        other => Err(AoiError::UnsupportedExtension(other.to_string())),
    }
}

fn extension_of(filename: &str) -> String {
    filename
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

fn finish_upload(geojson: GeoJson, missing: AoiError) -> Result<UploadedAoi, AoiError> {
    let raw = extract_first_ring(&geojson).ok_or(missing)?;
    // GeoJSON positions are (lng, lat); everything downstream wants (lat, lng).
    let ring: Vec<LatLng> = raw.iter().map(|&(lng, lat)| LatLng::new(lat, lng)).collect();
    let ring = close_ring(ring);
    let bounds = LatLngBounds::from_ring(&ring);
    Ok(UploadedAoi {
        ring,
        display: geojson,
        bounds,
    })
}

/// First polygon ring of the shape, as raw (lng, lat) pairs.
fn extract_first_ring(geojson: &GeoJson) -> Option<Vec<(f64, f64)>> {
    let geometry = match geojson {
        GeoJson::FeatureCollection(collection) => {
            collection.features.first()?.geometry.as_ref()?
        }
        GeoJson::Feature(feature) => feature.geometry.as_ref()?,
        GeoJson::Geometry(geometry) => geometry,
    };
    let ring = match &geometry.value {
        Value::Polygon(rings) => rings.first()?,
        Value::MultiPolygon(polygons) => polygons.first()?.first()?,
        _ => return None,
    };
    let pairs = ring
        .iter()
        .filter(|position| position.len() >= 2)
        .map(|position| (position[0], position[1]))
        .collect::<Vec<_>>();
    if pairs.is_empty() {
        None
    } else {
        Some(pairs)
    }
}

/// Decode the `.shp` member of a zipped shapefile bundle into a
/// FeatureCollection.
fn shapefile_zip_to_collection(bytes: &[u8]) -> Result<FeatureCollection, AoiError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| AoiError::ShapefileZip(e.to_string()))?;

    let shp_name = archive
        .file_names()
        .find(|name| name.to_lowercase().ends_with(".shp"))
        .map(String::from)
        .ok_or_else(|| AoiError::ShapefileZip("no .shp member found".to_string()))?;

    let mut shp_bytes = Vec::new();
    archive
        .by_name(&shp_name)
        .map_err(|e| AoiError::ShapefileZip(e.to_string()))?
        .read_to_end(&mut shp_bytes)
        .map_err(|e| AoiError::ShapefileZip(e.to_string()))?;

    let reader = shapefile::ShapeReader::new(Cursor::new(shp_bytes))
        .map_err(|e| AoiError::ShapefileZip(e.to_string()))?;
    let shapes = reader
        .read()
        .map_err(|e| AoiError::ShapefileZip(e.to_string()))?;

    let features = shapes
        .into_iter()
        .filter_map(shape_to_feature)
        .collect::<Vec<_>>();

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

fn shape_to_feature(shape: shapefile::Shape) -> Option<Feature> {
    let value = match shape {
        shapefile::Shape::Point(point) => Value::Point(vec![point.x, point.y]),
        shapefile::Shape::Polyline(line) => {
            let parts: Vec<Vec<Vec<f64>>> = line
                .parts()
                .iter()
                .map(|part| part.iter().map(|p| vec![p.x, p.y]).collect())
                .collect();
            match parts.len() {
                0 => return None,
                1 => Value::LineString(parts.into_iter().next().unwrap()),
                _ => Value::MultiLineString(parts),
            }
        }
        shapefile::Shape::Polygon(polygon) => {
            // Shapefile polygons interleave outer rings and their holes; each
            // outer ring starts a new polygon.
            let mut polygons: Vec<Vec<Vec<Vec<f64>>>> = Vec::new();
            for ring in polygon.rings() {
                let coords: Vec<Vec<f64>> =
                    ring.points().iter().map(|p| vec![p.x, p.y]).collect();
                match ring {
                    shapefile::PolygonRing::Outer(_) => polygons.push(vec![coords]),
                    shapefile::PolygonRing::Inner(_) => match polygons.last_mut() {
                        Some(current) => current.push(coords),
                        None => polygons.push(vec![coords]),
                    },
                }
            }
            match polygons.len() {
                0 => return None,
                1 => Value::Polygon(polygons.into_iter().next().unwrap()),
                _ => Value::MultiPolygon(polygons),
            }
        }
        _ => return None,
    };

    Some(Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: None,
        properties: None,
        foreign_members: None,
    })
}

// ============================================================
// Unit Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_close_ring_appends_first_vertex() {
        let ring = vec![
            LatLng::new(51.0, -0.1),
            LatLng::new(51.2, -0.1),
            LatLng::new(51.1, 0.0),
        ];
        let closed = close_ring(ring);
        assert_eq!(closed.len(), 4);
        assert_eq!(closed[0], closed[3]);
    }

    #[test]
    fn test_close_ring_is_idempotent() {
        let ring = close_ring(vec![
            LatLng::new(51.0, -0.1),
            LatLng::new(51.2, -0.1),
            LatLng::new(51.1, 0.0),
        ]);
        assert_eq!(close_ring(ring.clone()), ring);
    }

    #[test]
    fn test_close_ring_empty_is_noop() {
        assert!(close_ring(Vec::new()).is_empty());
    }

    #[test]
    fn test_upload_feature_collection_swaps_to_lat_lng() {
        let geojson = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-0.2, 51.0], [-0.1, 51.0], [-0.1, 51.1], [-0.2, 51.0]]]
                }
            }]
        }"#;

        let aoi = parse_upload("area.geojson", geojson.as_bytes()).unwrap();
        assert_eq!(aoi.ring[0], LatLng::new(51.0, -0.2));
        assert_eq!(aoi.ring[1], LatLng::new(51.0, -0.1));
        assert_eq!(aoi.ring.first(), aoi.ring.last());
    }

    #[test]
    fn test_upload_open_polygon_gets_closed() {
        let geojson = r#"{
            "type": "Polygon",
            "coordinates": [[[-0.2, 51.0], [-0.1, 51.0], [-0.1, 51.1]]]
        }"#;

        let aoi = parse_upload("area.json", geojson.as_bytes()).unwrap();
        assert_eq!(aoi.ring.len(), 4);
        assert_eq!(aoi.ring.first(), aoi.ring.last());
    }

    #[test]
    fn test_upload_multipolygon_takes_first_outer_ring() {
        let geojson = r#"{
            "type": "MultiPolygon",
            "coordinates": [
                [[[-0.2, 51.0], [-0.1, 51.0], [-0.1, 51.1], [-0.2, 51.0]]],
                [[[10.0, 20.0], [11.0, 20.0], [11.0, 21.0], [10.0, 20.0]]]
            ]
        }"#;

        let aoi = parse_upload("area.geojson", geojson.as_bytes()).unwrap();
        assert_eq!(aoi.ring[0], LatLng::new(51.0, -0.2));
    }

    #[test]
    fn test_upload_point_feature_has_no_polygon() {
        let geojson = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {},
                "geometry": {"type": "Point", "coordinates": [-0.1, 51.5]}
            }]
        }"#;

        let err = parse_upload("point.geojson", geojson.as_bytes()).unwrap_err();
        assert!(matches!(err, AoiError::MissingPolygon));
    }

    #[test]
    fn test_upload_malformed_json_is_rejected() {
        let err = parse_upload("broken.geojson", b"{not json").unwrap_err();
        assert!(matches!(err, AoiError::InvalidGeoJson(_)));
    }

    #[test]
    fn test_upload_bare_shp_is_rejected_with_guidance() {
        let err = parse_upload("area.shp", &[0u8; 16]).unwrap_err();
        assert!(err.to_string().contains(".shp, .shx, and .dbf"));
    }

    #[test]
    fn test_upload_unknown_extension_is_rejected() {
        let err = parse_upload("area.gpkg", &[0u8; 16]).unwrap_err();
        assert!(matches!(err, AoiError::UnsupportedExtension(ref ext) if ext == "gpkg"));
    }

    #[test]
    fn test_upload_extension_is_case_insensitive() {
        let geojson = r#"{
            "type": "Polygon",
            "coordinates": [[[-0.2, 51.0], [-0.1, 51.0], [-0.1, 51.1], [-0.2, 51.0]]]
        }"#;
        assert!(parse_upload("AREA.GeoJSON", geojson.as_bytes()).is_ok());
    }

    #[test]
    fn test_zip_without_shp_member_is_rejected() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("readme.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"not a shapefile").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let err = parse_upload("bundle.zip", &bytes).unwrap_err();
        assert!(matches!(err, AoiError::ShapefileZip(_)));
    }

    #[test]
    fn test_garbage_zip_is_rejected() {
        let err = parse_upload("bundle.zip", b"PK but not really").unwrap_err();
        assert!(matches!(err, AoiError::ShapefileZip(_)));
    }
}
