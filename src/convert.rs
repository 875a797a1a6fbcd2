//! Conversion of Overpass JSON elements into a GeoJSON FeatureCollection.
//!
//! Bare nodes that only exist to carry way geometry (the `out skel qt`
//! output) are folded into their ways and not emitted as features; tagged
//! nodes become Points, ways become LineStrings, and closed area ways
//! (buildings, explicit `area=yes`) become Polygons.

use std::collections::HashMap;

use geojson::{feature::Id, Feature, FeatureCollection, Geometry, JsonObject, Value};

use crate::api_types::{LatLngBounds, OverpassElement, OverpassPoint, OverpassResponse};

pub(crate) fn elements_to_geojson(response: OverpassResponse) -> FeatureCollection {
    // (lon, lat) per node id, for ways that reference geometry by id
    let mut node_index: HashMap<i64, (f64, f64)> = HashMap::new();
    for element in &response.elements {
        if let OverpassElement::Node { id, lat, lon, .. } = element {
            node_index.insert(*id, (*lon, *lat));
        }
    }

    let mut features = Vec::new();
    let mut skipped_ways = 0usize;

    for element in &response.elements {
        match element {
            OverpassElement::Node { id, lat, lon, tags } => {
                if tags.is_empty() {
                    continue;
                }
                features.push(build_feature(
                    format!("node/{id}"),
                    Value::Point(vec![*lon, *lat]),
                    tags,
                ));
            }
            OverpassElement::Way {
                id,
                nodes,
                geometry,
                tags,
            } => {
                let coords = way_coords(nodes, geometry.as_deref(), &node_index);
                if coords.len() < 2 {
                    skipped_ways += 1;
                    continue;
                }
                let value = if is_closed(&coords) && is_area(tags) {
                    Value::Polygon(vec![coords])
                } else {
                    Value::LineString(coords)
                };
                features.push(build_feature(format!("way/{id}"), value, tags));
            }
            OverpassElement::Relation { .. } => {}
        }
    }

    if skipped_ways > 0 {
        println!("Skipped {} ways with unresolved geometry", skipped_ways);
    }

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn way_coords(
    nodes: &[i64],
    geometry: Option<&[OverpassPoint]>,
    node_index: &HashMap<i64, (f64, f64)>,
) -> Vec<Vec<f64>> {
    match geometry {
        Some(points) => points.iter().map(|p| vec![p.lon, p.lat]).collect(),
        None => nodes
            .iter()
            .filter_map(|id| node_index.get(id))
            .map(|&(lon, lat)| vec![lon, lat])
            .collect(),
    }
}

fn is_closed(coords: &[Vec<f64>]) -> bool {
    coords.len() >= 4 && coords.first() == coords.last()
}

fn is_area(tags: &HashMap<String, String>) -> bool {
    tags.contains_key("building") || tags.get("area").map(String::as_str) == Some("yes")
}

fn build_feature(id: String, value: Value, tags: &HashMap<String, String>) -> Feature {
    let mut properties = JsonObject::new();
    for (key, val) in tags {
        properties.insert(key.clone(), serde_json::Value::String(val.clone()));
    }
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: Some(Id::String(id)),
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Bounding box over every coordinate in the collection, for map refit.
pub fn collection_bounds(collection: &FeatureCollection) -> Option<LatLngBounds> {
    let mut bounds = None;
    for feature in &collection.features {
        if let Some(geometry) = &feature.geometry {
            extend_with_value(&geometry.value, &mut bounds);
        }
    }
    bounds
}

fn extend_with_value(value: &Value, bounds: &mut Option<LatLngBounds>) {
    match value {
        Value::Point(position) => extend_position(position, bounds),
        Value::MultiPoint(positions) | Value::LineString(positions) => {
            for position in positions {
                extend_position(position, bounds);
            }
        }
        Value::MultiLineString(lines) | Value::Polygon(lines) => {
            for line in lines {
                for position in line {
                    extend_position(position, bounds);
                }
            }
        }
        Value::MultiPolygon(polygons) => {
            for polygon in polygons {
                for ring in polygon {
                    for position in ring {
                        extend_position(position, bounds);
                    }
                }
            }
        }
        Value::GeometryCollection(geometries) => {
            for geometry in geometries {
                extend_with_value(&geometry.value, bounds);
            }
        }
    }
}

fn extend_position(position: &[f64], bounds: &mut Option<LatLngBounds>) {
    if position.len() < 2 {
        return;
    }
    let (lng, lat) = (position[0], position[1]);
    match bounds {
        Some(b) => b.extend(lat, lng),
        None => *bounds = Some(LatLngBounds::of(lat, lng)),
    }
}

// ============================================================
// Unit Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(json: &str) -> FeatureCollection {
        let response: OverpassResponse = serde_json::from_str(json).unwrap();
        elements_to_geojson(response)
    }

    #[test]
    fn test_skeleton_nodes_are_not_features() {
        let collection = convert(
            r#"{"elements": [
                {"type": "node", "id": 1, "lat": 51.5, "lon": -0.1},
                {"type": "node", "id": 2, "lat": 51.6, "lon": -0.2},
                {"type": "way", "id": 10, "nodes": [1, 2],
                 "tags": {"highway": "residential", "name": "Acacia Avenue"}}
            ]}"#,
        );

        assert_eq!(collection.features.len(), 1);
        let feature = &collection.features[0];
        assert_eq!(feature.id, Some(Id::String("way/10".to_string())));
        match &feature.geometry.as_ref().unwrap().value {
            Value::LineString(coords) => {
                assert_eq!(coords[0], vec![-0.1, 51.5]);
                assert_eq!(coords[1], vec![-0.2, 51.6]);
            }
            other => panic!("expected LineString, got {:?}", other),
        }
        let props = feature.properties.as_ref().unwrap();
        assert_eq!(props["name"], "Acacia Avenue");
        assert_eq!(props["highway"], "residential");
    }

    #[test]
    fn test_tagged_node_becomes_point() {
        let collection = convert(
            r#"{"elements": [
                {"type": "node", "id": 5, "lat": 51.5, "lon": -0.1,
                 "tags": {"shop": "bakery"}}
            ]}"#,
        );

        assert_eq!(collection.features.len(), 1);
        let feature = &collection.features[0];
        assert_eq!(feature.id, Some(Id::String("node/5".to_string())));
        match &feature.geometry.as_ref().unwrap().value {
            Value::Point(position) => assert_eq!(position, &vec![-0.1, 51.5]),
            other => panic!("expected Point, got {:?}", other),
        }
    }

    #[test]
    fn test_closed_building_way_becomes_polygon() {
        let collection = convert(
            r#"{"elements": [
                {"type": "node", "id": 1, "lat": 51.0, "lon": 0.0},
                {"type": "node", "id": 2, "lat": 51.0, "lon": 0.1},
                {"type": "node", "id": 3, "lat": 51.1, "lon": 0.1},
                {"type": "way", "id": 20, "nodes": [1, 2, 3, 1],
                 "tags": {"building": "yes"}}
            ]}"#,
        );

        match &collection.features[0].geometry.as_ref().unwrap().value {
            Value::Polygon(rings) => {
                assert_eq!(rings.len(), 1);
                assert_eq!(rings[0].len(), 4);
            }
            other => panic!("expected Polygon, got {:?}", other),
        }
    }

    #[test]
    fn test_closed_way_without_area_tag_stays_linestring() {
        let collection = convert(
            r#"{"elements": [
                {"type": "node", "id": 1, "lat": 51.0, "lon": 0.0},
                {"type": "node", "id": 2, "lat": 51.0, "lon": 0.1},
                {"type": "node", "id": 3, "lat": 51.1, "lon": 0.1},
                {"type": "way", "id": 21, "nodes": [1, 2, 3, 1],
                 "tags": {"highway": "residential"}}
            ]}"#,
        );

        assert!(matches!(
            collection.features[0].geometry.as_ref().unwrap().value,
            Value::LineString(_)
        ));
    }

    #[test]
    fn test_way_with_embedded_geometry_needs_no_nodes() {
        let collection = convert(
            r#"{"elements": [
                {"type": "way", "id": 30,
                 "geometry": [{"lat": 51.0, "lon": 0.0}, {"lat": 51.1, "lon": 0.1}],
                 "tags": {"highway": "primary"}}
            ]}"#,
        );

        assert_eq!(collection.features.len(), 1);
        match &collection.features[0].geometry.as_ref().unwrap().value {
            Value::LineString(coords) => assert_eq!(coords[0], vec![0.0, 51.0]),
            other => panic!("expected LineString, got {:?}", other),
        }
    }

    #[test]
    fn test_way_with_unresolved_nodes_is_skipped() {
        let collection = convert(
            r#"{"elements": [
                {"type": "way", "id": 40, "nodes": [100, 200],
                 "tags": {"highway": "service"}}
            ]}"#,
        );

        assert!(collection.features.is_empty());
    }

    #[test]
    fn test_relations_are_ignored() {
        let collection = convert(
            r#"{"elements": [
                {"type": "relation", "id": 9, "members": [], "tags": {"type": "route"}}
            ]}"#,
        );

        assert!(collection.features.is_empty());
    }

    #[test]
    fn test_collection_bounds_spans_all_features() {
        let collection = convert(
            r#"{"elements": [
                {"type": "node", "id": 1, "lat": 51.0, "lon": -0.3, "tags": {"shop": "deli"}},
                {"type": "node", "id": 2, "lat": 52.0, "lon": 0.4, "tags": {"shop": "bakery"}}
            ]}"#,
        );

        let bounds = collection_bounds(&collection).unwrap();
        assert_eq!(bounds.min_lat, 51.0);
        assert_eq!(bounds.max_lat, 52.0);
        assert_eq!(bounds.min_lng, -0.3);
        assert_eq!(bounds.max_lng, 0.4);
    }

    #[test]
    fn test_collection_bounds_empty_is_none() {
        let empty = FeatureCollection {
            bbox: None,
            features: Vec::new(),
            foreign_members: None,
        };
        assert!(collection_bounds(&empty).is_none());
    }
}
