//! GeoJSON serialization of cached features.

use geojson::{FeatureCollection, GeoJson, Geometry, Value, feature::Id};
use serde_json::{Map, Value as JsonValue};

use super::FeatureCache;
use crate::feature::Feature;

impl From<&Feature> for geojson::Feature {
    fn from(feature: &Feature) -> Self {
        let mut properties = Map::new();
        for (key, value) in &feature.tags {
            properties.insert(key.clone(), JsonValue::String(value.clone()));
        }
        properties.insert(
            "category".to_string(),
            JsonValue::String(feature.category.tag_value().to_string()),
        );
        properties.insert("count".to_string(), JsonValue::from(feature.count));

        geojson::Feature {
            bbox: None,
            geometry: Some(Geometry::new(Value::Point(vec![
                feature.pos.lon,
                feature.pos.lat,
            ]))),
            id: Some(Id::String(feature.id.to_string())),
            properties: Some(properties),
            foreign_members: None,
        }
    }
}

impl FeatureCache {
    /// All cached features as a GeoJSON `FeatureCollection` of points.
    pub fn to_geojson(&self) -> GeoJson {
        GeoJson::FeatureCollection(FeatureCollection {
            bbox: None,
            features: self.all().iter().map(geojson::Feature::from).collect(),
            foreign_members: None,
        })
    }

    /// [`FeatureCache::to_geojson`] as a string.
    pub fn to_geojson_string(&self) -> String {
        self.to_geojson().to_string()
    }
}
