//! The session's accumulated points of interest and the areas already queried for them.
//!
//! Overlapping queries return the same features over and over while the user pans and zooms.
//! [`FeatureCache::ingest`] keeps exactly one copy of each feature, so the heatmaps never count
//! a place twice.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::feature::{Category, Feature, FeatureId};
use crate::projection::Bounds;

/// GeoJSON export of the cache.
#[cfg(feature = "geojson")]
pub mod geojson;

/// Storage key of the accumulated features.
pub const FEATURES_KEY: &str = "features";
/// Storage key of the covered bounds.
pub const COVERED_BOUNDS_KEY: &str = "covered_bounds";

/// De-duplicated features in arrival order, plus the append-only list of queried bounds.
#[derive(Clone, Debug, Default)]
pub struct FeatureCache {
    features: Vec<Feature>,
    ids: HashSet<FeatureId>,
    covered: Vec<Bounds>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    features: Vec<Feature>,
    covered_bounds: Vec<Bounds>,
}

impl FeatureCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds every feature whose id is not cached yet, keeping arrival order. Features already
    /// present are dropped silently. Returns the number of newly added features.
    pub fn ingest(&mut self, features: impl IntoIterator<Item = Feature>) -> usize {
        let mut accepted = 0;
        for feature in features {
            if self.ids.insert(feature.id) {
                self.features.push(feature);
                accepted += 1;
            }
        }
        debug!(
            "Ingested {} new features, {} cached in total",
            accepted,
            self.features.len()
        );
        accepted
    }

    /// All cached features in insertion order.
    pub fn all(&self) -> &[Feature] {
        &self.features
    }

    /// The cached features of one category, in insertion order.
    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &Feature> {
        self.features.iter().filter(move |f| f.category == category)
    }

    /// Whether a feature with this id has been ingested.
    pub fn contains(&self, id: &FeatureId) -> bool {
        self.ids.contains(id)
    }

    /// The number of cached features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether no features are cached.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Records that `bounds` has been queried. Bounds are never merged.
    pub fn mark_bounds_covered(&mut self, bounds: Bounds) {
        self.covered.push(bounds);
    }

    /// Every bound recorded so far, oldest first.
    pub fn covered_bounds(&self) -> &[Bounds] {
        &self.covered
    }

    /// Whether a single previously queried bound contains all of `bounds`.
    ///
    /// Overlapping bounds are not combined, so an area covered only by the union of several
    /// queries is reported as not covered.
    pub fn is_covered(&self, bounds: &Bounds) -> bool {
        self.covered.iter().any(|covered| covered.contains(bounds))
    }

    /// Drops all features and bounds.
    pub fn clear(&mut self) {
        self.features.clear();
        self.ids.clear();
        self.covered.clear();
    }

    /// Serializes features and covered bounds to a JSON string.
    pub fn serialize(&self) -> String {
        let snapshot = Snapshot {
            features: self.features.clone(),
            covered_bounds: self.covered.clone(),
        };
        serde_json::to_string(&snapshot).unwrap_or_default()
    }

    /// Restores a cache from [`FeatureCache::serialize`] output. A missing or malformed blob
    /// gives an empty cache.
    pub fn deserialize(blob: Option<&str>) -> Self {
        let Some(blob) = blob else {
            return Self::default();
        };
        match serde_json::from_str::<Snapshot>(blob) {
            Ok(snapshot) => Self::from_parts(snapshot.features, snapshot.covered_bounds),
            Err(e) => {
                warn!("Ignoring unreadable feature cache: {}", e);
                Self::default()
            }
        }
    }

    /// Restores the cache from the two storage entries written by [`FeatureCache::save`].
    /// Each entry degrades to empty independently.
    pub fn load(storage: &dyn eframe::Storage) -> Self {
        let features = read_json(storage, FEATURES_KEY).unwrap_or_default();
        let covered = read_json(storage, COVERED_BOUNDS_KEY).unwrap_or_default();
        Self::from_parts(features, covered)
    }

    /// Writes features and covered bounds to `storage`.
    pub fn save(&self, storage: &mut dyn eframe::Storage) {
        match serde_json::to_string(&self.features) {
            Ok(json) => storage.set_string(FEATURES_KEY, json),
            Err(e) => warn!("Unable to persist features: {}", e),
        }
        match serde_json::to_string(&self.covered) {
            Ok(json) => storage.set_string(COVERED_BOUNDS_KEY, json),
            Err(e) => warn!("Unable to persist covered bounds: {}", e),
        }
    }

    fn from_parts(features: Vec<Feature>, covered: Vec<Bounds>) -> Self {
        let mut cache = Self {
            covered,
            ..Self::default()
        };
        cache.ingest(features);
        cache
    }
}

fn read_json<T: serde::de::DeserializeOwned>(storage: &dyn eframe::Storage, key: &str) -> Option<T> {
    let json = storage.get_string(key)?;
    serde_json::from_str(&json)
        .inspect_err(|e| warn!("Ignoring unreadable `{}` entry: {}", key, e))
        .ok()
}
