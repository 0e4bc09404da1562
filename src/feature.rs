//! Points of interest and the categories they are grouped by.

use egui::Color32;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::projection::GeoPos;

/// The kind of points of interest shown on the map.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// `amenity=cafe`
    Cafe,
    /// `amenity=library`
    Library,
    /// `amenity=university`
    University,
    /// `amenity=college`
    College,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: [Category; 4] = [
        Category::Cafe,
        Category::Library,
        Category::University,
        Category::College,
    ];

    /// The value of the `amenity` tag selecting this category.
    pub fn tag_value(self) -> &'static str {
        match self {
            Category::Cafe => "cafe",
            Category::Library => "library",
            Category::University => "university",
            Category::College => "college",
        }
    }

    /// A human readable name.
    pub fn label(self) -> &'static str {
        match self {
            Category::Cafe => "Café",
            Category::Library => "Library",
            Category::University => "University",
            Category::College => "College",
        }
    }

    /// The colour used for the heatmap and markers of this category.
    pub fn color(self) -> Color32 {
        match self {
            Category::Cafe => Color32::from_rgb(230, 80, 30),
            Category::Library => Color32::from_rgb(40, 110, 220),
            Category::University => Color32::from_rgb(140, 50, 190),
            Category::College => Color32::from_rgb(30, 160, 90),
        }
    }

    /// Picks the category from a tag mapping, if the `amenity` tag names one.
    pub fn from_tags(tags: &BTreeMap<String, String>) -> Option<Self> {
        let amenity = tags.get("amenity")?;
        Self::ALL.into_iter().find(|c| c.tag_value() == amenity)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether a feature is a single point or an area represented by its centroid.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    /// A point.
    Node,
    /// An area or line, positioned at its centroid.
    Way,
}

/// The stable identifier of a feature. Ids are only unique per element kind.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureId {
    /// The element kind.
    pub kind: ElementKind,
    /// The numeric id within that kind.
    pub id: i64,
}

impl FeatureId {
    /// The id of a node.
    pub fn node(id: i64) -> Self {
        Self {
            kind: ElementKind::Node,
            id,
        }
    }

    /// The id of a way.
    pub fn way(id: i64) -> Self {
        Self {
            kind: ElementKind::Way,
            id,
        }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ElementKind::Node => write!(f, "node/{}", self.id),
            ElementKind::Way => write!(f, "way/{}", self.id),
        }
    }
}

/// A point of interest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// The stable identifier.
    pub id: FeatureId,

    /// What kind of place this is.
    pub category: Category,

    /// The position, or the centroid for ways.
    pub pos: GeoPos,

    /// Free-form attributes such as `name` or `opening_hours`.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// The weight of this feature in the heatmap.
    #[serde(default = "unit_count")]
    pub count: u32,
}

fn unit_count() -> u32 {
    1
}

impl Feature {
    /// Creates a feature with no tags and a unit count.
    pub fn new(id: FeatureId, category: Category, pos: GeoPos) -> Self {
        Self {
            id,
            category,
            pos,
            tags: BTreeMap::new(),
            count: 1,
        }
    }

    /// Adds a tag, for building features by hand.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// The `name` tag, if any.
    pub fn name(&self) -> Option<&str> {
        self.tags.get("name").map(String::as_str)
    }

    /// The `opening_hours` tag, if any.
    pub fn opening_hours(&self) -> Option<&str> {
        self.tags.get("opening_hours").map(String::as_str)
    }

    /// A line of text describing the feature, for popups and lists.
    pub fn title(&self) -> String {
        match self.name() {
            Some(name) => format!("{} ({})", name, self.category),
            None => format!("Unnamed {} ({})", self.category.label().to_lowercase(), self.id),
        }
    }
}
