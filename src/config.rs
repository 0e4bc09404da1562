//! Configuration for the tile provider and the remote point of interest services.

use crate::TileId;
use crate::projection::GeoPos;

/// Configuration for a map provider.
pub trait MapConfig {
    /// Returns the URL for a given tile.
    fn tile_url(&self, tile: &TileId) -> String;

    /// Returns the attribution text to be displayed on the map. If returns `None`, no attribution is shown.
    fn attribution(&self) -> Option<&String>;

    /// Returns the attribution URL to be linked from the attribution text.
    fn attribution_url(&self) -> Option<&String>;

    /// The default geographical center of the map.
    fn default_center(&self) -> GeoPos;

    /// The default zoom level of the map.
    fn default_zoom(&self) -> u8;

    /// Opacity of the base tiles, between 0 and 1.
    fn tile_opacity(&self) -> f32 {
        1.0
    }
}

/// Configuration for the OpenStreetMap tile server.
///
/// # Example
///
/// ```
/// use poi_heatmap::config::OpenStreetMapConfig;
/// let config = OpenStreetMapConfig::default();
/// ```
#[cfg(feature = "openstreetmap")]
pub struct OpenStreetMapConfig {
    base_url: String,
    attribution: String,
    attribution_url: String,
    default_center: GeoPos,
    default_zoom: u8,
    tile_opacity: f32,
}

#[cfg(feature = "openstreetmap")]
impl Default for OpenStreetMapConfig {
    fn default() -> Self {
        Self {
            base_url: "https://tile.openstreetmap.org".to_string(),
            attribution: "© OpenStreetMap contributors, POI via Overpass API".to_string(),
            attribution_url: "https://www.openstreetmap.org/copyright".to_string(),
            default_center: GeoPos {
                lon: 10.524,
                lat: 52.265,
            }, // Braunschweig, Germany
            default_zoom: 14,
            tile_opacity: 0.7,
        }
    }
}

#[cfg(feature = "openstreetmap")]
impl MapConfig for OpenStreetMapConfig {
    fn tile_url(&self, tile: &TileId) -> String {
        format!("{}/{}/{}/{}.png", self.base_url, tile.z, tile.x, tile.y)
    }

    fn attribution(&self) -> Option<&String> {
        Some(&self.attribution)
    }

    fn attribution_url(&self) -> Option<&String> {
        Some(&self.attribution_url)
    }

    fn default_center(&self) -> GeoPos {
        self.default_center
    }

    fn default_zoom(&self) -> u8 {
        self.default_zoom
    }

    fn tile_opacity(&self) -> f32 {
        self.tile_opacity
    }
}

/// Endpoints of the remote services queried for points of interest and places.
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceConfig {
    /// The Overpass API interpreter endpoint.
    pub overpass_url: String,

    /// The Nominatim search endpoint.
    pub nominatim_url: String,

    /// Server side timeout for a single Overpass query, in seconds.
    pub overpass_timeout_secs: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            overpass_url: "https://overpass-api.de/api/interpreter".to_string(),
            nominatim_url: "https://nominatim.openstreetmap.org/search".to_string(),
            overpass_timeout_secs: 25,
        }
    }
}
