//! Map projection.

use egui::Rect;
use serde::{Deserialize, Serialize};

use crate::{TILE_SIZE, lat_to_y, lon_to_x, x_to_lon, y_to_lat};

/// A geographical position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPos {
    /// Longitude in degrees.
    pub lon: f64,
    /// Latitude in degrees.
    pub lat: f64,
}

impl From<(f64, f64)> for GeoPos {
    /// Converts a `(longitude, latitude)` tuple.
    fn from((lon, lat): (f64, f64)) -> Self {
        Self { lon, lat }
    }
}

/// A rectangular geographic region, such as the area covered by a completed query.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Southern edge (minimum latitude).
    pub south: f64,
    /// Western edge (minimum longitude).
    pub west: f64,
    /// Northern edge (maximum latitude).
    pub north: f64,
    /// Eastern edge (maximum longitude).
    pub east: f64,
}

impl Bounds {
    /// Whether `pos` lies inside or on the edge of the bounds.
    pub fn contains_pos(&self, pos: GeoPos) -> bool {
        (self.south..=self.north).contains(&pos.lat) && (self.west..=self.east).contains(&pos.lon)
    }

    /// Whether `other` lies completely inside these bounds.
    pub fn contains(&self, other: &Bounds) -> bool {
        self.south <= other.south
            && self.west <= other.west
            && self.north >= other.north
            && self.east >= other.east
    }

    /// The bounds in the `south,west,north,east` form used by Overpass QL.
    pub fn to_overpass_bbox(&self) -> String {
        format!("{},{},{},{}", self.south, self.west, self.north, self.east)
    }
}

/// A helper for converting between geographical and screen coordinates.
pub struct MapProjection {
    zoom: u8,
    center: GeoPos,
    widget_rect: Rect,
}

impl MapProjection {
    /// Creates a new `MapProjection`.
    pub(crate) fn new(zoom: u8, center: GeoPos, widget_rect: Rect) -> Self {
        Self {
            zoom,
            center,
            widget_rect,
        }
    }

    /// The zoom level being projected.
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// Projects a geographical coordinate to a screen coordinate.
    pub fn project(&self, geo_pos: GeoPos) -> egui::Pos2 {
        let center_x = lon_to_x(self.center.lon, self.zoom);
        let center_y = lat_to_y(self.center.lat, self.zoom);

        let tile_x = lon_to_x(geo_pos.lon, self.zoom);
        let tile_y = lat_to_y(geo_pos.lat, self.zoom);

        let dx = (tile_x - center_x) * TILE_SIZE as f64;
        let dy = (tile_y - center_y) * TILE_SIZE as f64;

        let widget_center = self.widget_rect.center();
        widget_center + egui::vec2(dx as f32, dy as f32)
    }

    /// Un-projects a screen coordinate to a geographical coordinate.
    pub fn unproject(&self, screen_pos: egui::Pos2) -> GeoPos {
        let rel_pos = screen_pos - self.widget_rect.min;
        let widget_center_x = self.widget_rect.width() as f64 / 2.0;
        let widget_center_y = self.widget_rect.height() as f64 / 2.0;

        let center_x = lon_to_x(self.center.lon, self.zoom);
        let center_y = lat_to_y(self.center.lat, self.zoom);

        let target_x = center_x + (rel_pos.x as f64 - widget_center_x) / TILE_SIZE as f64;
        let target_y = center_y + (rel_pos.y as f64 - widget_center_y) / TILE_SIZE as f64;

        GeoPos {
            lon: x_to_lon(target_x, self.zoom),
            lat: y_to_lat(target_y, self.zoom),
        }
    }

    /// The geographic area covered by the widget.
    pub fn bounds(&self) -> Bounds {
        let north_west = self.unproject(self.widget_rect.left_top());
        let south_east = self.unproject(self.widget_rect.right_bottom());
        Bounds {
            south: south_east.lat,
            west: north_west.lon,
            north: north_west.lat,
            east: south_east.lon,
        }
    }

    /// The on-screen length, in points, of `degrees` of longitude at `pos`.
    pub fn degrees_to_pixels(&self, pos: GeoPos, degrees: f64) -> f32 {
        let shifted = GeoPos {
            lon: pos.lon + degrees,
            lat: pos.lat,
        };
        (self.project(shifted).x - self.project(pos).x).abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::{Vec2, pos2};

    fn projection() -> MapProjection {
        MapProjection::new(
            14,
            GeoPos {
                lon: 10.524,
                lat: 52.265,
            },
            Rect::from_min_size(pos2(0.0, 0.0), Vec2::new(800.0, 600.0)),
        )
    }

    #[test]
    fn center_projects_to_widget_center() {
        let p = projection();
        let screen = p.project(GeoPos {
            lon: 10.524,
            lat: 52.265,
        });
        assert!((screen.x - 400.0).abs() < 1e-3);
        assert!((screen.y - 300.0).abs() < 1e-3);
    }

    #[test]
    fn project_unproject_roundtrip() {
        let p = projection();
        let original = GeoPos {
            lon: 10.53,
            lat: 52.27,
        };
        let back = p.unproject(p.project(original));
        assert!((back.lon - original.lon).abs() < 1e-5);
        assert!((back.lat - original.lat).abs() < 1e-5);
    }

    #[test]
    fn widget_bounds_surround_center() {
        let bounds = projection().bounds();
        assert!(bounds.south < bounds.north);
        assert!(bounds.west < bounds.east);
        assert!(bounds.contains_pos(GeoPos {
            lon: 10.524,
            lat: 52.265
        }));
    }

    #[test]
    fn bounds_containment() {
        let outer = Bounds {
            south: 52.0,
            west: 10.0,
            north: 53.0,
            east: 11.0,
        };
        let inner = Bounds {
            south: 52.2,
            west: 10.2,
            north: 52.8,
            east: 10.8,
        };
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.contains(&outer));
        assert!(!outer.contains_pos(GeoPos { lon: 9.0, lat: 52.5 }));
    }

    #[test]
    fn overpass_bbox_order() {
        let bounds = Bounds {
            south: 52.25,
            west: 10.5,
            north: 52.28,
            east: 10.55,
        };
        assert_eq!(bounds.to_overpass_bbox(), "52.25,10.5,52.28,10.55");
    }

    #[test]
    fn degrees_to_pixels_grows_with_zoom() {
        let pos = GeoPos {
            lon: 10.524,
            lat: 52.265,
        };
        let rect = Rect::from_min_size(pos2(0.0, 0.0), Vec2::new(800.0, 600.0));
        let near = MapProjection::new(16, pos, rect).degrees_to_pixels(pos, 0.001);
        let far = MapProjection::new(12, pos, rect).degrees_to_pixels(pos, 0.001);
        assert!(near > far);
    }
}
