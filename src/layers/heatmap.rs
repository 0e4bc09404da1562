//! A layer drawing weighted points as soft, overlapping blobs.
//!
//! Every point becomes a radial gradient whose radius is fixed in degrees, so blobs grow as the
//! user zooms in. Overlapping blobs blend, which is what makes dense areas stand out.

use egui::{Color32, Mesh, Painter, Pos2, Response, Shape};
use std::any::Any;

use crate::feature::Feature;
use crate::layers::Layer;
use crate::projection::{GeoPos, MapProjection};

/// Number of outer vertices of a blob.
const BLOB_SEGMENTS: u32 = 20;

/// A weighted point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeatPoint {
    /// Where the point is.
    pub pos: GeoPos,
    /// Its weight. Weights at or above the layer maximum are drawn fully opaque.
    pub value: f32,
}

impl From<&Feature> for HeatPoint {
    fn from(feature: &Feature) -> Self {
        Self {
            pos: feature.pos,
            value: feature.count as f32,
        }
    }
}

/// A layer rendering one data set as a heatmap.
#[derive(Clone, Debug)]
pub struct HeatmapLayer {
    points: Vec<HeatPoint>,
    max: f32,

    /// The color at the center of a blob.
    pub color: Color32,

    /// Blob radius in degrees of longitude.
    pub radius_degrees: f64,

    /// Blobs are never drawn smaller than this, in screen points.
    pub min_radius: f32,

    /// Opacity of a blob whose value reaches the maximum.
    pub max_opacity: f32,
}

impl Default for HeatmapLayer {
    fn default() -> Self {
        Self::new(Color32::RED)
    }
}

impl HeatmapLayer {
    /// Creates an empty layer drawing in `color`.
    pub fn new(color: Color32) -> Self {
        Self {
            points: Vec::new(),
            max: 2.0,
            color,
            radius_degrees: 0.001,
            min_radius: 3.0,
            max_opacity: 0.5,
        }
    }

    /// Replaces the data set. `max` is the value drawn at full `max_opacity`.
    pub fn set_data(&mut self, points: Vec<HeatPoint>, max: f32) {
        self.points = points;
        self.max = max;
    }

    /// Removes all points.
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// The current data set.
    pub fn points(&self) -> &[HeatPoint] {
        &self.points
    }

    /// Whether the layer has nothing to draw.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The opacity of the center of a blob with the given value.
    fn opacity(&self, value: f32) -> f32 {
        if self.max <= 0.0 {
            return self.max_opacity;
        }
        self.max_opacity * (value / self.max).clamp(0.0, 1.0)
    }

    fn add_blob(&self, mesh: &mut Mesh, center: Pos2, radius: f32, color: Color32) {
        let first = mesh.vertices.len() as u32;
        mesh.colored_vertex(center, color);
        for i in 0..BLOB_SEGMENTS {
            let angle = i as f32 / BLOB_SEGMENTS as f32 * std::f32::consts::TAU;
            let rim = center + radius * egui::vec2(angle.cos(), angle.sin());
            mesh.colored_vertex(rim, Color32::TRANSPARENT);
        }
        for i in 0..BLOB_SEGMENTS {
            let a = first + 1 + i;
            let b = first + 1 + (i + 1) % BLOB_SEGMENTS;
            mesh.add_triangle(first, a, b);
        }
    }
}

impl Layer for HeatmapLayer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn handle_input(&mut self, _response: &Response, _projection: &MapProjection) -> bool {
        false
    }

    fn draw(&self, painter: &Painter, projection: &MapProjection) {
        if self.points.is_empty() {
            return;
        }

        let clip = painter.clip_rect();
        let mut mesh = Mesh::default();
        for point in &self.points {
            let center = projection.project(point.pos);
            let radius = projection
                .degrees_to_pixels(point.pos, self.radius_degrees)
                .max(self.min_radius);
            if !clip.expand(radius).contains(center) {
                continue;
            }
            let color = self.color.gamma_multiply(self.opacity(point.value));
            self.add_blob(&mut mesh, center, radius, color);
        }

        if !mesh.is_empty() {
            painter.add(Shape::mesh(mesh));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{Category, FeatureId};

    #[test]
    fn heat_point_from_feature_uses_count() {
        let mut feature = Feature::new(
            FeatureId::node(1),
            Category::Cafe,
            GeoPos { lon: 20.0, lat: 10.0 },
        );
        feature.count = 3;
        let point = HeatPoint::from(&feature);
        assert_eq!(point.value, 3.0);
        assert_eq!(point.pos, feature.pos);
    }

    #[test]
    fn set_data_and_clear() {
        let mut layer = HeatmapLayer::default();
        assert!(layer.is_empty());

        layer.set_data(
            vec![HeatPoint {
                pos: GeoPos { lon: 0.0, lat: 0.0 },
                value: 1.0,
            }],
            2.0,
        );
        assert_eq!(layer.points().len(), 1);

        layer.clear();
        assert!(layer.is_empty());
    }

    #[test]
    fn opacity_scales_with_value() {
        let layer = HeatmapLayer::default();
        assert!((layer.opacity(1.0) - 0.25).abs() < f32::EPSILON);
        assert!((layer.opacity(2.0) - 0.5).abs() < f32::EPSILON);
        assert!((layer.opacity(10.0) - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn blob_is_a_triangle_fan() {
        let layer = HeatmapLayer::default();
        let mut mesh = Mesh::default();
        layer.add_blob(&mut mesh, Pos2::ZERO, 10.0, Color32::RED);
        layer.add_blob(&mut mesh, Pos2::ZERO, 10.0, Color32::RED);
        assert_eq!(mesh.vertices.len() as u32, 2 * (BLOB_SEGMENTS + 1));
        assert_eq!(mesh.indices.len() as u32, 2 * 3 * BLOB_SEGMENTS);
        assert!(mesh.is_valid());
    }

    #[test]
    fn heatmap_layer_as_any() {
        let layer = HeatmapLayer::default();
        assert!(layer.as_any().is::<HeatmapLayer>());
    }
}
