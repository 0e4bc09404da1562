//! A layer of clickable point of interest markers.

use egui::{Align2, Color32, FontId, Painter, Pos2, Rect, Response, Stroke};
use std::any::Any;

use crate::feature::{Feature, FeatureId};
use crate::layers::Layer;
use crate::projection::MapProjection;

/// Shows features as dots. Clicking a dot opens a popup with its details.
#[derive(Clone, Debug)]
pub struct MarkerLayer {
    markers: Vec<Feature>,
    selected: Option<FeatureId>,

    /// Radius of a marker in screen points.
    pub radius: f32,

    /// Outline of the markers.
    pub stroke: Stroke,
}

impl Default for MarkerLayer {
    fn default() -> Self {
        Self {
            markers: Vec::new(),
            selected: None,
            radius: 5.0,
            stroke: Stroke::new(1.5, Color32::WHITE),
        }
    }
}

impl MarkerLayer {
    /// Replaces the markers. The selection survives if its feature is still shown.
    pub fn set_features(&mut self, features: impl IntoIterator<Item = Feature>) {
        self.markers = features.into_iter().collect();
        if let Some(id) = self.selected {
            if !self.markers.iter().any(|f| f.id == id) {
                self.selected = None;
            }
        }
    }

    /// Removes all markers.
    pub fn clear(&mut self) {
        self.markers.clear();
        self.selected = None;
    }

    /// The shown features.
    pub fn features(&self) -> &[Feature] {
        &self.markers
    }

    /// The feature whose popup is open.
    pub fn selected(&self) -> Option<&Feature> {
        let id = self.selected?;
        self.markers.iter().find(|f| f.id == id)
    }

    /// Selects the marker closest to `screen_pos`, if one is within reach. Returns whether a
    /// marker was hit.
    pub fn select_at(&mut self, screen_pos: Pos2, projection: &MapProjection) -> bool {
        self.selected = self.find_marker_at(screen_pos, projection);
        self.selected.is_some()
    }

    fn find_marker_at(&self, screen_pos: Pos2, projection: &MapProjection) -> Option<FeatureId> {
        let click_tolerance_sq = (self.radius * 2.0).powi(2);
        self.markers
            .iter()
            .map(|f| (f.id, projection.project(f.pos).distance_sq(screen_pos)))
            .filter(|(_, dist_sq)| *dist_sq <= click_tolerance_sq)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    fn draw_popup(&self, painter: &Painter, feature: &Feature, anchor: Pos2) {
        let mut lines = vec![feature.title()];
        if let Some(hours) = feature.opening_hours() {
            lines.push(format!("Opening hours: {}", hours));
        }
        if let Some(website) = feature.tags.get("website") {
            lines.push(website.clone());
        }
        lines.push(feature.id.to_string());

        let galley = painter.layout_no_wrap(
            lines.join("\n"),
            FontId::proportional(13.0),
            Color32::BLACK,
        );
        let popup_anchor = anchor - egui::vec2(0.0, self.radius + 6.0);
        let rect = Align2::CENTER_BOTTOM.anchor_rect(Rect::from_min_size(popup_anchor, galley.size()));

        painter.rect_filled(rect.expand(6.0), 4.0, Color32::from_white_alpha(235));
        painter.rect_stroke(
            rect.expand(6.0),
            4.0,
            Stroke::new(1.0, Color32::GRAY),
            egui::StrokeKind::Outside,
        );
        painter.galley(rect.min, galley, Color32::BLACK);
    }
}

/// Double clicks are left to the map so they keep zooming in.
fn selects_on_click(clicked: bool, double_clicked: bool) -> bool {
    clicked && !double_clicked
}

impl Layer for MarkerLayer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn handle_input(&mut self, response: &Response, projection: &MapProjection) -> bool {
        if !selects_on_click(response.clicked(), response.double_clicked()) {
            return false;
        }
        match response.interact_pointer_pos() {
            Some(pointer_pos) => self.select_at(pointer_pos, projection),
            None => false,
        }
    }

    fn draw(&self, painter: &Painter, projection: &MapProjection) {
        let clip = painter.clip_rect().expand(self.radius);
        for feature in &self.markers {
            let center = projection.project(feature.pos);
            if clip.contains(center) {
                painter.circle(center, self.radius, feature.category.color(), self.stroke);
            }
        }

        if let Some(feature) = self.selected() {
            self.draw_popup(painter, feature, projection.project(feature.pos));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Category;
    use crate::projection::GeoPos;
    use egui::{Vec2, pos2};

    fn projection() -> MapProjection {
        MapProjection::new(
            16,
            GeoPos {
                lon: 10.524,
                lat: 52.265,
            },
            Rect::from_min_size(pos2(0.0, 0.0), Vec2::new(800.0, 600.0)),
        )
    }

    fn features() -> Vec<Feature> {
        vec![
            Feature::new(
                FeatureId::node(1),
                Category::Cafe,
                GeoPos {
                    lon: 10.524,
                    lat: 52.265,
                },
            ),
            Feature::new(
                FeatureId::node(2),
                Category::Library,
                GeoPos {
                    lon: 10.526,
                    lat: 52.265,
                },
            ),
        ]
    }

    #[test]
    fn click_near_marker_selects_it() {
        let mut layer = MarkerLayer::default();
        layer.set_features(features());
        let projection = projection();

        assert!(layer.select_at(pos2(402.0, 301.0), &projection));
        assert_eq!(layer.selected().map(|f| f.id), Some(FeatureId::node(1)));

        let library = projection.project(GeoPos {
            lon: 10.526,
            lat: 52.265,
        });
        assert!(layer.select_at(library, &projection));
        assert_eq!(layer.selected().map(|f| f.id), Some(FeatureId::node(2)));
    }

    #[test]
    fn click_on_empty_map_clears_selection() {
        let mut layer = MarkerLayer::default();
        layer.set_features(features());
        let projection = projection();

        assert!(layer.select_at(pos2(400.0, 300.0), &projection));
        assert!(!layer.select_at(pos2(10.0, 10.0), &projection));
        assert!(layer.selected().is_none());
    }

    #[test]
    fn selection_survives_refresh_only_if_still_shown() {
        let mut layer = MarkerLayer::default();
        layer.set_features(features());
        layer.select_at(pos2(400.0, 300.0), &projection());

        layer.set_features(features());
        assert!(layer.selected().is_some());

        layer.set_features(features().into_iter().skip(1));
        assert!(layer.selected().is_none());
    }

    #[test]
    fn double_click_is_not_consumed() {
        assert!(selects_on_click(true, false));
        assert!(!selects_on_click(true, true));
        assert!(!selects_on_click(false, false));
    }

    #[test]
    fn clear_removes_markers() {
        let mut layer = MarkerLayer::default();
        layer.set_features(features());
        layer.clear();
        assert!(layer.features().is_empty());
        assert!(layer.selected().is_none());
    }
}
