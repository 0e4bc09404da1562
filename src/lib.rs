#![warn(missing_docs)]

//! An interactive map of cafés, libraries and universities for `egui`.
//!
//! Points of interest are fetched from the Overpass API for the visible part of the map,
//! de-duplicated into a [`cache::FeatureCache`] and drawn on top of OpenStreetMap tiles as one
//! heatmap per [`feature::Category`] plus clickable markers.
//!
//! The [`Map`] widget can also be used on its own:
//!
//! ```no_run
//! use eframe::egui;
//! use poi_heatmap::{Map, config::OpenStreetMapConfig};
//!
//! struct MyApp {
//!     map: Map,
//! }
//!
//! impl Default for MyApp {
//!     fn default() -> Self {
//!         Self {
//!             map: Map::new(OpenStreetMapConfig::default()),
//!         }
//!     }
//! }
//!
//! impl eframe::App for MyApp {
//!     fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
//!         egui::CentralPanel::default()
//!             .frame(egui::Frame::NONE)
//!             .show(ctx, |ui| {
//!                 ui.add(&mut self.map);
//!             });
//!     }
//! }
//! ```

/// The view controller tying map, cache and queries together.
pub mod app;
/// Accumulated, de-duplicated points of interest.
pub mod cache;
/// Configuration traits and types for the map widget.
pub mod config;
/// Points of interest and their categories.
pub mod feature;
/// Free-text place search.
pub mod geocode;
/// Layers drawn on top of the map tiles.
pub mod layers;
/// Locating the user.
pub mod locate;
/// Bounded-box point of interest queries.
pub mod overpass;
/// Geographic coordinates and the screen projection.
pub mod projection;
/// The persisted map view and its permalink encoding.
pub mod view;

use eframe::egui;
use egui::{Color32, Rect, Response, Sense, Ui, Vec2, Widget, pos2};
use eyre::{Context, Result};
use log::{debug, error};
use once_cell::sync::Lazy;
use poll_promise::Promise;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

use crate::config::MapConfig;
use crate::layers::Layer;
use crate::projection::{Bounds, GeoPos, MapProjection};
use crate::view::ViewState;

// The size of a map tile in pixels.
pub(crate) const TILE_SIZE: u32 = 256;
/// The minimum zoom level.
pub const MIN_ZOOM: u8 = 0;
/// The maximum zoom level.
pub const MAX_ZOOM: u8 = 19;

// Every outgoing request (tiles, Overpass, Nominatim) shares one client.
pub(crate) static CLIENT: Lazy<reqwest::blocking::Client> = Lazy::new(|| {
    reqwest::blocking::Client::builder()
        .user_agent(format!(
            "{}/{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ))
        .build()
        .expect("Failed to build reqwest client")
});

/// Errors that can occur while using the map widget.
#[derive(Error, Debug)]
pub enum MapError {
    /// An error occurred while making a web request.
    #[error("Connection error")]
    ConnectionError(#[from] reqwest::Error),

    /// A map tile failed to download.
    #[error("A map tile failed to download. HTTP Status: `{0}`")]
    TileDownloadError(String),

    /// The downloaded tile bytes could not be converted to an image.
    #[error("Unable to convert downloaded map tile bytes as image")]
    TileBytesConversionError(#[from] image::ImageError),
}

/// A unique identifier for a map tile.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct TileId {
    /// The zoom level.
    pub z: u8,

    /// The x-coordinate of the tile.
    pub x: u32,

    /// The y-coordinate of the tile.
    pub y: u32,
}

impl TileId {
    fn to_url(&self, config: &dyn MapConfig) -> String {
        config.tile_url(self)
    }
}

/// The state of a tile in the cache.
enum Tile {
    /// The tile is being downloaded.
    Loading(Promise<Result<egui::ColorImage, Arc<eyre::Report>>>),

    /// The tile is in memory.
    Loaded(egui::TextureHandle),

    /// The tile failed to download.
    Failed(Arc<eyre::Report>),
}

/// The map widget.
///
/// The returned [`Response`] is marked as changed whenever the user finishes a pan or changes the
/// zoom level, so callers can react once per move instead of once per frame.
pub struct Map {
    /// The geographical center of the map.
    pub center: GeoPos,

    /// The zoom level of the map.
    pub zoom: u8,

    /// The geographical position under the mouse pointer, if any.
    pub mouse_pos: Option<GeoPos>,

    /// Tint applied to the base tiles. The alpha channel sets the tile opacity.
    pub tile_tint: Color32,

    tiles: HashMap<TileId, Tile>,

    // Drawn in key order, handed input in reverse key order.
    layers: BTreeMap<String, Box<dyn Layer>>,

    /// Configuration for the map, such as the tile server URL.
    config: Box<dyn MapConfig>,

    last_rect: Option<Rect>,
}

impl Map {
    /// Creates a new `Map` widget.
    ///
    /// # Arguments
    ///
    /// * `config` - A type that implements `MapConfig`, which provides configuration for the map.
    pub fn new<C: MapConfig + 'static>(config: C) -> Self {
        let center = config.default_center();
        let zoom = config.default_zoom();
        Self {
            center,
            zoom,
            mouse_pos: None,
            tile_tint: Color32::WHITE.gamma_multiply(config.tile_opacity()),
            tiles: HashMap::new(),
            layers: BTreeMap::new(),
            config: Box::new(config),
            last_rect: None,
        }
    }

    /// The map's configuration.
    pub fn config(&self) -> &dyn MapConfig {
        self.config.as_ref()
    }

    /// Adds a layer under `key`, replacing any layer already stored there.
    pub fn add_layer(&mut self, key: impl Into<String>, layer: impl Layer) {
        self.layers.insert(key.into(), Box::new(layer));
    }

    /// Removes the layer stored under `key`.
    pub fn remove_layer(&mut self, key: &str) -> Option<Box<dyn Layer>> {
        self.layers.remove(key)
    }

    /// All layers, in drawing order.
    pub fn layers(&self) -> &BTreeMap<String, Box<dyn Layer>> {
        &self.layers
    }

    /// Gets a layer by key, if it exists and has the type `T`.
    pub fn layer<T: Layer>(&self, key: &str) -> Option<&T> {
        self.layers
            .get(key)
            .and_then(|layer| layer.as_any().downcast_ref::<T>())
    }

    /// Gets a mutable layer by key, if it exists and has the type `T`.
    pub fn layer_mut<T: Layer>(&mut self, key: &str) -> Option<&mut T> {
        self.layers
            .get_mut(key)
            .and_then(|layer| layer.as_any_mut().downcast_mut::<T>())
    }

    /// The current center and zoom.
    pub fn view(&self) -> ViewState {
        ViewState {
            center: self.center,
            zoom: self.zoom,
        }
    }

    /// Moves the map to `view`. The zoom is clamped to the supported range.
    pub fn set_view(&mut self, view: ViewState) {
        self.center = view.center;
        self.zoom = view.zoom.clamp(MIN_ZOOM, MAX_ZOOM);
    }

    /// The geographic area covered by the widget the last time it was drawn.
    pub fn bounds(&self) -> Option<Bounds> {
        self.last_rect
            .map(|rect| MapProjection::new(self.zoom, self.center, rect).bounds())
    }

    /// Handles user input for panning and zooming. Returns `true` when the view has settled
    /// at a new position.
    fn handle_input(&mut self, ui: &Ui, rect: &Rect, response: &Response) -> bool {
        let projection = MapProjection::new(self.zoom, self.center, *rect);
        for layer in self.layers.values_mut().rev() {
            if layer.handle_input(response, &projection) {
                return false;
            }
        }

        let mut view_changed = false;

        // Handle panning
        if response.dragged() {
            let delta = response.drag_delta();
            let center_in_tiles_x = lon_to_x(self.center.lon, self.zoom);
            let center_in_tiles_y = lat_to_y(self.center.lat, self.zoom);

            let new_center_x = center_in_tiles_x - (delta.x as f64 / TILE_SIZE as f64);
            let new_center_y = center_in_tiles_y - (delta.y as f64 / TILE_SIZE as f64);

            let (new_center_x, new_center_y) =
                clamp_center(new_center_x, new_center_y, self.zoom, rect);

            self.center = GeoPos {
                lon: x_to_lon(new_center_x, self.zoom),
                lat: y_to_lat(new_center_y, self.zoom),
            };
        }

        if response.drag_stopped() {
            view_changed = true;
        }

        // Handle double-click to zoom and center
        if response.double_clicked() {
            if let Some(pointer_pos) = response.interact_pointer_pos() {
                let new_zoom = (self.zoom + 1).clamp(MIN_ZOOM, MAX_ZOOM);

                if new_zoom != self.zoom {
                    let target = projection.unproject(pointer_pos);
                    self.zoom = new_zoom;
                    self.center = target;
                    view_changed = true;
                }
            }
        }

        // Handle zooming and mouse position
        let Some(mouse_pos) = response.hover_pos().filter(|_| response.hovered()) else {
            self.mouse_pos = None;
            return view_changed;
        };

        let target = projection.unproject(mouse_pos);
        self.mouse_pos = Some(target);

        let scroll = ui.input(|i| i.raw_scroll_delta.y);
        if scroll != 0.0 {
            let old_zoom = self.zoom;
            let mut new_zoom = (self.zoom as i32 + scroll.signum() as i32)
                .clamp(MIN_ZOOM as i32, MAX_ZOOM as i32) as u8;

            // Refuse to zoom out further than the world fits the widget.
            if scroll < 0.0 {
                let world_pixel_size = 2.0_f64.powi(new_zoom as i32) * TILE_SIZE as f64;
                if world_pixel_size < rect.width() as f64 || world_pixel_size < rect.height() as f64
                {
                    new_zoom = old_zoom;
                }
            }

            if new_zoom != old_zoom {
                let mouse_rel = mouse_pos - rect.center();

                // Keep the geo-coordinate under the mouse at the same screen position.
                let new_center_x = lon_to_x(target.lon, new_zoom) - mouse_rel.x as f64 / TILE_SIZE as f64;
                let new_center_y = lat_to_y(target.lat, new_zoom) - mouse_rel.y as f64 / TILE_SIZE as f64;

                self.zoom = new_zoom;
                self.center = GeoPos {
                    lon: x_to_lon(new_center_x, new_zoom),
                    lat: y_to_lat(new_center_y, new_zoom),
                };
                view_changed = true;
            }
        }

        view_changed
    }

    /// Draws the map tiles and attribution.
    fn draw_map_and_attribution(&mut self, ui: &mut Ui, rect: &Rect) {
        let painter = ui.painter_at(*rect);
        painter.rect_filled(*rect, 0.0, Color32::from_rgb(220, 220, 220)); // Background

        let visible_tiles: Vec<_> = visible_tiles(self.zoom, self.center, rect).collect();
        for (tile_id, tile_pos) in visible_tiles {
            self.draw_tile(ui, &painter, tile_id, tile_pos);
        }

        let projection = MapProjection::new(self.zoom, self.center, *rect);
        for layer in self.layers.values() {
            layer.draw(&painter, &projection);
        }

        self.draw_attribution(ui, rect);
    }

    /// Draws a single map tile.
    fn draw_tile(
        &mut self,
        ui: &mut Ui,
        painter: &egui::Painter,
        tile_id: TileId,
        tile_pos: egui::Pos2,
    ) {
        let tile_state = self
            .tiles
            .entry(tile_id)
            .or_insert_with(|| Tile::Loading(download_tile(tile_id.to_url(self.config.as_ref()))));

        // Promote a finished download before matching, so it is drawn this frame.
        if let Tile::Loading(promise) = tile_state {
            if let Some(result) = promise.ready() {
                match result {
                    Ok(color_image) => {
                        let texture = ui.ctx().load_texture(
                            format!("tile_{}_{}_{}", tile_id.z, tile_id.x, tile_id.y),
                            color_image.clone(),
                            Default::default(),
                        );
                        *tile_state = Tile::Loaded(texture);
                    }
                    Err(e) => {
                        error!("{:?}", e);
                        *tile_state = Tile::Failed(e.clone());
                    }
                }
            }
        }

        let tile_rect =
            Rect::from_min_size(tile_pos, Vec2::new(TILE_SIZE as f32, TILE_SIZE as f32));

        match tile_state {
            Tile::Loading(_) => {
                draw_placeholder(painter, tile_rect, "?", Color32::ORANGE);
                ui.ctx().request_repaint();
            }
            Tile::Loaded(texture) => {
                painter.image(
                    texture.id(),
                    tile_rect,
                    Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
                    self.tile_tint,
                );
            }
            Tile::Failed(e) => {
                draw_placeholder(painter, tile_rect, "!", Color32::RED);
                let response = ui.interact(tile_rect, ui.id().with(tile_id), Sense::hover());
                response.on_hover_text(format!("{}", e));
            }
        }
    }

    /// Draws the attribution text.
    fn draw_attribution(&self, ui: &mut Ui, rect: &Rect) {
        let Some(attribution) = self.config.attribution() else {
            return;
        };

        let bg_color = if ui.visuals().dark_mode {
            Color32::from_black_alpha(150)
        } else {
            Color32::from_white_alpha(150)
        };

        let frame = egui::Frame::NONE
            .inner_margin(egui::Margin::same(5))
            .fill(bg_color)
            .corner_radius(3.0);

        egui::Area::new(ui.id().with("attribution"))
            .fixed_pos(rect.left_bottom())
            .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(5.0, -5.0))
            .show(ui.ctx(), |ui| {
                frame.show(ui, |ui| {
                    ui.style_mut().override_text_style = Some(egui::TextStyle::Small);
                    ui.style_mut().wrap_mode = Some(egui::TextWrapMode::Extend);

                    if let Some(url) = self.config.attribution_url() {
                        ui.hyperlink_to(attribution, url);
                    } else {
                        ui.label(attribution);
                    }
                });
            });
    }
}

/// Starts downloading and decoding a tile on a worker thread.
fn download_tile(url: String) -> Promise<Result<egui::ColorImage, Arc<eyre::Report>>> {
    Promise::spawn_thread("download_tile", move || -> Result<_, Arc<eyre::Report>> {
        let result: Result<_, eyre::Report> = (|| {
            debug!("Downloading tile from {}", &url);
            let response = CLIENT.get(&url).send().map_err(MapError::from)?;

            if !response.status().is_success() {
                return Err(MapError::TileDownloadError(response.status().to_string()));
            }

            let bytes = response.bytes().map_err(MapError::from)?.to_vec();
            let image = image::load_from_memory(&bytes)
                .map_err(MapError::from)?
                .to_rgba8();

            let size = [image.width() as _, image.height() as _];
            let pixels = image.into_raw();
            Ok(egui::ColorImage::from_rgba_unmultiplied(size, &pixels))
        })()
        .with_context(|| format!("Failed to download tile from {}", &url));

        result.map_err(Arc::new)
    })
}

fn draw_placeholder(painter: &egui::Painter, tile_rect: Rect, symbol: &str, color: Color32) {
    painter.rect_filled(tile_rect, 0.0, Color32::from_gray(220));
    painter.rect_stroke(
        tile_rect,
        0.0,
        egui::Stroke::new(1.0, Color32::GRAY),
        egui::StrokeKind::Inside,
    );
    painter.text(
        tile_rect.center(),
        egui::Align2::CENTER_CENTER,
        symbol,
        egui::FontId::proportional(40.0),
        color,
    );
}

/// Clamps a center given in tile coordinates so the world always covers the widget. If the
/// world is smaller than the widget, the center is put in the middle of the world.
fn clamp_center(x: f64, y: f64, zoom: u8, rect: &Rect) -> (f64, f64) {
    let world_size_in_tiles = 2.0_f64.powi(zoom as i32);
    let half_view_x = rect.width() as f64 / TILE_SIZE as f64 / 2.0;
    let half_view_y = rect.height() as f64 / TILE_SIZE as f64 / 2.0;

    let clamp_axis = |value: f64, half_view: f64| {
        let (min, max) = (half_view, world_size_in_tiles - half_view);
        if min > max {
            world_size_in_tiles / 2.0
        } else {
            value.clamp(min, max)
        }
    };

    (clamp_axis(x, half_view_x), clamp_axis(y, half_view_y))
}

/// Returns an iterator over the tiles visible in `rect` and their screen positions.
fn visible_tiles(
    zoom: u8,
    center: GeoPos,
    rect: &Rect,
) -> impl Iterator<Item = (TileId, egui::Pos2)> {
    let center_x = lon_to_x(center.lon, zoom);
    let center_y = lat_to_y(center.lat, zoom);

    let widget_center_x = rect.width() / 2.0;
    let widget_center_y = rect.height() / 2.0;

    let tile_count = 2_i64.pow(zoom as u32);
    let x_min = (center_x - widget_center_x as f64 / TILE_SIZE as f64).floor() as i64;
    let y_min = (center_y - widget_center_y as f64 / TILE_SIZE as f64).floor() as i64;
    let x_max = (center_x + widget_center_x as f64 / TILE_SIZE as f64).ceil() as i64;
    let y_max = (center_y + widget_center_y as f64 / TILE_SIZE as f64).ceil() as i64;

    let rect_min = rect.min;
    (x_min.max(0)..=x_max.min(tile_count - 1)).flat_map(move |x| {
        (y_min.max(0)..=y_max.min(tile_count - 1)).map(move |y| {
            let tile_id = TileId {
                z: zoom,
                x: x as u32,
                y: y as u32,
            };
            let screen_x = widget_center_x + (x as f64 - center_x) as f32 * TILE_SIZE as f32;
            let screen_y = widget_center_y + (y as f64 - center_y) as f32 * TILE_SIZE as f32;
            (tile_id, rect_min + Vec2::new(screen_x, screen_y))
        })
    })
}

/// Converts longitude to the x-coordinate of a tile at a given zoom level.
pub(crate) fn lon_to_x(lon: f64, zoom: u8) -> f64 {
    (lon + 180.0) / 360.0 * (2.0_f64.powi(zoom as i32))
}

/// Converts latitude to the y-coordinate of a tile at a given zoom level.
pub(crate) fn lat_to_y(lat: f64, zoom: u8) -> f64 {
    (1.0 - lat.to_radians().tan().asinh() / std::f64::consts::PI) / 2.0
        * (2.0_f64.powi(zoom as i32))
}

/// Converts the x-coordinate of a tile to longitude at a given zoom level.
pub(crate) fn x_to_lon(x: f64, zoom: u8) -> f64 {
    x / (2.0_f64.powi(zoom as i32)) * 360.0 - 180.0
}

/// Converts the y-coordinate of a tile to latitude at a given zoom level.
pub(crate) fn y_to_lat(y: f64, zoom: u8) -> f64 {
    let n = std::f64::consts::PI - 2.0 * std::f64::consts::PI * y / (2.0_f64.powi(zoom as i32));
    n.sinh().atan().to_degrees()
}

impl Widget for &mut Map {
    fn ui(self, ui: &mut Ui) -> Response {
        let (rect, mut response) =
            ui.allocate_exact_size(ui.available_size(), Sense::drag().union(Sense::click()));
        let view_changed = self.handle_input(ui, &rect, &response);
        self.draw_map_and_attribution(ui, &rect);

        // A resize changes the visible bounds just like a pan does.
        if view_changed || self.last_rect.is_none_or(|last| last.size() != rect.size()) {
            response.mark_changed();
        }
        self.last_rect = Some(rect);

        response
    }
}
