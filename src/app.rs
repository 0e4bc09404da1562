//! The application: decides when to query, what to render and what to persist.
//!
//! All state lives in [`PoiMapApp`]. Query and search results arrive through promises that are
//! polled once per frame, so every cache mutation happens on the UI thread.

use eframe::egui;
use log::{debug, info, warn};
use poll_promise::Promise;
use std::sync::Arc;

use crate::Map;
use crate::cache::FeatureCache;
use crate::config::ServiceConfig;
use crate::feature::Category;
use crate::geocode::{NominatimClient, Place};
use crate::layers::heatmap::{HeatPoint, HeatmapLayer};
use crate::layers::marker::MarkerLayer;
use crate::locate::Locator;
use crate::overpass::{OverpassClient, QueryError, QueryOutcome};
use crate::projection::{Bounds, GeoPos};
use crate::view::{Permalink, ViewSource, ViewState, initial_view};

/// Below this zoom level nothing is rendered or queried.
pub const MIN_DATA_ZOOM: u8 = 11;

/// The heat value drawn at full opacity.
pub const HEAT_MAX: f32 = 2.0;

/// Zoom level used when jumping to a search result or the user's location.
const FOCUS_ZOOM: u8 = 16;

const MARKERS_KEY: &str = "markers";

/// The key of the heatmap layer of `category`. Heatmaps sort before the markers so they are
/// drawn underneath them.
pub fn heat_key(category: Category) -> String {
    format!("heatmap:{}", category.tag_value())
}

/// How serious a notice is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeKind {
    /// Plain information.
    Info,
    /// Something was skipped.
    Warning,
    /// Something failed.
    Error,
}

/// A dismissible message shown on top of the map.
#[derive(Clone, Debug, PartialEq)]
pub struct Notice {
    /// How serious it is.
    pub kind: NoticeKind,
    /// What to show.
    pub text: String,
}

type QueryPromise = Promise<Result<QueryOutcome, Arc<eyre::Report>>>;
type SearchPromise = Promise<Result<Vec<Place>, Arc<eyre::Report>>>;

struct PendingQuery {
    bounds: Bounds,
    promise: QueryPromise,
}

/// The map application.
pub struct PoiMapApp {
    map: Map,
    cache: FeatureCache,
    overpass: OverpassClient,
    geocoder: NominatimClient,
    locator: Box<dyn Locator>,

    // Overlapping queries are neither cancelled nor de-duplicated.
    queries: Vec<PendingQuery>,
    search: Option<SearchPromise>,
    search_text: String,
    search_results: Vec<Place>,

    notices: Vec<Notice>,
    show_info: bool,
    last_hit_count: Option<usize>,
}

impl PoiMapApp {
    /// Creates the application with an empty cache, adding one heatmap per category and a
    /// marker layer to `map`.
    pub fn new(mut map: Map, services: &ServiceConfig, locator: Box<dyn Locator>) -> Self {
        for category in Category::ALL {
            map.add_layer(heat_key(category), HeatmapLayer::new(category.color()));
        }
        map.add_layer(MARKERS_KEY, MarkerLayer::default());

        Self {
            map,
            cache: FeatureCache::new(),
            overpass: OverpassClient::new(services),
            geocoder: NominatimClient::new(services),
            locator,
            queries: Vec::new(),
            search: None,
            search_text: String::new(),
            search_results: Vec::new(),
            notices: Vec::new(),
            show_info: false,
            last_hit_count: None,
        }
    }

    /// Restores the cache and picks the opening view: the permalink `fragment` first, then the
    /// stored view, then the user's location, then the configured default.
    pub fn restore(&mut self, fragment: Option<&str>, storage: Option<&dyn eframe::Storage>) {
        self.cache = storage.map(FeatureCache::load).unwrap_or_default();
        info!(
            "Restored {} cached features and {} covered areas",
            self.cache.len(),
            self.cache.covered_bounds().len()
        );

        match initial_view(fragment, storage) {
            Some((view, source)) => {
                debug!("Opening at {} from {:?}", view.permalink(), source);
                if source == ViewSource::Permalink {
                    info!("Opening shared location {}", view.permalink());
                }
                self.map.set_view(view);
            }
            None => match self.locator.locate() {
                Ok(pos) => self.focus(pos),
                Err(e) => {
                    warn!("{}", e);
                    self.notify(NoticeKind::Warning, e.to_string());
                }
            },
        }

        self.refresh_layers();
    }

    /// The map widget.
    pub fn map(&self) -> &Map {
        &self.map
    }

    /// The accumulated features.
    pub fn cache(&self) -> &FeatureCache {
        &self.cache
    }

    /// Notices that have not been dismissed yet, oldest first.
    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    /// The permalink of the current view.
    pub fn permalink(&self) -> Permalink {
        self.map.view().permalink()
    }

    /// The number of elements in the last query response, including rejected and oversized ones.
    pub fn last_hit_count(&self) -> Option<usize> {
        self.last_hit_count
    }

    /// The number of queries still running.
    pub fn queries_in_flight(&self) -> usize {
        self.queries.len()
    }

    /// Renders the cache into the layers, or empties every layer when zoomed out too far.
    /// The cache itself is left untouched.
    pub fn refresh_layers(&mut self) {
        let show = self.map.zoom >= MIN_DATA_ZOOM;

        for category in Category::ALL {
            let points: Vec<HeatPoint> = if show {
                self.cache.by_category(category).map(HeatPoint::from).collect()
            } else {
                Vec::new()
            };
            if let Some(layer) = self.map.layer_mut::<HeatmapLayer>(&heat_key(category)) {
                layer.set_data(points, HEAT_MAX);
            }
        }

        let markers = if show { self.cache.all().to_vec() } else { Vec::new() };
        if let Some(layer) = self.map.layer_mut::<MarkerLayer>(MARKERS_KEY) {
            layer.set_features(markers);
        }
    }

    /// Reacts to a settled map move: re-renders, persists the view and returns the area that
    /// still has to be queried, if any.
    pub fn handle_view_change(
        &mut self,
        bounds: Option<Bounds>,
        storage: Option<&mut dyn eframe::Storage>,
    ) -> Option<Bounds> {
        self.refresh_layers();

        let view = self.map.view();
        if let Some(storage) = storage {
            view.save(storage);
        }
        debug!("View changed to {}", view.permalink());

        if view.zoom < MIN_DATA_ZOOM {
            return None;
        }
        let bounds = bounds?;
        if self.cache.is_covered(&bounds) {
            debug!("{} is already covered", bounds.to_overpass_bbox());
            return None;
        }
        Some(bounds)
    }

    /// [`PoiMapApp::handle_view_change`] for the current map bounds, starting the query.
    pub fn on_view_changed(&mut self, storage: Option<&mut dyn eframe::Storage>) {
        let bounds = self.map.bounds();
        if let Some(bounds) = self.handle_view_change(bounds, storage) {
            self.start_query(bounds);
        }
    }

    fn start_query(&mut self, bounds: Bounds) {
        let promise = self.overpass.fetch(bounds);
        self.queries.push(PendingQuery { bounds, promise });
    }

    /// Applies the outcome of the query for `bounds`. Successful results are ingested and the
    /// bounds are recorded as covered, failures only produce a notice.
    pub fn on_query_complete(
        &mut self,
        bounds: Bounds,
        result: Result<QueryOutcome, Arc<eyre::Report>>,
        storage: Option<&mut dyn eframe::Storage>,
    ) {
        match result {
            Ok(outcome) => {
                self.last_hit_count = Some(outcome.features.len() + outcome.rejected);
                let features = outcome.features.into_iter().map(|mut feature| {
                    feature.count = 1;
                    feature
                });
                let accepted = self.cache.ingest(features);
                info!(
                    "Query for {} added {} features ({} rejected)",
                    bounds.to_overpass_bbox(),
                    accepted,
                    outcome.rejected
                );

                self.refresh_layers();
                self.cache.mark_bounds_covered(bounds);
                if let Some(storage) = storage {
                    self.cache.save(storage);
                }
            }
            Err(report) => match report.downcast_ref::<QueryError>() {
                Some(QueryError::TooManyResults(count)) => {
                    warn!("Rejected oversized result with {} elements", count);
                    self.last_hit_count = Some(*count);
                    self.notify(
                        NoticeKind::Warning,
                        QueryError::TooManyResults(*count).to_string(),
                    );
                }
                _ => {
                    warn!("{:?}", report);
                    self.notify(
                        NoticeKind::Error,
                        format!("Loading points of interest failed: {}", report),
                    );
                }
            },
        }
    }

    /// Takes every finished query and applies it.
    fn poll_queries(&mut self, mut storage: Option<&mut dyn eframe::Storage>) {
        for query in std::mem::take(&mut self.queries) {
            match query.promise.try_take() {
                Ok(result) => {
                    self.on_query_complete(query.bounds, result, reborrow(&mut storage))
                }
                Err(promise) => self.queries.push(PendingQuery {
                    bounds: query.bounds,
                    promise,
                }),
            }
        }
    }

    /// Starts a place search for the text in the search box.
    pub fn search(&mut self) {
        self.search_results.clear();
        self.search = self.geocoder.search(&self.search_text);
    }

    fn poll_search(&mut self) {
        let Some(promise) = self.search.take() else {
            return;
        };
        match promise.try_take() {
            Ok(Ok(places)) => {
                if places.is_empty() {
                    self.notify(
                        NoticeKind::Info,
                        format!("No places found for `{}`", self.search_text.trim()),
                    );
                }
                self.search_results = places;
            }
            Ok(Err(report)) => {
                warn!("{:?}", report);
                self.notify(NoticeKind::Error, format!("Place search failed: {}", report));
            }
            Err(promise) => self.search = Some(promise),
        }
    }

    /// Centers the map on `pos`, zoomed in far enough to show points of interest.
    pub fn focus(&mut self, pos: GeoPos) {
        let zoom = self.map.zoom.max(FOCUS_ZOOM);
        self.map.set_view(ViewState { center: pos, zoom });
    }

    /// The locate-me action.
    pub fn locate_me(&mut self, storage: Option<&mut dyn eframe::Storage>) {
        match self.locator.locate() {
            Ok(pos) => {
                self.focus(pos);
                self.on_view_changed(storage);
            }
            Err(e) => {
                warn!("{}", e);
                self.notify(NoticeKind::Warning, e.to_string());
            }
        }
    }

    /// The erase-cache-and-reload action: forgets every feature, covered area, running request
    /// and notice, then loads the current view again.
    pub fn reset(&mut self, mut storage: Option<&mut dyn eframe::Storage>) {
        info!("Erasing {} cached features", self.cache.len());
        self.cache.clear();
        self.queries.clear();
        self.search = None;
        self.search_results.clear();
        self.notices.clear();
        self.last_hit_count = None;

        if let Some(storage) = reborrow(&mut storage) {
            self.cache.save(storage);
        }
        self.on_view_changed(storage);
    }

    /// The cache as a GeoJSON FeatureCollection, for the export action.
    #[cfg(feature = "geojson")]
    pub fn export_geojson(&mut self) -> String {
        let geojson = self.cache.to_geojson_string();
        info!("Exported {} cached features as GeoJSON", self.cache.len());
        self.notify(
            NoticeKind::Info,
            format!("Copied {} places as GeoJSON", self.cache.len()),
        );
        geojson
    }

    /// Shows or hides the information window.
    pub fn toggle_info(&mut self) {
        self.show_info = !self.show_info;
    }

    /// Adds a notice.
    pub fn notify(&mut self, kind: NoticeKind, text: impl Into<String>) {
        self.notices.push(Notice {
            kind,
            text: text.into(),
        });
    }

    /// Dismisses the notice at `index`.
    pub fn dismiss_notice(&mut self, index: usize) {
        if index < self.notices.len() {
            self.notices.remove(index);
        }
    }

    fn toolbar(&mut self, ui: &mut egui::Ui, frame: &mut eframe::Frame) {
        ui.horizontal(|ui| {
            let search_box = ui.add(
                egui::TextEdit::singleline(&mut self.search_text)
                    .hint_text("Search for a place")
                    .desired_width(220.0),
            );
            let submitted =
                search_box.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if submitted || ui.button("Search").clicked() {
                self.search();
            }
            if self.search.is_some() {
                ui.spinner();
            }

            ui.separator();

            if ui.button("Locate me").clicked() {
                self.locate_me(storage(frame));
            }
            if ui.button("Erase cache & reload").clicked() {
                self.reset(storage(frame));
            }
            #[cfg(feature = "geojson")]
            if ui.button("Export GeoJSON").clicked() {
                let geojson = self.export_geojson();
                ui.ctx().copy_text(geojson);
            }
            if ui.button("Info").clicked() {
                self.toggle_info();
            }

            ui.separator();

            ui.label(format!("{} places cached", self.cache.len()));
            if let Some(hits) = self.last_hit_count {
                ui.label(format!("({})", hits));
            }
            if !self.queries.is_empty() {
                ui.spinner();
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let permalink = self.permalink().to_string();
                if ui.button("Copy link").clicked() {
                    ui.ctx().copy_text(permalink.clone());
                }
                ui.monospace(permalink);
            });
        });
    }

    fn legend(&self, ctx: &egui::Context) {
        egui::Area::new(egui::Id::new("legend"))
            .anchor(egui::Align2::RIGHT_BOTTOM, egui::vec2(-10.0, -10.0))
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    for category in Category::ALL {
                        ui.horizontal(|ui| {
                            let (rect, _) =
                                ui.allocate_exact_size(egui::vec2(12.0, 12.0), egui::Sense::hover());
                            ui.painter().circle_filled(rect.center(), 5.0, category.color());
                            ui.label(format!(
                                "{} ({})",
                                category,
                                self.cache.by_category(category).count()
                            ));
                        });
                    }
                    if self.map.zoom < MIN_DATA_ZOOM {
                        ui.weak("Zoom in to see places");
                    }
                });
            });
    }

    fn notices_ui(&mut self, ctx: &egui::Context) {
        let mut dismissed = None;
        egui::Area::new(egui::Id::new("notices"))
            .anchor(egui::Align2::RIGHT_TOP, egui::vec2(-10.0, 40.0))
            .show(ctx, |ui| {
                for (index, notice) in self.notices.iter().enumerate() {
                    let color = match notice.kind {
                        NoticeKind::Info => ui.visuals().text_color(),
                        NoticeKind::Warning => ui.visuals().warn_fg_color,
                        NoticeKind::Error => ui.visuals().error_fg_color,
                    };
                    egui::Frame::popup(ui.style()).show(ui, |ui| {
                        ui.horizontal(|ui| {
                            ui.colored_label(color, &notice.text);
                            if ui.small_button("✕").clicked() {
                                dismissed = Some(index);
                            }
                        });
                    });
                }
            });
        if let Some(index) = dismissed {
            self.dismiss_notice(index);
        }
    }

    fn search_results_ui(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        if self.search_results.is_empty() {
            return;
        }
        let mut chosen = None;
        let mut open = true;
        egui::Window::new("Search results")
            .open(&mut open)
            .resizable(false)
            .show(ctx, |ui| {
                for place in &self.search_results {
                    if ui.link(&place.display_name).clicked() {
                        chosen = Some(place.pos);
                    }
                }
            });
        if let Some(pos) = chosen {
            self.search_results.clear();
            self.focus(pos);
            self.on_view_changed(storage(frame));
        } else if !open {
            self.search_results.clear();
        }
    }

    fn info_ui(&mut self, ctx: &egui::Context) {
        egui::Window::new("About this map")
            .open(&mut self.show_info)
            .resizable(false)
            .collapsible(false)
            .show(ctx, |ui| {
                ui.label("Cafés, libraries, universities and colleges from OpenStreetMap.");
                ui.label(format!(
                    "Places are loaded from the Overpass API once you zoom in to level {} or closer.",
                    MIN_DATA_ZOOM
                ));
                ui.label("Drag to pan, scroll or double click to zoom, click a dot for details.");
                ui.hyperlink_to("OpenStreetMap", "https://www.openstreetmap.org");
            });
    }
}

/// A shorter-lived borrow of `storage`, so it can be handed out more than once.
fn reborrow<'b>(
    storage: &'b mut Option<&mut dyn eframe::Storage>,
) -> Option<&'b mut dyn eframe::Storage> {
    match storage {
        Some(storage) => Some(&mut **storage),
        None => None,
    }
}

/// The frame's storage, with its lifetime shortened to the borrow of the frame.
fn storage(frame: &mut eframe::Frame) -> Option<&mut dyn eframe::Storage> {
    match frame.storage_mut() {
        Some(storage) => Some(storage),
        None => None,
    }
}

impl eframe::App for PoiMapApp {
    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        self.poll_queries(storage(frame));
        self.poll_search();

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            self.toolbar(ui, frame);
        });

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                let response = ui.add(&mut self.map);
                if response.changed() {
                    self.on_view_changed(storage(frame));
                }
            });

        self.legend(ctx);
        self.notices_ui(ctx);
        self.search_results_ui(ctx, frame);
        self.info_ui(ctx);

        if !self.queries.is_empty() || self.search.is_some() {
            ctx.request_repaint();
        }
    }

    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        self.map.view().save(storage);
        self.cache.save(storage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::MemoryStorage;
    use crate::cache::{COVERED_BOUNDS_KEY, FEATURES_KEY};
    use crate::config::OpenStreetMapConfig;
    use crate::feature::{Feature, FeatureId};
    use crate::locate::{FixedLocator, UnsupportedLocator};
    use crate::view::VIEW_KEY;
    use eyre::WrapErr;

    fn app() -> PoiMapApp {
        PoiMapApp::new(
            Map::new(OpenStreetMapConfig::default()),
            &ServiceConfig::default(),
            Box::new(UnsupportedLocator),
        )
    }

    fn area() -> Bounds {
        Bounds {
            south: 52.25,
            west: 10.5,
            north: 52.28,
            east: 10.55,
        }
    }

    fn outcome() -> QueryOutcome {
        QueryOutcome {
            features: vec![
                Feature::new(
                    FeatureId::node(1),
                    Category::Cafe,
                    GeoPos { lon: 10.52, lat: 52.26 },
                ),
                Feature::new(
                    FeatureId::node(2),
                    Category::Library,
                    GeoPos { lon: 10.53, lat: 52.27 },
                ),
            ],
            rejected: 0,
        }
    }

    fn set_zoom(app: &mut PoiMapApp, zoom: u8) {
        let center = app.map.center;
        app.map.set_view(ViewState { center, zoom });
    }

    fn heat_len(app: &PoiMapApp, category: Category) -> usize {
        app.map
            .layer::<HeatmapLayer>(&heat_key(category))
            .map(|layer| layer.points().len())
            .unwrap()
    }

    #[test]
    fn new_app_has_a_layer_per_category_and_markers() {
        let app = app();
        for category in Category::ALL {
            assert!(app.map.layer::<HeatmapLayer>(&heat_key(category)).is_some());
        }
        assert!(app.map.layer::<MarkerLayer>(MARKERS_KEY).is_some());
        assert_eq!(app.map.layers().keys().last().unwrap(), MARKERS_KEY);
    }

    #[test]
    fn completed_query_is_ingested_rendered_and_persisted() {
        let mut app = app();
        let mut storage = MemoryStorage::default();
        set_zoom(&mut app, 14);

        app.on_query_complete(area(), Ok(outcome()), Some(&mut storage));

        assert_eq!(app.cache().len(), 2);
        assert_eq!(app.cache().covered_bounds(), &[area()]);
        assert_eq!(heat_len(&app, Category::Cafe), 1);
        assert_eq!(heat_len(&app, Category::Library), 1);
        assert_eq!(heat_len(&app, Category::College), 0);
        assert!(storage.0.contains_key(FEATURES_KEY));
        assert!(storage.0.contains_key(COVERED_BOUNDS_KEY));
        assert!(app.notices().is_empty());
    }

    #[test]
    fn finished_queries_are_all_applied_when_polled() {
        let mut app = app();
        let mut storage = MemoryStorage::default();
        set_zoom(&mut app, 14);

        let east = Bounds {
            south: 52.25,
            west: 10.55,
            north: 52.28,
            east: 10.6,
        };
        let mut second = outcome();
        second.features = vec![Feature::new(
            FeatureId::way(3),
            Category::University,
            GeoPos { lon: 10.57, lat: 52.26 },
        )];
        app.queries.push(PendingQuery {
            bounds: area(),
            promise: Promise::from_ready(Ok(outcome())),
        });
        app.queries.push(PendingQuery {
            bounds: east,
            promise: Promise::from_ready(Ok(second)),
        });

        app.poll_queries(Some(&mut storage));

        assert_eq!(app.queries_in_flight(), 0);
        assert_eq!(app.cache().len(), 3);
        assert!(app.cache().is_covered(&area()));
        assert!(app.cache().is_covered(&east));
        assert_eq!(FeatureCache::load(&storage).len(), 3);
        assert!(storage.0.contains_key(FEATURES_KEY));
    }

    #[test]
    fn hit_count_includes_rejected_elements() {
        let mut app = app();
        assert_eq!(app.last_hit_count(), None);

        let mut partial = outcome();
        partial.rejected = 3;
        app.on_query_complete(area(), Ok(partial), None);
        assert_eq!(app.last_hit_count(), Some(5));
        assert_eq!(app.cache().len(), 2);

        let oversized: Result<QueryOutcome, QueryError> = Err(QueryError::TooManyResults(10_001));
        let report = oversized.wrap_err("Overpass query failed").unwrap_err();
        app.on_query_complete(area(), Err(Arc::new(report)), None);
        assert_eq!(app.last_hit_count(), Some(10_001));
    }

    #[test]
    #[cfg(feature = "geojson")]
    fn export_geojson_holds_every_cached_place() {
        let mut app = app();
        app.on_query_complete(area(), Ok(outcome()), None);

        let exported: serde_json::Value = serde_json::from_str(&app.export_geojson()).unwrap();
        assert_eq!(exported["type"], "FeatureCollection");
        assert_eq!(exported["features"].as_array().unwrap().len(), 2);
        assert_eq!(app.notices().len(), 1);
        assert_eq!(app.notices()[0].kind, NoticeKind::Info);
        assert!(app.notices()[0].text.contains('2'));
    }

    #[test]
    fn repeated_query_does_not_double_count() {
        let mut app = app();
        set_zoom(&mut app, 14);
        app.on_query_complete(area(), Ok(outcome()), None);
        app.on_query_complete(area(), Ok(outcome()), None);

        assert_eq!(app.cache().len(), 2);
        assert_eq!(heat_len(&app, Category::Cafe), 1);
    }

    #[test]
    fn zooming_out_clears_layers_but_keeps_cache() {
        let mut app = app();
        set_zoom(&mut app, 12);
        app.on_query_complete(area(), Ok(outcome()), None);
        assert_eq!(heat_len(&app, Category::Cafe), 1);

        set_zoom(&mut app, 10);
        assert_eq!(app.handle_view_change(Some(area()), None), None);

        for category in Category::ALL {
            assert_eq!(heat_len(&app, category), 0);
        }
        let markers = app.map.layer::<MarkerLayer>(MARKERS_KEY).unwrap();
        assert!(markers.features().is_empty());
        assert_eq!(app.cache().len(), 2);

        set_zoom(&mut app, 12);
        app.handle_view_change(Some(area()), None);
        assert_eq!(heat_len(&app, Category::Cafe), 1);
    }

    #[test]
    fn view_change_persists_view() {
        let mut app = app();
        let mut storage = MemoryStorage::default();
        set_zoom(&mut app, 9);
        app.handle_view_change(None, Some(&mut storage));

        let stored: ViewState = serde_json::from_str(&storage.0[VIEW_KEY]).unwrap();
        assert_eq!(stored, app.map().view());
    }

    #[test]
    fn only_uncovered_areas_are_queried() {
        let mut app = app();
        set_zoom(&mut app, 14);
        assert_eq!(app.handle_view_change(Some(area()), None), Some(area()));

        app.on_query_complete(area(), Ok(outcome()), None);
        let inside = Bounds {
            south: 52.26,
            west: 10.51,
            north: 52.27,
            east: 10.54,
        };
        assert_eq!(app.handle_view_change(Some(inside), None), None);
        assert_eq!(app.handle_view_change(None, None), None);
    }

    #[test]
    fn nothing_is_queried_when_zoomed_out() {
        let mut app = app();
        set_zoom(&mut app, MIN_DATA_ZOOM - 1);
        assert_eq!(app.handle_view_change(Some(area()), None), None);
    }

    #[test]
    fn oversized_result_is_rejected_with_a_warning() {
        let mut app = app();
        set_zoom(&mut app, 14);
        app.on_query_complete(area(), Ok(outcome()), None);

        let oversized: Result<QueryOutcome, QueryError> = Err(QueryError::TooManyResults(10_001));
        let report = oversized.wrap_err("Overpass query failed").unwrap_err();
        app.on_query_complete(area(), Err(Arc::new(report)), None);

        assert_eq!(app.cache().len(), 2);
        assert_eq!(app.cache().covered_bounds().len(), 1);
        assert_eq!(app.notices().len(), 1);
        assert_eq!(app.notices()[0].kind, NoticeKind::Warning);
        assert!(app.notices()[0].text.contains("10001"));
    }

    #[test]
    fn failed_query_shows_dismissible_error() {
        let mut app = app();
        let report = eyre::eyre!("connection refused");
        app.on_query_complete(area(), Err(Arc::new(report)), None);

        assert!(app.cache().is_empty());
        assert!(app.cache().covered_bounds().is_empty());
        assert_eq!(app.notices()[0].kind, NoticeKind::Error);

        app.dismiss_notice(5);
        assert_eq!(app.notices().len(), 1);
        app.dismiss_notice(0);
        assert!(app.notices().is_empty());
    }

    #[test]
    fn restore_prefers_permalink_over_stored_view() {
        let mut storage = MemoryStorage::default();
        ViewState {
            center: GeoPos { lon: 1.0, lat: 2.0 },
            zoom: 5,
        }
        .save(&mut storage);

        let mut app = app();
        app.restore(Some("#48.13700,11.57500,12z"), Some(&storage));
        assert_eq!(app.map().zoom, 12);
        assert_eq!(app.permalink().to_string(), "#48.13700,11.57500,12z");

        let mut app = self::app();
        app.restore(None, Some(&storage));
        assert_eq!(app.map().zoom, 5);
    }

    #[test]
    fn restore_loads_cache() {
        let mut storage = MemoryStorage::default();
        let mut cache = FeatureCache::new();
        cache.ingest(outcome().features);
        cache.save(&mut storage);
        ViewState {
            center: GeoPos { lon: 10.52, lat: 52.26 },
            zoom: 14,
        }
        .save(&mut storage);

        let mut app = app();
        app.restore(None, Some(&storage));
        assert_eq!(app.cache().len(), 2);
        assert_eq!(heat_len(&app, Category::Cafe), 1);
    }

    #[test]
    fn restore_without_state_uses_locator() {
        let pos = GeoPos { lon: 13.4, lat: 52.5 };
        let mut app = PoiMapApp::new(
            Map::new(OpenStreetMapConfig::default()),
            &ServiceConfig::default(),
            Box::new(FixedLocator(pos)),
        );
        app.restore(None, None);
        assert_eq!(app.map().center, pos);
        assert_eq!(app.map().zoom, FOCUS_ZOOM);
        assert!(app.notices().is_empty());
    }

    #[test]
    fn restore_without_state_or_location_falls_back_to_default() {
        let mut app = app();
        let default = OpenStreetMapConfig::default();
        app.restore(Some("garbage"), None);

        assert_eq!(app.map().center, crate::config::MapConfig::default_center(&default));
        assert_eq!(app.notices().len(), 1);
        assert_eq!(app.notices()[0].kind, NoticeKind::Warning);
    }

    #[test]
    fn locate_me_failure_is_reported() {
        let mut app = app();
        let before = app.map().view();
        app.locate_me(None);
        assert_eq!(app.map().view(), before);
        assert_eq!(app.notices().len(), 1);
    }

    #[test]
    fn reset_forgets_everything() {
        let mut app = app();
        let mut storage = MemoryStorage::default();
        set_zoom(&mut app, 9);
        app.on_query_complete(area(), Ok(outcome()), Some(&mut storage));
        app.notify(NoticeKind::Info, "hello");

        app.reset(Some(&mut storage));

        assert!(app.cache().is_empty());
        assert!(app.cache().covered_bounds().is_empty());
        assert!(app.notices().is_empty());
        assert_eq!(app.queries_in_flight(), 0);
        assert!(FeatureCache::load(&storage).is_empty());
    }

    #[test]
    fn toggle_info() {
        let mut app = app();
        app.toggle_info();
        assert!(app.show_info);
        app.toggle_info();
        assert!(!app.show_info);
    }
}
