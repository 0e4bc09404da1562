#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // hide console window on Windows in release

use clap::Parser;
use eframe::egui;
use poi_heatmap::{
    Map,
    app::PoiMapApp,
    config::{OpenStreetMapConfig, ServiceConfig},
    locate::{FixedLocator, Locator, UnsupportedLocator, parse_lat_lng},
};

/// A map of cafés, libraries and universities.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Location to open, as `#<lat>,<lng>,<zoom>z`.
    location: Option<String>,

    /// Your position as `<lat>,<lng>`, used by "Locate me".
    #[arg(long)]
    locate: Option<String>,

    /// Overpass API interpreter endpoint.
    #[arg(long)]
    overpass_url: Option<String>,

    /// Nominatim search endpoint.
    #[arg(long)]
    nominatim_url: Option<String>,
}

fn main() -> eframe::Result {
    // Log to stdout (if you run with `RUST_LOG=debug`).
    env_logger::init();

    let args = Args::parse();

    let mut services = ServiceConfig::default();
    if let Some(url) = args.overpass_url {
        services.overpass_url = url;
    }
    if let Some(url) = args.nominatim_url {
        services.nominatim_url = url;
    }

    let locator: Box<dyn Locator> = match args.locate.as_deref().map(parse_lat_lng) {
        Some(Ok(pos)) => Box::new(FixedLocator(pos)),
        Some(Err(e)) => {
            log::error!("{}", e);
            Box::new(UnsupportedLocator)
        }
        None => Box::new(UnsupportedLocator),
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1024.0, 768.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Cafés, libraries & universities",
        options,
        Box::new(move |cc| {
            let map = Map::new(OpenStreetMapConfig::default());
            let mut app = PoiMapApp::new(map, &services, locator);
            app.restore(args.location.as_deref(), cc.storage);
            Ok(Box::new(app))
        }),
    )
}
