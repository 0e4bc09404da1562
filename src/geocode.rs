//! Free-text place search using Nominatim.

use eyre::Context;
use log::{debug, info};
use poll_promise::Promise;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

use crate::CLIENT;
use crate::config::ServiceConfig;
use crate::projection::GeoPos;

/// How many places a search asks for.
const RESULT_LIMIT: u8 = 5;

/// Errors from a place search.
#[derive(Error, Debug)]
pub enum GeocodeError {
    /// The request could not be sent or the body could not be read.
    #[error("Connection error")]
    ConnectionError(#[from] reqwest::Error),

    /// The server answered with an error status.
    #[error("Place search returned HTTP status `{0}`")]
    Status(String),

    /// The body is not a valid search response.
    #[error("Malformed place search response")]
    Malformed(#[from] serde_json::Error),
}

/// A search result.
#[derive(Clone, Debug, PartialEq)]
pub struct Place {
    /// The full, human readable name of the place.
    pub display_name: String,
    /// Where it is.
    pub pos: GeoPos,
}

// Nominatim sends coordinates as strings.
#[derive(Deserialize)]
struct RawPlace {
    display_name: String,
    lat: String,
    lon: String,
}

impl RawPlace {
    fn into_place(self) -> Option<Place> {
        let lat = self.lat.parse::<f64>().ok()?;
        let lon = self.lon.parse::<f64>().ok()?;
        Some(Place {
            display_name: self.display_name,
            pos: GeoPos { lon, lat },
        })
    }
}

/// Parses a Nominatim `format=json` body, skipping entries with unreadable coordinates.
pub fn parse_places(body: &str) -> Result<Vec<Place>, GeocodeError> {
    let raw: Vec<RawPlace> = serde_json::from_str(body)?;
    Ok(raw.into_iter().filter_map(RawPlace::into_place).collect())
}

/// A client for a Nominatim search endpoint.
#[derive(Clone, Debug)]
pub struct NominatimClient {
    endpoint: String,
}

impl NominatimClient {
    /// Creates a client for the endpoint in `config`.
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            endpoint: config.nominatim_url.clone(),
        }
    }

    /// Searches for `text` on a worker thread. Returns `None` for a blank query.
    pub fn search(&self, text: &str) -> Option<Promise<Result<Vec<Place>, Arc<eyre::Report>>>> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return None;
        }
        let endpoint = self.endpoint.clone();

        Some(Promise::spawn_thread("place_search", move || {
            let result: Result<_, eyre::Report> = (|| {
                info!("Searching for place `{}`", &text);
                let limit = RESULT_LIMIT.to_string();
                let response = CLIENT
                    .get(&endpoint)
                    .query(&[("q", text.as_str()), ("format", "json"), ("limit", limit.as_str())])
                    .send()
                    .map_err(GeocodeError::from)?;

                if !response.status().is_success() {
                    return Err(GeocodeError::Status(response.status().to_string()));
                }

                let places = parse_places(&response.text().map_err(GeocodeError::from)?)?;
                debug!("Found {} places for `{}`", places.len(), &text);
                Ok(places)
            })()
            .with_context(|| format!("Searching for `{}` failed", &text));

            result.map_err(Arc::new)
        }))
    }
}
