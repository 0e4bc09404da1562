//! Bounded-box point of interest queries against the Overpass API.
//!
//! Responses are turned into validated [`Feature`]s right here, so nothing past this module
//! ever sees a raw element. Requests run on a worker thread and are never cancelled.

use eyre::Context;
use log::{debug, info, warn};
use poll_promise::Promise;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::CLIENT;
use crate::config::ServiceConfig;
use crate::feature::{Category, ElementKind, Feature, FeatureId};
use crate::projection::{Bounds, GeoPos};

/// Responses with more elements than this are rejected as a whole.
pub const MAX_RESULTS: usize = 10_000;

/// Errors from a single Overpass query.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The request could not be sent or the body could not be read.
    #[error("Connection error")]
    ConnectionError(#[from] reqwest::Error),

    /// The server answered with an error status.
    #[error("Overpass API returned HTTP status `{0}`")]
    Status(String),

    /// The body is not a valid Overpass JSON response.
    #[error("Malformed Overpass response")]
    Malformed(#[from] serde_json::Error),

    /// The response held more elements than [`MAX_RESULTS`].
    #[error("Too many results ({0}), zoom in to load points of interest")]
    TooManyResults(usize),
}

/// The parsed result of a successful query.
#[derive(Debug, Default, PartialEq)]
pub struct QueryOutcome {
    /// The valid features, in response order.
    pub features: Vec<Feature>,

    /// The number of elements that were dropped as malformed or uncategorized.
    pub rejected: usize,
}

#[derive(Deserialize)]
struct RawResponse {
    // Elements are typed one by one so a single bad element is dropped instead of the body.
    #[serde(default)]
    elements: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawElement {
    #[serde(rename = "type")]
    kind: Option<String>,
    id: Option<i64>,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<RawCenter>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct RawCenter {
    lat: f64,
    lon: f64,
}

impl RawElement {
    /// Validates the element. Requires an id, a known kind, a position and a category.
    fn into_feature(self) -> Option<Feature> {
        let id = self.id?;
        let kind = match self.kind.as_deref()? {
            "node" => ElementKind::Node,
            "way" => ElementKind::Way,
            _ => return None,
        };
        let pos = match (self.lat, self.lon, self.center) {
            (Some(lat), Some(lon), _) => GeoPos { lon, lat },
            (_, _, Some(center)) => GeoPos {
                lon: center.lon,
                lat: center.lat,
            },
            _ => return None,
        };
        let category = Category::from_tags(&self.tags)?;

        Some(Feature {
            id: FeatureId { kind, id },
            category,
            pos,
            tags: self.tags,
            count: 1,
        })
    }
}

/// Builds the Overpass QL query for `categories` inside `bounds`. Ways are returned with their
/// centroid.
pub fn build_query(bounds: &Bounds, categories: &[Category], timeout_secs: u32) -> String {
    let values = categories
        .iter()
        .map(|c| c.tag_value())
        .collect::<Vec<_>>()
        .join("|");
    let bbox = bounds.to_overpass_bbox();
    format!(
        "[out:json][timeout:{timeout_secs}];(node[\"amenity\"~\"^({values})$\"]({bbox});way[\"amenity\"~\"^({values})$\"]({bbox}););out center qt;"
    )
}

/// Parses an Overpass JSON body, rejecting oversized responses without parsing any feature.
pub fn parse_response(body: &str) -> Result<QueryOutcome, QueryError> {
    let response: RawResponse = serde_json::from_str(body)?;
    let total = response.elements.len();
    if total > MAX_RESULTS {
        return Err(QueryError::TooManyResults(total));
    }

    let features: Vec<Feature> = response
        .elements
        .into_iter()
        .filter_map(|element| serde_json::from_value::<RawElement>(element).ok())
        .filter_map(RawElement::into_feature)
        .collect();
    let rejected = total - features.len();
    if rejected > 0 {
        debug!("Dropped {} of {} Overpass elements", rejected, total);
    }

    Ok(QueryOutcome { features, rejected })
}

/// A client for one Overpass endpoint.
#[derive(Clone, Debug)]
pub struct OverpassClient {
    endpoint: String,
    timeout_secs: u32,
    categories: Vec<Category>,
}

impl OverpassClient {
    /// Creates a client querying every [`Category`].
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            endpoint: config.overpass_url.clone(),
            timeout_secs: config.overpass_timeout_secs,
            categories: Category::ALL.to_vec(),
        }
    }

    /// The query that [`OverpassClient::fetch`] sends for `bounds`.
    pub fn query_for(&self, bounds: &Bounds) -> String {
        build_query(bounds, &self.categories, self.timeout_secs)
    }

    /// Starts a query for `bounds` on a worker thread.
    pub fn fetch(&self, bounds: Bounds) -> Promise<Result<QueryOutcome, Arc<eyre::Report>>> {
        let endpoint = self.endpoint.clone();
        let query = self.query_for(&bounds);

        Promise::spawn_thread("overpass_query", move || {
            let result: Result<_, eyre::Report> = (|| {
                info!("Querying Overpass for {}", bounds.to_overpass_bbox());
                debug!("Overpass query: {}", &query);
                let response = CLIENT
                    .post(&endpoint)
                    .body(query)
                    .send()
                    .map_err(QueryError::from)?;

                if !response.status().is_success() {
                    return Err(QueryError::Status(response.status().to_string()));
                }

                let body = response.text().map_err(QueryError::from)?;
                parse_response(&body).inspect_err(|e| warn!("{}", e))
            })()
            .with_context(|| format!("Overpass query for {} failed", bounds.to_overpass_bbox()));

            result.map_err(Arc::new)
        })
    }
}
