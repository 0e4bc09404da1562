//! The map view: what is persisted between sessions and what a shared link encodes.

use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::MAX_ZOOM;
use crate::projection::GeoPos;

/// Storage key of the last map view.
pub const VIEW_KEY: &str = "pos";

/// The map center and zoom level.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredView", into = "StoredView")]
pub struct ViewState {
    /// The map center.
    pub center: GeoPos,
    /// The zoom level.
    pub zoom: u8,
}

// The persisted layout: `{"lat": .., "lng": .., "zoom": ..}`.
#[derive(Serialize, Deserialize)]
struct StoredView {
    lat: f64,
    lng: f64,
    zoom: u8,
}

impl From<StoredView> for ViewState {
    fn from(stored: StoredView) -> Self {
        Self {
            center: GeoPos {
                lon: stored.lng,
                lat: stored.lat,
            },
            zoom: stored.zoom,
        }
    }
}

impl From<ViewState> for StoredView {
    fn from(view: ViewState) -> Self {
        Self {
            lat: view.center.lat,
            lng: view.center.lon,
            zoom: view.zoom,
        }
    }
}

impl ViewState {
    /// Reads the last persisted view. Absent or unreadable data gives `None`.
    pub fn load(storage: &dyn eframe::Storage) -> Option<Self> {
        let json = storage.get_string(VIEW_KEY)?;
        serde_json::from_str(&json)
            .inspect_err(|e| warn!("Ignoring unreadable stored view: {}", e))
            .ok()
    }

    /// Persists the view.
    pub fn save(&self, storage: &mut dyn eframe::Storage) {
        match serde_json::to_string(self) {
            Ok(json) => storage.set_string(VIEW_KEY, json),
            Err(e) => warn!("Unable to persist view: {}", e),
        }
    }

    /// The permalink for this view.
    pub fn permalink(&self) -> Permalink {
        Permalink(*self)
    }
}

/// Why a permalink could not be decoded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PermalinkError {
    /// The text is not of the form `#<lat>,<lng>,<zoom>z`.
    #[error("`{0}` is not a map location, expected `#<lat>,<lng>,<zoom>z`")]
    Format(String),

    /// The numbers are outside of the valid ranges.
    #[error("`{0}` is outside of the map")]
    OutOfRange(String),
}

/// A view encoded as `#<lat>,<lng>,<zoom>z`, the form used in shareable links.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Permalink(pub ViewState);

impl fmt::Display for Permalink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let view = self.0;
        write!(
            f,
            "#{:.5},{:.5},{}z",
            view.center.lat, view.center.lon, view.zoom
        )
    }
}

impl FromStr for Permalink {
    type Err = PermalinkError;

    /// Parses a fragment. The leading `#` is optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format_error = || PermalinkError::Format(s.to_string());
        let body = s.trim();
        let body = body.strip_prefix('#').unwrap_or(body);
        let body = body.strip_suffix('z').ok_or_else(format_error)?;

        let mut parts = body.split(',');
        let (Some(lat), Some(lng), Some(zoom), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(format_error());
        };

        let lat: f64 = lat.trim().parse().map_err(|_| format_error())?;
        let lon: f64 = lng.trim().parse().map_err(|_| format_error())?;
        let zoom: u8 = zoom.trim().parse().map_err(|_| format_error())?;

        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) || zoom > MAX_ZOOM {
            return Err(PermalinkError::OutOfRange(s.to_string()));
        }

        Ok(Permalink(ViewState {
            center: GeoPos { lon, lat },
            zoom,
        }))
    }
}

/// Where the initial view came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewSource {
    /// A permalink given at startup.
    Permalink,
    /// The view persisted by the previous session.
    Stored,
}

/// Picks the view to open with: a valid permalink wins over the stored view. `None` means the
/// caller should locate the user or fall back to its default.
pub fn initial_view(
    fragment: Option<&str>,
    storage: Option<&dyn eframe::Storage>,
) -> Option<(ViewState, ViewSource)> {
    if let Some(fragment) = fragment {
        match fragment.parse::<Permalink>() {
            Ok(Permalink(view)) => return Some((view, ViewSource::Permalink)),
            Err(e) => warn!("{}", e),
        }
    }

    storage
        .and_then(ViewState::load)
        .map(|view| (view, ViewSource::Stored))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::MemoryStorage;

    fn braunschweig() -> ViewState {
        ViewState {
            center: GeoPos {
                lon: 10.524,
                lat: 52.265,
            },
            zoom: 14,
        }
    }

    #[test]
    fn stored_layout_uses_lat_lng_zoom() {
        let json = serde_json::to_string(&braunschweig()).unwrap();
        assert_eq!(json, r#"{"lat":52.265,"lng":10.524,"zoom":14}"#);
    }

    #[test]
    fn storage_roundtrip() {
        let mut storage = MemoryStorage::default();
        braunschweig().save(&mut storage);
        assert_eq!(ViewState::load(&storage), Some(braunschweig()));
    }

    #[test]
    fn corrupt_stored_view_is_ignored() {
        let mut storage = MemoryStorage::default();
        assert_eq!(ViewState::load(&storage), None);

        storage
            .0
            .insert(VIEW_KEY.to_string(), r#"{"lat":52.2"#.to_string());
        assert_eq!(ViewState::load(&storage), None);
    }

    #[test]
    fn permalink_format() {
        assert_eq!(braunschweig().permalink().to_string(), "#52.26500,10.52400,14z");
    }

    #[test]
    fn permalink_parsing() {
        let parsed: Permalink = "#52.26500,10.52400,14z".parse().unwrap();
        assert_eq!(parsed.0, braunschweig());

        let without_hash: Permalink = "52.265,10.524,14z".parse().unwrap();
        assert_eq!(without_hash.0, braunschweig());

        for bad in ["", "#", "#52.2,10.5", "#52.2,10.5,14", "#a,b,cz", "#1,2,3,4z"] {
            assert!(
                matches!(bad.parse::<Permalink>(), Err(PermalinkError::Format(_))),
                "{bad}"
            );
        }
        assert!(matches!(
            "#91,10,14z".parse::<Permalink>(),
            Err(PermalinkError::OutOfRange(_))
        ));
        assert!(matches!(
            "#52,10,25z".parse::<Permalink>(),
            Err(PermalinkError::OutOfRange(_))
        ));
    }

    #[test]
    fn permalink_beats_stored_view() {
        let mut storage = MemoryStorage::default();
        braunschweig().save(&mut storage);

        let (view, source) = initial_view(Some("#48.13700,11.57500,12z"), Some(&storage)).unwrap();
        assert_eq!(source, ViewSource::Permalink);
        assert_eq!(view.zoom, 12);
    }

    #[test]
    fn invalid_permalink_falls_back_to_stored_view() {
        let mut storage = MemoryStorage::default();
        braunschweig().save(&mut storage);

        let (view, source) = initial_view(Some("#nowhere"), Some(&storage)).unwrap();
        assert_eq!(source, ViewSource::Stored);
        assert_eq!(view, braunschweig());
    }

    #[test]
    fn nothing_known_gives_none() {
        let storage = MemoryStorage::default();
        assert!(initial_view(None, Some(&storage)).is_none());
        assert!(initial_view(None, None).is_none());
    }
}
