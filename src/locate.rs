//! Finding the user's physical location for the locate-me action.

use thiserror::Error;

use crate::projection::GeoPos;

/// Why the user's location is not available.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocateError {
    /// No location source exists on this platform.
    #[error("Geolocation is not supported on this system")]
    Unsupported,

    /// A location source exists but refused or failed to answer.
    #[error("Unable to retrieve your location: {0}")]
    Unavailable(String),
}

/// A source of the user's current location.
pub trait Locator {
    /// Returns the current location.
    fn locate(&self) -> Result<GeoPos, LocateError>;
}

/// A locator for systems without any location source.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnsupportedLocator;

impl Locator for UnsupportedLocator {
    fn locate(&self) -> Result<GeoPos, LocateError> {
        Err(LocateError::Unsupported)
    }
}

/// A locator that always answers with the same, user supplied, position.
#[derive(Clone, Copy, Debug)]
pub struct FixedLocator(pub GeoPos);

impl Locator for FixedLocator {
    fn locate(&self) -> Result<GeoPos, LocateError> {
        Ok(self.0)
    }
}

/// Parses a `<lat>,<lng>` pair, as given on the command line.
pub fn parse_lat_lng(text: &str) -> Result<GeoPos, LocateError> {
    let invalid = || LocateError::Unavailable(format!("`{}` is not a `lat,lng` pair", text));
    let (lat, lng) = text.split_once(',').ok_or_else(invalid)?;
    let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
    let lon: f64 = lng.trim().parse().map_err(|_| invalid())?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(invalid());
    }
    Ok(GeoPos { lon, lat })
}
