//! Geolocation Source abstraction. Best-effort and single-shot.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Sentinel used when no fix was ever acquired.
    pub const UNKNOWN: Coordinates = Coordinates {
        latitude: 0.0,
        longitude: 0.0,
    };

    /// Validate ranges; latitude in [-90, 90], longitude in [-180, 180].
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, LocationError> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(LocationError::OutOfRange {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ns = if self.latitude >= 0.0 { 'N' } else { 'S' };
        let ew = if self.longitude >= 0.0 { 'E' } else { 'W' };
        write!(
            f,
            "{:.4}° {ns}, {:.4}° {ew}",
            self.latitude.abs(),
            self.longitude.abs()
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocationError {
    #[error("location unavailable: {0}")]
    Unavailable(String),
    #[error("coordinates out of range: {latitude}, {longitude}")]
    OutOfRange { latitude: f64, longitude: f64 },
}

/// One-shot position provider. May block; callers run it off the main task.
pub trait GeolocationSource: Send + Sync {
    fn get_position(&self) -> Result<Coordinates, LocationError>;
}

/// A kiosk with a known, configured position.
pub struct FixedLocation(pub Coordinates);

impl GeolocationSource for FixedLocation {
    fn get_position(&self) -> Result<Coordinates, LocationError> {
        Ok(self.0)
    }
}

/// No positioning available on this host.
pub struct NoLocation;

impl GeolocationSource for NoLocation {
    fn get_position(&self) -> Result<Coordinates, LocationError> {
        Err(LocationError::Unavailable("no location provider configured".into()))
    }
}
