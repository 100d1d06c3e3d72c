use async_trait::async_trait;
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// How long a capture waits for the last known location.
pub const DEFAULT_LOCATION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Reported when the device has no last known location.
    pub const UNKNOWN: Coordinates = Coordinates {
        latitude: 0.0,
        longitude: 0.0,
    };

    /// Reported when the location lookup itself failed.
    pub const LOOKUP_FAILED: Coordinates = Coordinates {
        latitude: -1.0,
        longitude: -1.0,
    };

    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

#[derive(Error, Debug)]
pub enum LocationError {
    #[error("Location service unavailable: {0}")]
    Unavailable(String),
    #[error("Location lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// Source of the device's last known position.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// `Ok(None)` means the lookup worked but there is no fix yet.
    async fn last_known(&self) -> Result<Option<Coordinates>, LocationError>;
}

/// Always reports the same position, e.g. a stationary mount.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(Coordinates);

impl FixedLocation {
    pub fn new(coordinates: Coordinates) -> Self {
        Self(coordinates)
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn last_known(&self) -> Result<Option<Coordinates>, LocationError> {
        Ok(Some(self.0))
    }
}

/// For devices without any location source.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocation;

#[async_trait]
impl LocationProvider for NoLocation {
    async fn last_known(&self) -> Result<Option<Coordinates>, LocationError> {
        Ok(None)
    }
}

/// Resolve the location exactly once, substituting sentinels on any problem.
///
/// A lookup that does not finish within `limit` counts as failed.
pub async fn resolve_location(provider: &dyn LocationProvider, limit: Duration) -> Coordinates {
    let result = match tokio::time::timeout(limit, provider.last_known()).await {
        Ok(result) => result,
        Err(_) => Err(LocationError::Timeout(limit)),
    };

    match result {
        Ok(Some(coordinates)) => {
            debug!(
                "📍 Location: {:.6}, {:.6}",
                coordinates.latitude, coordinates.longitude
            );
            coordinates
        }
        Ok(None) => {
            warn!("📍 No last known location; using zeroed coordinates");
            Coordinates::UNKNOWN
        }
        Err(e) => {
            error!("Failed to fetch location: {}", e);
            Coordinates::LOOKUP_FAILED
        }
    }
}
