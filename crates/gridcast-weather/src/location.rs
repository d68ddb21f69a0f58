//! Known-location resolution: cached grid cell, or a fresh position projected
//! onto the grid and labelled by the geocoder.

use std::future::Future;
use std::sync::Arc;

use gridcast_core::{AppError, LocationConfig};

use crate::geocode::{PlaceNamer, ReverseGeocoder};
use crate::projection::project_point;
use crate::store::{load_location, save_location, KeyValueStore};
use crate::types::{GeodeticPoint, LocationRecord};

/// Best-effort last-known-position provider.
pub trait PositionSource: Send + Sync {
    /// `None` when no position is currently known
    fn last_known_position(&self) -> impl Future<Output = Option<GeodeticPoint>> + Send;
}

impl<T: PositionSource> PositionSource for Arc<T> {
    fn last_known_position(&self) -> impl Future<Output = Option<GeodeticPoint>> + Send {
        self.as_ref().last_known_position()
    }
}

/// Position source that reports a configured point, if any.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPosition {
    point: Option<GeodeticPoint>,
}

impl FixedPosition {
    pub fn new(point: Option<GeodeticPoint>) -> Self {
        Self { point }
    }

    pub fn from_config(config: &LocationConfig) -> Self {
        let point = match (config.latitude, config.longitude) {
            (Some(lat), Some(lon)) => Some(GeodeticPoint::new(lat, lon)),
            _ => None,
        };
        Self { point }
    }
}

impl PositionSource for FixedPosition {
    async fn last_known_position(&self) -> Option<GeodeticPoint> {
        self.point
    }
}

/// Outcome of [`LocationResolver::resolve`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Stored record reused without touching the position source
    Cached(LocationRecord),
    /// Freshly acquired and persisted
    Resolved(LocationRecord),
    /// No position was available; any stored record is left as it was
    PositionUnavailable,
}

impl Resolution {
    pub fn into_record(self) -> Option<LocationRecord> {
        match self {
            Self::Cached(r) | Self::Resolved(r) => Some(r),
            Self::PositionUnavailable => None,
        }
    }
}

pub struct LocationResolver<P, G, S: ?Sized> {
    positions: P,
    namer: PlaceNamer<G>,
    store: Arc<S>,
}

impl<P, G, S> LocationResolver<P, G, S>
where
    P: PositionSource,
    G: ReverseGeocoder,
    S: KeyValueStore + ?Sized,
{
    pub fn new(positions: P, namer: PlaceNamer<G>, store: Arc<S>) -> Self {
        Self {
            positions,
            namer,
            store,
        }
    }

    /// Resolve the known location.
    ///
    /// Without `force`, a stored record is returned as-is. Otherwise a position
    /// is requested; when one is available it is projected, labelled and written
    /// over the stored record.
    pub async fn resolve(&self, force: bool) -> Resolution {
        if !force {
            match load_location(self.store.as_ref()) {
                Ok(Some(record)) => {
                    tracing::debug!("Location already stored at {}, skipping lookup", record.grid);
                    return Resolution::Cached(record);
                }
                Ok(None) => {}
                Err(e) => {
                    let e = AppError::from(e);
                    tracing::warn!("Failed to read stored location: {} ({})", e, e.user_message());
                }
            }
        }

        let Some(point) = self.positions.last_known_position().await else {
            tracing::warn!("No last known position available");
            return Resolution::PositionUnavailable;
        };

        let place_name = self.namer.name(point).await;
        let record = LocationRecord {
            grid: project_point(&point),
            place_name,
        };

        match save_location(self.store.as_ref(), &record) {
            Ok(()) => tracing::info!(
                "Location stored: nx={}, ny={}, name={}",
                record.grid.nx,
                record.grid.ny,
                record.place_name
            ),
            Err(e) => {
                let e = AppError::from(e);
                tracing::warn!("Failed to persist location: {} ({})", e, e.user_message());
            }
        }

        Resolution::Resolved(record)
    }
}
