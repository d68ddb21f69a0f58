//! Forecast engine for Gridcast
//!
//! Projects a position onto the provider's forecast grid, fetches the
//! ultra-short-term forecast for that cell, picks the current hour's values
//! and gates how often all of that is allowed to run.

pub mod cycle;
pub mod geocode;
pub mod location;
pub mod projection;
pub mod provider;
pub mod schedule;
pub mod select;
pub mod store;
pub mod types;

pub use cycle::{run_worker, CycleOutcome, CycleReport, CycleSettings, RefreshCycle, Renderer};
pub use geocode::{Address, NominatimGeocoder, PlaceNamer, ReverseGeocoder};
pub use location::{FixedPosition, LocationResolver, PositionSource, Resolution};
pub use projection::project;
pub use provider::ForecastFetcher;
pub use schedule::{
    LocalWorkQueue, RefreshPolicy, RefreshScheduler, ScheduleDecision, SkipReason, WorkState,
    WorkTracker, REFRESH_TAG,
};
pub use select::select;
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
pub use types::*;
