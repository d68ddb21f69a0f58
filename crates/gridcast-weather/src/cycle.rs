//! One refresh cycle: resolve the location, fetch, select, render.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use gridcast_core::AppError;
use tokio::sync::mpsc;

use crate::geocode::ReverseGeocoder;
use crate::location::{LocationResolver, PositionSource, Resolution};
use crate::provider::ForecastFetcher;
use crate::schedule::{LocalWorkQueue, WorkState, WorkTicket};
use crate::select::select;
use crate::store::{load_location, KeyValueStore};
use crate::types::{ForecastResult, GridCell, LocationRecord, WidgetView, NO_LOCATION};

/// Display surface fed by each cycle.
pub trait Renderer: Send + Sync {
    fn render(&self, view: &WidgetView);
}

impl<T: Renderer> Renderer for Arc<T> {
    fn render(&self, view: &WidgetView) {
        self.as_ref().render(view);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Succeeded,
    /// Forecast failed; placeholders were rendered and the cycle counts as done
    SucceededWithPlaceholder,
    /// Forecast failed; placeholders were rendered and the cycle should run again
    Retry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub view: WidgetView,
    pub outcome: CycleOutcome,
}

/// Settings a cycle needs beyond its collaborators
#[derive(Debug, Clone)]
pub struct CycleSettings {
    /// Grid used while no location has ever been stored
    pub fallback_grid: GridCell,
    /// Local clock of the forecast provider
    pub provider_offset: FixedOffset,
    pub retry_on_fetch_error: bool,
}

pub struct RefreshCycle<P, G, S: ?Sized, R> {
    resolver: LocationResolver<P, G, S>,
    fetcher: ForecastFetcher,
    store: Arc<S>,
    renderer: R,
    settings: CycleSettings,
}

impl<P, G, S, R> RefreshCycle<P, G, S, R>
where
    P: PositionSource,
    G: ReverseGeocoder,
    S: KeyValueStore + ?Sized,
    R: Renderer,
{
    pub fn new(
        resolver: LocationResolver<P, G, S>,
        fetcher: ForecastFetcher,
        store: Arc<S>,
        renderer: R,
        settings: CycleSettings,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            store,
            renderer,
            settings,
        }
    }

    /// Render the pending state with whatever place name is stored.
    pub fn show_loading(&self) {
        let place_name = self.known_location().place_name;
        self.renderer.render(&WidgetView::loading(place_name));
    }

    /// User-triggered refresh: always re-acquires the position.
    pub async fn run_forced(&self, now: DateTime<Utc>) -> CycleReport {
        self.run(true, now).await
    }

    /// Run one cycle and hand the result to the renderer.
    pub async fn run(&self, force: bool, now: DateTime<Utc>) -> CycleReport {
        let record = match self.resolver.resolve(force).await {
            Resolution::Cached(record) | Resolution::Resolved(record) => record,
            Resolution::PositionUnavailable => self.known_location(),
        };

        let as_of = now.with_timezone(&self.settings.provider_offset);
        let (result, outcome) = match self.fetcher.fetch(record.grid, as_of).await {
            Ok(observations) => (select(&observations, &as_of), CycleOutcome::Succeeded),
            Err(e) => {
                let app_error = AppError::from(e);
                tracing::warn!(
                    "Forecast fetch failed: {} ({})",
                    app_error,
                    app_error.user_message()
                );
                let outcome = if self.settings.retry_on_fetch_error {
                    CycleOutcome::Retry
                } else {
                    CycleOutcome::SucceededWithPlaceholder
                };
                (ForecastResult::default(), outcome)
            }
        };

        tracing::info!(
            "Forecast for {}: sky={}, temperature={}",
            record.place_name,
            result.sky_condition,
            result.temperature_c
        );

        let view = WidgetView::new(result, record.place_name);
        self.renderer.render(&view);

        CycleReport { view, outcome }
    }

    fn known_location(&self) -> LocationRecord {
        match load_location(self.store.as_ref()) {
            Ok(Some(record)) => record,
            Ok(None) => self.fallback_location(),
            Err(e) => {
                let e = AppError::from(e);
                tracing::warn!("Failed to read stored location: {} ({})", e, e.user_message());
                self.fallback_location()
            }
        }
    }

    fn fallback_location(&self) -> LocationRecord {
        LocationRecord {
            grid: self.settings.fallback_grid,
            place_name: NO_LOCATION.to_string(),
        }
    }
}

/// Drain `tickets`, running one periodic cycle per ticket and recording its state.
///
/// Returns once the queue has been closed and drained.
pub async fn run_worker<P, G, S, R>(
    queue: Arc<LocalWorkQueue>,
    mut tickets: mpsc::UnboundedReceiver<WorkTicket>,
    cycle: Arc<RefreshCycle<P, G, S, R>>,
) where
    P: PositionSource,
    G: ReverseGeocoder,
    S: KeyValueStore + ?Sized,
    R: Renderer,
{
    while let Some(ticket) = tickets.recv().await {
        tracing::debug!("Running work ticket {} ({})", ticket.id, ticket.tag);
        queue.set_state(ticket.id, WorkState::Running);

        let report = cycle.run(false, Utc::now()).await;
        let state = match report.outcome {
            CycleOutcome::Retry => WorkState::Failed,
            CycleOutcome::Succeeded | CycleOutcome::SucceededWithPlaceholder => {
                WorkState::Succeeded
            }
        };
        queue.set_state(ticket.id, state);
    }

    tracing::debug!("Work queue closed, worker exiting");
}
