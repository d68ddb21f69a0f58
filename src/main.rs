use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{FixedOffset, Utc};
use clap::Parser;
use gridcast_core::Config;
use gridcast_weather::{
    run_worker, CycleSettings, FixedPosition, ForecastFetcher, GridCell, KeyValueStore,
    LocalWorkQueue, LocationResolver, MemoryStore, NominatimGeocoder, PlaceNamer, RefreshCycle,
    RefreshPolicy, RefreshScheduler, Renderer, ScheduleDecision, SqliteStore, WidgetView,
};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "gridcast", about = "Short-range weather for the current location")]
struct Cli {
    /// Run one forced refresh (re-acquire the location) and exit
    #[arg(long, conflicts_with = "once")]
    force: bool,
    /// Evaluate the periodic refresh gate once, wait for the cycle and exit
    #[arg(long)]
    once: bool,
    /// Config file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Prints each view as one line on stdout
struct ConsoleRenderer;

impl Renderer for ConsoleRenderer {
    fn render(&self, view: &WidgetView) {
        println!(
            "{} | {} | {}",
            view.place_name, view.temperature, view.sky_condition
        );
    }
}

type Cycle = RefreshCycle<FixedPosition, NominatimGeocoder, dyn KeyValueStore, ConsoleRenderer>;

fn open_store(config: &Config) -> Arc<dyn KeyValueStore> {
    let path = config.database_path();
    match SqliteStore::new(&path) {
        Ok(store) => {
            info!("Using state database at {}", path.display());
            Arc::new(store)
        }
        Err(e) => {
            warn!(
                "Failed to open state database at {}: {}; state will not survive restarts",
                path.display(),
                e
            );
            Arc::new(MemoryStore::new())
        }
    }
}

fn build_cycle(config: &Config, store: Arc<dyn KeyValueStore>) -> Result<Cycle> {
    let provider_offset = FixedOffset::east_opt(config.forecast.utc_offset_hours * 3600)
        .context("forecast.utc_offset_hours is out of range")?;

    let geocoder = NominatimGeocoder::new(&config.location.geocoder_url)
        .context("Failed to create reverse geocoder")?;
    let resolver = LocationResolver::new(
        FixedPosition::from_config(&config.location),
        PlaceNamer::new(geocoder),
        store.clone(),
    );
    let fetcher =
        ForecastFetcher::new(&config.forecast).context("Failed to create forecast client")?;

    Ok(RefreshCycle::new(
        resolver,
        fetcher,
        store,
        ConsoleRenderer,
        CycleSettings {
            fallback_grid: GridCell::new(config.location.fallback_nx, config.location.fallback_ny),
            provider_offset,
            retry_on_fetch_error: config.refresh.retry_on_fetch_error,
        },
    ))
}

type Scheduler = RefreshScheduler<dyn KeyValueStore, Arc<LocalWorkQueue>>;

async fn tick(scheduler: &Scheduler, cycle: &Cycle) {
    if scheduler.maybe_run_cycle(Utc::now()).await == ScheduleDecision::Scheduled {
        cycle.show_loading();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    gridcast_core::init()?;

    let (config, _) = match &cli.config {
        Some(path) => Config::load_validated_from(path)?,
        None => Config::load_validated()?,
    };
    info!("Config directory: {}", config.config_dir.display());

    let store = open_store(&config);
    let cycle = Arc::new(build_cycle(&config, store.clone())?);

    if cli.force {
        cycle.run_forced(Utc::now()).await;
        return Ok(());
    }

    let (queue, tickets) = LocalWorkQueue::new();
    let queue = Arc::new(queue);
    let worker = tokio::spawn(run_worker(queue.clone(), tickets, cycle.clone()));
    let scheduler = RefreshScheduler::new(
        store,
        queue.clone(),
        RefreshPolicy::from_config(&config.refresh),
    );

    if cli.once {
        tick(&scheduler, &cycle).await;
    } else {
        let mut interval =
            tokio::time::interval(Duration::from_secs(config.refresh.poll_interval_secs));
        info!(
            "Polling refresh gate every {}s",
            config.refresh.poll_interval_secs
        );

        loop {
            tokio::select! {
                _ = interval.tick() => tick(&scheduler, &cycle).await,
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!("Failed to listen for shutdown signal: {}", e);
                    }
                    info!("Shutting down");
                    break;
                }
            }
        }
    }

    queue.close();
    worker.await.context("Refresh worker panicked")?;

    Ok(())
}
