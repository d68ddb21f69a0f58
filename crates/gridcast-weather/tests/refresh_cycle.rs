//! Integration tests for the refresh pipeline using wiremock.
//!
//! Forecast service and geocoder are mocked; position source, store and
//! renderer are in-process fakes.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeDelta, TimeZone, Timelike, Utc};
use gridcast_core::ForecastConfig;
use gridcast_weather::store::{load_location, save_location};
use gridcast_weather::{
    run_worker, CycleOutcome, CycleSettings, FixedPosition, ForecastFetcher, GridCell,
    LocalWorkQueue, LocationRecord, LocationResolver, MemoryStore, NominatimGeocoder, PlaceNamer,
    RefreshCycle, RefreshPolicy, RefreshScheduler, Renderer, ScheduleDecision, SkipReason,
    WidgetView, WorkState, WorkTracker, REFRESH_TAG,
};
use parking_lot::Mutex;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingRenderer {
    views: Mutex<Vec<WidgetView>>,
}

impl Renderer for RecordingRenderer {
    fn render(&self, view: &WidgetView) {
        self.views.lock().push(view.clone());
    }
}

fn kst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).unwrap()
}

fn forecast_items(buckets: &[String], temperature: &str, sky: &str) -> serde_json::Value {
    let mut items = Vec::new();
    for bucket in buckets {
        for (category, value) in [("T1H", temperature), ("SKY", sky), ("REH", "70")] {
            items.push(serde_json::json!({
                "category": category,
                "fcstTime": bucket,
                "fcstValue": value
            }));
        }
    }
    serde_json::json!({
        "response": {
            "header": { "resultCode": "00", "resultMsg": "NORMAL_SERVICE" },
            "body": { "dataType": "JSON", "items": { "item": items } }
        }
    })
}

async fn mount_geocoder(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/reverse"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "address": { "city_district": "Jongno-gu", "city": "Seoul" }
        })))
        .mount(server)
        .await;
}

type TestCycle =
    RefreshCycle<FixedPosition, NominatimGeocoder, MemoryStore, Arc<RecordingRenderer>>;

fn build_cycle(
    server: &MockServer,
    store: Arc<MemoryStore>,
    renderer: Arc<RecordingRenderer>,
) -> TestCycle {
    let geocoder = NominatimGeocoder::new(&format!("{}/reverse", server.uri())).unwrap();
    let resolver = LocationResolver::new(
        FixedPosition::new(Some(gridcast_weather::GeodeticPoint::new(37.5665, 126.9780))),
        PlaceNamer::new(geocoder),
        store.clone(),
    );
    let fetcher = ForecastFetcher::new(&ForecastConfig {
        base_url: format!("{}/getUltraSrtFcst", server.uri()),
        service_key: Some("integration-key".to_string()),
        ..ForecastConfig::default()
    })
    .unwrap();

    RefreshCycle::new(
        resolver,
        fetcher,
        store,
        renderer,
        CycleSettings {
            fallback_grid: GridCell::new(62, 125),
            provider_offset: kst(),
            retry_on_fetch_error: false,
        },
    )
}

#[tokio::test]
async fn test_first_cycle_resolves_location_and_renders() {
    let server = MockServer::start().await;
    mount_geocoder(&server).await;

    Mock::given(method("GET"))
        .and(path("/getUltraSrtFcst"))
        .and(query_param("nx", "60"))
        .and(query_param("ny", "127"))
        .and(query_param("base_date", "20261014"))
        .and(query_param("base_time", "1300"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(forecast_items(&["1400".into(), "1500".into()], "23", "1")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let renderer = Arc::new(RecordingRenderer::default());
    let cycle = build_cycle(&server, store.clone(), renderer.clone());

    // 14:20 at the provider
    let now: DateTime<Utc> = kst()
        .with_ymd_and_hms(2026, 10, 14, 14, 20, 0)
        .unwrap()
        .with_timezone(&Utc);
    let report = cycle.run(false, now).await;

    assert_eq!(report.outcome, CycleOutcome::Succeeded);
    assert_eq!(
        report.view,
        WidgetView {
            sky_condition: "clear".into(),
            temperature: "23°C".into(),
            place_name: "Jongno-gu Seoul".into(),
        }
    );
    assert_eq!(renderer.views.lock().len(), 1);
    assert_eq!(
        load_location(store.as_ref()).unwrap(),
        Some(LocationRecord {
            grid: GridCell::new(60, 127),
            place_name: "Jongno-gu Seoul".into(),
        })
    );
}

#[tokio::test]
async fn test_forced_cycle_replaces_stale_location() {
    let server = MockServer::start().await;
    mount_geocoder(&server).await;

    Mock::given(method("GET"))
        .and(path("/getUltraSrtFcst"))
        .and(query_param("nx", "60"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(forecast_items(&["0900".into()], "11", "3")),
        )
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    save_location(
        store.as_ref(),
        &LocationRecord {
            grid: GridCell::new(98, 76),
            place_name: "Haeundae-gu Busan".into(),
        },
    )
    .unwrap();

    let renderer = Arc::new(RecordingRenderer::default());
    let cycle = build_cycle(&server, store.clone(), renderer);

    let now = kst()
        .with_ymd_and_hms(2026, 10, 14, 9, 45, 0)
        .unwrap()
        .with_timezone(&Utc);
    let report = cycle.run_forced(now).await;

    assert_eq!(report.view.place_name, "Jongno-gu Seoul");
    assert_eq!(report.view.sky_condition, "cloudy/rain");
    assert_eq!(report.view.temperature, "11°C");
    assert_eq!(
        load_location(store.as_ref()).unwrap().unwrap().grid,
        GridCell::new(60, 127)
    );
}

#[tokio::test]
async fn test_scheduler_worker_pipeline() {
    let server = MockServer::start().await;
    mount_geocoder(&server).await;

    // Cover the current and next provider hour so the hour can roll over mid-test
    let local_now = Utc::now().with_timezone(&kst());
    let buckets = [
        format!("{:02}00", local_now.hour()),
        format!("{:02}00", (local_now + TimeDelta::hours(1)).hour()),
    ];
    Mock::given(method("GET"))
        .and(path("/getUltraSrtFcst"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(forecast_items(&buckets, "17", "1")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let renderer = Arc::new(RecordingRenderer::default());
    let cycle = Arc::new(build_cycle(&server, store.clone(), renderer.clone()));

    let (queue, tickets) = LocalWorkQueue::new();
    let queue = Arc::new(queue);
    let worker = tokio::spawn(run_worker(queue.clone(), tickets, cycle));

    let scheduler = RefreshScheduler::new(store, queue.clone(), RefreshPolicy::default());
    let start = Utc::now();
    assert_eq!(scheduler.maybe_run_cycle(start).await, ScheduleDecision::Scheduled);
    assert_eq!(
        scheduler.maybe_run_cycle(start + TimeDelta::minutes(5)).await,
        ScheduleDecision::Skipped(SkipReason::Throttled)
    );

    let mut finished = false;
    for _ in 0..200 {
        let states = queue.work_states(REFRESH_TAG).await.unwrap();
        if states == vec![WorkState::Succeeded] {
            finished = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(finished, "worker did not complete the cycle");

    let views = renderer.views.lock().clone();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].temperature, "17°C");
    assert_eq!(views[0].sky_condition, "clear");
    assert_eq!(views[0].place_name, "Jongno-gu Seoul");

    queue.close();
    worker.await.unwrap();
}
