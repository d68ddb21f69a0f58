//! Refresh gating: how often a cycle may be submitted and when a duplicate is
//! refused.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use gridcast_core::{AppError, RefreshConfig};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::store::{KeyValueStore, KEY_LAST_UPDATE_TIME};
use crate::types::TrackerError;

/// Tag every refresh cycle is submitted under
pub const REFRESH_TAG: &str = "gridcast-refresh";

/// Lifecycle of one unit of tracked work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkState {
    Enqueued,
    Running,
    Succeeded,
    Failed,
}

impl WorkState {
    /// True while the work still occupies the queue
    pub fn is_active(self) -> bool {
        matches!(self, Self::Enqueued | Self::Running)
    }
}

/// Work-tracking and enqueue collaborator.
pub trait WorkTracker: Send + Sync {
    /// States of every known unit of work carrying `tag`
    fn work_states(
        &self,
        tag: &str,
    ) -> impl Future<Output = Result<Vec<WorkState>, TrackerError>> + Send;

    /// Submit one unit of work under `tag`
    fn enqueue(&self, tag: &str) -> Result<(), TrackerError>;
}

impl<T: WorkTracker> WorkTracker for Arc<T> {
    fn work_states(
        &self,
        tag: &str,
    ) -> impl Future<Output = Result<Vec<WorkState>, TrackerError>> + Send {
        self.as_ref().work_states(tag)
    }

    fn enqueue(&self, tag: &str) -> Result<(), TrackerError> {
        self.as_ref().enqueue(tag)
    }
}

/// A unit of work handed to the worker loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkTicket {
    pub id: u64,
    pub tag: String,
}

/// In-process work queue that tracks the state of each ticket it hands out.
#[derive(Debug)]
pub struct LocalWorkQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<WorkTicket>>>,
    table: Mutex<HashMap<u64, (String, WorkState)>>,
    next_id: AtomicU64,
}

impl LocalWorkQueue {
    /// Create a queue and the receiving end the worker drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WorkTicket>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Self {
            tx: Mutex::new(Some(tx)),
            table: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        };
        (queue, rx)
    }

    pub fn set_state(&self, id: u64, state: WorkState) {
        if let Some(entry) = self.table.lock().get_mut(&id) {
            entry.1 = state;
        }
    }

    pub fn state(&self, id: u64) -> Option<WorkState> {
        self.table.lock().get(&id).map(|(_, state)| *state)
    }

    /// Stop accepting work. The worker exits after draining what is queued.
    pub fn close(&self) {
        self.tx.lock().take();
    }
}

impl WorkTracker for LocalWorkQueue {
    async fn work_states(&self, tag: &str) -> Result<Vec<WorkState>, TrackerError> {
        Ok(self
            .table
            .lock()
            .values()
            .filter(|(t, _)| t == tag)
            .map(|(_, state)| *state)
            .collect())
    }

    fn enqueue(&self, tag: &str) -> Result<(), TrackerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut table = self.table.lock();
            table.retain(|_, (_, state)| state.is_active());
            table.insert(id, (tag.to_string(), WorkState::Enqueued));
        }

        let sent = match self.tx.lock().as_ref() {
            Some(tx) => tx
                .send(WorkTicket {
                    id,
                    tag: tag.to_string(),
                })
                .is_ok(),
            None => false,
        };

        if sent {
            Ok(())
        } else {
            self.table.lock().remove(&id);
            Err(TrackerError::Unavailable("worker has shut down".to_string()))
        }
    }
}

/// Knobs for [`RefreshScheduler`]
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    pub min_interval: TimeDelta,
    pub tag: String,
    pub tracker_timeout: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            min_interval: TimeDelta::minutes(30),
            tag: REFRESH_TAG.to_string(),
            tracker_timeout: Duration::from_secs(5),
        }
    }
}

impl RefreshPolicy {
    pub fn from_config(config: &RefreshConfig) -> Self {
        Self {
            min_interval: TimeDelta::minutes(i64::from(config.min_interval_minutes)),
            tag: REFRESH_TAG.to_string(),
            tracker_timeout: Duration::from_secs(config.tracker_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Last accepted cycle is more recent than the minimum interval
    Throttled,
    /// A cycle under the refresh tag is already running or enqueued
    AlreadyActive,
    /// The tracker refused the new cycle
    EnqueueFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    Scheduled,
    Skipped(SkipReason),
}

/// Decides whether a periodic refresh cycle may be submitted.
pub struct RefreshScheduler<S: ?Sized, T> {
    store: Arc<S>,
    tracker: T,
    policy: RefreshPolicy,
}

impl<S, T> RefreshScheduler<S, T>
where
    S: KeyValueStore + ?Sized,
    T: WorkTracker,
{
    pub fn new(store: Arc<S>, tracker: T, policy: RefreshPolicy) -> Self {
        Self {
            store,
            tracker,
            policy,
        }
    }

    /// Periodic entry point.
    ///
    /// The gate timestamp is written before the tracker is consulted, so an
    /// overlapping call sees it even if this one ends up skipping.
    pub async fn maybe_run_cycle(&self, now: DateTime<Utc>) -> ScheduleDecision {
        if let Some(last_run) = self.last_run() {
            let elapsed = now.signed_duration_since(last_run);
            if elapsed < self.policy.min_interval {
                tracing::debug!(
                    "Last refresh {}s ago, under the {}s minimum; skipping",
                    elapsed.num_seconds(),
                    self.policy.min_interval.num_seconds()
                );
                return ScheduleDecision::Skipped(SkipReason::Throttled);
            }
        }

        if let Err(e) = self
            .store
            .put_i64(KEY_LAST_UPDATE_TIME, now.timestamp_millis())
        {
            let e = AppError::from(e);
            tracing::warn!("Failed to record refresh time: {} ({})", e, e.user_message());
        }

        match self.active_work().await {
            Ok(true) => {
                tracing::debug!("Refresh already running or enqueued; skipping");
                return ScheduleDecision::Skipped(SkipReason::AlreadyActive);
            }
            Ok(false) => {}
            Err(e) => {
                let e = AppError::from(e);
                tracing::warn!(
                    "Work tracker query failed, enqueueing anyway: {} ({})",
                    e,
                    e.user_message()
                );
            }
        }

        match self.tracker.enqueue(&self.policy.tag) {
            Ok(()) => {
                tracing::info!("Refresh cycle enqueued");
                ScheduleDecision::Scheduled
            }
            Err(e) => {
                tracing::error!("Failed to enqueue refresh cycle: {}", e);
                ScheduleDecision::Skipped(SkipReason::EnqueueFailed)
            }
        }
    }

    fn last_run(&self) -> Option<DateTime<Utc>> {
        match self.store.get_i64(KEY_LAST_UPDATE_TIME) {
            Ok(Some(ms)) => DateTime::from_timestamp_millis(ms),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to read last refresh time: {}", e);
                None
            }
        }
    }

    async fn active_work(&self) -> Result<bool, TrackerError> {
        let states = tokio::time::timeout(
            self.policy.tracker_timeout,
            self.tracker.work_states(&self.policy.tag),
        )
        .await
        .map_err(|_| TrackerError::Timeout)??;

        Ok(states.into_iter().any(WorkState::is_active))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use std::sync::atomic::AtomicUsize;

    enum Query {
        States(Vec<WorkState>),
        Fail,
        Hang,
    }

    struct FakeTracker {
        query: Query,
        enqueued: AtomicUsize,
    }

    impl FakeTracker {
        fn new(query: Query) -> Arc<Self> {
            Arc::new(Self {
                query,
                enqueued: AtomicUsize::new(0),
            })
        }

        fn enqueued(&self) -> usize {
            self.enqueued.load(Ordering::SeqCst)
        }
    }

    impl WorkTracker for FakeTracker {
        async fn work_states(&self, _tag: &str) -> Result<Vec<WorkState>, TrackerError> {
            match &self.query {
                Query::States(states) => Ok(states.clone()),
                Query::Fail => Err(TrackerError::Unavailable("down".into())),
                Query::Hang => std::future::pending().await,
            }
        }

        fn enqueue(&self, _tag: &str) -> Result<(), TrackerError> {
            self.enqueued.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 14, 5, 0, 0).unwrap() + TimeDelta::minutes(i64::from(minute))
    }

    fn scheduler(
        tracker: Arc<FakeTracker>,
    ) -> (RefreshScheduler<MemoryStore, Arc<FakeTracker>>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            RefreshScheduler::new(store.clone(), tracker, RefreshPolicy::default()),
            store,
        )
    }

    #[tokio::test]
    async fn test_second_call_within_interval_is_throttled() {
        let tracker = FakeTracker::new(Query::States(vec![]));
        let (scheduler, _) = scheduler(tracker.clone());

        assert_eq!(scheduler.maybe_run_cycle(t(0)).await, ScheduleDecision::Scheduled);
        assert_eq!(
            scheduler.maybe_run_cycle(t(5)).await,
            ScheduleDecision::Skipped(SkipReason::Throttled)
        );
        assert_eq!(tracker.enqueued(), 1);
    }

    #[tokio::test]
    async fn test_calls_past_interval_both_scheduled() {
        let tracker = FakeTracker::new(Query::States(vec![WorkState::Succeeded]));
        let (scheduler, _) = scheduler(tracker.clone());

        assert_eq!(scheduler.maybe_run_cycle(t(0)).await, ScheduleDecision::Scheduled);
        assert_eq!(scheduler.maybe_run_cycle(t(31)).await, ScheduleDecision::Scheduled);
        assert_eq!(tracker.enqueued(), 2);
    }

    #[tokio::test]
    async fn test_running_cycle_blocks_duplicate() {
        let tracker = FakeTracker::new(Query::States(vec![WorkState::Running]));
        let (scheduler, store) = scheduler(tracker.clone());

        assert_eq!(
            scheduler.maybe_run_cycle(t(0)).await,
            ScheduleDecision::Skipped(SkipReason::AlreadyActive)
        );
        assert_eq!(tracker.enqueued(), 0);
        // The gate still moved forward
        assert_eq!(
            store.get_i64(KEY_LAST_UPDATE_TIME).unwrap(),
            Some(t(0).timestamp_millis())
        );
    }

    #[tokio::test]
    async fn test_enqueued_cycle_blocks_duplicate() {
        let tracker = FakeTracker::new(Query::States(vec![WorkState::Failed, WorkState::Enqueued]));
        let (scheduler, _) = scheduler(tracker.clone());

        assert_eq!(
            scheduler.maybe_run_cycle(t(0)).await,
            ScheduleDecision::Skipped(SkipReason::AlreadyActive)
        );
    }

    #[tokio::test]
    async fn test_tracker_failure_fails_open() {
        let tracker = FakeTracker::new(Query::Fail);
        let (scheduler, _) = scheduler(tracker.clone());

        assert_eq!(scheduler.maybe_run_cycle(t(0)).await, ScheduleDecision::Scheduled);
        assert_eq!(tracker.enqueued(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_timeout_fails_open() {
        let tracker = FakeTracker::new(Query::Hang);
        let (scheduler, _) = scheduler(tracker.clone());

        assert_eq!(scheduler.maybe_run_cycle(t(0)).await, ScheduleDecision::Scheduled);
        assert_eq!(tracker.enqueued(), 1);
    }

    #[tokio::test]
    async fn test_gate_reads_persisted_timestamp() {
        let tracker = FakeTracker::new(Query::States(vec![]));
        let (scheduler, store) = scheduler(tracker.clone());
        store
            .put_i64(KEY_LAST_UPDATE_TIME, t(0).timestamp_millis())
            .unwrap();

        assert_eq!(
            scheduler.maybe_run_cycle(t(29)).await,
            ScheduleDecision::Skipped(SkipReason::Throttled)
        );
        assert_eq!(scheduler.maybe_run_cycle(t(30)).await, ScheduleDecision::Scheduled);
    }

    #[tokio::test]
    async fn test_future_timestamp_is_throttled() {
        let tracker = FakeTracker::new(Query::States(vec![]));
        let (scheduler, store) = scheduler(tracker.clone());
        store
            .put_i64(KEY_LAST_UPDATE_TIME, t(120).timestamp_millis())
            .unwrap();

        assert_eq!(
            scheduler.maybe_run_cycle(t(0)).await,
            ScheduleDecision::Skipped(SkipReason::Throttled)
        );
        assert_eq!(tracker.enqueued(), 0);
        // The stored gate is left untouched
        assert_eq!(
            store.get_i64(KEY_LAST_UPDATE_TIME).unwrap(),
            Some(t(120).timestamp_millis())
        );
    }

    #[tokio::test]
    async fn test_local_queue_tracks_ticket_states() {
        let (queue, mut rx) = LocalWorkQueue::new();
        queue.enqueue(REFRESH_TAG).unwrap();

        assert_eq!(
            queue.work_states(REFRESH_TAG).await.unwrap(),
            vec![WorkState::Enqueued]
        );
        assert!(queue.work_states("other").await.unwrap().is_empty());

        let ticket = rx.recv().await.unwrap();
        assert_eq!(ticket.tag, REFRESH_TAG);
        queue.set_state(ticket.id, WorkState::Running);
        assert_eq!(queue.state(ticket.id), Some(WorkState::Running));

        queue.set_state(ticket.id, WorkState::Succeeded);
        queue.enqueue(REFRESH_TAG).unwrap();
        // Finished tickets are pruned on the next enqueue
        assert_eq!(queue.state(ticket.id), None);
    }

    #[tokio::test]
    async fn test_local_queue_blocks_duplicates_through_scheduler() {
        let (queue, _rx) = LocalWorkQueue::new();
        let queue = Arc::new(queue);
        let store = Arc::new(MemoryStore::new());
        let scheduler = RefreshScheduler::new(store, queue.clone(), RefreshPolicy::default());

        assert_eq!(scheduler.maybe_run_cycle(t(0)).await, ScheduleDecision::Scheduled);
        assert_eq!(
            scheduler.maybe_run_cycle(t(45)).await,
            ScheduleDecision::Skipped(SkipReason::AlreadyActive)
        );
    }

    #[tokio::test]
    async fn test_local_queue_without_worker_fails_enqueue() {
        let (queue, rx) = LocalWorkQueue::new();
        drop(rx);
        assert!(matches!(
            queue.enqueue(REFRESH_TAG),
            Err(TrackerError::Unavailable(_))
        ));
        assert!(queue.work_states(REFRESH_TAG).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_queue_refuses_work() {
        let (queue, mut rx) = LocalWorkQueue::new();
        queue.enqueue(REFRESH_TAG).unwrap();
        queue.close();

        assert!(queue.enqueue(REFRESH_TAG).is_err());
        // Work queued before closing is still delivered
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }
}
