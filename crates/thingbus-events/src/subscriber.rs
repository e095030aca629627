//! Consumer-group subscription over a lifecycle stream.
//!
//! A [`Subscription`] owns one consumer inside a named group. It alternates
//! between two read modes:
//!
//! 1. a pass over the consumer's own pending entries, which recovers
//!    records delivered before a crash or left unacknowledged by a failed
//!    handler;
//! 2. a bounded blocking read of records never delivered to the group.
//!
//! Records are decoded, handed to the [`EventHandler`] and acknowledged one
//! at a time, in delivery order. A record is acknowledged only after its
//! handler succeeded. When a handler fails the consumer stops taking new
//! records and retries the failed one from its pending list, with capped
//! backoff, until it succeeds. Cursors and pending lists stay in the store.

use crate::error::{EventError, EventResult};
use crate::event::LifecycleEvent;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thingbus_common::{EventsConfig, GroupStartConfig};
use thingbus_store::{EntryId, GroupStart, ReadMode, StoreError, StreamEntry, StreamStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Service-specific reaction to lifecycle events.
///
/// Records are redelivered after crashes and handler failures, so an
/// implementation must tolerate seeing the same event more than once.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &LifecycleEvent) -> EventResult<()>;
}

/// Capped exponential backoff for store failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    /// Delay after the first failure
    pub min: Duration,
    /// Upper bound for any delay
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(100),
            max: Duration::from_secs(10),
        }
    }
}

impl Backoff {
    /// Delay before retrying after `failures` consecutive failures.
    ///
    /// Zero failures means no delay; each further failure doubles the
    /// delay up to `max`.
    #[must_use]
    pub fn delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        self.min.saturating_mul(factor).min(self.max)
    }
}

/// Tuning of a [`Subscription`].
#[derive(Clone, Debug)]
pub struct SubscriptionOptions {
    /// Consumer group, named after the owning service
    pub group: String,
    /// Consumer name within the group. Must be stable across restarts for
    /// the pending pass to find what a crashed run left behind.
    pub consumer: String,
    pub batch_size: usize,
    /// Bounded wait of a read for new records
    pub block: Duration,
    /// Upper bound for the delay before a record whose handler failed is
    /// retried. The delay grows with `backoff` while the record keeps failing.
    pub pending_retry: Duration,
    /// Records idle this long in another consumer's pending list are
    /// claimed. `None` disables claiming.
    pub claim_idle: Option<Duration>,
    pub backoff: Backoff,
    /// Attempts made to set up the consumer group before giving up
    pub connect_attempts: u32,
    pub start: GroupStart,
}

impl SubscriptionOptions {
    pub fn new(group: impl Into<String>, consumer: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            consumer: consumer.into(),
            batch_size: 100,
            block: Duration::from_secs(1),
            pending_retry: Duration::from_secs(5),
            claim_idle: Some(Duration::from_secs(60)),
            backoff: Backoff::default(),
            connect_attempts: 5,
            start: GroupStart::Beginning,
        }
    }
}

impl From<&EventsConfig> for SubscriptionOptions {
    fn from(config: &EventsConfig) -> Self {
        Self {
            group: config.group.clone(),
            consumer: config.consumer_name(),
            batch_size: config.batch_size,
            block: config.block(),
            pending_retry: config.pending_retry(),
            claim_idle: config.claim_idle(),
            backoff: Backoff {
                min: config.min_backoff(),
                max: config.max_backoff(),
            },
            connect_attempts: config.connect_attempts,
            start: match config.group_start {
                GroupStartConfig::Beginning => GroupStart::Beginning,
                GroupStartConfig::Latest => GroupStart::Latest,
            },
        }
    }
}

/// A consumer-group subscription to one stream.
pub struct Subscription {
    store: Arc<dyn StreamStore>,
    stream: String,
    options: SubscriptionOptions,
    handler: Arc<dyn EventHandler>,
}

/// Outcome of handling one batch
#[derive(Debug, Default, PartialEq, Eq)]
struct Processed {
    acked: usize,
    /// Handling stopped at a record that failed
    failed: bool,
}

impl Subscription {
    pub fn new(
        store: Arc<dyn StreamStore>,
        stream: impl Into<String>,
        options: SubscriptionOptions,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            store,
            stream: stream.into(),
            options,
            handler,
        }
    }

    /// Run the subscription as a background task.
    pub fn spawn(self) -> SubscriptionHandle {
        let (cancel, cancelled) = watch::channel(false);
        let join = tokio::spawn(async move { self.run(cancelled).await });
        SubscriptionHandle { cancel, join }
    }

    /// Process records until `cancel` flips to `true` or its sender is
    /// dropped.
    ///
    /// Fails when the consumer group cannot be set up within the configured
    /// attempts, or when a read fails with a non-retryable store error.
    /// Handler failures never end the loop.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) -> EventResult<()> {
        if !self.ensure_group(&mut cancel).await? {
            return Ok(());
        }
        let opts = &self.options;
        info!(
            "Subscribed to {} as consumer {} of group {}",
            self.stream, opts.consumer, opts.group
        );

        // Position of the pending pass, `None` while reading new records
        let mut pending_from = Some(EntryId::ZERO);
        let mut next_claim = opts.claim_idle.map(|idle| Instant::now() + idle);
        let mut read_failures = 0u32;
        let mut handler_failures = 0u32;

        loop {
            if *cancel.borrow() {
                break;
            }
            let now = Instant::now();
            if let (Some(idle), Some(at)) = (opts.claim_idle, next_claim)
                && at <= now
            {
                next_claim = Some(now + idle);
                if self.claim(idle).await.failed {
                    // Unhandled claimed records are now in our pending list
                    handler_failures = handler_failures.saturating_add(1);
                    if !self.pause(&mut cancel, handler_failures).await {
                        break;
                    }
                    pending_from = Some(EntryId::ZERO);
                    continue;
                }
            }

            let (mode, block) = match pending_from {
                Some(after) => (ReadMode::Pending { after }, Duration::ZERO),
                None => (ReadMode::New, opts.block),
            };

            let read = tokio::select! {
                biased;
                _ = cancel.changed() => break,
                read = self.store.read_group(
                    &self.stream,
                    &opts.group,
                    &opts.consumer,
                    mode,
                    opts.batch_size,
                    block,
                ) => read,
            };

            let entries = match read {
                Ok(entries) => {
                    read_failures = 0;
                    entries
                }
                Err(e) if e.is_retryable() => {
                    read_failures = read_failures.saturating_add(1);
                    let delay = opts.backoff.delay(read_failures);
                    warn!(
                        "Reading {} failed (attempt {}), retrying in {:?}: {}",
                        self.stream, read_failures, delay, e
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.changed() => break,
                        () = tokio::time::sleep(delay) => continue,
                    }
                }
                Err(source) => {
                    return Err(EventError::Read {
                        stream: self.stream.clone(),
                        source,
                    });
                }
            };

            if pending_from.is_some() {
                match entries.last() {
                    Some(last) => pending_from = Some(last.id),
                    None => {
                        pending_from = None;
                        continue;
                    }
                }
            }

            if self.process(&entries).await.failed {
                // Nothing newer is read until the failed record is handled;
                // the rest of the batch is redelivered after it, in order
                handler_failures = handler_failures.saturating_add(1);
                if !self.pause(&mut cancel, handler_failures).await {
                    break;
                }
                pending_from = Some(EntryId::ZERO);
            } else if !entries.is_empty() {
                handler_failures = 0;
            }
        }

        info!("Subscription to {} stopped", self.stream);
        Ok(())
    }

    /// Create the consumer group if absent, retrying connection failures.
    /// Returns `false` if cancelled while waiting.
    async fn ensure_group(&self, cancel: &mut watch::Receiver<bool>) -> EventResult<bool> {
        let opts = &self.options;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self
                .store
                .create_group(&self.stream, &opts.group, opts.start)
                .await
            {
                Ok(true) => {
                    info!("Created consumer group {} on {}", opts.group, self.stream);
                    return Ok(true);
                }
                Ok(false) => return Ok(true),
                Err(e) => e,
            };
            if !err.is_retryable() || attempt >= opts.connect_attempts {
                return Err(self.subscribe_error(err));
            }

            let delay = opts.backoff.delay(attempt);
            warn!(
                "Failed to set up group {} on {} (attempt {}/{}), retrying in {:?}: {}",
                opts.group, self.stream, attempt, opts.connect_attempts, delay, err
            );
            tokio::select! {
                biased;
                _ = cancel.changed() => return Ok(false),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Wait before retrying a failed record. Returns `false` if cancelled.
    async fn pause(&self, cancel: &mut watch::Receiver<bool>, failures: u32) -> bool {
        let delay = self
            .options
            .backoff
            .delay(failures)
            .min(self.options.pending_retry);
        debug!(
            "Retrying unacknowledged records on {} in {:?}",
            self.stream, delay
        );
        tokio::select! {
            biased;
            _ = cancel.changed() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    /// Take over records a crashed peer left idle in the group.
    async fn claim(&self, idle: Duration) -> Processed {
        let opts = &self.options;
        match self
            .store
            .claim_idle(
                &self.stream,
                &opts.group,
                &opts.consumer,
                idle,
                opts.batch_size,
            )
            .await
        {
            Ok(entries) => {
                if !entries.is_empty() {
                    info!(
                        "Claimed {} idle records on {} for {}",
                        entries.len(),
                        self.stream,
                        opts.consumer
                    );
                }
                self.process(&entries).await
            }
            Err(e) => {
                warn!("Claiming idle records on {} failed: {}", self.stream, e);
                Processed::default()
            }
        }
    }

    /// Handle and ack entries in order, stopping at the first failure so
    /// that no record overtakes an unhandled one.
    async fn process(&self, entries: &[StreamEntry]) -> Processed {
        let mut processed = Processed::default();
        for entry in entries {
            if let Err(e) = self.dispatch(entry).await {
                warn!(
                    "Handler failed for record {} on {} (delivery {}): {}",
                    entry.id, self.stream, entry.deliveries, e
                );
                processed.failed = true;
                break;
            }
            if let Err(e) = self
                .store
                .ack(&self.stream, &self.options.group, &[entry.id])
                .await
            {
                warn!("Failed to ack record {} on {}: {}", entry.id, self.stream, e);
                processed.failed = true;
                break;
            }
            processed.acked += 1;
        }
        if !entries.is_empty() {
            debug!(
                "Handled {} of {} records on {}",
                processed.acked,
                entries.len(),
                self.stream
            );
        }
        processed
    }

    /// Decode and hand a record to the handler. Records that can never be
    /// handled succeed here so they get acknowledged.
    async fn dispatch(&self, entry: &StreamEntry) -> EventResult<()> {
        match LifecycleEvent::decode(&entry.fields) {
            Ok(Some(event)) => self.handler.handle(&event).await,
            Ok(None) => {
                debug!(
                    "Ignoring record {} with unknown operation {:?}",
                    entry.id,
                    entry.fields.get(crate::event::OPERATION)
                );
                Ok(())
            }
            Err(e) => {
                warn!("Dropping undecodable record {} on {}: {}", entry.id, self.stream, e);
                Ok(())
            }
        }
    }

    fn subscribe_error(&self, source: StoreError) -> EventError {
        EventError::Subscribe {
            stream: self.stream.clone(),
            source,
        }
    }
}

/// Owner side of a spawned [`Subscription`].
///
/// Dropping the handle cancels the task at its next wait point.
pub struct SubscriptionHandle {
    cancel: watch::Sender<bool>,
    join: JoinHandle<EventResult<()>>,
}

impl SubscriptionHandle {
    /// Ask the task to stop. In-flight records stay pending and are
    /// redelivered on the next start.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the task to end on its own.
    ///
    /// Must not be called again after it returned.
    pub async fn wait(&mut self) -> EventResult<()> {
        match (&mut self.join).await {
            Ok(result) => result,
            Err(e) => Err(EventError::Task(e.to_string())),
        }
    }

    /// Cancel the task and wait for it to finish.
    pub async fn shutdown(mut self) -> EventResult<()> {
        self.cancel();
        self.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EntityKind;
    use crate::producer::EventProducer;
    use crate::testing::{DownStore, FlakyStore};
    use parking_lot::Mutex;
    use std::sync::atomic::Ordering;
    use thingbus_common::THINGS_STREAM;
    use thingbus_store::{Fields, MemoryStore};

    const GROUP: &str = "test-service";

    /// Records every event; fails events whose id is listed in `failing`
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<LifecycleEvent>>,
        failing: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn ids(&self) -> Vec<String> {
            self.seen
                .lock()
                .iter()
                .filter_map(|e| e.entity().map(|(_, id)| id.to_string()))
                .collect()
        }
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: &LifecycleEvent) -> EventResult<()> {
            self.seen.lock().push(event.clone());
            match event.entity() {
                Some((_, id)) if self.failing.lock().iter().any(|f| f == id) => {
                    Err(EventError::handler(format!("refusing {id}")))
                }
                _ => Ok(()),
            }
        }
    }

    fn removed(id: &str) -> LifecycleEvent {
        LifecycleEvent::Removed {
            kind: EntityKind::Thing,
            id: id.into(),
        }
    }

    fn options(consumer: &str) -> SubscriptionOptions {
        SubscriptionOptions {
            block: Duration::from_millis(20),
            pending_retry: Duration::from_millis(50),
            claim_idle: None,
            backoff: Backoff {
                min: Duration::from_millis(5),
                max: Duration::from_millis(20),
            },
            ..SubscriptionOptions::new(GROUP, consumer)
        }
    }

    async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {what}");
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let backoff = Backoff {
            min: Duration::from_millis(100),
            max: Duration::from_secs(1),
        };
        assert_eq!(backoff.delay(0), Duration::ZERO);
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(4), Duration::from_millis(800));
        assert_eq!(backoff.delay(5), Duration::from_secs(1));
        assert_eq!(backoff.delay(64), Duration::from_secs(1));
    }

    #[test]
    fn test_options_from_config() {
        let config = EventsConfig {
            instance: "eu-1".into(),
            claim_idle_ms: 0,
            group_start: GroupStartConfig::Latest,
            ..EventsConfig::default()
        };
        let opts = SubscriptionOptions::from(&config);
        assert_eq!(opts.group, "thingbus-lora");
        assert_eq!(opts.consumer, "thingbus-lora-eu-1");
        assert_eq!(opts.claim_idle, None);
        assert_eq!(opts.start, GroupStart::Latest);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_handles_in_append_order_and_acks() {
        let store = Arc::new(MemoryStore::new());
        let producer = EventProducer::new(store.clone());
        for id in ["thing-1", "thing-2", "thing-3"] {
            producer.notify(&removed(id)).await.unwrap();
        }

        let recorder = Arc::new(Recorder::default());
        let handle =
            Subscription::new(store.clone(), THINGS_STREAM, options("c1"), recorder.clone())
                .spawn();

        eventually("three events", || recorder.ids().len() == 3).await;
        assert_eq!(recorder.ids(), ["thing-1", "thing-2", "thing-3"]);

        // Records appended while subscribed are picked up too
        producer.notify(&removed("thing-4")).await.unwrap();
        eventually("fourth event", || recorder.ids().len() == 4).await;

        handle.shutdown().await.unwrap();
        assert_eq!(store.pending_len(THINGS_STREAM, GROUP), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_restart_redelivers_unacked_record() {
        let store = Arc::new(MemoryStore::new());
        store
            .create_group(THINGS_STREAM, GROUP, GroupStart::Beginning)
            .await
            .unwrap();
        EventProducer::new(store.clone())
            .notify(&removed("thing-1"))
            .await
            .unwrap();

        // A previous run read the record and crashed before acking it
        let delivered = store
            .read_group(THINGS_STREAM, GROUP, "c1", ReadMode::New, 10, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(delivered.len(), 1);

        let recorder = Arc::new(Recorder::default());
        let handle =
            Subscription::new(store.clone(), THINGS_STREAM, options("c1"), recorder.clone())
                .spawn();
        eventually("redelivery", || recorder.ids() == ["thing-1"]).await;
        eventually("ack", || {
            store.pending_len(THINGS_STREAM, GROUP) == 0
        })
        .await;
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_handler_holds_back_later_records() {
        let store = Arc::new(MemoryStore::new());
        let producer = EventProducer::new(store.clone());
        producer.notify(&removed("thing-bad")).await.unwrap();
        producer.notify(&removed("thing-good")).await.unwrap();

        let recorder = Arc::new(Recorder::default());
        recorder.failing.lock().push("thing-bad".into());
        let handle =
            Subscription::new(store.clone(), THINGS_STREAM, options("c1"), recorder.clone())
                .spawn();

        // Retried from the pending list; the later record waits behind it
        eventually("retry", || {
            recorder.ids().iter().filter(|id| *id == "thing-bad").count() >= 3
        })
        .await;
        assert!(!recorder.ids().contains(&"thing-good".to_string()));
        let pending = store.pending(THINGS_STREAM, GROUP).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|p| p.consumer == "c1"));

        // Records appended meanwhile are not read either
        producer.notify(&removed("thing-late")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!recorder.ids().contains(&"thing-late".to_string()));

        recorder.failing.lock().clear();
        eventually("recovery", || {
            recorder.ids().last().is_some_and(|id| id == "thing-late")
                && store.pending_len(THINGS_STREAM, GROUP) == 0
        })
        .await;
        handle.shutdown().await.unwrap();

        let ids = recorder.ids();
        let tail: Vec<_> = ids.iter().skip_while(|id| *id == "thing-bad").collect();
        assert_eq!(tail, ["thing-good", "thing-late"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failure_mid_batch_keeps_order_of_the_rest() {
        let store = Arc::new(MemoryStore::new());
        let producer = EventProducer::new(store.clone());
        for id in ["thing-1", "thing-2", "thing-3"] {
            producer.notify(&removed(id)).await.unwrap();
        }

        let recorder = Arc::new(Recorder::default());
        recorder.failing.lock().push("thing-2".into());
        let handle =
            Subscription::new(store.clone(), THINGS_STREAM, options("c1"), recorder.clone())
                .spawn();

        eventually("failure", || recorder.ids().len() >= 3).await;
        assert!(!recorder.ids().contains(&"thing-3".to_string()));
        recorder.failing.lock().clear();
        eventually("drained", || {
            recorder.ids().last().is_some_and(|id| id == "thing-3")
                && store.pending_len(THINGS_STREAM, GROUP) == 0
        })
        .await;
        handle.shutdown().await.unwrap();

        // thing-1 acked once, thing-2 retried until it passed, then thing-3
        let ids = recorder.ids();
        assert_eq!(ids.first().map(String::as_str), Some("thing-1"));
        assert_eq!(ids.iter().filter(|id| *id == "thing-1").count(), 1);
        assert_eq!(ids.iter().filter(|id| *id == "thing-3").count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unknown_and_malformed_records_are_acked() {
        let store = Arc::new(MemoryStore::new());
        let unknown = Fields::from([
            ("operation".to_string(), "thing.share".to_string()),
            ("id".to_string(), "thing-1".to_string()),
        ]);
        let malformed = Fields::from([("operation".to_string(), "thing.remove".to_string())]);
        store.append(THINGS_STREAM, &unknown).await.unwrap();
        store.append(THINGS_STREAM, &malformed).await.unwrap();
        EventProducer::new(store.clone())
            .notify(&removed("thing-2"))
            .await
            .unwrap();

        let recorder = Arc::new(Recorder::default());
        let handle =
            Subscription::new(store.clone(), THINGS_STREAM, options("c1"), recorder.clone())
                .spawn();

        eventually("valid record", || recorder.ids() == ["thing-2"]).await;
        handle.shutdown().await.unwrap();
        assert_eq!(store.pending_len(THINGS_STREAM, GROUP), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_read_failures_back_off_and_continue() {
        let memory = Arc::new(MemoryStore::new());
        EventProducer::new(memory.clone())
            .notify(&removed("thing-1"))
            .await
            .unwrap();
        let flaky = Arc::new(FlakyStore::new(memory, 3));

        let recorder = Arc::new(Recorder::default());
        let handle =
            Subscription::new(flaky.clone(), THINGS_STREAM, options("c1"), recorder.clone())
                .spawn();

        eventually("record after outage", || recorder.ids() == ["thing-1"]).await;
        assert!(flaky.reads.load(Ordering::SeqCst) > 3);
        assert!(!handle.is_finished());
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_store_at_startup_is_fatal() {
        let mut opts = options("c1");
        opts.connect_attempts = 3;
        let subscription = Subscription::new(
            Arc::new(DownStore),
            THINGS_STREAM,
            opts,
            Arc::new(Recorder::default()),
        );
        let (_cancel, cancelled) = watch::channel(false);
        let err = subscription.run(cancelled).await.unwrap_err();
        assert!(matches!(err, EventError::Subscribe { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_stops_blocked_read() {
        let store = Arc::new(MemoryStore::new());
        let mut opts = options("c1");
        opts.block = Duration::from_secs(30);
        let handle =
            Subscription::new(store, THINGS_STREAM, opts, Arc::new(Recorder::default())).spawn();

        tokio::time::sleep(Duration::from_millis(20)).await;
        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .expect("cancellation must interrupt the blocking read")
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_idle_records_are_claimed_from_crashed_peer() {
        let store = Arc::new(MemoryStore::new());
        store
            .create_group(THINGS_STREAM, GROUP, GroupStart::Beginning)
            .await
            .unwrap();
        EventProducer::new(store.clone())
            .notify(&removed("thing-1"))
            .await
            .unwrap();
        // Peer c0 took the record and died
        store
            .read_group(THINGS_STREAM, GROUP, "c0", ReadMode::New, 10, Duration::ZERO)
            .await
            .unwrap();

        let mut opts = options("c1");
        opts.claim_idle = Some(Duration::from_millis(30));
        let recorder = Arc::new(Recorder::default());
        let handle =
            Subscription::new(store.clone(), THINGS_STREAM, opts, recorder.clone()).spawn();

        eventually("claimed record", || recorder.ids() == ["thing-1"]).await;
        handle.shutdown().await.unwrap();
        assert_eq!(store.pending_len(THINGS_STREAM, GROUP), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_instances_share_a_group_without_double_processing() {
        let store = Arc::new(MemoryStore::new());
        let producer = EventProducer::new(store.clone());
        for i in 0..20 {
            producer.notify(&removed(&format!("thing-{i}"))).await.unwrap();
        }

        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let a = Subscription::new(store.clone(), THINGS_STREAM, options("c1"), first.clone())
            .spawn();
        let b = Subscription::new(store.clone(), THINGS_STREAM, options("c2"), second.clone())
            .spawn();

        eventually("all records", || first.ids().len() + second.ids().len() == 20).await;
        a.shutdown().await.unwrap();
        b.shutdown().await.unwrap();

        let mut all = first.ids();
        all.extend(second.ids());
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 20);
    }
}
