//! Tick orchestrator.
//!
//! Periodically polls every watched wallet, detects new transactions, and
//! fans alerts out to the subscribers whose filters match.

use crate::composer::compose;
use crate::cursor::CursorTracker;
use crate::dedup::{fingerprint, DedupGate, DEFAULT_DEDUP_WINDOW};
use crate::error::{PollerError, PollerResult};
use crate::filter::matches;
use crate::traits::{AlertSink, SubscriberStore, TransactionSource};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use walletwatch_core::{FilterConfig, SubscriberSnapshot, WalletAddress};

/// Epoch-millisecond clock used for dedup windows.
pub type Clock = Box<dyn Fn() -> u64 + Send + Sync>;

fn system_clock_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Configuration for the poller.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Time between tick starts.
    pub poll_interval: Duration,
    /// Window during which identical-looking alerts are suppressed.
    pub dedup_window: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(15_000),
            dedup_window: DEFAULT_DEDUP_WINDOW,
        }
    }
}

impl PollerConfig {
    pub fn validate(&self) -> PollerResult<()> {
        if self.poll_interval.is_zero() {
            return Err(PollerError::InvalidConfig(
                "poll interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Whether a tick is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Running,
}

/// Counters accumulated across ticks.
#[derive(Debug, Default)]
pub struct PollerStats {
    pub ticks_completed: AtomicU64,
    pub ticks_skipped: AtomicU64,
    pub ticks_failed: AtomicU64,
    pub transactions_seen: AtomicU64,
    pub duplicates_suppressed: AtomicU64,
    pub alerts_delivered: AtomicU64,
    pub delivery_failures: AtomicU64,
}

impl PollerStats {
    fn record(&self, summary: &TickSummary) {
        self.ticks_completed.fetch_add(1, Ordering::Relaxed);
        self.transactions_seen
            .fetch_add(summary.new_transactions as u64, Ordering::Relaxed);
        self.duplicates_suppressed
            .fetch_add(summary.duplicates as u64, Ordering::Relaxed);
        self.alerts_delivered
            .fetch_add(summary.deliveries as u64, Ordering::Relaxed);
        self.delivery_failures
            .fetch_add(summary.delivery_failures as u64, Ordering::Relaxed);
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            ticks_completed: self.ticks_completed.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            ticks_failed: self.ticks_failed.load(Ordering::Relaxed),
            transactions_seen: self.transactions_seen.load(Ordering::Relaxed),
            duplicates_suppressed: self.duplicates_suppressed.load(Ordering::Relaxed),
            alerts_delivered: self.alerts_delivered.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PollerStats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSummary {
    pub ticks_completed: u64,
    pub ticks_skipped: u64,
    pub ticks_failed: u64,
    pub transactions_seen: u64,
    pub duplicates_suppressed: u64,
    pub alerts_delivered: u64,
    pub delivery_failures: u64,
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Distinct wallets polled.
    pub wallets: usize,
    /// Transactions newer than their wallet's cursor.
    pub new_transactions: usize,
    /// New transactions dropped by the dedup gate.
    pub duplicates: usize,
    pub deliveries: usize,
    pub delivery_failures: usize,
}

/// Result of a tick request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick was still running; this one was dropped.
    Skipped,
    Completed(TickSummary),
    /// The tick ended early on an error (already logged).
    Failed,
}

/// One subscriber's interest in a wallet.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// Chat id, or None for device subscribers.
    pub recipient: Option<String>,
    pub filter: FilterConfig,
}

/// Group subscribers by wallet, keeping first-seen wallet order.
///
/// Chats with a blank id or no usable wallets are skipped, as are devices
/// with a blank token or wallet. Chats come before devices.
pub fn build_index(snapshot: &SubscriberSnapshot) -> Vec<(WalletAddress, Vec<Route>)> {
    let mut index: Vec<(WalletAddress, Vec<Route>)> = Vec::new();
    let mut positions: HashMap<WalletAddress, usize> = HashMap::new();

    let mut push = |wallet: WalletAddress, route: Route| {
        let pos = *positions.entry(wallet.clone()).or_insert_with(|| {
            index.push((wallet, Vec::new()));
            index.len() - 1
        });
        index[pos].1.push(route);
    };

    for chat in &snapshot.chats {
        let chat_id = chat.chat_id.trim();
        if chat_id.is_empty() || chat.wallets.is_empty() {
            continue;
        }
        let mut seen = HashSet::new();
        for raw in &chat.wallets {
            let Some(wallet) = WalletAddress::parse(raw.as_str()) else {
                continue;
            };
            if !seen.insert(wallet.clone()) {
                continue;
            }
            push(
                wallet,
                Route {
                    recipient: Some(chat_id.to_string()),
                    filter: chat.filter.clone(),
                },
            );
        }
    }

    for device in &snapshot.devices {
        if device.token.trim().is_empty() {
            continue;
        }
        let Some(wallet) = WalletAddress::parse(device.wallet.as_str()) else {
            continue;
        };
        push(
            wallet,
            Route {
                recipient: None,
                filter: device.filter.clone(),
            },
        );
    }

    index
}

/// Resets the running flag when a tick ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Decrements the spawned-tick count when a tick task ends, however it ends.
struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Polls wallets and dispatches alerts.
///
/// Owns the cursor and dedup state for the lifetime of the process.
pub struct Poller {
    config: PollerConfig,
    source: Arc<dyn TransactionSource>,
    store: Arc<dyn SubscriberStore>,
    sink: Arc<dyn AlertSink>,
    cursors: CursorTracker,
    dedup: DedupGate,
    running: AtomicBool,
    stats: PollerStats,
    clock: Clock,
}

impl Poller {
    /// Create a new poller. Fails if the configuration is invalid.
    pub fn new(
        config: PollerConfig,
        source: Arc<dyn TransactionSource>,
        store: Arc<dyn SubscriberStore>,
        sink: Arc<dyn AlertSink>,
    ) -> PollerResult<Self> {
        config.validate()?;
        Ok(Self {
            dedup: DedupGate::new(config.dedup_window),
            config,
            source,
            store,
            sink,
            cursors: CursorTracker::new(),
            running: AtomicBool::new(false),
            stats: PollerStats::default(),
            clock: Box::new(system_clock_ms),
        })
    }

    /// Replace the wall clock used for dedup windows.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn state(&self) -> PollerState {
        if self.running.load(Ordering::Acquire) {
            PollerState::Running
        } else {
            PollerState::Idle
        }
    }

    pub fn stats(&self) -> &PollerStats {
        &self.stats
    }

    pub fn cursors(&self) -> &CursorTracker {
        &self.cursors
    }

    pub fn dedup(&self) -> &DedupGate {
        &self.dedup
    }

    /// Run one tick unless one is already in progress.
    pub async fn run_tick(&self) -> TickOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Tick skipped: previous tick still running");
            self.stats.ticks_skipped.fetch_add(1, Ordering::Relaxed);
            return TickOutcome::Skipped;
        }
        let _guard = RunningGuard(&self.running);

        match self.tick().await {
            Ok(summary) => {
                self.stats.record(&summary);
                if summary.deliveries > 0 || summary.delivery_failures > 0 {
                    info!(
                        wallets = summary.wallets,
                        new_transactions = summary.new_transactions,
                        duplicates = summary.duplicates,
                        deliveries = summary.deliveries,
                        delivery_failures = summary.delivery_failures,
                        "Tick completed"
                    );
                } else {
                    debug!(
                        wallets = summary.wallets,
                        new_transactions = summary.new_transactions,
                        "Tick completed"
                    );
                }
                TickOutcome::Completed(summary)
            }
            Err(e) => {
                self.stats.ticks_failed.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "Poller tick failed");
                TickOutcome::Failed
            }
        }
    }

    async fn tick(&self) -> PollerResult<TickSummary> {
        let snapshot = self.store.load_subscribers().await?;
        let index = build_index(&snapshot);

        let mut summary = TickSummary {
            wallets: index.len(),
            ..Default::default()
        };

        for (wallet, routes) in &index {
            let page = self.source.fetch_recent_transactions(wallet).await;
            let new_txs = self.cursors.new_transactions_since(wallet, page);
            if new_txs.is_empty() {
                continue;
            }

            let balance = self.source.fetch_balance(wallet).await;
            debug!(
                wallet = %wallet,
                count = new_txs.len(),
                subscribers = routes.len(),
                "New transactions"
            );

            // Cursor order is newest first; alert oldest first.
            for tx in new_txs.iter().rev() {
                summary.new_transactions += 1;

                let fp = fingerprint(wallet, tx);
                if !self.dedup.allow(&fp, (self.clock)()) {
                    debug!(
                        wallet = %wallet,
                        signature = %tx.signature,
                        fingerprint = %fp,
                        "Skipping alert: duplicate within window"
                    );
                    summary.duplicates += 1;
                    continue;
                }

                let mut message: Option<String> = None;
                for route in routes {
                    if !matches(tx, &route.filter) {
                        continue;
                    }
                    let text = message.get_or_insert_with(|| compose(wallet, balance, tx));

                    match self
                        .sink
                        .deliver(route.recipient.as_deref(), text, wallet)
                        .await
                    {
                        Ok(()) => {
                            debug!(
                                wallet = %wallet,
                                signature = %tx.signature,
                                recipient = route.recipient.as_deref().unwrap_or("device"),
                                "Alert delivered"
                            );
                            summary.deliveries += 1;
                        }
                        Err(e) => {
                            warn!(
                                wallet = %wallet,
                                signature = %tx.signature,
                                recipient = route.recipient.as_deref().unwrap_or("device"),
                                error = %e,
                                "Failed to deliver alert"
                            );
                            summary.delivery_failures += 1;
                        }
                    }
                }
            }
        }

        let swept = self.dedup.sweep((self.clock)());
        if swept > 0 {
            debug!(swept = swept, "Expired dedup entries removed");
        }

        Ok(summary)
    }

    /// Start the recurring timer. The first tick fires immediately.
    ///
    /// Each timer fire spawns its own tick; a fire that lands while a tick is
    /// still running is dropped by the running flag.
    pub fn start(self: Arc<Self>) -> PollerHandle {
        let poller = Arc::clone(&self);
        let period = self.config.poll_interval;
        let pending = Arc::new(AtomicUsize::new(0));
        let timer_pending = Arc::clone(&pending);

        info!(
            interval_ms = period.as_millis() as u64,
            dedup_window_ms = self.config.dedup_window.as_millis() as u64,
            "Starting poller"
        );

        let timer = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let poller = Arc::clone(&poller);
                // No await between the count and the spawn.
                timer_pending.fetch_add(1, Ordering::AcqRel);
                let guard = PendingGuard(Arc::clone(&timer_pending));
                tokio::spawn(async move {
                    let _guard = guard;
                    poller.run_tick().await;
                });
            }
        });

        PollerHandle {
            timer,
            poller: self,
            pending,
        }
    }
}

/// Handle returned by [`Poller::start`].
pub struct PollerHandle {
    timer: JoinHandle<()>,
    poller: Arc<Poller>,
    /// Tick tasks spawned by the timer that have not finished yet.
    pending: Arc<AtomicUsize>,
}

impl PollerHandle {
    pub fn poller(&self) -> &Arc<Poller> {
        &self.poller
    }

    /// Cancel the timer. A tick already in flight keeps running.
    pub fn stop(&self) {
        self.timer.abort();
    }

    /// Tick tasks spawned by the timer that have not finished yet, including
    /// ones that have not reached the running flag.
    pub fn pending_ticks(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Cancel the timer and wait up to `timeout` for every spawned tick.
    /// Returns false if a tick was still pending at the deadline.
    pub async fn stop_and_drain(&self, timeout: Duration) -> bool {
        self.stop();
        let deadline = tokio::time::Instant::now() + timeout;
        while self.pending_ticks() > 0 || self.poller.state() == PollerState::Running {
            if tokio::time::Instant::now() >= deadline {
                warn!("Poller tick still running at shutdown deadline");
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        info!("Poller stopped");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DeliveryError, StoreError};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio::sync::Semaphore;
    use walletwatch_core::{ChatSubscriber, DeviceSubscriber, FilterMode, Transaction};

    const SOL: u64 = 1_000_000_000;

    #[derive(Default)]
    struct MockSource {
        pages: Mutex<HashMap<String, Vec<Transaction>>>,
        balance: Option<f64>,
        page_fetches: AtomicUsize,
        balance_fetches: AtomicUsize,
        gate: Option<Arc<Semaphore>>,
    }

    impl MockSource {
        fn set_page(&self, wallet: &str, txs: Vec<Transaction>) {
            self.pages.lock().unwrap().insert(wallet.to_string(), txs);
        }
    }

    #[async_trait]
    impl TransactionSource for MockSource {
        async fn fetch_recent_transactions(&self, wallet: &WalletAddress) -> Vec<Transaction> {
            if let Some(gate) = &self.gate {
                let _permit = gate.acquire().await;
            }
            self.page_fetches.fetch_add(1, Ordering::SeqCst);
            self.pages
                .lock()
                .unwrap()
                .get(wallet.as_str())
                .cloned()
                .unwrap_or_default()
        }

        async fn fetch_balance(&self, _wallet: &WalletAddress) -> Option<f64> {
            self.balance_fetches.fetch_add(1, Ordering::SeqCst);
            self.balance
        }
    }

    #[derive(Default)]
    struct MockStore {
        snapshot: Mutex<SubscriberSnapshot>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl SubscriberStore for MockStore {
        async fn load_subscribers(&self) -> Result<SubscriberSnapshot, StoreError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("disk on fire".to_string()));
            }
            Ok(self.snapshot.lock().unwrap().clone())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<(Option<String>, String, String)>>,
        failing_recipient: Option<String>,
    }

    impl RecordingSink {
        fn calls(&self) -> Vec<(Option<String>, String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn deliver(
            &self,
            recipient: Option<&str>,
            message: &str,
            wallet: &WalletAddress,
        ) -> Result<(), DeliveryError> {
            if recipient.is_some() && recipient == self.failing_recipient.as_deref() {
                return Err(DeliveryError::SendFailed("chat blocked the bot".to_string()));
            }
            self.calls.lock().unwrap().push((
                recipient.map(str::to_string),
                message.to_string(),
                wallet.to_string(),
            ));
            Ok(())
        }
    }

    fn wallet(s: &str) -> WalletAddress {
        WalletAddress::parse(s).unwrap()
    }

    fn chat(id: &str, wallets: &[&str], filter: FilterConfig) -> ChatSubscriber {
        ChatSubscriber::new(id, wallets.iter().map(|w| wallet(w)).collect()).with_filter(filter)
    }

    fn snapshot(chats: Vec<ChatSubscriber>) -> SubscriberSnapshot {
        SubscriberSnapshot {
            chats,
            devices: Vec::new(),
        }
    }

    fn transfer(sig: &str, lamports: u64) -> Transaction {
        Transaction::new(sig, "TRANSFER").with_native(lamports, "alice", "bob")
    }

    struct Harness {
        source: Arc<MockSource>,
        store: Arc<MockStore>,
        sink: Arc<RecordingSink>,
        poller: Arc<Poller>,
        now: Arc<AtomicU64>,
    }

    fn harness_with(source: MockSource, sink: RecordingSink, snap: SubscriberSnapshot) -> Harness {
        let source = Arc::new(source);
        let store = Arc::new(MockStore::default());
        *store.snapshot.lock().unwrap() = snap;
        let sink = Arc::new(sink);
        let now = Arc::new(AtomicU64::new(1_000_000));
        let clock_now = Arc::clone(&now);
        let poller = Poller::new(
            PollerConfig::default(),
            source.clone(),
            store.clone(),
            sink.clone(),
        )
        .unwrap()
        .with_clock(Box::new(move || clock_now.load(Ordering::SeqCst)));
        Harness {
            source,
            store,
            sink,
            poller: Arc::new(poller),
            now,
        }
    }

    fn harness(snap: SubscriberSnapshot) -> Harness {
        harness_with(MockSource::default(), RecordingSink::default(), snap)
    }

    fn completed(outcome: TickOutcome) -> TickSummary {
        match outcome {
            TickOutcome::Completed(summary) => summary,
            other => panic!("expected completed tick, got {:?}", other),
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(PollerConfig::default().validate().is_ok());
        let config = PollerConfig {
            poll_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PollerError::InvalidConfig(_))));
    }

    #[test]
    fn test_build_index_groups_by_wallet() {
        let mut snap = snapshot(vec![
            chat("1", &["W1", "W2"], FilterConfig::default()),
            chat("2", &["W2"], FilterConfig::with_mode(FilterMode::Swap)),
        ]);
        snap.devices.push(DeviceSubscriber::new("tok", wallet("W3")));
        snap.devices.push(DeviceSubscriber::new("tok2", wallet("W1")));

        let index = build_index(&snap);
        let wallets: Vec<&str> = index.iter().map(|(w, _)| w.as_str()).collect();
        assert_eq!(wallets, vec!["W1", "W2", "W3"]);

        let w1: Vec<Option<&str>> = index[0].1.iter().map(|r| r.recipient.as_deref()).collect();
        assert_eq!(w1, vec![Some("1"), None]);
        let w2: Vec<Option<&str>> = index[1].1.iter().map(|r| r.recipient.as_deref()).collect();
        assert_eq!(w2, vec![Some("1"), Some("2")]);
        assert_eq!(index[1].1[1].filter.mode, FilterMode::Swap);
    }

    #[test]
    fn test_build_index_skips_unusable_subscribers() {
        let mut snap = snapshot(vec![
            chat("  ", &["W1"], FilterConfig::default()),
            chat("2", &[], FilterConfig::default()),
            chat("3", &["W1", "W1"], FilterConfig::default()),
        ]);
        snap.devices.push(DeviceSubscriber::new("", wallet("W2")));

        let index = build_index(&snap);
        assert_eq!(index.len(), 1);
        assert_eq!(index[0].0.as_str(), "W1");
        // Repeated wallet in one chat yields one route
        assert_eq!(index[0].1.len(), 1);
        assert_eq!(index[0].1[0].recipient.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_first_observation_sends_nothing() {
        let h = harness(snapshot(vec![chat("1", &["W"], FilterConfig::default())]));
        h.source.set_page("W", vec![transfer("s3", 3), transfer("s2", 2), transfer("s1", 1)]);

        let summary = completed(h.poller.run_tick().await);
        assert_eq!(summary.deliveries, 0);
        assert!(h.sink.calls().is_empty());
        assert_eq!(h.poller.cursors().cursor(&wallet("W")).as_deref(), Some("s3"));
        // Nothing new, so the balance is never fetched
        assert_eq!(h.source.balance_fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_new_transactions_delivered_oldest_first() {
        let h = harness(snapshot(vec![chat("1", &["W"], FilterConfig::default())]));
        h.source.set_page("W", vec![transfer("s1", SOL)]);
        completed(h.poller.run_tick().await);

        h.source.set_page(
            "W",
            vec![transfer("s3", 3 * SOL), transfer("s2", 2 * SOL), transfer("s1", SOL)],
        );
        let summary = completed(h.poller.run_tick().await);
        assert_eq!(summary.new_transactions, 2);
        assert_eq!(summary.deliveries, 2);

        let calls = h.sink.calls();
        assert!(calls[0].1.ends_with("Tx: <code>s2</code>"));
        assert!(calls[1].1.ends_with("Tx: <code>s3</code>"));
        assert_eq!(h.poller.cursors().cursor(&wallet("W")).as_deref(), Some("s3"));
        assert_eq!(h.source.balance_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sol_filter_threshold_end_to_end() {
        let h = harness(snapshot(vec![chat("1", &["W"], FilterConfig::min_sol(5.0))]));
        h.source.set_page("W", vec![transfer("s0", SOL)]);
        completed(h.poller.run_tick().await);

        h.source.set_page("W", vec![transfer("s1", 4 * SOL), transfer("s0", SOL)]);
        completed(h.poller.run_tick().await);
        assert!(h.sink.calls().is_empty());

        h.source.set_page("W", vec![transfer("s2", 6 * SOL), transfer("s1", 4 * SOL)]);
        completed(h.poller.run_tick().await);
        let calls = h.sink.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1.contains("Transfer: <b>6.0000 SOL</b>"));
    }

    #[tokio::test]
    async fn test_fan_out_shares_message() {
        let h = harness(snapshot(vec![
            chat("all", &["W"], FilterConfig::default()),
            chat("swaps", &["W"], FilterConfig::with_mode(FilterMode::Swap)),
        ]));
        h.source.set_page("W", vec![Transaction::new("s0", "TRANSFER")]);
        completed(h.poller.run_tick().await);

        h.source.set_page(
            "W",
            vec![Transaction::new("s1", "SWAP_EXACT"), Transaction::new("s0", "TRANSFER")],
        );
        let summary = completed(h.poller.run_tick().await);
        assert_eq!(summary.deliveries, 2);

        let calls = h.sink.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0.as_deref(), Some("all"));
        assert_eq!(calls[1].0.as_deref(), Some("swaps"));
        assert_eq!(calls[0].1, calls[1].1);
        assert_eq!(calls[0].2, "W");
    }

    #[tokio::test]
    async fn test_one_admission_fans_out_to_all_subscribers() {
        let h = harness(snapshot(vec![
            chat("1", &["W"], FilterConfig::default()),
            chat("2", &["W"], FilterConfig::default()),
        ]));
        h.source.set_page("W", vec![transfer("s0", SOL)]);
        completed(h.poller.run_tick().await);

        h.source.set_page("W", vec![transfer("s1", 9 * SOL), transfer("s0", SOL)]);
        let summary = completed(h.poller.run_tick().await);
        assert_eq!(summary.deliveries, 2);
        assert_eq!(summary.duplicates, 0);
        assert_eq!(h.poller.dedup().len(), 1);
    }

    #[tokio::test]
    async fn test_same_shape_within_tick_is_suppressed_for_everyone() {
        let h = harness(snapshot(vec![
            chat("1", &["W"], FilterConfig::default()),
            chat("2", &["W"], FilterConfig::default()),
        ]));
        h.source.set_page("W", vec![transfer("s0", SOL)]);
        completed(h.poller.run_tick().await);

        // s1 and s2 share wallet, type and peak amount
        h.source.set_page(
            "W",
            vec![transfer("s2", 2 * SOL), transfer("s1", 2 * SOL), transfer("s0", SOL)],
        );
        let summary = completed(h.poller.run_tick().await);
        assert_eq!(summary.new_transactions, 2);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.deliveries, 2);
        assert!(h.sink.calls().iter().all(|c| c.1.ends_with("<code>s1</code>")));
    }

    #[tokio::test]
    async fn test_dedup_window_across_ticks() {
        let h = harness(snapshot(vec![chat("1", &["W"], FilterConfig::default())]));
        h.source.set_page("W", vec![transfer("s0", SOL)]);
        completed(h.poller.run_tick().await);

        h.source.set_page("W", vec![transfer("s1", 2 * SOL), transfer("s0", SOL)]);
        completed(h.poller.run_tick().await);
        assert_eq!(h.sink.calls().len(), 1);

        h.now.fetch_add(10_000, Ordering::SeqCst);
        h.source.set_page("W", vec![transfer("s2", 2 * SOL), transfer("s1", 2 * SOL)]);
        let summary = completed(h.poller.run_tick().await);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(h.sink.calls().len(), 1);

        h.now.fetch_add(45_000, Ordering::SeqCst);
        h.source.set_page("W", vec![transfer("s3", 2 * SOL), transfer("s2", 2 * SOL)]);
        completed(h.poller.run_tick().await);
        assert_eq!(h.sink.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_device_subscribers_get_null_recipient() {
        let mut snap = snapshot(Vec::new());
        snap.devices.push(DeviceSubscriber::new("device-token", wallet("W")));
        let h = harness(snap);
        h.source.set_page("W", vec![transfer("s0", SOL)]);
        completed(h.poller.run_tick().await);

        h.source.set_page("W", vec![transfer("s1", 3 * SOL), transfer("s0", SOL)]);
        completed(h.poller.run_tick().await);

        let calls = h.sink.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, None);
        assert_eq!(calls[0].2, "W");
    }

    #[tokio::test]
    async fn test_delivery_failure_does_not_stop_fan_out() {
        let sink = RecordingSink {
            failing_recipient: Some("bad".to_string()),
            ..Default::default()
        };
        let h = harness_with(
            MockSource::default(),
            sink,
            snapshot(vec![
                chat("bad", &["W"], FilterConfig::default()),
                chat("good", &["W"], FilterConfig::default()),
            ]),
        );
        h.source.set_page("W", vec![transfer("s0", SOL)]);
        completed(h.poller.run_tick().await);

        h.source.set_page("W", vec![transfer("s1", 3 * SOL), transfer("s0", SOL)]);
        let summary = completed(h.poller.run_tick().await);
        assert_eq!(summary.deliveries, 1);
        assert_eq!(summary.delivery_failures, 1);
        assert_eq!(h.sink.calls()[0].0.as_deref(), Some("good"));
        assert_eq!(h.poller.stats().summary().delivery_failures, 1);
    }

    #[tokio::test]
    async fn test_store_failure_fails_tick_and_resets_state() {
        let h = harness(snapshot(vec![chat("1", &["W"], FilterConfig::default())]));
        h.store.fail.store(true, Ordering::SeqCst);

        assert_eq!(h.poller.run_tick().await, TickOutcome::Failed);
        assert_eq!(h.poller.state(), PollerState::Idle);
        assert_eq!(h.source.page_fetches.load(Ordering::SeqCst), 0);

        h.store.fail.store(false, Ordering::SeqCst);
        completed(h.poller.run_tick().await);
        let stats = h.poller.stats().summary();
        assert_eq!(stats.ticks_failed, 1);
        assert_eq!(stats.ticks_completed, 1);
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let gate = Arc::new(Semaphore::new(0));
        let source = MockSource {
            gate: Some(gate.clone()),
            ..Default::default()
        };
        let h = harness_with(
            source,
            RecordingSink::default(),
            snapshot(vec![chat("1", &["W"], FilterConfig::default())]),
        );

        let poller = Arc::clone(&h.poller);
        let first = tokio::spawn(async move { poller.run_tick().await });
        while h.poller.state() != PollerState::Running {
            tokio::task::yield_now().await;
        }

        assert_eq!(h.poller.run_tick().await, TickOutcome::Skipped);

        gate.add_permits(1);
        let outcome = first.await.unwrap();
        assert!(matches!(outcome, TickOutcome::Completed(_)));
        assert_eq!(h.poller.state(), PollerState::Idle);
        assert_eq!(h.poller.stats().summary().ticks_skipped, 1);
        assert_eq!(h.source.page_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let source = Arc::new(MockSource::default());
        let store = Arc::new(MockStore::default());
        *store.snapshot.lock().unwrap() =
            snapshot(vec![chat("1", &["W"], FilterConfig::default())]);
        let config = PollerConfig {
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let poller = Arc::new(
            Poller::new(config, source.clone(), store, Arc::new(RecordingSink::default())).unwrap(),
        );

        let handle = Arc::clone(&poller).start();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(handle.stop_and_drain(Duration::from_secs(1)).await);

        assert!(poller.stats().summary().ticks_completed >= 1);
        assert_eq!(poller.state(), PollerState::Idle);
        assert_eq!(handle.pending_ticks(), 0);
    }

    #[tokio::test]
    async fn test_stop_and_drain_waits_for_spawned_tick() {
        let gate = Arc::new(Semaphore::new(0));
        let source = Arc::new(MockSource {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let store = Arc::new(MockStore::default());
        *store.snapshot.lock().unwrap() =
            snapshot(vec![chat("1", &["W"], FilterConfig::default())]);
        let config = PollerConfig {
            poll_interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let poller = Arc::new(
            Poller::new(config, source, store, Arc::new(RecordingSink::default())).unwrap(),
        );

        let handle = Arc::clone(&poller).start();
        // The immediate timer fire has spawned a tick that has not run yet
        while handle.pending_ticks() == 0 {
            tokio::task::yield_now().await;
        }

        // The spawned tick is waited for even though it was idle when the drain began
        assert!(!handle.stop_and_drain(Duration::from_millis(100)).await);
        assert_eq!(handle.pending_ticks(), 1);
        assert_eq!(poller.state(), PollerState::Running);

        gate.add_permits(1);
        assert!(handle.stop_and_drain(Duration::from_secs(1)).await);
        assert_eq!(handle.pending_ticks(), 0);
        assert_eq!(poller.state(), PollerState::Idle);
        assert_eq!(poller.stats().summary().ticks_completed, 1);
    }
}
