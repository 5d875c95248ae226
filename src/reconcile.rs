//! Reconciliation: detect entries that should have been paid but have no
//! ledger transaction, and repair them.
//!
//! The sweep runs from a timer, from an admin force trigger, or in a
//! side-effect-free dry-run mode. Gap detection and repair use the same
//! structured (user, entry) de-duplication key as the payout processor, so
//! the two paths can never disagree about whether an entry was paid.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use tokio::sync::{Notify, Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, info, warn};

use crate::Amount;
use crate::model::{ContestId, EntryId, FailedPayout, PayoutDraft, UserId};
use crate::payout::payout_reference;
use crate::store::{Store, StoreError};

/// Production sweep cadence.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default width of the repair worker pool.
pub const DEFAULT_SWEEP_CONCURRENCY: usize = 8;

/// A winning entry with no completed payout transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gap {
    pub entry: EntryId,
    pub user: UserId,
    pub contest: ContestId,
    pub rank: u32,
    pub amount: Amount,
}

/// Gaps for one contest, for the monitoring surface.
#[derive(Debug, Clone)]
pub struct ContestGapReport {
    pub contest: ContestId,
    pub gaps: Vec<Gap>,
}

/// Whether the sweep writes repairs or only reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepMode {
    /// Report gaps and pending dead letters without touching anything.
    DryRun,
    Repair,
}

/// Sweep tuning and cooperative cancellation.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub concurrency: usize,
    /// Checked between entries; setting it makes an in-flight sweep wind
    /// down promptly.
    pub cancel: Arc<AtomicBool>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_SWEEP_CONCURRENCY,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Aggregate sweep result; per-entry failures are counted, never raised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub gaps_found: usize,
    pub repaired: usize,
    pub replayed: usize,
    pub pending_dead_letters: usize,
    pub errors: usize,
}

/// Winning entries with no matching completed payout, by structured
/// transaction metadata.
pub fn find_gaps(store: &impl Store) -> Result<Vec<Gap>, StoreError> {
    let paid_entries: HashSet<EntryId> = store
        .payouts()?
        .iter()
        .filter_map(|t| t.meta.map(|m| m.entry))
        .collect();

    Ok(store
        .winning_entries()?
        .into_iter()
        .filter(|e| !paid_entries.contains(&e.id))
        .map(|e| Gap {
            entry: e.id,
            user: e.user,
            contest: e.contest,
            rank: e.rank.unwrap_or(0),
            amount: e.win_amount.unwrap_or_default(),
        })
        .collect())
}

/// Read-only monitoring surface: unpaid winners grouped per contest.
pub fn gap_report(store: &impl Store) -> Result<Vec<ContestGapReport>, StoreError> {
    let mut by_contest: BTreeMap<ContestId, Vec<Gap>> = BTreeMap::new();
    for gap in find_gaps(store)? {
        by_contest.entry(gap.contest).or_default().push(gap);
    }
    Ok(by_contest
        .into_iter()
        .map(|(contest, gaps)| ContestGapReport { contest, gaps })
        .collect())
}

/// One full sweep: repair gaps through a bounded worker pool, then replay
/// pending dead letters. Never returns an error; everything that goes
/// wrong is a count in the report.
pub async fn run_sweep<S>(store: &S, mode: SweepMode, config: &SweepConfig) -> SweepReport
where
    S: Store + Clone + Send + Sync + 'static,
{
    let mut report = SweepReport::default();

    let gaps = match find_gaps(store) {
        Ok(gaps) => gaps,
        Err(e) => {
            warn!(error = %e, "gap detection failed");
            report.errors += 1;
            return report;
        }
    };
    report.gaps_found = gaps.len();

    let pending = match store.pending_dead_letters() {
        Ok(pending) => pending,
        Err(e) => {
            warn!(error = %e, "dead letter listing failed");
            report.errors += 1;
            Vec::new()
        }
    };
    report.pending_dead_letters = pending.len();

    if mode == SweepMode::DryRun {
        info!(
            gaps = report.gaps_found,
            dead_letters = report.pending_dead_letters,
            "dry-run sweep"
        );
        return report;
    }

    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let mut tasks = JoinSet::new();
    for gap in gaps {
        if config.cancel.load(Ordering::SeqCst) {
            warn!("sweep cancelled before completing gap repair");
            break;
        }
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let store = store.clone();
        tasks.spawn(async move {
            let _permit = permit;
            repair_gap(&store, &gap)
        });
    }
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => report.repaired += 1,
            Ok(Err(e)) => {
                warn!(error = %e, "gap repair failed");
                report.errors += 1;
            }
            Err(e) => {
                warn!(error = %e, "gap repair task panicked");
                report.errors += 1;
            }
        }
    }

    for dead in pending {
        if config.cancel.load(Ordering::SeqCst) {
            warn!("sweep cancelled before completing dead letter replay");
            break;
        }
        match replay_dead_letter(store, &dead) {
            Ok(()) => report.replayed += 1,
            Err(e) => {
                // left pending for the next sweep
                warn!(key = %dead.key, error = %e, "dead letter replay failed");
                report.errors += 1;
            }
        }
    }

    info!(
        gaps = report.gaps_found,
        repaired = report.repaired,
        replayed = report.replayed,
        errors = report.errors,
        "sweep finished"
    );
    report
}

/// Re-create the missing payout for one gap. The entry-metadata duplicate
/// key is the only existence check; a duplicate means another trigger got
/// there first, which is success.
fn repair_gap(store: &impl Store, gap: &Gap) -> Result<(), StoreError> {
    let contest = store.contest(gap.contest)?;
    let draft = PayoutDraft {
        user: gap.user,
        contest: gap.contest,
        entry: gap.entry,
        amount: gap.amount,
        reference: payout_reference(&contest.name, gap.rank),
    };
    match store.commit_payout(&draft) {
        Ok(_) => {
            info!(entry = gap.entry, user = gap.user, amount = %gap.amount, "gap repaired");
            Ok(())
        }
        Err(StoreError::DuplicatePayout(..)) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Replay one dead-lettered payout and mark it replayed on success (or
/// when the payout turns out to exist already).
fn replay_dead_letter(store: &impl Store, dead: &FailedPayout) -> Result<(), StoreError> {
    let contest = store.contest(dead.contest)?;
    let draft = PayoutDraft {
        user: dead.user,
        contest: dead.contest,
        entry: dead.entry,
        amount: dead.amount,
        reference: payout_reference(&contest.name, dead.rank),
    };
    match store.commit_payout(&draft) {
        Ok(_) | Err(StoreError::DuplicatePayout(..)) => {
            store.mark_replayed(&dead.key)?;
            info!(key = %dead.key, entry = dead.entry, "dead letter replayed");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Shared state between the timer loop and on-demand triggers; the
/// in-flight flag is the overlap guard.
#[derive(Clone)]
struct SweepRunner<S> {
    store: S,
    concurrency: usize,
    in_flight: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    /// Signaled each time a sweep finishes and `in_flight` drops.
    idle: Arc<Notify>,
    last_run: Arc<Mutex<Option<SystemTime>>>,
}

impl<S> SweepRunner<S>
where
    S: Store + Clone + Send + Sync + 'static,
{
    /// Run one repair sweep unless one is already in flight.
    async fn trigger(&self) -> Option<SweepReport> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("sweep already in flight, trigger skipped");
            return None;
        }
        let config = SweepConfig {
            concurrency: self.concurrency,
            cancel: self.cancel.clone(),
        };
        let report = run_sweep(&self.store, SweepMode::Repair, &config).await;
        *self
            .last_run
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(SystemTime::now());
        self.in_flight.store(false, Ordering::SeqCst);
        self.idle.notify_one();
        Some(report)
    }
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub started: bool,
    pub sweep_in_flight: bool,
    pub last_run: Option<SystemTime>,
}

/// Owns the periodic reconciliation loop.
///
/// One sweep at a time: a timer tick that fires while a sweep is still in
/// flight no-ops instead of double-processing. Stopping cancels an
/// in-flight sweep cooperatively and joins the loop task.
pub struct ReconcileScheduler<S> {
    runner: SweepRunner<S>,
    interval: Duration,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl<S> ReconcileScheduler<S>
where
    S: Store + Clone + Send + Sync + 'static,
{
    pub fn new(store: S, interval: Duration) -> Self {
        Self {
            runner: SweepRunner {
                store,
                concurrency: DEFAULT_SWEEP_CONCURRENCY,
                in_flight: Arc::new(AtomicBool::new(false)),
                cancel: Arc::new(AtomicBool::new(false)),
                idle: Arc::new(Notify::new()),
                last_run: Arc::new(Mutex::new(None)),
            },
            interval,
            shutdown: None,
            handle: None,
        }
    }

    /// Spawn the timer loop. Idempotent while already started.
    pub fn start(&mut self) {
        if self.shutdown.is_some() {
            return;
        }
        self.runner.cancel.store(false, Ordering::SeqCst);
        let (tx, mut rx) = watch::channel(false);
        let runner = self.runner.clone();
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticks = IntervalStream::new(tokio::time::interval(interval));
            // interval fires immediately; the first sweep belongs one
            // period out
            ticks.next().await;
            loop {
                tokio::select! {
                    _ = rx.changed() => break,
                    _ = ticks.next() => {
                        runner.trigger().await;
                    }
                }
            }
            debug!("reconcile scheduler loop exited");
        });
        self.shutdown = Some(tx);
        self.handle = Some(handle);
        info!(interval_secs = self.interval.as_secs(), "reconcile scheduler started");
    }

    /// Stop the loop and cancel any in-flight sweep, waiting for both.
    pub async fn stop(&mut self) {
        let Some(tx) = self.shutdown.take() else {
            return;
        };
        let _ = tx.send(true);
        self.runner.cancel.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        // wait out a sweep a force trigger left in flight; `notify_one`
        // stores a permit, so a finish between the check and the await is
        // never missed
        while self.runner.in_flight.load(Ordering::SeqCst) {
            self.runner.idle.notified().await;
        }
        self.runner.cancel.store(false, Ordering::SeqCst);
        info!("reconcile scheduler stopped");
    }

    /// Immediate sweep, bypassing the timer. `None` while another sweep is
    /// in flight.
    pub async fn force_run(&self) -> Option<SweepReport> {
        self.runner.trigger().await
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            started: self.shutdown.is_some(),
            sweep_in_flight: self.runner.in_flight.load(Ordering::SeqCst),
            last_run: *self
                .runner
                .last_run
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }
}
