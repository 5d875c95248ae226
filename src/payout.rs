//! Payout processor: idempotently credits one winning entry.
//!
//! Per (entry, amount) the flow is Checking -> Paying -> Verifying, with
//! bounded retries and a dead-letter record once retries are exhausted.
//! Exhaustion is never surfaced as a hard error; the caller reads it from
//! the returned outcome and carries on with the other winners.

use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use crate::Amount;
use crate::model::{Contest, ContestEntry, FailedPayout, PayoutDraft};
use crate::store::{Store, StoreError};

/// Retry bounds for one payout.
#[derive(Debug, Clone)]
pub struct PayoutConfig {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles per attempt, plus jitter.
    pub base_delay: Duration,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl PayoutConfig {
    /// Exponential backoff with random jitter of up to a quarter of the
    /// computed delay.
    fn delay_for(&self, attempt: u32) -> Duration {
        let backoff = self.base_delay.saturating_mul(1 << (attempt - 1).min(16));
        let jitter_max = (backoff.as_millis() / 4) as u64;
        let jitter = if jitter_max == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_max)
        };
        backoff + Duration::from_millis(jitter)
    }
}

/// How a payout attempt concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutOutcome {
    /// Money moved in this call.
    Paid,
    /// A completed payout already existed; no new money movement.
    AlreadyPaid,
    /// Retries exhausted; a dead-letter record was written for the
    /// reconciliation sweep to replay.
    DeadLettered,
}

/// Display-only description for the ledger row. Never used for matching.
pub fn payout_reference(contest_name: &str, rank: u32) -> String {
    format!("Contest Win: {contest_name} - Rank {rank}")
}

/// Pay `amount` to the entry's user, exactly once.
///
/// Safe to call again for the same entry: a completed payout found in the
/// Checking phase short-circuits to [`PayoutOutcome::AlreadyPaid`], back-
/// filling the entry's win amount if an earlier run recorded the money but
/// not the entry (data-repair path).
pub async fn pay_winner(
    store: &impl Store,
    contest: &Contest,
    entry: &ContestEntry,
    rank: u32,
    amount: Amount,
    config: &PayoutConfig,
) -> Result<PayoutOutcome, StoreError> {
    // Checking
    if store.find_payout(entry.user, entry.id)?.is_some() {
        if entry.win_amount.is_none() {
            store.mark_winner(entry.id, amount)?;
        }
        info!(entry = entry.id, user = entry.user, "payout already recorded");
        return Ok(PayoutOutcome::AlreadyPaid);
    }

    let draft = PayoutDraft {
        user: entry.user,
        contest: contest.id,
        entry: entry.id,
        amount,
        reference: payout_reference(&contest.name, rank),
    };

    let mut last_error = String::new();
    for attempt in 1..=config.max_attempts {
        match attempt_payout(store, &draft).await {
            Ok(()) => {
                info!(
                    entry = entry.id,
                    user = entry.user,
                    amount = %amount,
                    "payout completed"
                );
                return Ok(PayoutOutcome::Paid);
            }
            Err(StoreError::DuplicatePayout(..)) => {
                // lost a benign race with another trigger
                info!(entry = entry.id, user = entry.user, "payout raced, already paid");
                return Ok(PayoutOutcome::AlreadyPaid);
            }
            Err(e) => {
                warn!(
                    entry = entry.id,
                    attempt,
                    max_attempts = config.max_attempts,
                    error = %e,
                    "payout attempt failed"
                );
                last_error = e.to_string();
                if attempt < config.max_attempts {
                    tokio::time::sleep(config.delay_for(attempt)).await;
                }
            }
        }
    }

    // dead-letter path: durable record for asynchronous recovery
    store.push_dead_letter(FailedPayout::new(
        entry.user,
        contest.id,
        entry.id,
        rank,
        amount,
        last_error,
    ))?;
    warn!(entry = entry.id, user = entry.user, "payout dead-lettered");
    Ok(PayoutOutcome::DeadLettered)
}

/// One Paying + Verifying pass.
async fn attempt_payout(store: &impl Store, draft: &PayoutDraft) -> Result<(), StoreError> {
    // record the win before money moves; if this fails there is no point
    // attempting payment
    store.mark_winner(draft.entry, draft.amount)?;

    // wallet credit + ledger insert, one atomic unit
    store.commit_payout(draft)?;

    // Verifying: the committed payout must be visible
    if store.find_payout(draft.user, draft.entry)?.is_none() {
        return Err(StoreError::Unavailable(
            "payout not visible after commit".to_string(),
        ));
    }
    Ok(())
}
