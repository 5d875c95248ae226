//! Contest finalization: score, rank, match prizes and pay winners.
//!
//! Runs once per contest after its match completes; safe to re-run because
//! the payout processor refuses to move money twice. One winner's payout
//! failure never aborts the rest of the contest.

use thiserror::Error;
use tracing::{info, warn};

use crate::Amount;
use crate::model::{ContestId, ContestStatus, EntryId, UserId};
use crate::payout::{PayoutConfig, PayoutOutcome, pay_winner};
use crate::points::{Points, StatsSource, compute_entry_points};
use crate::prize::match_prize;
use crate::rank::rank_entries;
use crate::store::{Store, StoreError};

/// Rejections checked before any side effect.
#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("contest {0} is not completed (status {1:?})")]
    ContestNotCompleted(ContestId, ContestStatus),

    #[error("contest {0} has no prize table")]
    MissingPrizeTable(ContestId),
}

/// One paid (or attempted) winner in the summary.
#[derive(Debug, Clone)]
pub struct WinnerSummary {
    pub entry: EntryId,
    pub user: UserId,
    pub rank: u32,
    pub points: Points,
    pub amount: Amount,
    pub outcome: PayoutOutcome,
}

/// Aggregate result returned to the finalize caller; per-entry failures
/// show up here as counts, never as errors.
#[derive(Debug, Clone)]
pub struct FinalizeSummary {
    pub contest: ContestId,
    pub total_entries: usize,
    /// Sum over winners whose payout completed (now or previously).
    pub total_prizes_distributed: Amount,
    pub winners: Vec<WinnerSummary>,
    pub dead_lettered: usize,
    pub errors: usize,
}

/// Finalize one contest: compute every entry's points, rank the field,
/// persist results, then pay each winning rank its prize.
pub async fn finalize_contest(
    store: &(impl Store + StatsSource),
    contest_id: ContestId,
    config: &PayoutConfig,
) -> Result<FinalizeSummary, FinalizeError> {
    let contest = store.contest(contest_id)?;
    if contest.status != ContestStatus::Completed {
        return Err(FinalizeError::ContestNotCompleted(contest_id, contest.status));
    }
    if contest.prize_table.is_empty() {
        return Err(FinalizeError::MissingPrizeTable(contest_id));
    }

    let entries = store.contest_entries(contest_id)?;
    let scored: Vec<(EntryId, Points)> = entries
        .iter()
        .map(|e| (e.id, compute_entry_points(&e.team, contest.match_id, store)))
        .collect();
    let ranked = rank_entries(&scored);

    for r in &ranked {
        store.record_result(r.id, r.rank, r.points)?;
    }
    info!(contest = contest_id, entries = ranked.len(), "contest ranked");

    let mut summary = FinalizeSummary {
        contest: contest_id,
        total_entries: entries.len(),
        total_prizes_distributed: Amount::ZERO,
        winners: Vec::new(),
        dead_lettered: 0,
        errors: 0,
    };

    for r in ranked {
        let Some(prize) = match_prize(r.rank, &contest.prize_table) else {
            continue;
        };
        let entry = store.entry(r.id)?;
        match pay_winner(store, &contest, &entry, r.rank, prize.amount, config).await {
            Ok(outcome) => {
                if outcome == PayoutOutcome::DeadLettered {
                    summary.dead_lettered += 1;
                } else {
                    summary.total_prizes_distributed += prize.amount;
                }
                summary.winners.push(WinnerSummary {
                    entry: entry.id,
                    user: entry.user,
                    rank: r.rank,
                    points: r.points,
                    amount: prize.amount,
                    outcome,
                });
            }
            Err(e) => {
                // isolate the failure; the other winners still get paid
                warn!(contest = contest_id, entry = r.id, error = %e, "winner payout errored");
                summary.errors += 1;
            }
        }
    }

    info!(
        contest = contest_id,
        winners = summary.winners.len(),
        distributed = %summary.total_prizes_distributed,
        dead_lettered = summary.dead_lettered,
        "contest finalized"
    );
    Ok(summary)
}
