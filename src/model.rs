//! Core domain types for the finalization and payout pipeline.

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use thiserror::Error;

use crate::Amount;
use crate::points::Points;

/// User identifier.
pub type UserId = u32;

/// Contest identifier.
pub type ContestId = u32;

/// Contest entry identifier.
pub type EntryId = u32;

/// Match identifier.
pub type MatchId = u32;

/// Real-world player identifier.
pub type PlayerId = u32;

/// Ledger transaction identifier.
pub type TxId = u64;

/// Status of a contest, tracking the underlying match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContestStatus {
    /// Match has not started; entries may still join.
    #[default]
    Open,
    /// Match in progress.
    Live,
    /// Match finished; the contest can be finalized.
    Completed,
}

/// Prize distribution shape for generated prize tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrizeShape {
    /// Most of the pool concentrated in the top ranks.
    TopHeavy,
    /// Flatter spread across all winning ranks.
    Distributed,
    #[default]
    Balanced,
}

impl FromStr for PrizeShape {
    type Err = ParseShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top_heavy" => Ok(PrizeShape::TopHeavy),
            "distributed" => Ok(PrizeShape::Distributed),
            "balanced" => Ok(PrizeShape::Balanced),
            other => Err(ParseShapeError(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("unrecognized prize shape '{0}'")]
pub struct ParseShapeError(String);

/// The ranks a prize row covers: a single rank or an inclusive range.
///
/// String encoding is "5" for an exact rank and "4-10" for a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankSpan {
    Exact(u32),
    Range(u32, u32),
}

impl RankSpan {
    pub fn contains(&self, rank: u32) -> bool {
        match *self {
            RankSpan::Exact(r) => r == rank,
            RankSpan::Range(start, end) => start <= rank && rank <= end,
        }
    }

    pub fn start(&self) -> u32 {
        match *self {
            RankSpan::Exact(r) => r,
            RankSpan::Range(start, _) => start,
        }
    }

    pub fn end(&self) -> u32 {
        match *self {
            RankSpan::Exact(r) => r,
            RankSpan::Range(_, end) => end,
        }
    }

    /// Number of ranks covered.
    pub fn count(&self) -> u64 {
        (self.end() - self.start()) as u64 + 1
    }
}

impl fmt::Display for RankSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RankSpan::Exact(r) => write!(f, "{r}"),
            RankSpan::Range(start, end) => write!(f, "{start}-{end}"),
        }
    }
}

impl FromStr for RankSpan {
    type Err = ParseRankSpanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ParseRankSpanError(s.to_string());
        match s.split_once('-') {
            Some((start, end)) => {
                let start = start.trim().parse().map_err(|_| bad())?;
                let end = end.trim().parse().map_err(|_| bad())?;
                if start == 0 || end < start {
                    return Err(bad());
                }
                Ok(RankSpan::Range(start, end))
            }
            None => {
                let rank = s.trim().parse().map_err(|_| bad())?;
                if rank == 0 {
                    return Err(bad());
                }
                Ok(RankSpan::Exact(rank))
            }
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid rank span '{0}'")]
pub struct ParseRankSpanError(String);

/// One row of a contest's prize table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrizeRow {
    pub span: RankSpan,
    /// Prize paid to each rank the span covers.
    pub amount: Amount,
    /// Rounded share of the pool, display only.
    pub percentage: u32,
}

/// A contest: one prize pool tied to one match.
#[derive(Debug, Clone)]
pub struct Contest {
    pub id: ContestId,
    pub match_id: MatchId,
    pub name: String,
    pub entry_fee: Amount,
    pub total_prize: Amount,
    pub status: ContestStatus,
    /// Generated once, before any entry joins; immutable thereafter.
    pub prize_table: Vec<PrizeRow>,
}

/// A user-selected set of real players with one captain and one vice-captain.
#[derive(Debug, Clone)]
pub struct FantasyTeam {
    pub players: Vec<PlayerId>,
    pub captain: PlayerId,
    pub vice_captain: PlayerId,
}

/// One user's team entry into one contest.
///
/// `rank`, `points` and `win_amount` stay unset until the finalization
/// pipeline assigns them. `win_amount` set and positive must imply a
/// completed payout transaction exists for this entry; the reconciliation
/// sweep exists to enforce that.
#[derive(Debug, Clone)]
pub struct ContestEntry {
    pub id: EntryId,
    pub user: UserId,
    pub contest: ContestId,
    pub team: FantasyTeam,
    pub rank: Option<u32>,
    pub points: Option<Points>,
    pub win_amount: Option<Amount>,
}

impl ContestEntry {
    pub fn new(id: EntryId, user: UserId, contest: ContestId, team: FantasyTeam) -> Self {
        Self {
            id,
            user,
            contest,
            team,
            rank: None,
            points: None,
            win_amount: None,
        }
    }

    pub fn is_paid_winner(&self) -> bool {
        self.win_amount.is_some_and(Amount::is_positive)
    }
}

/// Per-player performance in one match, from the external statistics feed.
///
/// Absence of a row for a (match, player) pair means the player did not
/// feature, which is a valid zero-point state rather than an error.
#[derive(Debug, Clone, Copy)]
pub struct PlayerStatistic {
    pub match_id: MatchId,
    pub player: PlayerId,
    pub runs: u32,
    pub wickets: u32,
    pub catches: u32,
    /// Fantasy points already computed by the feed.
    pub points: f64,
}

/// Kind of wallet-affecting ledger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxType {
    ContestWin,
    /// Manual operator correction.
    Adjustment,
}

/// Status of a ledger entry. `Completed` is terminal for payouts;
/// `Reversed` is reachable only through operator tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Completed,
    Reversed,
}

/// Structured payout metadata; the (user, entry) pair under `TxType::ContestWin`
/// is the canonical de-duplication key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxMeta {
    pub contest: ContestId,
    pub entry: EntryId,
}

/// Immutable record of a wallet-affecting event.
#[derive(Debug, Clone)]
pub struct TxRecord {
    pub id: TxId,
    pub user: UserId,
    pub amount: Amount,
    pub tx_type: TxType,
    pub status: TxStatus,
    /// Human-readable description, display only. Never used for matching.
    pub reference: String,
    pub created_at: SystemTime,
    pub meta: Option<TxMeta>,
}

/// Everything the store needs to commit one payout atomically.
#[derive(Debug, Clone)]
pub struct PayoutDraft {
    pub user: UserId,
    pub contest: ContestId,
    pub entry: EntryId,
    pub amount: Amount,
    pub reference: String,
}

/// Replay state of a dead-lettered payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailedPayoutStatus {
    #[default]
    Pending,
    Replayed,
}

/// Durable record of a payout that exhausted its retries.
#[derive(Debug, Clone)]
pub struct FailedPayout {
    /// Unique per entry and capture time.
    pub key: String,
    pub user: UserId,
    pub contest: ContestId,
    pub entry: EntryId,
    pub rank: u32,
    pub amount: Amount,
    pub error: String,
    pub created_at: SystemTime,
    pub status: FailedPayoutStatus,
}

impl FailedPayout {
    pub fn new(
        user: UserId,
        contest: ContestId,
        entry: EntryId,
        rank: u32,
        amount: Amount,
        error: String,
    ) -> Self {
        let created_at = SystemTime::now();
        let stamp = created_at
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        Self {
            key: format!("failed_payout:{entry}:{stamp}"),
            user,
            contest,
            entry,
            rank,
            amount,
            error,
            created_at,
            status: FailedPayoutStatus::Pending,
        }
    }
}
