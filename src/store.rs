//! Persistence seam for contests, entries, wallets, the ledger and the
//! dead-letter log.
//!
//! The [`Store`] trait is the boundary the payout processor and the
//! reconciliation sweep are written against; [`MemStore`] is the in-memory
//! implementation. The crucial contract is [`Store::commit_payout`]: the
//! duplicate check, wallet increment, ledger insert and entry backfill are
//! one atomic unit under a single lock, with (user, entry) under
//! `TxType::ContestWin` as the uniqueness key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use thiserror::Error;

use crate::Amount;
use crate::model::{
    Contest, ContestEntry, ContestId, EntryId, FailedPayout, FailedPayoutStatus, MatchId,
    PayoutDraft, PlayerId, PlayerStatistic, TxId, TxMeta, TxRecord, TxStatus, TxType, UserId,
};
use crate::points::{Points, StatsSource};

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("contest {0} not found")]
    ContestNotFound(ContestId),

    #[error("entry {0} not found")]
    EntryNotFound(EntryId),

    #[error("transaction {0} not found")]
    TxNotFound(TxId),

    /// A completed contest-win transaction already exists for this
    /// (user, entry) pair. Callers treat this as "already paid".
    #[error("payout already recorded for user {0}, entry {1}")]
    DuplicatePayout(UserId, EntryId),

    /// Transient infrastructure failure; the payout retry loop retries
    /// these.
    #[error("datastore unavailable: {0}")]
    Unavailable(String),
}

/// Storage operations the finalization and reconciliation paths need.
pub trait Store {
    fn contest(&self, id: ContestId) -> Result<Contest, StoreError>;

    fn entry(&self, id: EntryId) -> Result<ContestEntry, StoreError>;

    /// All entries joined into one contest.
    fn contest_entries(&self, contest: ContestId) -> Result<Vec<ContestEntry>, StoreError>;

    /// Persist an entry's finalization result (rank and points).
    fn record_result(&self, entry: EntryId, rank: u32, points: Points) -> Result<(), StoreError>;

    /// Durably mark an entry as a winner before money moves. Idempotent;
    /// an existing win amount is left untouched.
    fn mark_winner(&self, entry: EntryId, amount: Amount) -> Result<(), StoreError>;

    /// The completed contest-win transaction for (user, entry), if any.
    /// This metadata lookup is the single canonical de-duplication check.
    fn find_payout(&self, user: UserId, entry: EntryId) -> Result<Option<TxRecord>, StoreError>;

    /// Atomically: verify no completed contest-win exists for the draft's
    /// (user, entry), credit the wallet, append the ledger record, and set
    /// the entry's win amount if still unset.
    fn commit_payout(&self, draft: &PayoutDraft) -> Result<TxRecord, StoreError>;

    fn balance(&self, user: UserId) -> Result<Amount, StoreError>;

    /// Entries with a positive win amount, across all contests: the
    /// "should have been paid" set.
    fn winning_entries(&self) -> Result<Vec<ContestEntry>, StoreError>;

    /// All completed contest-win transactions.
    fn payouts(&self) -> Result<Vec<TxRecord>, StoreError>;

    fn push_dead_letter(&self, record: FailedPayout) -> Result<(), StoreError>;

    fn pending_dead_letters(&self) -> Result<Vec<FailedPayout>, StoreError>;

    fn mark_replayed(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
struct Inner {
    contests: HashMap<ContestId, Contest>,
    entries: HashMap<EntryId, ContestEntry>,
    wallets: HashMap<UserId, Amount>,
    ledger: Vec<TxRecord>,
    dead_letters: Vec<FailedPayout>,
    stats: HashMap<(MatchId, PlayerId), PlayerStatistic>,
    next_tx_id: TxId,
}

impl Inner {
    fn completed_payout(&self, user: UserId, entry: EntryId) -> Option<&TxRecord> {
        self.ledger.iter().find(|t| {
            t.user == user
                && t.tx_type == TxType::ContestWin
                && t.status == TxStatus::Completed
                && t.meta.is_some_and(|m| m.entry == entry)
        })
    }
}

/// In-memory store. Clones share state, so handles can be passed to the
/// sweep's worker tasks cheaply.
#[derive(Clone, Default)]
pub struct MemStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_contest(&self, contest: Contest) {
        self.lock().contests.insert(contest.id, contest);
    }

    pub fn insert_entry(&self, entry: ContestEntry) {
        self.lock().entries.insert(entry.id, entry);
    }

    pub fn insert_stat(&self, stat: PlayerStatistic) {
        self.lock().stats.insert((stat.match_id, stat.player), stat);
    }

    /// Full ledger, operator/read-model use.
    pub fn ledger(&self) -> Vec<TxRecord> {
        self.lock().ledger.clone()
    }

    pub fn dead_letters(&self) -> Vec<FailedPayout> {
        self.lock().dead_letters.clone()
    }

    /// Operator tooling: reverse a completed payout and claw the funds
    /// back from the wallet. The only sanctioned ledger mutation.
    pub fn reverse_payout(&self, tx: TxId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let record = inner
            .ledger
            .iter_mut()
            .find(|t| t.id == tx)
            .ok_or(StoreError::TxNotFound(tx))?;
        record.status = TxStatus::Reversed;
        let (user, amount) = (record.user, record.amount);
        *inner.wallets.entry(user).or_default() -= amount;
        Ok(())
    }
}

impl Store for MemStore {
    fn contest(&self, id: ContestId) -> Result<Contest, StoreError> {
        self.lock()
            .contests
            .get(&id)
            .cloned()
            .ok_or(StoreError::ContestNotFound(id))
    }

    fn entry(&self, id: EntryId) -> Result<ContestEntry, StoreError> {
        self.lock()
            .entries
            .get(&id)
            .cloned()
            .ok_or(StoreError::EntryNotFound(id))
    }

    fn contest_entries(&self, contest: ContestId) -> Result<Vec<ContestEntry>, StoreError> {
        let mut entries: Vec<ContestEntry> = self
            .lock()
            .entries
            .values()
            .filter(|e| e.contest == contest)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.id);
        Ok(entries)
    }

    fn record_result(&self, entry: EntryId, rank: u32, points: Points) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let e = inner
            .entries
            .get_mut(&entry)
            .ok_or(StoreError::EntryNotFound(entry))?;
        e.rank = Some(rank);
        e.points = Some(points);
        Ok(())
    }

    fn mark_winner(&self, entry: EntryId, amount: Amount) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let e = inner
            .entries
            .get_mut(&entry)
            .ok_or(StoreError::EntryNotFound(entry))?;
        if e.win_amount.is_none() {
            e.win_amount = Some(amount);
        }
        Ok(())
    }

    fn find_payout(&self, user: UserId, entry: EntryId) -> Result<Option<TxRecord>, StoreError> {
        Ok(self.lock().completed_payout(user, entry).cloned())
    }

    fn commit_payout(&self, draft: &PayoutDraft) -> Result<TxRecord, StoreError> {
        let mut inner = self.lock();

        if inner.completed_payout(draft.user, draft.entry).is_some() {
            return Err(StoreError::DuplicatePayout(draft.user, draft.entry));
        }

        inner.next_tx_id += 1;
        let record = TxRecord {
            id: inner.next_tx_id,
            user: draft.user,
            amount: draft.amount,
            tx_type: TxType::ContestWin,
            status: TxStatus::Completed,
            reference: draft.reference.clone(),
            created_at: SystemTime::now(),
            meta: Some(TxMeta {
                contest: draft.contest,
                entry: draft.entry,
            }),
        };

        *inner.wallets.entry(draft.user).or_default() += draft.amount;
        inner.ledger.push(record.clone());
        if let Some(e) = inner.entries.get_mut(&draft.entry) {
            if e.win_amount.is_none() {
                e.win_amount = Some(draft.amount);
            }
        }
        Ok(record)
    }

    fn balance(&self, user: UserId) -> Result<Amount, StoreError> {
        Ok(self.lock().wallets.get(&user).copied().unwrap_or_default())
    }

    fn winning_entries(&self) -> Result<Vec<ContestEntry>, StoreError> {
        let mut entries: Vec<ContestEntry> = self
            .lock()
            .entries
            .values()
            .filter(|e| e.is_paid_winner())
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.id);
        Ok(entries)
    }

    fn payouts(&self) -> Result<Vec<TxRecord>, StoreError> {
        Ok(self
            .lock()
            .ledger
            .iter()
            .filter(|t| t.tx_type == TxType::ContestWin && t.status == TxStatus::Completed)
            .cloned()
            .collect())
    }

    fn push_dead_letter(&self, record: FailedPayout) -> Result<(), StoreError> {
        self.lock().dead_letters.push(record);
        Ok(())
    }

    fn pending_dead_letters(&self) -> Result<Vec<FailedPayout>, StoreError> {
        Ok(self
            .lock()
            .dead_letters
            .iter()
            .filter(|d| d.status == FailedPayoutStatus::Pending)
            .cloned()
            .collect())
    }

    fn mark_replayed(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        for d in inner.dead_letters.iter_mut() {
            if d.key == key {
                d.status = FailedPayoutStatus::Replayed;
            }
        }
        Ok(())
    }
}

impl StatsSource for MemStore {
    fn player_points(&self, match_id: MatchId, player: PlayerId) -> Option<f64> {
        self.lock().stats.get(&(match_id, player)).map(|s| s.points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FantasyTeam;

    fn team() -> FantasyTeam {
        FantasyTeam {
            players: vec![1, 2, 3],
            captain: 1,
            vice_captain: 2,
        }
    }

    fn draft(user: UserId, entry: EntryId, amount: f64) -> PayoutDraft {
        PayoutDraft {
            user,
            contest: 1,
            entry,
            amount: Amount::from_float(amount),
            reference: "Contest Win: Test - Rank 1".to_string(),
        }
    }

    fn store_with_entry(entry: EntryId, user: UserId) -> MemStore {
        let store = MemStore::new();
        store.insert_entry(ContestEntry::new(entry, user, 1, team()));
        store
    }

    #[test]
    fn commit_payout_credits_wallet_and_appends_ledger() {
        let store = store_with_entry(10, 7);
        let record = store.commit_payout(&draft(7, 10, 50.0)).unwrap();

        assert_eq!(record.status, TxStatus::Completed);
        assert_eq!(record.meta.unwrap().entry, 10);
        assert_eq!(store.balance(7).unwrap(), Amount::from_float(50.0));
        assert_eq!(store.payouts().unwrap().len(), 1);
        // entry backfilled in the same unit
        assert_eq!(
            store.entry(10).unwrap().win_amount,
            Some(Amount::from_float(50.0))
        );
    }

    #[test]
    fn commit_payout_rejects_duplicates() {
        let store = store_with_entry(10, 7);
        store.commit_payout(&draft(7, 10, 50.0)).unwrap();

        let result = store.commit_payout(&draft(7, 10, 50.0));
        assert!(matches!(result, Err(StoreError::DuplicatePayout(7, 10))));

        // neither wallet nor ledger changed
        assert_eq!(store.balance(7).unwrap(), Amount::from_float(50.0));
        assert_eq!(store.payouts().unwrap().len(), 1);
    }

    #[test]
    fn duplicate_key_is_per_entry_not_per_user() {
        let store = store_with_entry(10, 7);
        store.insert_entry(ContestEntry::new(11, 7, 2, team()));

        store.commit_payout(&draft(7, 10, 50.0)).unwrap();
        store.commit_payout(&draft(7, 11, 25.0)).unwrap();

        assert_eq!(store.balance(7).unwrap(), Amount::from_float(75.0));
        assert_eq!(store.payouts().unwrap().len(), 2);
    }

    #[test]
    fn mark_winner_is_idempotent() {
        let store = store_with_entry(10, 7);
        store.mark_winner(10, Amount::from_float(50.0)).unwrap();
        store.mark_winner(10, Amount::from_float(99.0)).unwrap();

        assert_eq!(
            store.entry(10).unwrap().win_amount,
            Some(Amount::from_float(50.0))
        );
    }

    #[test]
    fn reverse_payout_debits_wallet_and_reopens_the_key() {
        let store = store_with_entry(10, 7);
        let record = store.commit_payout(&draft(7, 10, 50.0)).unwrap();

        store.reverse_payout(record.id).unwrap();
        assert_eq!(store.balance(7).unwrap(), Amount::ZERO);
        assert!(store.find_payout(7, 10).unwrap().is_none());

        // a reversed payout no longer blocks a re-pay
        store.commit_payout(&draft(7, 10, 50.0)).unwrap();
        assert_eq!(store.balance(7).unwrap(), Amount::from_float(50.0));
    }

    #[test]
    fn winning_entries_filters_on_positive_win_amount() {
        let store = store_with_entry(10, 7);
        store.insert_entry(ContestEntry::new(11, 8, 1, team()));
        store.mark_winner(10, Amount::from_float(50.0)).unwrap();

        let winners = store.winning_entries().unwrap();
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].id, 10);
    }

    #[test]
    fn dead_letter_lifecycle() {
        let store = MemStore::new();
        let fp = FailedPayout::new(7, 1, 10, 2, Amount::from_float(5.0), "io".into());
        let key = fp.key.clone();
        store.push_dead_letter(fp).unwrap();

        assert_eq!(store.pending_dead_letters().unwrap().len(), 1);
        store.mark_replayed(&key).unwrap();
        assert!(store.pending_dead_letters().unwrap().is_empty());
        // record survives with replayed status rather than being deleted
        assert_eq!(store.dead_letters().len(), 1);
        assert_eq!(store.dead_letters()[0].status, FailedPayoutStatus::Replayed);
    }

    #[test]
    fn stats_source_absent_player_is_none() {
        let store = MemStore::new();
        store.insert_stat(PlayerStatistic {
            match_id: 1,
            player: 3,
            runs: 40,
            wickets: 0,
            catches: 1,
            points: 44.0,
        });

        assert_eq!(store.player_points(1, 3), Some(44.0));
        assert_eq!(store.player_points(1, 4), None);
        assert_eq!(store.player_points(2, 3), None);
    }
}
