//! Ranking engine: orders scored entries and assigns dense sequential ranks.

use crate::model::EntryId;
use crate::points::Points;

/// One entry's position after ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankedEntry {
    pub id: EntryId,
    pub rank: u32,
    pub points: Points,
}

/// Sort entries by points descending and assign ranks 1..N in order.
///
/// Ties break deterministically by ascending entry id, so re-ranking the
/// same inputs always produces the same assignment regardless of input
/// order.
pub fn rank_entries(entries: &[(EntryId, Points)]) -> Vec<RankedEntry> {
    let mut sorted: Vec<(EntryId, Points)> = entries.to_vec();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    sorted
        .into_iter()
        .enumerate()
        .map(|(i, (id, points))| RankedEntry {
            id,
            rank: i as u32 + 1,
            points,
        })
        .collect()
}
