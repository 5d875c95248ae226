//! Prize table generation and rank-to-prize matching.
//!
//! Generation is a pure function of the contest's prize parameters. Amounts
//! are split with truncating arithmetic so the table never pays out more
//! than the pool in aggregate; display percentages absorb rounding drift
//! into rank 1.

use thiserror::Error;

use crate::Amount;
use crate::model::{PrizeRow, PrizeShape, RankSpan};

/// Hard cap on winner count for a single contest.
pub const MAX_WINNER_COUNT: u32 = 100_000;

/// Per-winner floor for ranged rows.
pub const MIN_PRIZE_AMOUNT: Amount = Amount::from_scaled(10_000); // 1.0000

/// Inputs to prize table generation.
#[derive(Debug, Clone)]
pub struct PrizeParams {
    pub total_prize: Amount,
    pub winner_count: u32,
    pub first_prize: Amount,
    pub entry_fee: Amount,
    pub shape: PrizeShape,
}

/// Validation failures; generation has no side effects so these are the
/// only way it can go wrong.
#[derive(Debug, Error)]
pub enum PrizeError {
    #[error("total prize must be positive, got {0}")]
    InvalidTotalPrize(Amount),

    #[error("winner count must be in 1..={MAX_WINNER_COUNT}, got {0}")]
    InvalidWinnerCount(u32),

    #[error("first prize must be positive, got {0}")]
    InvalidFirstPrize(Amount),

    #[error("first prize {0} exceeds total prize {1}")]
    FirstPrizeExceedsTotal(Amount, Amount),

    #[error("pool {total} cannot cover {winners} winners at the {floor} per-winner floor")]
    PoolBelowFloor {
        winners: u32,
        floor: Amount,
        total: Amount,
    },
}

/// Generate the ranked prize table for a contest.
pub fn generate_prize_table(params: &PrizeParams) -> Result<Vec<PrizeRow>, PrizeError> {
    validate(params)?;

    let mut rows = match params.winner_count {
        1 => vec![row(RankSpan::Exact(1), params.total_prize)],
        2 | 3 => small_table(params),
        4..=99 => medium_table(params),
        _ => mega_table(params),
    };

    enforce_pool_bounds(&mut rows, params.total_prize);
    assign_percentages(&mut rows, params.total_prize);
    Ok(rows)
}

/// Find the prize row covering `rank`: exact rows first, then ranges.
///
/// `None` means the rank wins nothing, which is the normal case for most
/// of the field.
pub fn match_prize(rank: u32, table: &[PrizeRow]) -> Option<&PrizeRow> {
    table
        .iter()
        .find(|r| matches!(r.span, RankSpan::Exact(_)) && r.span.contains(rank))
        .or_else(|| {
            table
                .iter()
                .find(|r| matches!(r.span, RankSpan::Range(..)) && r.span.contains(rank))
        })
}

fn validate(params: &PrizeParams) -> Result<(), PrizeError> {
    if !params.total_prize.is_positive() {
        return Err(PrizeError::InvalidTotalPrize(params.total_prize));
    }
    if params.winner_count == 0 || params.winner_count > MAX_WINNER_COUNT {
        return Err(PrizeError::InvalidWinnerCount(params.winner_count));
    }
    if !params.first_prize.is_positive() {
        return Err(PrizeError::InvalidFirstPrize(params.first_prize));
    }
    if params.first_prize > params.total_prize {
        return Err(PrizeError::FirstPrizeExceedsTotal(
            params.first_prize,
            params.total_prize,
        ));
    }
    if params.winner_count >= 4
        && MIN_PRIZE_AMOUNT * params.winner_count as u64 > params.total_prize
    {
        return Err(PrizeError::PoolBelowFloor {
            winners: params.winner_count,
            floor: MIN_PRIZE_AMOUNT,
            total: params.total_prize,
        });
    }
    Ok(())
}

fn row(span: RankSpan, amount: Amount) -> PrizeRow {
    PrizeRow {
        span,
        amount,
        percentage: 0, // assigned in a final pass
    }
}

fn span(start: u32, end: u32) -> RankSpan {
    if start == end {
        RankSpan::Exact(start)
    } else {
        RankSpan::Range(start, end)
    }
}

/// 2-3 winners: first prize to rank 1, the remainder 100% to rank 2 or
/// split 60/40 between ranks 2 and 3.
fn small_table(params: &PrizeParams) -> Vec<PrizeRow> {
    let rest = params.total_prize - params.first_prize;
    let mut rows = vec![row(RankSpan::Exact(1), params.first_prize)];
    if params.winner_count == 2 {
        rows.push(row(RankSpan::Exact(2), rest));
    } else {
        let second = rest.ratio(60, 100);
        rows.push(row(RankSpan::Exact(2), second));
        rows.push(row(RankSpan::Exact(3), rest - second));
    }
    rows
}

/// Shape weight split (top/middle/bottom, percent of the post-first-prize
/// remainder) for medium contests.
fn medium_weights(shape: PrizeShape) -> (u64, u64, u64) {
    match shape {
        PrizeShape::TopHeavy => (80, 15, 5),
        PrizeShape::Distributed => (50, 30, 20),
        PrizeShape::Balanced => (70, 20, 10),
    }
}

/// 4-99 winners: three weighted tiers after rank 1.
///
/// Top tier (ranks 2..=min(5, 20% of winners)) decays linearly per rank,
/// the middle (~50% of winners) is a flat ranged row, the remainder
/// collapses into one ranged row floored at [`MIN_PRIZE_AMOUNT`] per
/// winner.
fn medium_table(params: &PrizeParams) -> Vec<PrizeRow> {
    let winners = params.winner_count;
    let rest = params.total_prize - params.first_prize;
    let (top_w, mid_w, bot_w) = medium_weights(params.shape);

    let top_end = (winners / 5).clamp(2, 5);
    let mid_end = (top_end + winners / 2).min(winners);

    let top_amount = rest.ratio(top_w, 100);
    let mid_amount = rest.ratio(mid_w, 100);
    let bot_amount = rest.ratio(bot_w, 100);

    let mut rows = vec![row(RankSpan::Exact(1), params.first_prize)];
    rows.extend(linear_rows(2, top_end, top_amount));

    let mid_span = span(top_end + 1, mid_end);
    if mid_end == winners {
        // no bottom tier; its share folds into the middle
        rows.push(row(mid_span, (mid_amount + bot_amount).split(mid_span.count())));
    } else {
        rows.push(row(mid_span, mid_amount.split(mid_span.count())));
        let bot_span = span(mid_end + 1, winners);
        let per_winner = bot_amount.split(bot_span.count()).max(MIN_PRIZE_AMOUNT);
        rows.push(row(bot_span, per_winner));
    }
    rows
}

/// Rank bands (start, end, relative weight) for mega contests; `end` is
/// clamped to the winner count and bands past it are dropped.
fn mega_bands(shape: PrizeShape) -> [(u32, u32, u64); 6] {
    match shape {
        PrizeShape::TopHeavy => [
            (2, 10, 50),
            (11, 50, 25),
            (51, 200, 12),
            (201, 1_000, 7),
            (1_001, 10_000, 4),
            (10_001, MAX_WINNER_COUNT, 2),
        ],
        PrizeShape::Distributed => [
            (2, 10, 20),
            (11, 50, 20),
            (51, 200, 20),
            (201, 1_000, 18),
            (1_001, 10_000, 14),
            (10_001, MAX_WINNER_COUNT, 8),
        ],
        PrizeShape::Balanced => [
            (2, 10, 30),
            (11, 50, 25),
            (51, 200, 20),
            (201, 1_000, 12),
            (1_001, 10_000, 8),
            (10_001, MAX_WINNER_COUNT, 5),
        ],
    }
}

/// >=100 winners: shape-specific rank bands funded proportionally to their
/// weights. Ranks 2-10 get individually decreasing prizes; later bands are
/// ranged rows floored at [`MIN_PRIZE_AMOUNT`] per winner. The lowest band
/// is forced to the entry fee so every paid winner at least recovers it.
fn mega_table(params: &PrizeParams) -> Vec<PrizeRow> {
    let winners = params.winner_count;
    let rest = params.total_prize - params.first_prize;

    let bands: Vec<(u32, u32, u64)> = mega_bands(params.shape)
        .into_iter()
        .filter(|&(start, _, _)| start <= winners)
        .map(|(start, end, w)| (start, end.min(winners), w))
        .collect();
    let weight_sum: u64 = bands.iter().map(|&(_, _, w)| w).sum();

    let mut rows = vec![row(RankSpan::Exact(1), params.first_prize)];
    for &(start, end, weight) in &bands {
        let band_amount = rest.ratio(weight, weight_sum);
        if start == 2 {
            rows.extend(linear_rows(2, end, band_amount));
        } else {
            let band_span = span(start, end);
            let per_winner = band_amount.split(band_span.count()).max(MIN_PRIZE_AMOUNT);
            rows.push(row(band_span, per_winner));
        }
    }

    // every paid winner recovers at least the entry fee
    if params.entry_fee.is_positive() {
        if let Some(last) = rows.last_mut() {
            if matches!(last.span, RankSpan::Range(..)) {
                last.amount = params.entry_fee;
            }
        }
    }
    rows
}

/// Individual rows for ranks `start..=end` with linearly decreasing
/// weights (count, count-1, .., 1) over `tier_amount`.
fn linear_rows(start: u32, end: u32, tier_amount: Amount) -> Vec<PrizeRow> {
    let count = (end - start + 1) as u64;
    let weight_sum = count * (count + 1) / 2;
    (0..count)
        .map(|i| {
            let weight = count - i;
            row(
                RankSpan::Exact(start + i as u32),
                tier_amount.ratio(weight, weight_sum),
            )
        })
        .collect()
}

/// Keep the table inside the pool and monotonic.
///
/// Per-winner floors (and the mega entry-fee guarantee) can push the paid
/// total past the pool; the overage comes out of rank 1, which is also
/// where percentage drift is absorbed. A final clamp keeps amounts
/// non-increasing as rank worsens.
fn enforce_pool_bounds(rows: &mut [PrizeRow], total_prize: Amount) {
    let paid: Amount = rows.iter().map(|r| r.amount * r.span.count()).sum();
    if paid > total_prize {
        let over = paid - total_prize;
        rows[0].amount = (rows[0].amount - over).max(MIN_PRIZE_AMOUNT);
    }

    let mut cap = rows[0].amount;
    for r in rows.iter_mut().skip(1) {
        if r.amount > cap {
            r.amount = cap;
        }
        cap = r.amount;
    }
}

/// Rounded percentage per row; the residual against the paid total's
/// percentage goes to rank 1 only (amounts are never redistributed).
fn assign_percentages(rows: &mut [PrizeRow], total_prize: Amount) {
    for r in rows.iter_mut() {
        r.percentage = r.amount.percent_of(total_prize);
    }
    let paid: Amount = rows.iter().map(|r| r.amount * r.span.count()).sum();
    let target = paid.percent_of(total_prize) as i64;
    let assigned: i64 = rows
        .iter()
        .map(|r| r.percentage as i64 * r.span.count() as i64)
        .sum();
    let adjusted = rows[0].percentage as i64 + (target - assigned);
    rows[0].percentage = adjusted.max(0) as u32;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(total: f64, winners: u32, first: f64, fee: f64, shape: PrizeShape) -> PrizeParams {
        PrizeParams {
            total_prize: Amount::from_float(total),
            winner_count: winners,
            first_prize: Amount::from_float(first),
            entry_fee: Amount::from_float(fee),
            shape,
        }
    }

    fn paid_total(table: &[PrizeRow]) -> Amount {
        table.iter().map(|r| r.amount * r.span.count()).sum()
    }

    /// Every rank in 1..=winners covered by exactly one row, in order,
    /// with no gaps or overlaps.
    fn assert_partition(table: &[PrizeRow], winners: u32) {
        let mut next = 1;
        for r in table {
            assert_eq!(r.span.start(), next, "gap or overlap before {}", r.span);
            next = r.span.end() + 1;
        }
        assert_eq!(next, winners + 1, "table does not cover all winners");
    }

    fn assert_monotonic(table: &[PrizeRow]) {
        for pair in table.windows(2) {
            assert!(
                pair[0].amount >= pair[1].amount,
                "prize increases from {} to {}",
                pair[0].span,
                pair[1].span
            );
        }
    }

    #[test]
    fn single_winner_takes_all() {
        let table =
            generate_prize_table(&params(10_000.0, 1, 10_000.0, 0.0, PrizeShape::Balanced))
                .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].span, RankSpan::Exact(1));
        assert_eq!(table[0].amount, Amount::from_float(10_000.0));
        assert_eq!(table[0].percentage, 100);
    }

    #[test]
    fn two_winners_remainder_to_second() {
        let table =
            generate_prize_table(&params(900.0, 2, 600.0, 500.0, PrizeShape::Balanced)).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table[0].amount, Amount::from_float(600.0));
        assert_eq!(table[1].span, RankSpan::Exact(2));
        assert_eq!(table[1].amount, Amount::from_float(300.0));
        assert_eq!(paid_total(&table), Amount::from_float(900.0));
    }

    #[test]
    fn three_winners_sixty_forty_split() {
        let table =
            generate_prize_table(&params(1_000.0, 3, 500.0, 0.0, PrizeShape::Balanced)).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table[1].amount, Amount::from_float(300.0));
        assert_eq!(table[2].amount, Amount::from_float(200.0));
        assert_eq!(paid_total(&table), Amount::from_float(1_000.0));
    }

    #[test]
    fn medium_table_structure() {
        let table =
            generate_prize_table(&params(10_000.0, 10, 4_000.0, 10.0, PrizeShape::Balanced))
                .unwrap();
        // rank 1, rank 2 (top tier), 3-7 (middle), 8-10 (bottom)
        assert_partition(&table, 10);
        assert_monotonic(&table);
        assert_eq!(table[0].amount, Amount::from_float(4_000.0));
        assert_eq!(table.last().unwrap().span, RankSpan::Range(8, 10));
        assert!(table.last().unwrap().amount >= MIN_PRIZE_AMOUNT);
        assert!(paid_total(&table) <= Amount::from_float(10_000.0));
    }

    #[test]
    fn medium_without_bottom_folds_share_into_middle() {
        // 4 winners: top tier is rank 2, middle is 3-4, no remainder
        let table =
            generate_prize_table(&params(1_000.0, 4, 400.0, 10.0, PrizeShape::Balanced)).unwrap();
        assert_partition(&table, 4);
        assert_monotonic(&table);
        assert_eq!(table.last().unwrap().span, RankSpan::Range(3, 4));
    }

    #[test]
    fn mega_table_structure() {
        let table =
            generate_prize_table(&params(100_000.0, 200, 10_000.0, 100.0, PrizeShape::Balanced))
                .unwrap();
        assert_partition(&table, 200);
        assert_monotonic(&table);
        // ranks 2-10 are individual, decreasing
        assert_eq!(table[1].span, RankSpan::Exact(2));
        assert_eq!(table[9].span, RankSpan::Exact(10));
        assert!(table[1].amount > table[9].amount);
        // band clamped at the winner count
        assert_eq!(table.last().unwrap().span, RankSpan::Range(51, 200));
        assert!(paid_total(&table) <= Amount::from_float(100_000.0));
    }

    #[test]
    fn mega_lowest_row_forced_to_entry_fee() {
        let table =
            generate_prize_table(&params(100_000.0, 200, 10_000.0, 49.0, PrizeShape::Balanced))
                .unwrap();
        assert_eq!(table.last().unwrap().amount, Amount::from_float(49.0));
    }

    #[test]
    fn percentages_absorb_drift_at_rank_one() {
        let table =
            generate_prize_table(&params(900.0, 2, 600.0, 0.0, PrizeShape::Balanced)).unwrap();
        // 600/900 -> 67, 300/900 -> 33; full pool paid, so they must total 100
        let pct_sum: i64 = table
            .iter()
            .map(|r| r.percentage as i64 * r.span.count() as i64)
            .sum();
        assert_eq!(pct_sum, 100);
    }

    #[test]
    fn rejects_bad_parameters() {
        let base = params(1_000.0, 10, 100.0, 10.0, PrizeShape::Balanced);

        let mut p = base.clone();
        p.total_prize = Amount::ZERO;
        assert!(matches!(
            generate_prize_table(&p),
            Err(PrizeError::InvalidTotalPrize(_))
        ));

        let mut p = base.clone();
        p.winner_count = 0;
        assert!(matches!(
            generate_prize_table(&p),
            Err(PrizeError::InvalidWinnerCount(0))
        ));

        let mut p = base.clone();
        p.winner_count = MAX_WINNER_COUNT + 1;
        assert!(matches!(
            generate_prize_table(&p),
            Err(PrizeError::InvalidWinnerCount(_))
        ));

        let mut p = base.clone();
        p.first_prize = Amount::from_float(2_000.0);
        assert!(matches!(
            generate_prize_table(&p),
            Err(PrizeError::FirstPrizeExceedsTotal(..))
        ));

        let mut p = base.clone();
        p.first_prize = Amount::ZERO;
        assert!(matches!(
            generate_prize_table(&p),
            Err(PrizeError::InvalidFirstPrize(_))
        ));

        let mut p = base;
        p.winner_count = 999;
        p.total_prize = Amount::from_float(500.0);
        p.first_prize = Amount::from_float(100.0);
        assert!(matches!(
            generate_prize_table(&p),
            Err(PrizeError::PoolBelowFloor { .. })
        ));
    }

    #[test]
    fn partition_conservation_and_monotonicity_hold_across_shapes_and_sizes() {
        let shapes = [
            PrizeShape::TopHeavy,
            PrizeShape::Distributed,
            PrizeShape::Balanced,
        ];
        let winner_counts = [1, 2, 3, 4, 5, 7, 10, 25, 50, 99, 100, 250, 1_000, 5_000, 20_000];
        for shape in shapes {
            for winners in winner_counts {
                // pool economics as in production: fees fund the pool
                let fee = 10.0;
                let total = fee * winners as f64 * 5.0;
                let first = total * 0.15;
                let p = params(total, winners, first, fee, shape);
                let table = generate_prize_table(&p)
                    .unwrap_or_else(|e| panic!("{shape:?}/{winners}: {e}"));

                assert_partition(&table, winners);
                assert_monotonic(&table);
                assert!(
                    paid_total(&table) <= p.total_prize,
                    "{shape:?}/{winners}: table over-pays the pool"
                );
            }
        }
    }

    #[test]
    fn match_prize_prefers_exact_then_range() {
        let table = vec![
            PrizeRow {
                span: RankSpan::Exact(1),
                amount: Amount::from_float(100.0),
                percentage: 50,
            },
            PrizeRow {
                span: RankSpan::Range(2, 5),
                amount: Amount::from_float(10.0),
                percentage: 5,
            },
        ];
        assert_eq!(match_prize(1, &table).unwrap().amount, Amount::from_float(100.0));
        assert_eq!(match_prize(3, &table).unwrap().amount, Amount::from_float(10.0));
        assert_eq!(match_prize(5, &table).unwrap().amount, Amount::from_float(10.0));
        assert!(match_prize(6, &table).is_none());
    }

    #[test]
    fn unranked_prize_is_none_on_empty_table() {
        assert!(match_prize(1, &[]).is_none());
    }
}
