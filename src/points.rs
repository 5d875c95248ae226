//! Fantasy scoring: per-player statistics rolled up into an entry total.

use std::fmt;

use crate::model::{FantasyTeam, MatchId, PlayerId};

/// Captain's score multiplier.
pub const CAPTAIN_MULTIPLIER: f64 = 2.0;

/// Vice-captain's score multiplier.
pub const VICE_CAPTAIN_MULTIPLIER: f64 = 1.5;

/// Fantasy points with one decimal place, stored as a scaled integer.
///
/// Player-level points arrive as floats from the statistics feed; the entry
/// total is rounded to one decimal exactly once, at the entry level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Points(i64);

impl Points {
    const SCALE: i64 = 10;

    pub const ZERO: Points = Points(0);

    pub fn from_float(value: f64) -> Self {
        Points((value * Self::SCALE as f64).round() as i64)
    }

    pub const fn from_scaled(value: i64) -> Self {
        Points(value)
    }

    pub const fn as_scaled(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Points {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{sign}{}.{}", abs / Self::SCALE, abs % Self::SCALE)
    }
}

/// Source of per-player match statistics (external collaborator).
pub trait StatsSource {
    /// Fantasy points scored by `player` in `match_id`.
    ///
    /// `None` means the player did not feature in the match, which scores
    /// zero rather than being an error.
    fn player_points(&self, match_id: MatchId, player: PlayerId) -> Option<f64>;
}

/// Total fantasy score for one entry's team in one match.
///
/// Captain scores double, vice-captain 1.5x, everyone else face value.
/// The sum is rounded to one decimal place at the entry level only.
pub fn compute_entry_points(
    team: &FantasyTeam,
    match_id: MatchId,
    stats: &impl StatsSource,
) -> Points {
    let mut total = 0.0;
    for &player in &team.players {
        let base = stats.player_points(match_id, player).unwrap_or(0.0);
        let multiplier = if player == team.captain {
            CAPTAIN_MULTIPLIER
        } else if player == team.vice_captain {
            VICE_CAPTAIN_MULTIPLIER
        } else {
            1.0
        };
        total += base * multiplier;
    }
    Points::from_float(total)
}
