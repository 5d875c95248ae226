use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::finalize::FinalizeSummary;
use crate::model::{ContestEntry, FantasyTeam, PlayerId, PlayerStatistic};
use crate::payout::PayoutOutcome;

/// Errors that can occur when parsing csv rows
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: invalid player list '{value}'")]
    BadPlayerList { line: usize, value: String },
}

#[derive(Debug, Deserialize)]
struct EntryRow {
    entry: u32,
    user: u32,
    contest: u32,
    /// `;`-separated player ids
    players: String,
    captain: u32,
    vice: u32,
}

#[derive(Debug, Deserialize)]
struct StatRow {
    #[serde(rename = "match")]
    match_id: u32,
    player: u32,
    runs: u32,
    wickets: u32,
    catches: u32,
    points: f64,
}

#[derive(Debug, Serialize)]
struct SummaryRow {
    entry: u32,
    user: u32,
    rank: u32,
    points: String,
    amount: String,
    outcome: &'static str,
}

fn outcome_label(outcome: PayoutOutcome) -> &'static str {
    match outcome {
        PayoutOutcome::Paid => "paid",
        PayoutOutcome::AlreadyPaid => "already_paid",
        PayoutOutcome::DeadLettered => "dead_lettered",
    }
}

/// Read contest entries from a csv file
pub fn read_entries(
    path: impl AsRef<Path>,
) -> impl Iterator<Item = Result<ContestEntry, CsvError>> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .expect("failed to open csv file");

    reader
        .into_deserialize::<EntryRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            let players = row
                .players
                .split(';')
                .map(|p| p.trim().parse::<PlayerId>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| CsvError::BadPlayerList {
                    line,
                    value: row.players.clone(),
                })?;
            Ok(ContestEntry::new(
                row.entry,
                row.user,
                row.contest,
                FantasyTeam {
                    players,
                    captain: row.captain,
                    vice_captain: row.vice,
                },
            ))
        })
}

/// Read per-player match statistics from a csv file
pub fn read_stats(
    path: impl AsRef<Path>,
) -> impl Iterator<Item = Result<PlayerStatistic, CsvError>> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .expect("failed to open csv file");

    reader
        .into_deserialize::<StatRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2;
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            Ok(PlayerStatistic {
                match_id: row.match_id,
                player: row.player,
                runs: row.runs,
                wickets: row.wickets,
                catches: row.catches,
                points: row.points,
            })
        })
}

/// write the finalize summary's winners to stdout in csv format
pub fn write_summary(summary: &FinalizeSummary) {
    let stdout = io::stdout();
    let mut writer = csv::Writer::from_writer(stdout.lock());

    for w in &summary.winners {
        let row = SummaryRow {
            entry: w.entry,
            user: w.user,
            rank: w.rank,
            points: w.points.to_string(),
            amount: w.amount.to_string(),
            outcome: outcome_label(w.outcome),
        };
        writer.serialize(&row).expect("failed to write csv row");
    }

    writer.flush().expect("failed to flush csv writer");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn read_entry_with_team() {
        let file = write_csv(
            "entry,user,contest,players,captain,vice\n1,100,1,10;11;12,10,11\n",
        );
        let results: Vec<_> = read_entries(file.path()).collect();
        assert_eq!(results.len(), 1);

        let entry = results.into_iter().next().unwrap().unwrap();
        assert_eq!(entry.id, 1);
        assert_eq!(entry.user, 100);
        assert_eq!(entry.contest, 1);
        assert_eq!(entry.team.players, vec![10, 11, 12]);
        assert_eq!(entry.team.captain, 10);
        assert_eq!(entry.team.vice_captain, 11);
        assert_eq!(entry.win_amount, None);
    }

    #[test]
    fn read_entry_with_whitespace() {
        let file = write_csv(
            "entry, user, contest, players, captain, vice\n1, 100, 1, 10; 11, 10, 11\n",
        );
        let results: Vec<_> = read_entries(file.path()).collect();
        assert_eq!(results.len(), 1);
        let entry = results.into_iter().next().unwrap().unwrap();
        assert_eq!(entry.team.players, vec![10, 11]);
    }

    #[test]
    fn read_entry_rejects_bad_player_list() {
        let file = write_csv("entry,user,contest,players,captain,vice\n1,100,1,10;abc,10,11\n");
        let results: Vec<_> = read_entries(file.path()).collect();
        let err = results[0].as_ref().unwrap_err();
        assert!(matches!(err, CsvError::BadPlayerList { line: 2, .. }));
    }

    #[test]
    fn read_entry_rejects_malformed_row() {
        let file = write_csv("entry,user,contest,players,captain,vice\nnope,100,1,10,10,10\n");
        let results: Vec<_> = read_entries(file.path()).collect();
        let err = results[0].as_ref().unwrap_err();
        assert!(matches!(err, CsvError::Parse { line: 2, .. }));
    }

    #[test]
    fn read_stat_row() {
        let file = write_csv("match,player,runs,wickets,catches,points\n1,10,50,2,1,78.5\n");
        let results: Vec<_> = read_stats(file.path()).collect();
        assert_eq!(results.len(), 1);

        let stat = results.into_iter().next().unwrap().unwrap();
        assert_eq!(stat.match_id, 1);
        assert_eq!(stat.player, 10);
        assert_eq!(stat.runs, 50);
        assert_eq!(stat.wickets, 2);
        assert_eq!(stat.catches, 1);
        assert_eq!(stat.points, 78.5);
    }

    #[test]
    fn read_stat_rejects_bad_points() {
        let file = write_csv("match,player,runs,wickets,catches,points\n1,10,50,2,1,high\n");
        let results: Vec<_> = read_stats(file.path()).collect();
        let err = results[0].as_ref().unwrap_err();
        assert!(matches!(err, CsvError::Parse { line: 2, .. }));
    }
}
