use std::env;

use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use payout_eng::csv::{read_entries, read_stats, write_summary};
use payout_eng::model::{Contest, ContestStatus, PrizeShape};
use payout_eng::payout::PayoutConfig;
use payout_eng::prize::{PrizeParams, generate_prize_table};
use payout_eng::reconcile::find_gaps;
use payout_eng::store::MemStore;
use payout_eng::{Amount, finalize_contest};

const USAGE: &str = "usage: payout-eng <entries.csv> <stats.csv> \
                     <total_prize> <winner_count> <first_prize> <entry_fee> [shape]";

const CONTEST_ID: u32 = 1;
const MATCH_ID: u32 = 1;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 6 {
        eprintln!("{USAGE}");
        std::process::exit(2);
    }

    let entries_path = &args[0];
    let stats_path = &args[1];
    let params = PrizeParams {
        total_prize: Amount::from_float(args[2].parse().expect("invalid total prize")),
        winner_count: args[3].parse().expect("invalid winner count"),
        first_prize: Amount::from_float(args[4].parse().expect("invalid first prize")),
        entry_fee: Amount::from_float(args[5].parse().expect("invalid entry fee")),
        shape: match args.get(6) {
            Some(shape) => shape.parse::<PrizeShape>().expect("invalid prize shape"),
            None => PrizeShape::default(),
        },
    };

    let prize_table = match generate_prize_table(&params) {
        Ok(table) => table,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let store = MemStore::new();
    store.insert_contest(Contest {
        id: CONTEST_ID,
        match_id: MATCH_ID,
        name: format!("Contest {CONTEST_ID}"),
        entry_fee: params.entry_fee,
        total_prize: params.total_prize,
        status: ContestStatus::Completed,
        prize_table,
    });

    for result in read_stats(stats_path) {
        match result {
            Ok(stat) => store.insert_stat(stat),
            Err(e) => warn!("{e}"),
        }
    }
    for result in read_entries(entries_path) {
        match result {
            Ok(entry) => store.insert_entry(entry),
            Err(e) => warn!("{e}"),
        }
    }

    let summary = match finalize_contest(&store, CONTEST_ID, &PayoutConfig::default()).await {
        Ok(summary) => summary,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    write_summary(&summary);

    // integrity check: every winner must have its transaction by now
    match find_gaps(&store) {
        Ok(gaps) if !gaps.is_empty() => {
            warn!(gaps = gaps.len(), "unpaid winners remain after finalization");
        }
        Ok(_) => {}
        Err(e) => warn!("{e}"),
    }
}
