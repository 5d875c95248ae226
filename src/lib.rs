pub mod amount;
pub mod csv;
pub mod finalize;
pub mod model;
pub mod payout;
pub mod points;
pub mod prize;
pub mod rank;
pub mod reconcile;
pub mod store;

pub use amount::Amount;
pub use finalize::{FinalizeSummary, finalize_contest};
pub use payout::{PayoutConfig, PayoutOutcome};
pub use points::Points;
pub use reconcile::{ReconcileScheduler, SweepMode, run_sweep};
pub use store::{MemStore, Store};
