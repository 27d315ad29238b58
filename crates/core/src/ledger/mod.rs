//! Persistent job ledger.
//!
//! One JSON document per run holding the settings snapshot, the ordered job
//! list and run-wide stats. An existing ledger is authoritative: resuming a
//! run reuses its settings and jobs instead of re-enumerating.

mod error;
mod store;
mod types;

pub use error::LedgerError;
pub use store::JobLedger;
pub use types::{Ledger, LedgerStats};
