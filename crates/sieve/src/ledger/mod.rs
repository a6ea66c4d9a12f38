//! Append-only audit ledger.
//!
//! Every decision, per-file error, manual override and run boundary becomes
//! one `<timestamp>\t<json>` line. The ledger is never rewritten; `status`
//! reads it back with [`read_ledger`].

mod reader;
mod record;
mod writer;

pub use reader::{read_ledger, LedgerSummary};
pub use record::{LedgerEntry, LedgerEvent};
pub use writer::Ledger;
