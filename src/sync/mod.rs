// Sync module - OFFLINE RECONCILIATION
// Resolves transactions recorded on disconnected devices against the ledger:
// validate, detect double spends, commit all-or-nothing.

mod outcome;
mod reconciler;
mod submission;

pub use outcome::*;
pub use reconciler::*;
pub use submission::*;
