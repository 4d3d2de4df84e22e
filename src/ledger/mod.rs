// Ledger module - THE RECORD OF TRUTH
// Persistence collaborator for token and transaction records. Conditional
// (compare-and-swap) updates are the only way status changes.

mod error;
mod memory;
mod traits;
mod transaction;

pub use error::{LedgerError, LedgerResult};
pub use memory::MemoryLedger;
pub use traits::{BulkUpdate, TokenLedger};
pub(crate) use traits::{check_transaction_transition, check_transition};
pub use transaction::{
    Transaction, TransactionId, TransactionSource, TransactionStatus, TransactionType,
};
