// Settlement module - REDEMPTION
// Exchanges spent tokens for settlement against an external ledger

mod redeemer;
mod target;

pub use redeemer::*;
pub use target::*;
