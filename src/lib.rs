// offcash - offline bearer tokens
//
// Issue signed value tokens, validate and divide them, and reconcile
// transactions recorded on disconnected devices with double-spend detection.

pub mod clock;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod service;
pub mod settlement;
pub mod storage;
pub mod sync;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{TokenError, TokenStateError};
pub use service::{ServiceConfig, TokenService};
