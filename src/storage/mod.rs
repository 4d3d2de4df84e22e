// Storage module - PERSISTENCE
// sled-backed implementation of the token ledger

mod store;

pub use store::{SledLedger, StorageStats, StoreError};
