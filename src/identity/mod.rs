// Identity module - issuer key material and signatures over token payloads

mod keypair;
mod signer;

pub use keypair::*;
pub use signer::*;
