// Token module - THE BEARER INSTRUMENT
// Signed token model plus the issuer, validator and divider that operate on it

mod amount;
mod codec;
mod divider;
mod issuer;
mod model;
mod validator;

pub use amount::*;
pub use codec::*;
pub use divider::*;
pub use issuer::*;
pub use model::*;
pub use validator::*;
