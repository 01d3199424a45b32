pub mod keypair;
pub mod signature;

pub use keypair::*;
pub use signature::*;
