pub mod base;
pub mod digest;
pub mod node_id;

pub use base::*;
pub use digest::*;
pub use node_id::*;
