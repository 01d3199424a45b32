pub mod dispatcher;
pub mod node;
pub mod result;
pub mod runner;
pub mod stats;
pub mod test_utils;
pub mod transport;

pub use crate::dispatcher::*;
pub use crate::node::*;
pub use crate::result::*;
pub use crate::runner::*;
pub use crate::stats::*;
pub use crate::transport::*;
