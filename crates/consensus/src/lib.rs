pub mod acs;
pub mod bracha;
pub mod coin;
pub mod erasure;
pub mod mo14;
pub mod result;
pub mod step;

pub use crate::acs::*;
pub use crate::bracha::*;
pub use crate::coin::*;
pub use crate::erasure::*;
pub use crate::mo14::*;
pub use crate::result::*;
pub use crate::step::*;
