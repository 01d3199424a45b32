mod instruction;
mod message;

pub use instruction::*;
pub use message::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unknown message tag {0}")]
    UnknownTag(u16),

    #[error("frame truncated")]
    Truncated,

    #[error(transparent)]
    Bincode(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, CodecError>;
