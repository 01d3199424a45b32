use primitives::{NodeId, Round, SeqNum};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlockError {
    #[error("bad signature from {0}")]
    BadSignature(NodeId),

    #[error("bad link: prev {got} does not extend {expected}")]
    BadLink { expected: String, got: String },

    #[error("bad sequence number: got {got}, expected {expected}")]
    BadSeq { expected: SeqNum, got: SeqNum },

    #[error("bad round: {got} does not advance past {latest}")]
    BadRound { latest: Round, got: Round },

    #[error("bad hash: {0}")]
    BadHash(String),

    #[error("insufficient checkpoint signatures: got {got}, need {need}")]
    InsufficientSignatures { got: usize, need: usize },

    #[error("concurrent transaction attempt rejected")]
    Aborted,
}

pub type Result<T> = std::result::Result<T, BlockError>;
