use block::BlockError;
use primitives::{Round, SeqNum};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error(transparent)]
    Block(#[from] BlockError),

    #[error("no block at seq {0}")]
    UnknownSeq(SeqNum),

    #[error("block at seq {0} is not a transaction")]
    NotATransaction(SeqNum),

    #[error("transaction at seq {0} has no counterparty half yet")]
    MissingOtherHalf(SeqNum),

    #[error("conflicting consensus result for round {0}")]
    ConsMismatch(Round),
}

pub type Result<T> = std::result::Result<T, ChainError>;
