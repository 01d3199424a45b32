use primitives::NodeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("erasure coding parameters invalid: k = {k}, m = {m}")]
    BadCodingParams { k: usize, m: usize },

    #[error("erasure decoding failed: {0}")]
    DecodeFailed(String),

    #[error("decoded payload does not hash to the advertised root")]
    BadHash,

    #[error("unknown consensus instance {0}")]
    UnknownInstance(NodeId),

    #[error("message sender {0} is not a committee member")]
    NotACommitteeMember(NodeId),
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
