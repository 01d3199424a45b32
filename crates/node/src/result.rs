use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("{0}")]
    Chain(#[from] trustchain::ChainError),

    #[error("{0}")]
    Block(#[from] block::BlockError),

    #[error("{0}")]
    Consensus(#[from] consensus::ConsensusError),

    #[error("{0}")]
    Codec(#[from] messages::CodecError),

    #[error("{0}")]
    Config(#[from] trust_config::ConfigError),

    #[error("{0}")]
    Crypto(#[from] trust_core::KeypairError),

    #[error("{0}")]
    Serialization(#[from] bincode::Error),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, NodeError>;
