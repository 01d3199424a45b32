mod node_config;
mod protocol_config;

pub use node_config::*;
pub use protocol_config::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
