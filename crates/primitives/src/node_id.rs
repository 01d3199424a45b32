use std::fmt::{self, Debug, Display, Formatter};

use serde::{Deserialize, Serialize};

pub const NODE_ID_LENGTH: usize = 32;

/// A node identity: the raw bytes of its Ed25519 verification key.
///
/// `Ord` so that committees and signature lists have a deterministic
/// ordering on every node.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId([u8; NODE_ID_LENGTH]);

impl NodeId {
    pub fn from_bytes(bytes: [u8; NODE_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; NODE_ID_LENGTH] {
        &self.0
    }

    /// Short hex form used in log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}..)", self.short())
    }
}

impl From<[u8; NODE_ID_LENGTH]> for NodeId {
    fn from(bytes: [u8; NODE_ID_LENGTH]) -> Self {
        Self(bytes)
    }
}
