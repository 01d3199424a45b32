use messages::Message;
use primitives::NodeId;

use crate::result::Result;

/// The authenticated point-to-point boundary the consensus core sits
/// behind. Implementations are external (a TCP line protocol in
/// production, an in-memory router in tests); the core only ever calls
/// `send`. Self-addressed messages must loop back to the sender.
pub trait Transport: Send + Sync {
    fn send(&self, to: &NodeId, msg: Message) -> Result<()>;
}
