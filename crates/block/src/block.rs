use primitives::{Digest, Round, SeqNum};
use serde::{Deserialize, Serialize};

use crate::cp_block::CpBlock;
use crate::tx_block::TxBlock;

/// A chain entry: either half of a transaction pair or a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Block {
    Tx(TxBlock),
    Cp(CpBlock),
}

impl Block {
    pub fn is_tx(&self) -> bool {
        matches!(self, Block::Tx(_))
    }

    pub fn is_cp(&self) -> bool {
        matches!(self, Block::Cp(_))
    }

    pub fn hash(&self) -> Digest {
        match self {
            Block::Tx(b) => b.hash(),
            Block::Cp(b) => b.hash(),
        }
    }

    pub fn prev(&self) -> Digest {
        match self {
            Block::Tx(b) => b.prev(),
            Block::Cp(b) => b.prev(),
        }
    }

    pub fn seq(&self) -> SeqNum {
        match self {
            Block::Tx(b) => b.seq(),
            Block::Cp(b) => b.seq(),
        }
    }

    pub fn as_tx(&self) -> Option<&TxBlock> {
        match self {
            Block::Tx(b) => Some(b),
            Block::Cp(_) => None,
        }
    }

    pub fn as_tx_mut(&mut self) -> Option<&mut TxBlock> {
        match self {
            Block::Tx(b) => Some(b),
            Block::Cp(_) => None,
        }
    }

    pub fn as_cp(&self) -> Option<&CpBlock> {
        match self {
            Block::Tx(_) => None,
            Block::Cp(b) => Some(b),
        }
    }

    /// The redacted form circulated during validation.
    pub fn compact(&self) -> CompactBlock {
        CompactBlock {
            digest: self.hash(),
            prev: self.prev(),
            seq: self.seq(),
            agreed_round: None,
        }
    }
}

impl From<TxBlock> for Block {
    fn from(block: TxBlock) -> Block {
        Block::Tx(block)
    }
}

impl From<CpBlock> for Block {
    fn from(block: CpBlock) -> Block {
        Block::Cp(block)
    }
}

/// Redacted block form: enough to follow hash pointers without revealing
/// payloads. `agreed_round` is set on the endpoints of an agreed piece to
/// name the consensus round that anchors them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactBlock {
    pub digest: Digest,
    pub prev: Digest,
    pub seq: SeqNum,
    pub agreed_round: Option<Round>,
}

impl CompactBlock {
    /// Whether `next` directly extends this block.
    pub fn links_to(&self, next: &CompactBlock) -> bool {
        next.prev == self.digest && next.seq == self.seq + 1
    }
}
