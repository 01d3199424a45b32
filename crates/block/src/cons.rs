use primitives::{Digest, NodeId, Round};
use serde::{Deserialize, Serialize};

use crate::cp_block::CpBlock;

/// The consensus result of one ACS round: the set of checkpoint blocks
/// the committee agreed on. Blocks are held sorted by owner id so that
/// equal agreed sets hash identically on every node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cons {
    pub round: Round,
    blocks: Vec<CpBlock>,
}

impl Cons {
    pub fn new(round: Round, mut blocks: Vec<CpBlock>) -> Self {
        blocks.sort_by_key(|b| (b.owner(), b.hash()));
        blocks.dedup_by_key(|b| b.hash());
        Cons { round, blocks }
    }

    pub fn blocks(&self) -> &[CpBlock] {
        &self.blocks
    }

    pub fn count(&self) -> usize {
        self.blocks.len()
    }

    pub fn hash(&self) -> Digest {
        let mut bytes = Vec::with_capacity(8 + self.blocks.len() * 32);
        bytes.extend_from_slice(&self.round.to_be_bytes());
        for b in &self.blocks {
            bytes.extend_from_slice(b.hash().as_bytes());
        }
        Digest::sha256(&bytes)
    }

    /// Whether the agreed set contains a checkpoint with this digest.
    pub fn contains_digest(&self, digest: &Digest) -> bool {
        self.blocks.iter().any(|b| b.hash() == *digest)
    }

    /// Selects the next committee: candidates with `p = 1`, ordered by
    /// `luck = sha256(block hash ‖ owner vk)`, first `n` taken. The luck
    /// ordering is deterministic and collision-resistant, so every node
    /// derives the same committee from the same `Cons`.
    pub fn get_promoters(&self, n: usize) -> Vec<NodeId> {
        let mut candidates: Vec<(Digest, NodeId)> = self
            .blocks
            .iter()
            .filter(|b| b.inner.p == 1)
            .map(|b| {
                let luck = Digest::sha256_concat(&[
                    b.hash().as_bytes(),
                    b.owner().as_bytes(),
                ]);
                (luck, b.owner())
            })
            .collect();

        candidates.sort();
        candidates.into_iter().take(n).map(|(_, vk)| vk).collect()
    }
}
