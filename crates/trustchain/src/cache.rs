use std::collections::{BTreeMap, HashMap};

use block::CompactBlock;
use primitives::{NodeId, SeqNum};

/// Sparse per-counterparty store of compact chain fragments learnt during
/// validation. Indexed by the counterparty's seq numbers, so later
/// verifications against the same chain can be answered locally.
#[derive(Debug, Default)]
pub struct SegmentCache {
    segments: HashMap<NodeId, BTreeMap<SeqNum, CompactBlock>>,
}

impl SegmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges verified pieces into the counterparty's fragment list. An
    /// `agreed_round` annotation is never downgraded back to `None` by a
    /// later overlapping insert.
    pub fn insert_pieces(&mut self, counterparty: NodeId, pieces: &[CompactBlock]) {
        let segment = self.segments.entry(counterparty).or_default();
        for piece in pieces {
            segment
                .entry(piece.seq)
                .and_modify(|existing| {
                    if existing.agreed_round.is_none() {
                        existing.agreed_round = piece.agreed_round;
                    }
                })
                .or_insert_with(|| piece.clone());
        }
    }

    /// A contiguous hash-linked run of cached fragments that encloses
    /// `seq` between two agreed checkpoints, if one exists.
    pub fn covering_segment(
        &self,
        counterparty: &NodeId,
        seq: SeqNum,
    ) -> Option<Vec<CompactBlock>> {
        let segment = self.segments.get(counterparty)?;
        segment.get(&seq)?;

        let mut lo = seq;
        loop {
            let cur = segment.get(&lo)?;
            if cur.agreed_round.is_some() {
                break;
            }
            if lo == 0 {
                return None;
            }
            let prev = segment.get(&(lo - 1))?;
            if !prev.links_to(cur) {
                return None;
            }
            lo -= 1;
        }

        let mut hi = seq;
        loop {
            let cur = segment.get(&hi)?;
            if cur.agreed_round.is_some() && hi > seq {
                break;
            }
            let next = segment.get(&(hi + 1))?;
            if !cur.links_to(next) {
                return None;
            }
            hi += 1;
        }

        Some((lo..=hi).filter_map(|s| segment.get(&s).cloned()).collect())
    }

    pub fn fragment_count(&self, counterparty: &NodeId) -> usize {
        self.segments.get(counterparty).map_or(0, |s| s.len())
    }
}
