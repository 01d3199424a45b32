use block::{Block, BlockError, CompactBlock, CpBlock, TxBlock, Validity};
use primitives::{Digest, NodeId, Round, SeqNum};
use trust_core::Keypair;

use crate::result::{ChainError, Result};

/// One node's append-only chain. The genesis checkpoint sits at index 0
/// and a block's `seq` always equals its index.
#[derive(Debug, Clone)]
pub struct Chain {
    vk: NodeId,
    blocks: Vec<Block>,
}

impl Chain {
    pub fn new(keypair: &Keypair) -> Self {
        Chain {
            vk: keypair.node_id(),
            blocks: vec![Block::Cp(block::generate_genesis_block(keypair))],
        }
    }

    pub fn vk(&self) -> NodeId {
        self.vk
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        false // genesis is always present
    }

    pub fn get(&self, seq: SeqNum) -> Option<&Block> {
        self.blocks.get(seq as usize)
    }

    pub fn get_mut(&mut self, seq: SeqNum) -> Option<&mut Block> {
        self.blocks.get_mut(seq as usize)
    }

    pub fn latest(&self) -> &Block {
        self.blocks
            .last()
            .unwrap_or_else(|| unreachable!("chain always holds its genesis block"))
    }

    pub fn latest_hash(&self) -> Digest {
        self.latest().hash()
    }

    pub fn next_seq(&self) -> SeqNum {
        self.blocks.len() as SeqNum
    }

    /// The most recent checkpoint. Genesis guarantees one exists.
    pub fn latest_cp(&self) -> &CpBlock {
        self.blocks
            .iter()
            .rev()
            .find_map(|b| b.as_cp())
            .unwrap_or_else(|| unreachable!("chain always holds its genesis checkpoint"))
    }

    pub fn latest_round(&self) -> Round {
        self.latest_cp().round()
    }

    pub fn genesis(&self) -> &CpBlock {
        self.blocks[0]
            .as_cp()
            .unwrap_or_else(|| unreachable!("chain always starts with a checkpoint"))
    }

    fn check_link(&self, prev: Digest, seq: SeqNum) -> Result<()> {
        let latest = self.latest();
        if prev != latest.hash() {
            return Err(BlockError::BadLink {
                expected: latest.hash().to_string(),
                got: prev.to_string(),
            }
            .into());
        }
        if seq != latest.seq() + 1 {
            return Err(BlockError::BadSeq {
                expected: latest.seq() + 1,
                got: seq,
            }
            .into());
        }
        Ok(())
    }

    pub fn append_tx(&mut self, tx: TxBlock) -> Result<()> {
        self.check_link(tx.prev(), tx.seq())?;
        if tx.owner() != self.vk {
            return Err(BlockError::BadSignature(tx.owner()).into());
        }
        self.blocks.push(Block::Tx(tx));
        Ok(())
    }

    pub fn append_cp(&mut self, cp: CpBlock) -> Result<()> {
        self.check_link(cp.prev(), cp.seq())?;
        let latest_round = self.latest_round();
        if cp.round() <= latest_round {
            return Err(BlockError::BadRound {
                latest: latest_round,
                got: cp.round(),
            }
            .into());
        }
        if cp.owner() != self.vk {
            return Err(BlockError::BadSignature(cp.owner()).into());
        }
        self.blocks.push(Block::Cp(cp));
        Ok(())
    }

    /// The compact slice `[cp_a … cp_b]` around the transaction at `seq`,
    /// where `cp_a` is the nearest preceding and `cp_b` the nearest
    /// following checkpoint. Empty when either enclosure is missing or
    /// `seq` does not name a transaction.
    pub fn pieces(&self, seq: SeqNum) -> Vec<CompactBlock> {
        let idx = seq as usize;
        match self.blocks.get(idx) {
            Some(Block::Tx(_)) => {}
            _ => return vec![],
        }

        let Some(start) = self.blocks[..idx].iter().rposition(|b| b.is_cp()) else {
            return vec![];
        };
        let Some(end) = self.blocks[idx + 1..].iter().position(|b| b.is_cp()) else {
            return vec![];
        };
        let end = idx + 1 + end;

        self.blocks[start..=end].iter().map(Block::compact).collect()
    }

    /// Monotone validity update: a block already marked `Valid` or
    /// `Invalid` keeps its state.
    pub fn set_validity(&mut self, seq: SeqNum, validity: Validity) -> Result<Validity> {
        let block = self
            .blocks
            .get_mut(seq as usize)
            .ok_or(ChainError::UnknownSeq(seq))?;
        let tx = block.as_tx_mut().ok_or(ChainError::NotATransaction(seq))?;

        if tx.validity == Validity::Unknown {
            tx.validity = validity;
        }
        Ok(tx.validity)
    }

    pub fn tx_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_tx()).count()
    }

    pub fn cp_count(&self) -> usize {
        // excluding genesis
        self.blocks.iter().filter(|b| b.is_cp()).count() - 1
    }

    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use block::{Cons, TxBlock};
    use primitives::random_nonce;
    use trust_core::Signature;

    fn gen_cons_for(round: Round, n: usize) -> (Vec<Keypair>, Vec<Signature>, Cons) {
        let keypairs: Vec<Keypair> = (0..n).map(|_| Keypair::random()).collect();
        let blocks = keypairs
            .iter()
            .map(block::generate_genesis_block)
            .collect();
        let cons = Cons::new(round, blocks);
        let ss = keypairs
            .iter()
            .map(|kp| kp.sign_digest(&cons.hash()))
            .collect();
        (keypairs, ss, cons)
    }

    fn append_cp_for_round(chain: &mut Chain, keypair: &Keypair, round: Round) {
        let (keypairs, ss, cons) = gen_cons_for(round, 4);
        let committee: Vec<NodeId> = keypairs.iter().map(|kp| kp.node_id()).collect();
        let cp = CpBlock::new(
            keypair,
            chain.latest_hash(),
            chain.next_seq(),
            &cons,
            1,
            ss,
            &committee,
            1,
        )
        .unwrap();
        chain.append_cp(cp).unwrap();
    }

    fn append_tx_to(chain: &mut Chain, keypair: &Keypair, counterparty: NodeId) {
        let tx = TxBlock::new(
            keypair,
            chain.latest_hash(),
            chain.next_seq(),
            counterparty,
            random_nonce(),
            b"m".to_vec(),
        );
        chain.append_tx(tx).unwrap();
    }

    #[test]
    fn chain_links_and_seqs_hold() {
        let keypair = Keypair::random();
        let other = Keypair::random().node_id();
        let mut chain = Chain::new(&keypair);

        for _ in 0..3 {
            append_tx_to(&mut chain, &keypair, other);
        }
        append_cp_for_round(&mut chain, &keypair, 1);

        for pair in chain.blocks.windows(2) {
            assert_eq!(pair[1].prev(), pair[0].hash());
            assert_eq!(pair[1].seq(), pair[0].seq() + 1);
        }
        assert_eq!(chain.tx_count(), 3);
        assert_eq!(chain.cp_count(), 1);
    }

    #[test]
    fn append_rejects_bad_link() {
        let keypair = Keypair::random();
        let mut chain = Chain::new(&keypair);

        let tx = TxBlock::new(
            &keypair,
            Digest::sha256(b"wrong prev"),
            1,
            Keypair::random().node_id(),
            random_nonce(),
            b"m".to_vec(),
        );
        assert!(matches!(
            chain.append_tx(tx),
            Err(ChainError::Block(BlockError::BadLink { .. }))
        ));
    }

    #[test]
    fn append_rejects_duplicate() {
        let keypair = Keypair::random();
        let mut chain = Chain::new(&keypair);
        append_cp_for_round(&mut chain, &keypair, 1);

        let cp = chain.latest_cp().clone();
        assert!(chain.append_cp(cp).is_err());
    }

    #[test]
    fn cp_round_must_advance() {
        let keypair = Keypair::random();
        let mut chain = Chain::new(&keypair);
        append_cp_for_round(&mut chain, &keypair, 2);

        let (keypairs, ss, cons) = gen_cons_for(1, 4);
        let committee: Vec<NodeId> = keypairs.iter().map(|kp| kp.node_id()).collect();
        let stale = CpBlock::new(
            &keypair,
            chain.latest_hash(),
            chain.next_seq(),
            &cons,
            1,
            ss,
            &committee,
            1,
        )
        .unwrap();
        assert!(matches!(
            chain.append_cp(stale),
            Err(ChainError::Block(BlockError::BadRound { .. }))
        ));
    }

    #[test]
    fn pieces_enclose_the_target() {
        let keypair = Keypair::random();
        let other = Keypair::random().node_id();
        let mut chain = Chain::new(&keypair);

        for _ in 0..2 {
            append_tx_to(&mut chain, &keypair, other);
        }
        append_cp_for_round(&mut chain, &keypair, 1);
        for _ in 0..2 {
            append_tx_to(&mut chain, &keypair, other);
        }
        append_cp_for_round(&mut chain, &keypair, 2);

        // tx at seq 4, enclosed by cps at 3 and 6
        let pieces = chain.pieces(4);
        assert_eq!(pieces.len(), 4);
        assert_eq!(pieces[0].seq, 3);
        assert_eq!(pieces[3].seq, 6);
        for pair in pieces.windows(2) {
            assert!(pair[0].links_to(&pair[1]));
        }
    }

    #[test]
    fn pieces_empty_without_following_cp() {
        let keypair = Keypair::random();
        let other = Keypair::random().node_id();
        let mut chain = Chain::new(&keypair);
        append_tx_to(&mut chain, &keypair, other);

        assert!(chain.pieces(1).is_empty());
        // and a cp seq is never a piece target
        assert!(chain.pieces(0).is_empty());
    }

    #[test]
    fn validity_is_monotone() {
        let keypair = Keypair::random();
        let other = Keypair::random().node_id();
        let mut chain = Chain::new(&keypair);
        append_tx_to(&mut chain, &keypair, other);

        assert_eq!(chain.set_validity(1, Validity::Valid).unwrap(), Validity::Valid);
        assert_eq!(
            chain.set_validity(1, Validity::Invalid).unwrap(),
            Validity::Valid
        );
    }
}
