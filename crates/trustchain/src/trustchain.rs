use std::collections::{BTreeMap, HashMap};

use block::{Block, BlockError, CompactBlock, Cons, CpBlock, TxBlock, Validity};
use primitives::{Digest, NodeId, Nonce, Round, SeqNum};
use telemetry::{debug, info};
use trust_core::{Keypair, Signature};

use crate::cache::SegmentCache;
use crate::chain::Chain;
use crate::result::{ChainError, Result};

/// A node's complete chain state: its own chain, the consensus results it
/// knows, and cached counterparty fragments. Single writer.
#[derive(Debug)]
pub struct TrustChain {
    keypair: Keypair,
    chain: Chain,
    consensus: BTreeMap<Round, Cons>,
    /// Digest of every checkpoint inside a known `Cons`, by round.
    agreed_cps: HashMap<Digest, Round>,
    cache: SegmentCache,
}

impl TrustChain {
    pub fn new(keypair: Keypair) -> Self {
        let chain = Chain::new(&keypair);
        TrustChain {
            keypair,
            chain,
            consensus: BTreeMap::new(),
            agreed_cps: HashMap::new(),
            cache: SegmentCache::new(),
        }
    }

    pub fn vk(&self) -> NodeId {
        self.chain.vk()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn genesis(&self) -> &CpBlock {
        self.chain.genesis()
    }

    pub fn latest_cp(&self) -> &CpBlock {
        self.chain.latest_cp()
    }

    pub fn latest_round(&self) -> Round {
        self.chain.latest_round()
    }

    pub fn cons(&self, round: Round) -> Option<&Cons> {
        self.consensus.get(&round)
    }

    pub fn known_rounds(&self) -> impl Iterator<Item = Round> + '_ {
        self.consensus.keys().copied()
    }

    /// Round of the consensus result containing this checkpoint digest.
    pub fn cp_agreed_round(&self, digest: &Digest) -> Option<Round> {
        self.agreed_cps.get(digest).copied()
    }

    pub fn sign(&self, digest: &Digest) -> Signature {
        self.keypair.sign_digest(digest)
    }

    // ------------------------------------------------------------------
    // transactions

    /// Creates and appends this node's half of a transaction pair.
    pub fn new_tx(&mut self, counterparty: NodeId, m: Vec<u8>, nonce: Nonce) -> Result<SeqNum> {
        let seq = self.chain.next_seq();
        let tx = TxBlock::new(
            &self.keypair,
            self.chain.latest_hash(),
            seq,
            counterparty,
            nonce,
            m,
        );
        self.chain.append_tx(tx)?;

        info!(
            seq,
            counterparty = %counterparty.short(),
            "TC: added tx"
        );
        Ok(seq)
    }

    /// Handles an incoming transaction request: verifies the initiator's
    /// half, appends the matching local half with its counterparty copy
    /// attached, and returns the local half for the response.
    pub fn receive_tx(&mut self, from: NodeId, their_half: TxBlock) -> Result<TxBlock> {
        their_half.verify_owner(&from)?;
        if their_half.inner.counterparty != self.vk() {
            return Err(BlockError::BadHash(
                "transaction request addressed to a different node".to_string(),
            )
            .into());
        }

        let seq = self.new_tx(from, their_half.inner.m.clone(), their_half.inner.nonce)?;

        let own_vk = self.vk();
        let tx = self
            .chain
            .get_mut(seq)
            .and_then(Block::as_tx_mut)
            .ok_or(ChainError::NotATransaction(seq))?;
        tx.add_other_half(&own_vk, their_half)?;

        Ok(self
            .chain
            .get(seq)
            .and_then(Block::as_tx)
            .cloned()
            .ok_or(ChainError::NotATransaction(seq))?)
    }

    /// Attaches the counterparty's half to the transaction at `seq`
    /// (the response leg of the two-message protocol).
    pub fn add_other_half(&mut self, seq: SeqNum, half: TxBlock) -> Result<()> {
        let own_vk = self.vk();
        let tx = self
            .chain
            .get_mut(seq)
            .ok_or(ChainError::UnknownSeq(seq))?
            .as_tx_mut()
            .ok_or(ChainError::NotATransaction(seq))?;
        tx.add_other_half(&own_vk, half)?;

        debug!(seq, "TC: stored other half");
        Ok(())
    }

    pub fn tx(&self, seq: SeqNum) -> Option<&TxBlock> {
        self.chain.get(seq).and_then(Block::as_tx)
    }

    pub fn tx_mut(&mut self, seq: SeqNum) -> Option<&mut TxBlock> {
        self.chain.get_mut(seq).and_then(Block::as_tx_mut)
    }

    /// Seqs of transactions that have both halves but no verdict yet.
    pub fn verifiable_txs(&self) -> Vec<SeqNum> {
        self.chain
            .iter()
            .filter_map(Block::as_tx)
            .filter(|tx| tx.other_half.is_some() && tx.validity == Validity::Unknown)
            .map(TxBlock::seq)
            .collect()
    }

    pub fn tx_count(&self) -> usize {
        self.chain.tx_count()
    }

    pub fn validated_tx_count(&self) -> usize {
        self.chain
            .iter()
            .filter_map(Block::as_tx)
            .filter(|tx| tx.validity == Validity::Valid)
            .count()
    }

    // ------------------------------------------------------------------
    // checkpoints & consensus results

    /// Records an agreed consensus result and appends this node's own
    /// checkpoint for it. `committee` is the promoter set of the previous
    /// round; at least `t + 1` of `sigs` must verify against the result.
    pub fn new_cp(
        &mut self,
        p: u8,
        cons: Cons,
        sigs: Vec<Signature>,
        committee: &[NodeId],
        t: usize,
    ) -> Result<()> {
        // refuse a conflicting result before touching the chain
        if let Some(existing) = self.consensus.get(&cons.round) {
            if *existing != cons {
                return Err(ChainError::ConsMismatch(cons.round));
            }
        }

        let cp = CpBlock::new(
            &self.keypair,
            self.chain.latest_hash(),
            self.chain.next_seq(),
            &cons,
            p,
            sigs,
            committee,
            t,
        )?;
        let round = cp.round();
        let seq = cp.seq();
        self.chain.append_cp(cp)?;
        self.insert_cons(cons)?;

        info!(round, seq, "TC: added cp");
        Ok(())
    }

    /// Stores a consensus result. A conflicting result for an already
    /// known round is an error (honest promoters never disagree).
    pub fn insert_cons(&mut self, cons: Cons) -> Result<()> {
        if let Some(existing) = self.consensus.get(&cons.round) {
            if *existing != cons {
                return Err(ChainError::ConsMismatch(cons.round));
            }
            return Ok(());
        }

        for b in cons.blocks() {
            self.agreed_cps.insert(b.hash(), cons.round);
        }
        self.consensus.insert(cons.round, cons);
        Ok(())
    }

    // ------------------------------------------------------------------
    // validation protocol

    /// `pieces(seq)` restricted to segments whose enclosing checkpoints
    /// are both inside some known `Cons`; the endpoints are annotated
    /// with their agreed round. Empty when the enclosure is not agreed.
    pub fn agreed_pieces(&self, seq: SeqNum) -> Vec<CompactBlock> {
        let mut pieces = self.chain.pieces(seq);
        if pieces.is_empty() {
            return pieces;
        }

        let first = match self.cp_agreed_round(&pieces[0].digest) {
            Some(r) => r,
            None => return vec![],
        };
        let last_idx = pieces.len() - 1;
        let last = match self.cp_agreed_round(&pieces[last_idx].digest) {
            Some(r) => r,
            None => return vec![],
        };

        pieces[0].agreed_round = Some(first);
        pieces[last_idx].agreed_round = Some(last);
        pieces
    }

    /// Verifies a validation response for the transaction at local `seq`:
    /// the endpoint checkpoints must appear in this node's own consensus
    /// results for their declared rounds, the hash pointers must chain
    /// through, and one piece must carry the stored counterparty half's
    /// digest. Only full success flips the verdict; a malformed reply
    /// leaves it `Unknown`.
    pub fn verify_tx(&mut self, seq: SeqNum, pieces: &[CompactBlock]) -> Result<Validity> {
        let tx = self.tx(seq).ok_or(ChainError::NotATransaction(seq))?;
        if tx.validity != Validity::Unknown {
            // verified once, stays verified
            return Ok(tx.validity);
        }
        let other_half = tx
            .other_half
            .as_deref()
            .ok_or(ChainError::MissingOtherHalf(seq))?;
        let counterparty = tx.inner.counterparty;
        let target = other_half.hash();

        if !self.pieces_verify(pieces, &target) {
            debug!(seq, "TC: validation response did not verify");
            return Ok(Validity::Unknown);
        }

        self.chain.set_validity(seq, Validity::Valid)?;
        self.cache.insert_pieces(counterparty, pieces);
        info!(seq, counterparty = %counterparty.short(), "TC: verified tx");

        self.recheck_pending(counterparty);
        Ok(Validity::Valid)
    }

    /// Attempts to validate from cached fragments alone. Returns true if
    /// the transaction is (now) valid.
    pub fn verify_tx_from_cache(&mut self, seq: SeqNum) -> bool {
        let Some(tx) = self.tx(seq) else {
            return false;
        };
        if tx.validity == Validity::Valid {
            return true;
        }
        let Some(other_half) = tx.other_half.as_deref() else {
            return false;
        };
        let counterparty = tx.inner.counterparty;
        let target_seq = other_half.seq();
        let target = other_half.hash();

        let Some(segment) = self.cache.covering_segment(&counterparty, target_seq) else {
            return false;
        };
        if !self.pieces_verify(&segment, &target) {
            return false;
        }

        if self.chain.set_validity(seq, Validity::Valid).is_ok() {
            info!(seq, counterparty = %counterparty.short(), "TC: verified tx from cache");
            true
        } else {
            false
        }
    }

    fn pieces_verify(&self, pieces: &[CompactBlock], target: &Digest) -> bool {
        // at least cp, tx, cp
        if pieces.len() < 3 {
            return false;
        }

        let first = &pieces[0];
        let last = &pieces[pieces.len() - 1];
        let endpoints_agreed = [first, last].into_iter().all(|cp| {
            cp.agreed_round
                .and_then(|r| self.consensus.get(&r))
                .map(|cons| cons.contains_digest(&cp.digest))
                .unwrap_or(false)
        });
        if !endpoints_agreed {
            return false;
        }

        if !pieces.windows(2).all(|pair| pair[0].links_to(&pair[1])) {
            return false;
        }

        pieces.iter().any(|piece| piece.digest == *target)
    }

    /// After new fragments land in the cache, other pending transactions
    /// with the same counterparty may have become verifiable locally.
    fn recheck_pending(&mut self, counterparty: NodeId) {
        let pending: Vec<SeqNum> = self
            .chain
            .iter()
            .filter_map(Block::as_tx)
            .filter(|tx| {
                tx.validity == Validity::Unknown
                    && tx.inner.counterparty == counterparty
                    && tx.other_half.is_some()
            })
            .map(TxBlock::seq)
            .collect();

        for seq in pending {
            self.verify_tx_from_cache(seq);
        }
    }

    pub fn cache(&self) -> &SegmentCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitives::random_nonce;

    /// A committee whose members sign whatever `Cons` they are given,
    /// so chains in tests can grow checkpoints at will.
    struct TestCommittee {
        keypairs: Vec<Keypair>,
    }

    impl TestCommittee {
        fn new(n: usize) -> Self {
            Self {
                keypairs: (0..n).map(|_| Keypair::random()).collect(),
            }
        }

        fn ids(&self) -> Vec<NodeId> {
            self.keypairs.iter().map(|kp| kp.node_id()).collect()
        }

        fn sign(&self, cons: &Cons) -> Vec<Signature> {
            self.keypairs
                .iter()
                .map(|kp| kp.sign_digest(&cons.hash()))
                .collect()
        }
    }

    /// Close a round on both chains: build a `Cons` agreeing on both
    /// nodes' latest checkpoints, then append a CP for it on each side.
    fn close_round(round: Round, committee: &TestCommittee, chains: &mut [&mut TrustChain]) {
        let latest: Vec<CpBlock> = chains.iter().map(|tc| tc.latest_cp().clone()).collect();
        let cons = Cons::new(round, latest);
        let sigs = committee.sign(&cons);
        for tc in chains.iter_mut() {
            tc.new_cp(1, cons.clone(), sigs.clone(), &committee.ids(), 1)
                .unwrap();
        }
    }

    fn exchange_tx(a: &mut TrustChain, b: &mut TrustChain, m: &[u8]) -> (SeqNum, SeqNum) {
        let nonce = random_nonce();
        let seq_a = a.new_tx(b.vk(), m.to_vec(), nonce).unwrap();
        let a_half = a.tx(seq_a).unwrap().clone();
        let b_half = b.receive_tx(a.vk(), a_half).unwrap();
        let seq_b = b_half.seq();
        a.add_other_half(seq_a, b_half).unwrap();
        (seq_a, seq_b)
    }

    fn two_chains() -> (TrustChain, TrustChain, TestCommittee) {
        (
            TrustChain::new(Keypair::random()),
            TrustChain::new(Keypair::random()),
            TestCommittee::new(4),
        )
    }

    #[test]
    fn tx_round_trip_links_both_halves() {
        let (mut a, mut b, _) = two_chains();
        let (seq_a, seq_b) = exchange_tx(&mut a, &mut b, b"ping");

        let a_tx = a.tx(seq_a).unwrap();
        let b_tx = b.tx(seq_b).unwrap();

        assert_eq!(a_tx.inner.m, b"ping");
        assert_eq!(a_tx.inner.nonce, b_tx.inner.nonce);
        assert_eq!(a_tx.other_half.as_ref().unwrap().owner(), b.vk());
        assert_eq!(b_tx.other_half.as_ref().unwrap().owner(), a.vk());
    }

    #[test]
    fn cons_disagreement_is_rejected() {
        let (mut a, _b, _committee) = two_chains();
        let cons1 = Cons::new(1, vec![a.genesis().clone()]);
        a.insert_cons(cons1).unwrap();

        let other = TrustChain::new(Keypair::random());
        let cons2 = Cons::new(1, vec![other.genesis().clone()]);
        assert!(matches!(
            a.insert_cons(cons2),
            Err(ChainError::ConsMismatch(1))
        ));
    }

    #[test]
    fn agreed_pieces_and_verify() {
        let (mut a, mut b, committee) = two_chains();

        // round 1 closes over the genesis blocks
        close_round(1, &committee, &mut [&mut a, &mut b]);

        // 5 transactions, the middle one is the target
        let mut seqs = vec![];
        for i in 0..5 {
            seqs.push(exchange_tx(&mut a, &mut b, format!("tx-{i}").as_bytes()));
        }
        close_round(2, &committee, &mut [&mut a, &mut b]);
        // the round-2 checkpoints only become agreed once round 3 closes
        close_round(3, &committee, &mut [&mut a, &mut b]);

        let (seq_a, seq_b) = seqs[2];
        let pieces = b.agreed_pieces(seq_b);
        assert_eq!(pieces.len(), 7); // cp + 5 tx + cp
        assert_eq!(pieces[0].agreed_round, Some(2));
        assert_eq!(pieces[6].agreed_round, Some(3));

        assert_eq!(a.verify_tx(seq_a, &pieces).unwrap(), Validity::Valid);
        assert_eq!(a.tx(seq_a).unwrap().validity, Validity::Valid);
        // cache picked up the counterparty fragments
        assert_eq!(a.cache().fragment_count(&b.vk()), 7);
    }

    #[test]
    fn verify_is_idempotent() {
        let (mut a, mut b, committee) = two_chains();
        close_round(1, &committee, &mut [&mut a, &mut b]);
        let (seq_a, seq_b) = exchange_tx(&mut a, &mut b, b"once");
        close_round(2, &committee, &mut [&mut a, &mut b]);
        close_round(3, &committee, &mut [&mut a, &mut b]);

        let pieces = b.agreed_pieces(seq_b);
        assert_eq!(a.verify_tx(seq_a, &pieces).unwrap(), Validity::Valid);
        // a second, even empty, response cannot disturb the verdict
        assert_eq!(a.verify_tx(seq_a, &[]).unwrap(), Validity::Valid);
    }

    #[test]
    fn validation_before_round_closes_stays_unknown() {
        let (mut a, mut b, committee) = two_chains();
        close_round(1, &committee, &mut [&mut a, &mut b]);

        let (seq_a, seq_b) = exchange_tx(&mut a, &mut b, b"early");

        // the following checkpoint does not exist yet
        assert!(b.agreed_pieces(seq_b).is_empty());
        assert_eq!(a.verify_tx(seq_a, &[]).unwrap(), Validity::Unknown);
        assert_eq!(a.tx(seq_a).unwrap().validity, Validity::Unknown);
    }

    #[test]
    fn pending_txs_resolve_from_cache() {
        let (mut a, mut b, committee) = two_chains();
        close_round(1, &committee, &mut [&mut a, &mut b]);

        let first = exchange_tx(&mut a, &mut b, b"one");
        let second = exchange_tx(&mut a, &mut b, b"two");
        close_round(2, &committee, &mut [&mut a, &mut b]);
        close_round(3, &committee, &mut [&mut a, &mut b]);

        // verifying the first tx inserts the whole enclosing segment,
        // which also covers the second tx
        let pieces = b.agreed_pieces(first.1);
        a.verify_tx(first.0, &pieces).unwrap();

        assert_eq!(a.tx(second.0).unwrap().validity, Validity::Valid);
    }

    #[test]
    fn tampered_pieces_do_not_validate() {
        let (mut a, mut b, committee) = two_chains();
        close_round(1, &committee, &mut [&mut a, &mut b]);
        let (seq_a, seq_b) = exchange_tx(&mut a, &mut b, b"tamper");
        close_round(2, &committee, &mut [&mut a, &mut b]);
        close_round(3, &committee, &mut [&mut a, &mut b]);

        let mut pieces = b.agreed_pieces(seq_b);
        // break the hash linkage in the middle
        pieces[1].digest = Digest::sha256(b"forged");

        assert_eq!(a.verify_tx(seq_a, &pieces).unwrap(), Validity::Unknown);
    }
}
