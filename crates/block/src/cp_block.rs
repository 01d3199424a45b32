use primitives::{Digest, NodeId, Round, SeqNum};
use serde::{Deserialize, Serialize};
use trust_core::{Keypair, Signature};

use crate::cons::Cons;
use crate::error::{BlockError, Result};

/// The signed value of a checkpoint block. `ss` is kept sorted by signer
/// so the digest is canonical. Field order is the hashing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpBlockInner {
    pub prev: Digest,
    pub seq: SeqNum,
    pub round: Round,
    pub cons_hash: Digest,
    pub ss: Vec<Signature>,
    /// Promoter-candidacy flag, 0 or 1.
    pub p: u8,
}

impl CpBlockInner {
    fn digest_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(32 + 8 + 8 + 32 + self.ss.len() * 96 + 1);
        bytes.extend_from_slice(self.prev.as_bytes());
        bytes.extend_from_slice(&self.seq.to_be_bytes());
        bytes.extend_from_slice(&self.round.to_be_bytes());
        bytes.extend_from_slice(self.cons_hash.as_bytes());
        for s in &self.ss {
            bytes.extend_from_slice(&s.to_bytes());
        }
        bytes.push(self.p);
        bytes
    }

    pub fn hash(&self) -> Digest {
        Digest::sha256(&self.digest_bytes())
    }
}

/// A checkpoint block: anchors its owner's chain to a consensus-round
/// outcome, carrying `t + 1` committee signatures over that outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpBlock {
    pub inner: CpBlockInner,
    pub s: Signature,
}

impl CpBlock {
    /// Builds a checkpoint for round `cons.round`. `committee` is the
    /// promoter set of the previous round; signatures from keys outside
    /// it are discarded, and at least `t + 1` of the remainder must
    /// verify against the consensus digest.
    pub fn new(
        keypair: &Keypair,
        prev: Digest,
        seq: SeqNum,
        cons: &Cons,
        p: u8,
        sigs: Vec<Signature>,
        committee: &[NodeId],
        t: usize,
    ) -> Result<Self> {
        let cons_hash = cons.hash();

        let mut ss: Vec<Signature> = sigs
            .into_iter()
            .filter(|s| committee.contains(&s.vk))
            .collect();

        let valid = ss
            .iter()
            .filter(|s| s.verify(&s.vk, &cons_hash).is_ok())
            .count();
        if valid < t + 1 {
            return Err(BlockError::InsufficientSignatures {
                got: valid,
                need: t + 1,
            });
        }

        ss.sort_by_key(|s| s.vk);
        ss.dedup_by_key(|s| s.vk);

        let inner = CpBlockInner {
            prev,
            seq,
            round: cons.round,
            cons_hash,
            ss,
            p,
        };
        let s = keypair.sign_digest(&inner.hash());

        Ok(CpBlock { inner, s })
    }

    /// Used only by the genesis builder, which has no committee to check.
    pub(crate) fn unchecked(keypair: &Keypair, inner: CpBlockInner) -> Self {
        let s = keypair.sign_digest(&inner.hash());
        CpBlock { inner, s }
    }

    pub fn owner(&self) -> NodeId {
        self.s.vk
    }

    pub fn round(&self) -> Round {
        self.inner.round
    }

    pub fn seq(&self) -> SeqNum {
        self.inner.seq
    }

    pub fn prev(&self) -> Digest {
        self.inner.prev
    }

    pub fn is_genesis(&self) -> bool {
        self.inner.round == 0
    }

    /// Block digest: the signed inner record plus the owner signature.
    pub fn hash(&self) -> Digest {
        let mut bytes = self.inner.digest_bytes();
        bytes.extend_from_slice(&self.s.to_bytes());
        Digest::sha256(&bytes)
    }

    /// Verifies the owner signature, and for non-genesis blocks that at
    /// least `t + 1` committee signatures cover the consensus digest.
    pub fn validate(&self, committee: &[NodeId], t: usize) -> Result<()> {
        self.s
            .verify(&self.s.vk, &self.inner.hash())
            .map_err(|_| BlockError::BadSignature(self.s.vk))?;

        if self.is_genesis() {
            return Ok(());
        }

        let valid = self
            .inner
            .ss
            .iter()
            .filter(|s| committee.contains(&s.vk))
            .filter(|s| s.verify(&s.vk, &self.inner.cons_hash).is_ok())
            .count();
        if valid < t + 1 {
            return Err(BlockError::InsufficientSignatures {
                got: valid,
                need: t + 1,
            });
        }
        Ok(())
    }
}
