use primitives::{Digest, NodeId, Nonce, Round, SeqNum};
use serde::{Deserialize, Serialize};
use trust_core::{Keypair, Signature};

use crate::error::{BlockError, Result};

/// Validation state of a transaction block. Transitions are monotone:
/// once `Valid` or `Invalid`, later writes are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Validity {
    #[default]
    Unknown,
    Valid,
    Invalid,
}

/// The signed value of a transaction block. Field order is the canonical
/// hashing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxBlockInner {
    pub prev: Digest,
    pub seq: SeqNum,
    pub counterparty: NodeId,
    pub nonce: Nonce,
    pub m: Vec<u8>,
}

impl TxBlockInner {
    fn digest_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(32 + 8 + 32 + 32 + 8 + self.m.len());
        bytes.extend_from_slice(self.prev.as_bytes());
        bytes.extend_from_slice(&self.seq.to_be_bytes());
        bytes.extend_from_slice(self.counterparty.as_bytes());
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&(self.m.len() as u64).to_be_bytes());
        bytes.extend_from_slice(&self.m);
        bytes
    }

    pub fn hash(&self) -> Digest {
        Digest::sha256(&self.digest_bytes())
    }
}

/// One half of a matched transaction pair. The counterparty's half is
/// attached later and never feeds the block digest, so chain linkage is
/// stable from the moment the block is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxBlock {
    pub inner: TxBlockInner,
    pub sig: Signature,

    #[serde(skip)]
    pub other_half: Option<Box<TxBlock>>,

    #[serde(skip)]
    pub validity: Validity,

    /// Round in which the last validation request for this block went
    /// out, if any. Gates re-requests to one per round.
    #[serde(skip)]
    pub request_sent_round: Option<Round>,
}

impl TxBlock {
    pub fn new(
        keypair: &Keypair,
        prev: Digest,
        seq: SeqNum,
        counterparty: NodeId,
        nonce: Nonce,
        m: Vec<u8>,
    ) -> Self {
        let inner = TxBlockInner {
            prev,
            seq,
            counterparty,
            nonce,
            m,
        };
        let sig = keypair.sign_digest(&inner.hash());

        TxBlock {
            inner,
            sig,
            other_half: None,
            validity: Validity::Unknown,
            request_sent_round: None,
        }
    }

    pub fn owner(&self) -> NodeId {
        self.sig.vk
    }

    pub fn seq(&self) -> SeqNum {
        self.inner.seq
    }

    pub fn prev(&self) -> Digest {
        self.inner.prev
    }

    /// Block digest: the signed inner record plus the owner signature.
    pub fn hash(&self) -> Digest {
        let mut bytes = self.inner.digest_bytes();
        bytes.extend_from_slice(&self.sig.to_bytes());
        Digest::sha256(&bytes)
    }

    /// Checks that this block is signed by `owner` over its inner record.
    pub fn verify_owner(&self, owner: &NodeId) -> Result<()> {
        self.sig
            .verify(owner, &self.inner.hash())
            .map_err(|_| BlockError::BadSignature(self.sig.vk))
    }

    /// Attaches the counterparty's half. `owner` is this block's owner.
    ///
    /// The halves must carry the same nonce and payload, name each other
    /// as counterparties, and each be signed by its declared owner.
    pub fn add_other_half(&mut self, owner: &NodeId, half: TxBlock) -> Result<()> {
        if self.other_half.is_some() {
            return Err(BlockError::Aborted);
        }

        if half.inner.nonce != self.inner.nonce || half.inner.m != self.inner.m {
            return Err(BlockError::BadHash(
                "transaction halves disagree on nonce or payload".to_string(),
            ));
        }
        if half.inner.counterparty != *owner {
            return Err(BlockError::BadHash(
                "counterparty half names a different owner".to_string(),
            ));
        }

        half.verify_owner(&self.inner.counterparty)?;

        self.other_half = Some(Box::new(half));
        Ok(())
    }
}
