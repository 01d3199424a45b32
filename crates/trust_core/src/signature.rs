use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use primitives::{Digest, NodeId};
use serde::{Deserialize, Serialize};

use crate::keypair::{KeypairError, Result};

/// A verification key paired with a signature over a single 32-byte digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub vk: NodeId,
    sig: ed25519_dalek::Signature,
}

impl Signature {
    pub(crate) fn sign(signing: &SigningKey, vk: NodeId, digest: &Digest) -> Self {
        Signature {
            vk,
            sig: signing.sign(digest.as_bytes()),
        }
    }

    /// Canonical byte form (signer key followed by the raw signature),
    /// used when signatures feed a block digest.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(96);
        bytes.extend_from_slice(self.vk.as_bytes());
        bytes.extend_from_slice(&self.sig.to_bytes());
        bytes
    }

    /// Verifies that this signature was produced by `expected_vk` over
    /// `digest`. A mismatching signer key counts as a bad signature.
    pub fn verify(&self, expected_vk: &NodeId, digest: &Digest) -> Result<()> {
        if *expected_vk != self.vk {
            return Err(KeypairError::BadSignature(self.vk));
        }

        let vk = VerifyingKey::from_bytes(self.vk.as_bytes())
            .map_err(|_| KeypairError::InvalidPublicKey)?;

        vk.verify(digest.as_bytes(), &self.sig)
            .map_err(|_| KeypairError::BadSignature(self.vk))
    }
}
