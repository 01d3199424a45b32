use primitives::Digest;
use reed_solomon_erasure::galois_8::ReedSolomon;

use crate::result::{ConsensusError, Result};

/// Reed-Solomon codec with the committee parameters `k = n - 2t` data
/// shards and `m = 2t` parity shards; any `k` of the `n` fragments
/// recover the payload.
///
/// The payload is length-prefixed (u32 LE) and zero-padded so every
/// shard has equal size.
pub struct ErasureCodec {
    rs: ReedSolomon,
    k: usize,
    m: usize,
}

impl std::fmt::Debug for ErasureCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErasureCodec")
            .field("k", &self.k)
            .field("m", &self.m)
            .finish()
    }
}

impl ErasureCodec {
    pub fn new(n: usize, t: usize) -> Result<Self> {
        let k = n.saturating_sub(2 * t);
        let m = 2 * t;
        let rs = ReedSolomon::new(k, m).map_err(|_| ConsensusError::BadCodingParams { k, m })?;
        Ok(ErasureCodec { rs, k, m })
    }

    pub fn fragment_count(&self) -> usize {
        self.k + self.m
    }

    /// Splits `payload` into `n` fragments, fragment `i` addressed to
    /// committee member `i`.
    pub fn encode(&self, payload: &[u8]) -> Result<Vec<Vec<u8>>> {
        let prefixed_len = payload.len() + 4;
        let shard_size = prefixed_len.div_ceil(self.k).max(1);

        let mut data = Vec::with_capacity(shard_size * self.k);
        data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        data.extend_from_slice(payload);
        data.resize(shard_size * self.k, 0);

        let mut shards: Vec<Vec<u8>> = data.chunks(shard_size).map(<[u8]>::to_vec).collect();
        shards.resize(self.k + self.m, vec![0u8; shard_size]);

        self.rs
            .encode(&mut shards)
            .map_err(|e| ConsensusError::DecodeFailed(e.to_string()))?;
        Ok(shards)
    }

    /// Recovers the payload from any `k` fragments, indexed by committee
    /// position, and checks it against the advertised root digest.
    pub fn decode(&self, fragments: &[(usize, Vec<u8>)], root: &Digest) -> Result<Vec<u8>> {
        let mut shards: Vec<Option<Vec<u8>>> = vec![None; self.k + self.m];
        for (idx, fragment) in fragments {
            if *idx < shards.len() {
                shards[*idx] = Some(fragment.clone());
            }
        }

        self.rs
            .reconstruct(&mut shards)
            .map_err(|e| ConsensusError::DecodeFailed(e.to_string()))?;

        let mut data = Vec::new();
        for shard in shards.into_iter().take(self.k).flatten() {
            data.extend_from_slice(&shard);
        }
        if data.len() < 4 {
            return Err(ConsensusError::DecodeFailed("short payload".to_string()));
        }

        let len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if data.len() < len + 4 {
            return Err(ConsensusError::DecodeFailed(
                "length prefix exceeds data".to_string(),
            ));
        }
        let payload = data[4..len + 4].to_vec();

        if Digest::sha256(&payload) != *root {
            return Err(ConsensusError::BadHash);
        }
        Ok(payload)
    }
}
