use rand::RngCore;

/// Consensus round counter. Genesis checkpoints carry round 0.
pub type Round = u64;

/// Position of a block in its owner's chain, genesis at 0.
pub type SeqNum = u64;

pub const NONCE_LENGTH: usize = 32;

/// Random value shared by the two halves of a transaction pair.
pub type Nonce = [u8; NONCE_LENGTH];

pub fn random_nonce() -> Nonce {
    let mut nonce = [0u8; NONCE_LENGTH];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Default committee size `n` used by ACS and erasure coding.
pub const DEFAULT_COMMITTEE_SIZE: usize = 4;

/// Default Byzantine bound `t` inside the committee.
pub const DEFAULT_BYZANTINE_BOUND: usize = 1;

/// Seed bytes hashed into the `prev` pointer of every genesis block.
pub const GENESIS_PREV_SEED: &[u8] = b"0";
