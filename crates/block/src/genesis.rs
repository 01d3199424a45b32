use primitives::{Digest, GENESIS_PREV_SEED};
use trust_core::Keypair;

use crate::cons::Cons;
use crate::cp_block::{CpBlock, CpBlockInner};

/// Every chain starts with a checkpoint at round 0 carrying no
/// signatures, a candidacy flag of 1, and a distinguished prev pointer.
/// Its consensus digest anchors to the empty round-0 agreement.
pub fn generate_genesis_block(keypair: &Keypair) -> CpBlock {
    let inner = CpBlockInner {
        prev: Digest::sha256(GENESIS_PREV_SEED),
        seq: 0,
        round: 0,
        cons_hash: Cons::new(0, vec![]).hash(),
        ss: vec![],
        p: 1,
    };
    CpBlock::unchecked(keypair, inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_shape() {
        let keypair = Keypair::random();
        let genesis = generate_genesis_block(&keypair);

        assert!(genesis.is_genesis());
        assert_eq!(genesis.round(), 0);
        assert_eq!(genesis.seq(), 0);
        assert_eq!(genesis.inner.p, 1);
        assert!(genesis.inner.ss.is_empty());
        assert_eq!(genesis.prev(), Digest::sha256(b"0"));
        assert_eq!(genesis.owner(), keypair.node_id());
    }

    #[test]
    fn genesis_validates_without_committee() {
        let keypair = Keypair::random();
        let genesis = generate_genesis_block(&keypair);
        genesis.validate(&[], 1).unwrap();
    }

    #[test]
    fn distinct_owners_distinct_digests() {
        let a = generate_genesis_block(&Keypair::random());
        let b = generate_genesis_block(&Keypair::random());
        assert_ne!(a.hash(), b.hash());
    }
}
