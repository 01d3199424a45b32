use std::time::Duration;

use block::Validity;
use node::test_utils::{test_config, TestNet};
use primitives::random_nonce;
use trust_config::NodeConfig;

fn all_reached_round(net: &TestNet, round: u64) -> bool {
    net.nodes
        .iter()
        .all(|node| node.runner.latest_round() >= round)
}

/// Close round 1, lay five transactions between two checkpoints, then
/// drive consensus far enough that both enclosing checkpoints are
/// agreed and validate the middle transaction.
#[test]
fn validation_with_enclosing_checkpoints() {
    let mut net = TestNet::new(4, |_| test_config(4));
    net.bootstrap_all();
    assert!(net.run_until(50, |net| all_reached_round(net, 1)));

    let b_vk = net.ids[1];
    let mut seqs = vec![];
    for i in 0..5 {
        let seq = net
            .runner_mut(0)
            .make_tx_with(b_vk, format!("tx-{i}").into_bytes(), random_nonce())
            .unwrap();
        seqs.push(seq);
        // no ticks in between: the halves exchange while consensus is
        // parked, so all five land inside one segment
        net.settle();
    }

    assert!(
        net.run_until(200, |net| all_reached_round(net, 3)),
        "consensus stalled before the enclosure was agreed"
    );

    let middle = seqs[2];
    net.runner_mut(0).send_validation_req(middle).unwrap();
    net.settle();

    let a = net.runner(0).tc();
    assert_eq!(a.tx(middle).unwrap().validity, Validity::Valid);

    // the whole enclosing segment landed in the cache: cp + 5 tx + cp
    assert_eq!(a.cache().fragment_count(&b_vk), 7);

    // and the cached segment settled the neighbouring transactions too
    for seq in &seqs {
        assert_eq!(
            a.tx(*seq).unwrap().validity,
            Validity::Valid,
            "tx at seq {seq} should verify from cache"
        );
    }
}

/// Ask for validation before the following checkpoint is agreed: the
/// counterparty has no agreed pieces to answer with, the verdict stays
/// `Unknown` and nothing is corrupted.
#[test]
fn validation_before_the_round_closes() {
    // park consensus after the bootstrap round
    let mut net = TestNet::new(4, |_| NodeConfig {
        consensus_delay: Duration::from_secs(3600),
        ..test_config(4)
    });
    net.bootstrap_all();
    assert!(net.run_until(50, |net| all_reached_round(net, 1)));

    let b_vk = net.ids[1];
    let seq = net
        .runner_mut(0)
        .make_tx_with(b_vk, b"too early".to_vec(), random_nonce())
        .unwrap();
    net.settle();

    let b_len_before = net.runner(1).tc().chain().len();

    net.runner_mut(0).send_validation_req(seq).unwrap();
    net.settle();

    let a = net.runner(0).tc();
    assert_eq!(a.tx(seq).unwrap().validity, Validity::Unknown);
    assert_eq!(a.cache().fragment_count(&b_vk), 0);
    // the request was spent for this round
    assert_eq!(a.tx(seq).unwrap().request_sent_round, Some(1));

    // the counterparty answered nothing and its chain is untouched
    assert_eq!(net.runner(1).tc().chain().len(), b_len_before);
}

/// The sweep gates on round progress and one request per round.
#[test]
fn validation_sweep_gating() {
    let mut net = TestNet::new(4, |_| NodeConfig {
        consensus_delay: Duration::from_secs(3600),
        ..test_config(4)
    });
    net.bootstrap_all();
    assert!(net.run_until(50, |net| all_reached_round(net, 1)));

    let b_vk = net.ids[1];
    net.runner_mut(0)
        .make_tx_with(b_vk, b"gated".to_vec(), random_nonce())
        .unwrap();
    net.settle();

    // latest round is 1: the sweep must not fire at all
    net.runner_mut(0).validation_sweep().unwrap();
    net.settle();
    assert_eq!(
        net.runner(0).tc().tx(2).unwrap().request_sent_round,
        None,
        "sweep must wait for round 2"
    );
}
