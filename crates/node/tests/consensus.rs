use node::test_utils::{test_config, TestNet};
use trust_config::{FailureMode, NodeConfig};

fn all_reached_round(net: &TestNet, round: u64, skip: Option<usize>) -> bool {
    net.nodes
        .iter()
        .enumerate()
        .filter(|(idx, _)| Some(*idx) != skip)
        .all(|(_, node)| node.runner.latest_round() >= round)
}

#[test]
fn single_round_clean() {
    let mut net = TestNet::new(4, |_| test_config(4));
    net.bootstrap_all();

    assert!(
        net.run_until(50, |net| all_reached_round(net, 1, None)),
        "round 1 did not close"
    );

    let reference = net.runner(0).tc().cons(1).cloned().expect("cons for round 1");
    assert_eq!(reference.count(), 4, "all four genesis blocks agreed");

    for idx in 0..4 {
        let runner = net.runner(idx);
        let cp = runner
            .tc()
            .chain()
            .get(1)
            .and_then(block::Block::as_cp)
            .expect("own checkpoint at seq 1");
        assert_eq!(cp.round(), 1);
        assert_eq!(cp.seq(), 1);

        // every promoter agreed on the identical result
        assert_eq!(runner.tc().cons(1), Some(&reference));

        // with four candidates carrying the flag, the next committee is
        // the whole population, whatever the luck ordering
        let mut promoters = runner.promoters().to_vec();
        promoters.sort();
        assert_eq!(promoters, net.ids);
    }
}

#[test]
fn one_omission_still_closes_the_round() {
    let silent = 3usize;
    let mut net = TestNet::new(4, |idx| NodeConfig {
        failure: (idx == silent).then_some(FailureMode::Omission),
        ..test_config(4)
    });
    net.bootstrap_all();

    assert!(
        net.run_until(100, |net| all_reached_round(net, 1, Some(silent))),
        "honest nodes did not close round 1"
    );

    let reference = net
        .runner(0)
        .tc()
        .cons(1)
        .cloned()
        .expect("cons for round 1");
    assert!(
        reference.count() >= 3,
        "agreed set must hold at least n - t inputs, got {}",
        reference.count()
    );

    for idx in 0..3 {
        let runner = net.runner(idx);
        assert!(runner.latest_round() >= 1, "node {idx} stuck");
        assert_eq!(runner.tc().cons(1), Some(&reference));
        assert_eq!(runner.tc().chain().cp_count(), runner.latest_round() as usize);
    }
}

#[test]
fn one_byzantine_agreement_participant() {
    let byzantine = 3usize;
    let mut net = TestNet::new(4, |idx| NodeConfig {
        failure: (idx == byzantine).then_some(FailureMode::Byzantine),
        ..test_config(4)
    });
    net.bootstrap_all();

    assert!(
        net.run_until(300, |net| all_reached_round(net, 1, Some(byzantine))),
        "honest nodes did not terminate with a byzantine member"
    );

    let reference = net
        .runner(0)
        .tc()
        .cons(1)
        .cloned()
        .expect("cons for round 1");
    for idx in 0..3 {
        assert_eq!(
            net.runner(idx).tc().cons(1),
            Some(&reference),
            "honest node {idx} disagrees"
        );
    }
}

#[test]
fn rounds_keep_rotating() {
    let mut net = TestNet::new(4, |_| test_config(4));
    net.bootstrap_all();

    assert!(
        net.run_until(200, |net| all_reached_round(net, 3, None)),
        "consensus stalled before round 3"
    );

    // chain linkage holds across the grown chain
    for idx in 0..4 {
        let chain = net.runner(idx).tc().chain();
        let blocks: Vec<_> = chain.iter().collect();
        for pair in blocks.windows(2) {
            assert_eq!(pair[1].prev(), pair[0].hash());
            assert_eq!(pair[1].seq(), pair[0].seq() + 1);
        }
    }
}
