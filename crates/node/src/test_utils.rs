//! In-memory wiring for multi-node tests: a router that stands in for
//! the TCP transport, and a deterministic network harness that drives
//! message delivery and virtual time by hand.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use messages::Message;
use primitives::NodeId;
use trust_config::NodeConfig;
use trust_core::Keypair;

use crate::dispatcher::Dispatcher;
use crate::result::Result;
use crate::runner::TrustChainRunner;
use crate::transport::Transport;

/// Swallows everything; for tests that never read the wire.
pub struct NullTransport;

impl Transport for NullTransport {
    fn send(&self, _to: &NodeId, _msg: Message) -> Result<()> {
        Ok(())
    }
}

type Inboxes = Arc<Mutex<HashMap<NodeId, VecDeque<(NodeId, Vec<u8>)>>>>;

/// Routes encoded frames between registered inboxes. Frames really do
/// pass through the wire codec, so tests exercise the same encode and
/// decode paths a TCP run would.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inboxes: Inboxes,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, vk: NodeId) {
        self.inboxes.lock().unwrap().entry(vk).or_default();
    }

    pub fn transport(&self, me: NodeId) -> MemoryTransport {
        self.register(me);
        MemoryTransport {
            me,
            inboxes: Arc::clone(&self.inboxes),
        }
    }

    pub fn drain(&self, vk: &NodeId) -> Vec<(NodeId, Vec<u8>)> {
        self.inboxes
            .lock()
            .unwrap()
            .get_mut(vk)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn pending_frames(&self) -> usize {
        self.inboxes.lock().unwrap().values().map(VecDeque::len).sum()
    }
}

pub struct MemoryTransport {
    me: NodeId,
    inboxes: Inboxes,
}

impl Transport for MemoryTransport {
    fn send(&self, to: &NodeId, msg: Message) -> Result<()> {
        let frame = msg.encode()?;
        self.inboxes
            .lock()
            .unwrap()
            .entry(*to)
            .or_default()
            .push_back((self.me, frame));
        Ok(())
    }
}

pub struct TestNode {
    pub runner: TrustChainRunner,
    pub dispatcher: Dispatcher,
}

/// A whole population wired over a [`MemoryNetwork`] with virtual time.
/// Nodes are ordered by ascending id, so `nodes[..n]` is the bootstrap
/// committee.
pub struct TestNet {
    pub network: MemoryNetwork,
    pub nodes: Vec<TestNode>,
    pub ids: Vec<NodeId>,
    now: Instant,
}

impl TestNet {
    pub fn new(population: usize, make_config: impl Fn(usize) -> NodeConfig) -> Self {
        let network = MemoryNetwork::new();

        let mut keypairs: Vec<Keypair> = (0..population).map(|_| Keypair::random()).collect();
        keypairs.sort_by_key(Keypair::node_id);
        let ids: Vec<NodeId> = keypairs.iter().map(Keypair::node_id).collect();

        let nodes = keypairs
            .into_iter()
            .enumerate()
            .map(|(idx, keypair)| {
                let transport = Arc::new(network.transport(keypair.node_id()));
                let mut runner =
                    TrustChainRunner::new(keypair, make_config(idx), transport).unwrap();
                runner.set_peers(ids.clone());
                TestNode {
                    runner,
                    dispatcher: Dispatcher::new(),
                }
            })
            .collect();

        TestNet {
            network,
            nodes,
            ids,
            now: Instant::now(),
        }
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn runner(&self, idx: usize) -> &TrustChainRunner {
        &self.nodes[idx].runner
    }

    pub fn runner_mut(&mut self, idx: usize) -> &mut TrustChainRunner {
        &mut self.nodes[idx].runner
    }

    pub fn bootstrap_all(&mut self) {
        let now = self.now;
        for node in &mut self.nodes {
            node.runner.bootstrap(now).unwrap();
        }
    }

    /// Delivers in-flight frames until the network is quiet. Virtual
    /// time does not advance, so no timers fire in between.
    pub fn settle(&mut self) {
        let mut budget = 1_000_000u64;
        loop {
            let mut delivered = false;
            for idx in 0..self.nodes.len() {
                let vk = self.ids[idx];
                for (from, frame) in self.network.drain(&vk) {
                    budget -= 1;
                    assert!(budget > 0, "network did not quiesce");
                    delivered = true;

                    let msg = Message::decode(&frame).unwrap();
                    let node = &mut self.nodes[idx];
                    node.runner.stats.record_received(frame.len());
                    node.dispatcher.dispatch(&mut node.runner, from, msg, self.now);
                }
            }
            if !delivered {
                break;
            }
        }
    }

    /// Advances virtual time and runs every node's tick: replay-queue
    /// drain first, then the timer work.
    pub fn tick(&mut self, advance: Duration) {
        self.now += advance;
        let now = self.now;
        for node in &mut self.nodes {
            node.dispatcher.drain_replays(&mut node.runner, now);
            node.runner.on_tick(now).unwrap();
        }
    }

    /// Alternates settling and ticking until `pred` holds or the tick
    /// budget runs out. Returns whether the predicate was reached.
    pub fn run_until(&mut self, max_ticks: usize, pred: impl Fn(&TestNet) -> bool) -> bool {
        for _ in 0..max_ticks {
            self.settle();
            if pred(self) {
                return true;
            }
            self.tick(Duration::from_millis(100));
        }
        self.settle();
        pred(self)
    }
}

/// A config suitable for fast deterministic tests: the settle delay is
/// shorter than one virtual tick.
pub fn test_config(population: usize) -> NodeConfig {
    NodeConfig {
        protocol: trust_config::ProtocolConfig::new(4, 1, population).unwrap(),
        consensus_delay: Duration::from_millis(10),
        ..NodeConfig::default()
    }
}
