use std::collections::BTreeMap;
use std::sync::Arc;

use primitives::{NodeId, Round};
use serde::{Deserialize, Serialize};
use telemetry::{debug, info};

use crate::bracha::{Bracha, BrachaMessage};
use crate::coin::Coin;
use crate::mo14::{Mo14, Mo14Message};
use crate::result::{ConsensusError, Result};
use crate::step::{Outcome, Step};

/// Envelope for all consensus traffic of one ACS round. `instance` is
/// the verification key of the member whose proposal the inner protocol
/// concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcsMessage {
    pub instance: NodeId,
    pub round: Round,
    pub body: AcsBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcsBody {
    Bracha(BrachaMessage),
    Mo14(Mo14Message),
}

/// The agreed common subset: for every committee member whether its
/// proposal made it in, and the delivered proposals themselves. Up to
/// `t` accepted entries may lack a delivered value locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcsOutput {
    pub round: Round,
    pub set: BTreeMap<NodeId, bool>,
    pub values: BTreeMap<NodeId, Vec<u8>>,
}

/// Asynchronous common subset: one reliable broadcast and one binary
/// agreement per committee member, all tagged with the same round.
pub struct Acs {
    me: NodeId,
    round: Round,
    committee: Vec<NodeId>,
    t: usize,
    brachas: BTreeMap<NodeId, Bracha>,
    mo14s: BTreeMap<NodeId, Mo14>,
    bracha_results: BTreeMap<NodeId, Vec<u8>>,
    mo14_results: BTreeMap<NodeId, bool>,
    /// Input this node fed into each BA, once provided.
    mo14_provided: BTreeMap<NodeId, bool>,
    done: bool,
}

impl std::fmt::Debug for Acs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acs")
            .field("round", &self.round)
            .field("rbc_delivered", &self.bracha_results.len())
            .field("ba_decided", &self.mo14_results.len())
            .field("done", &self.done)
            .finish()
    }
}

impl Acs {
    pub fn new(
        me: NodeId,
        round: Round,
        committee: Vec<NodeId>,
        t: usize,
        coin: Arc<dyn Coin + Send + Sync>,
        byzantine: bool,
    ) -> Result<Self> {
        let n = committee.len();
        let mut brachas = BTreeMap::new();
        let mut mo14s = BTreeMap::new();
        for member in &committee {
            brachas.insert(*member, Bracha::new(committee.clone(), t)?);
            mo14s.insert(*member, Mo14::new(n, t, Arc::clone(&coin), byzantine));
        }

        Ok(Acs {
            me,
            round,
            committee,
            t,
            brachas,
            mo14s,
            bracha_results: BTreeMap::new(),
            mo14_results: BTreeMap::new(),
            mo14_provided: BTreeMap::new(),
            done: false,
        })
    }

    pub fn round(&self) -> Round {
        self.round
    }

    pub fn done(&self) -> bool {
        self.done
    }

    fn n(&self) -> usize {
        self.committee.len()
    }

    /// Proposes this node's input by initiating its own reliable
    /// broadcast instance.
    pub fn start(&mut self, input: &[u8]) -> Result<Step<AcsMessage>> {
        let me = self.me;
        let round = self.round;
        let bracha = self
            .brachas
            .get_mut(&me)
            .ok_or(ConsensusError::UnknownInstance(me))?;

        info!(round, bytes = input.len(), "ACS: proposing input");
        Ok(bracha.bcast_init(input)?.map(|body| AcsMessage {
            instance: me,
            round,
            body: AcsBody::Bracha(body),
        }))
    }

    pub fn handle(
        &mut self,
        from: NodeId,
        msg: AcsMessage,
    ) -> Result<(Outcome<AcsOutput>, Step<AcsMessage>)> {
        let mut step = Step::new();
        if self.done {
            return Ok((Outcome::handled(), step));
        }

        if msg.round < self.round {
            return Ok((Outcome::handled(), step));
        }
        if msg.round > self.round {
            return Ok((Outcome::Replay, step));
        }

        if !self.committee.contains(&from) {
            return Err(ConsensusError::NotACommitteeMember(from));
        }
        let instance = msg.instance;
        if !self.committee.contains(&instance) {
            return Err(ConsensusError::UnknownInstance(instance));
        }

        match msg.body {
            AcsBody::Bracha(body) => {
                let bracha = self
                    .brachas
                    .get_mut(&instance)
                    .ok_or(ConsensusError::UnknownInstance(instance))?;
                let (outcome, inner) = bracha.handle(from, body)?;
                step.extend(Self::wrap_bracha(instance, self.round, inner));

                if let Outcome::Handled(Some(value)) = outcome {
                    debug!(round = self.round, instance = %instance.short(), "ACS: RBC delivered");
                    self.bracha_results.insert(instance, value);

                    if !self.mo14_provided.contains_key(&instance) {
                        self.mo14_provided.insert(instance, true);
                        let inner = self.start_ba(&instance, true)?;
                        step.extend(inner);
                    }
                }
            }
            AcsBody::Mo14(body) => {
                if !self.mo14_provided.contains_key(&instance) {
                    // BA traffic before the matching RBC delivered: the
                    // caller replays it once the instance is live
                    return Ok((Outcome::Replay, step));
                }

                let ba = self
                    .mo14s
                    .get_mut(&instance)
                    .ok_or(ConsensusError::UnknownInstance(instance))?;
                let (outcome, inner) = ba.handle(from, body)?;
                step.extend(Self::wrap_mo14(instance, self.round, inner));

                match outcome {
                    Outcome::Replay => return Ok((Outcome::Replay, step)),
                    Outcome::Handled(Some(decision)) => {
                        debug!(
                            round = self.round,
                            instance = %instance.short(),
                            decision,
                            "ACS: BA decided"
                        );
                        self.mo14_results.insert(instance, decision);

                        // enough accepted proposals: vote the remaining
                        // instances out with input 0
                        let ones = self.mo14_results.values().filter(|v| **v).count();
                        if ones >= self.n() - self.t {
                            for member in self.committee.clone() {
                                if !self.mo14_provided.contains_key(&member) {
                                    self.mo14_provided.insert(member, false);
                                    let inner = self.start_ba(&member, false)?;
                                    step.extend(inner);
                                }
                            }
                        }
                    }
                    Outcome::Handled(None) => {}
                }
            }
        }

        if self.mo14_results.len() == self.n() {
            self.done = true;
            let output = self.output();
            info!(
                round = self.round,
                accepted = output.set.values().filter(|v| **v).count(),
                delivered = output.values.len(),
                "ACS: DONE"
            );
            return Ok((Outcome::delivered(output), step));
        }

        Ok((Outcome::handled(), step))
    }

    fn start_ba(&mut self, instance: &NodeId, input: bool) -> Result<Step<AcsMessage>> {
        let round = self.round;
        let ba = self
            .mo14s
            .get_mut(instance)
            .ok_or(ConsensusError::UnknownInstance(*instance))?;
        debug!(round, instance = %instance.short(), input, "ACS: starting BA");
        Ok(Self::wrap_mo14(*instance, round, ba.start(input)))
    }

    fn wrap_bracha(instance: NodeId, round: Round, step: Step<BrachaMessage>) -> Step<AcsMessage> {
        step.map(|body| AcsMessage {
            instance,
            round,
            body: AcsBody::Bracha(body),
        })
    }

    fn wrap_mo14(instance: NodeId, round: Round, step: Step<Mo14Message>) -> Step<AcsMessage> {
        step.map(|body| AcsMessage {
            instance,
            round,
            body: AcsBody::Mo14(body),
        })
    }

    fn output(&self) -> AcsOutput {
        let values = self
            .bracha_results
            .iter()
            .filter(|(vk, _)| self.mo14_results.get(*vk).copied().unwrap_or(false))
            .map(|(vk, v)| (*vk, v.clone()))
            .collect();
        AcsOutput {
            round: self.round,
            set: self.mo14_results.clone(),
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use crate::coin::SharedCoinTape;
    use crate::step::Target;

    struct Sim {
        committee: Vec<NodeId>,
        nodes: Vec<Acs>,
        queue: VecDeque<(NodeId, NodeId, AcsMessage)>,
        outputs: Vec<Option<AcsOutput>>,
        silent: Option<usize>,
    }

    impl Sim {
        fn new(n: usize, t: usize, round: Round) -> Self {
            let committee: Vec<NodeId> =
                (0..n as u8).map(|i| NodeId::from_bytes([i; 32])).collect();
            let coin: Arc<dyn Coin + Send + Sync> = Arc::new(SharedCoinTape);
            let nodes = committee
                .iter()
                .map(|me| {
                    Acs::new(*me, round, committee.clone(), t, Arc::clone(&coin), false).unwrap()
                })
                .collect();
            Sim {
                committee,
                nodes,
                queue: VecDeque::new(),
                outputs: vec![None; n],
                silent: None,
            }
        }

        fn index(&self, vk: &NodeId) -> usize {
            self.committee.iter().position(|m| m == vk).unwrap()
        }

        fn enqueue(&mut self, from: NodeId, step: Step<AcsMessage>) {
            if Some(self.index(&from)) == self.silent {
                return;
            }
            for (target, msg) in step.messages {
                match target {
                    Target::All => {
                        for member in self.committee.clone() {
                            self.queue.push_back((from, member, msg.clone()));
                        }
                    }
                    Target::Node(to) => self.queue.push_back((from, to, msg)),
                }
            }
        }

        fn start_all(&mut self) {
            for i in 0..self.nodes.len() {
                if Some(i) == self.silent {
                    continue;
                }
                let me = self.committee[i];
                let input = format!("proposal from {i}").into_bytes();
                let step = self.nodes[i].start(&input).unwrap();
                self.enqueue(me, step);
            }
        }

        fn run(&mut self) {
            let mut budget = 2_000_000;
            let mut replays_in_a_row = 0usize;
            while let Some((from, to, msg)) = self.queue.pop_front() {
                budget -= 1;
                assert!(budget > 0, "simulation did not converge");

                let idx = self.index(&to);
                if Some(idx) == self.silent {
                    continue;
                }
                let (outcome, step) = self.nodes[idx].handle(from, msg.clone()).unwrap();
                match outcome {
                    Outcome::Handled(Some(output)) => {
                        self.outputs[idx] = Some(output);
                        replays_in_a_row = 0;
                    }
                    Outcome::Replay => {
                        replays_in_a_row += 1;
                        // queue full of permanently stuck replays
                        if replays_in_a_row > self.queue.len() + 1 {
                            break;
                        }
                        self.queue.push_back((from, to, msg));
                    }
                    Outcome::Handled(None) => replays_in_a_row = 0,
                }
                self.enqueue(to, step);
            }
        }
    }

    #[test]
    fn all_members_agree_on_the_same_subset() {
        let mut sim = Sim::new(4, 1, 1);
        sim.start_all();
        sim.run();

        let first = sim.outputs[0].clone().expect("node 0 must complete");
        assert_eq!(first.set.len(), 4);
        assert!(first.values.len() >= 3);
        for output in &sim.outputs {
            assert_eq!(output.as_ref(), Some(&first));
        }
    }

    #[test]
    fn one_omitting_member_is_voted_out() {
        let mut sim = Sim::new(4, 1, 1);
        sim.silent = Some(3);
        sim.start_all();
        sim.run();

        let silent_vk = sim.committee[3];
        let mut completed = 0;
        for idx in 0..3 {
            let output = sim.outputs[idx].as_ref().expect("honest node must complete");
            assert_eq!(output.set.get(&silent_vk), Some(&false));
            assert!(output.values.len() >= 3);
            assert!(!output.values.contains_key(&silent_vk));
            completed += 1;
        }
        assert_eq!(completed, 3);
    }

    #[test]
    fn wrong_round_messages_drop_or_replay() {
        let committee: Vec<NodeId> = (0..4u8).map(|i| NodeId::from_bytes([i; 32])).collect();
        let coin: Arc<dyn Coin + Send + Sync> = Arc::new(SharedCoinTape);
        let mut acs = Acs::new(
            committee[0],
            2,
            committee.clone(),
            1,
            coin,
            false,
        )
        .unwrap();

        let stale = AcsMessage {
            instance: committee[1],
            round: 1,
            body: AcsBody::Mo14(Mo14Message::Est { r: 1, v: true }),
        };
        let (outcome, _) = acs.handle(committee[1], stale).unwrap();
        assert_eq!(outcome, Outcome::handled());

        let future = AcsMessage {
            instance: committee[1],
            round: 3,
            body: AcsBody::Mo14(Mo14Message::Est { r: 1, v: true }),
        };
        let (outcome, _) = acs.handle(committee[1], future).unwrap();
        assert_eq!(outcome, Outcome::Replay);
    }

    #[test]
    fn ba_before_rbc_replays() {
        let committee: Vec<NodeId> = (0..4u8).map(|i| NodeId::from_bytes([i; 32])).collect();
        let coin: Arc<dyn Coin + Send + Sync> = Arc::new(SharedCoinTape);
        let mut acs = Acs::new(
            committee[0],
            1,
            committee.clone(),
            1,
            coin,
            false,
        )
        .unwrap();

        let early = AcsMessage {
            instance: committee[1],
            round: 1,
            body: AcsBody::Mo14(Mo14Message::Est { r: 1, v: true }),
        };
        let (outcome, _) = acs.handle(committee[1], early).unwrap();
        assert_eq!(outcome, Outcome::Replay);
    }
}
