use std::collections::{BTreeMap, BTreeSet};

use primitives::{Digest, NodeId};
use serde::{Deserialize, Serialize};
use telemetry::debug;

use crate::erasure::ErasureCodec;
use crate::result::{ConsensusError, Result};
use crate::step::{Outcome, Step};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrachaMessage {
    /// Sender disperses fragment `i` to committee member `i`.
    Init { root: Digest, fragment: Vec<u8> },
    /// A member re-broadcasts the fragment it was dealt.
    Echo { root: Digest, fragment: Vec<u8> },
    Ready { root: Digest },
}

impl BrachaMessage {
    pub fn root(&self) -> &Digest {
        match self {
            BrachaMessage::Init { root, .. }
            | BrachaMessage::Echo { root, .. }
            | BrachaMessage::Ready { root } => root,
        }
    }
}

/// One instance of Bracha reliable broadcast with erasure-coded
/// dispersal. Delivers exactly once; every honest committee member
/// delivers the same value.
#[derive(Debug)]
pub struct Bracha {
    committee: Vec<NodeId>,
    t: usize,
    codec: ErasureCodec,

    root: Option<Digest>,
    /// Echoed fragments keyed by sender; the sender's committee index is
    /// the shard index.
    fragments: BTreeMap<NodeId, Vec<u8>>,
    readies: BTreeSet<NodeId>,
    value: Option<Vec<u8>>,
    got_init: bool,
    sent_echo: bool,
    sent_ready: bool,
    delivered: bool,
}

impl Bracha {
    pub fn new(committee: Vec<NodeId>, t: usize) -> Result<Self> {
        let codec = ErasureCodec::new(committee.len(), t)?;
        Ok(Bracha {
            committee,
            t,
            codec,
            root: None,
            fragments: BTreeMap::new(),
            readies: BTreeSet::new(),
            value: None,
            got_init: false,
            sent_echo: false,
            sent_ready: false,
            delivered: false,
        })
    }

    fn n(&self) -> usize {
        self.committee.len()
    }

    fn member_index(&self, vk: &NodeId) -> Result<usize> {
        self.committee
            .iter()
            .position(|member| member == vk)
            .ok_or(ConsensusError::NotACommitteeMember(*vk))
    }

    /// Initiates the broadcast: erasure-codes `payload` and deals one
    /// fragment per committee member, keyed by the payload digest.
    pub fn bcast_init(&mut self, payload: &[u8]) -> Result<Step<BrachaMessage>> {
        let root = Digest::sha256(payload);
        let fragments = self.codec.encode(payload)?;
        debug!(root = %root.short(), "Bracha: initiate dispersal");

        let mut step = Step::new();
        for (member, fragment) in self.committee.clone().into_iter().zip(fragments) {
            step.send(member, BrachaMessage::Init { root, fragment });
        }
        Ok(step)
    }

    pub fn handle(
        &mut self,
        from: NodeId,
        msg: BrachaMessage,
    ) -> Result<(Outcome<Vec<u8>>, Step<BrachaMessage>)> {
        let mut step = Step::new();
        if self.delivered {
            return Ok((Outcome::handled(), step));
        }
        self.member_index(&from)?;

        // bind the instance to the first root seen, drop the rest
        let root = *msg.root();
        match self.root {
            None => self.root = Some(root),
            Some(bound) if bound != root => {
                debug!(
                    bound = %bound.short(),
                    got = %root.short(),
                    "Bracha: mismatching root, discarding"
                );
                return Ok((Outcome::handled(), step));
            }
            Some(_) => {}
        }

        match msg {
            BrachaMessage::Init { fragment, .. } => {
                if !self.got_init {
                    self.got_init = true;
                    if !self.sent_echo {
                        self.sent_echo = true;
                        step.broadcast(BrachaMessage::Echo { root, fragment });
                    }
                }
            }
            BrachaMessage::Echo { fragment, .. } => {
                self.fragments.entry(from).or_insert(fragment);

                if self.fragments.len() >= self.n() - self.t && self.value.is_none() {
                    let value = self.reconstruct(&root)?;
                    debug!(root = %root.short(), "Bracha: erasure decoded value");
                    self.value = Some(value);
                    if !self.sent_ready {
                        self.sent_ready = true;
                        step.broadcast(BrachaMessage::Ready { root });
                    }
                }
            }
            BrachaMessage::Ready { .. } => {
                self.readies.insert(from);

                // amplification
                if self.readies.len() >= self.t + 1 && !self.sent_ready {
                    self.sent_ready = true;
                    step.broadcast(BrachaMessage::Ready { root });
                }
            }
        }

        if self.readies.len() >= 2 * self.t + 1
            && self.fragments.len() >= self.n() - 2 * self.t
        {
            if self.value.is_none() {
                self.value = Some(self.reconstruct(&root)?);
            }
            self.delivered = true;
            let value = self
                .value
                .clone()
                .unwrap_or_else(|| unreachable!("value reconstructed above"));
            debug!(root = %root.short(), bytes = value.len(), "Bracha: DELIVER");
            return Ok((Outcome::delivered(value), step));
        }

        Ok((Outcome::handled(), step))
    }

    fn reconstruct(&self, root: &Digest) -> Result<Vec<u8>> {
        let indexed: Vec<(usize, Vec<u8>)> = self
            .fragments
            .iter()
            .filter_map(|(vk, fragment)| {
                self.member_index(vk).ok().map(|idx| (idx, fragment.clone()))
            })
            .collect();
        self.codec.decode(&indexed, root)
    }

    pub fn delivered(&self) -> bool {
        self.delivered
    }
}
