use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use primitives::{NodeId, Round};
use serde::{Deserialize, Serialize};
use telemetry::debug;

use crate::coin::Coin;
use crate::result::Result;
use crate::step::{Outcome, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mo14Message {
    Est { r: Round, v: bool },
    Aux { r: Round, v: bool },
}

impl Mo14Message {
    pub fn round(&self) -> Round {
        match self {
            Mo14Message::Est { r, .. } | Mo14Message::Aux { r, .. } => *r,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mo14State {
    Start,
    Aux,
    Stopped,
}

/// Per-round vote sets, one set of signers per bit.
#[derive(Debug, Default)]
struct VoteSets {
    votes: [BTreeSet<NodeId>; 2],
}

impl VoteSets {
    fn add(&mut self, v: bool, vk: NodeId) {
        self.votes[v as usize].insert(vk);
    }

    fn count(&self, v: bool) -> usize {
        self.votes[v as usize].len()
    }

    fn union_count(&self) -> usize {
        self.votes[0].union(&self.votes[1]).count()
    }
}

/// Mostéfaoui-Moumen-Raynal binary Byzantine agreement, driven by the
/// external coin tape. Rounds restart until the single accepted value
/// matches the coin.
pub struct Mo14 {
    n: usize,
    t: usize,
    coin: Arc<dyn Coin + Send + Sync>,
    /// Byzantine failure injection: broadcast random bits.
    byzantine: bool,

    r: Round,
    state: Mo14State,
    est_values: HashMap<Round, VoteSets>,
    aux_values: HashMap<Round, VoteSets>,
    /// `(round, value)` pairs this node has already BV-echoed.
    echoed: HashSet<(Round, bool)>,
    /// Whether the aux for the current round went out.
    sent_aux: HashSet<Round>,
    bin_values: HashMap<Round, [bool; 2]>,
    decided: Option<bool>,
    /// Rounds answered with the decided value after stopping, so
    /// laggards behind the decision point keep their vote quorum.
    term_echoed: HashSet<Round>,
}

impl std::fmt::Debug for Mo14 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mo14")
            .field("r", &self.r)
            .field("state", &self.state)
            .field("decided", &self.decided)
            .finish()
    }
}

impl Mo14 {
    pub fn new(n: usize, t: usize, coin: Arc<dyn Coin + Send + Sync>, byzantine: bool) -> Self {
        Mo14 {
            n,
            t,
            coin,
            byzantine,
            r: 0,
            state: Mo14State::Start,
            est_values: HashMap::new(),
            aux_values: HashMap::new(),
            echoed: HashSet::new(),
            sent_aux: HashSet::new(),
            bin_values: HashMap::new(),
            decided: None,
            term_echoed: HashSet::new(),
        }
    }

    pub fn started(&self) -> bool {
        self.r > 0
    }

    pub fn decided(&self) -> Option<bool> {
        self.decided
    }

    /// Enters round 1 with the initial estimate.
    pub fn start(&mut self, v: bool) -> Step<Mo14Message> {
        let mut step = Step::new();
        self.r = 1;
        self.state = Mo14State::Start;
        self.bcast_est(v, &mut step);
        debug!(v, "Mo14: initial estimate broadcast");
        step
    }

    pub fn handle(
        &mut self,
        from: NodeId,
        msg: Mo14Message,
    ) -> Result<(Outcome<bool>, Step<Mo14Message>)> {
        let mut step = Step::new();
        if self.state == Mo14State::Stopped {
            // echo the decision into rounds still running elsewhere,
            // once per round, so stragglers retain an n - t quorum
            if let Some(v) = self.decided {
                let rr = msg.round();
                if rr >= self.r && self.term_echoed.insert(rr) {
                    step.broadcast(Mo14Message::Est { r: rr, v });
                    step.broadcast(Mo14Message::Aux { r: rr, v });
                }
            }
            return Ok((Outcome::handled(), step));
        }

        let r = msg.round();
        if r < self.r {
            return Ok((Outcome::handled(), step));
        }
        if r > self.r || !self.started() {
            // not ready for this round yet; no state is touched so the
            // dispatcher can re-deliver the message verbatim
            return Ok((Outcome::Replay, step));
        }

        match msg {
            Mo14Message::Est { v, .. } => {
                self.est_values.entry(r).or_default().add(v, from);
                self.update_bin_values(v, &mut step);

                if self.state == Mo14State::Start {
                    if let Some(w) = self.first_bin_value() {
                        self.state = Mo14State::Aux;
                        if self.sent_aux.insert(self.r) {
                            self.bcast_aux(w, &mut step);
                        }
                    }
                }
            }
            Mo14Message::Aux { v, .. } => {
                self.aux_values.entry(r).or_default().add(v, from);
            }
        }

        if self.state == Mo14State::Aux {
            if let Some(vals) = self.accepted_values() {
                let s = self.coin.flip(self.r);
                debug!(round = self.r, coin = s, ?vals, "Mo14: coin state");

                let est = match vals {
                    AcceptedValues::Single(v) if v == s => {
                        debug!(round = self.r, v, "Mo14: DECIDED");
                        self.decided = Some(v);
                        self.state = Mo14State::Stopped;
                        self.drop_round_state();
                        return Ok((Outcome::delivered(v), step));
                    }
                    AcceptedValues::Single(v) => v,
                    AcceptedValues::Both => s,
                };

                // restart with the new estimate
                self.r += 1;
                self.state = Mo14State::Start;
                self.bcast_est(est, &mut step);
                debug!(round = self.r, est, "Mo14: next round");
            }
        }

        Ok((Outcome::handled(), step))
    }

    /// BV broadcast: echo a value backed by `t + 1` distinct voters, and
    /// promote it into `bin_values` at `2t + 1`.
    fn update_bin_values(&mut self, v: bool, step: &mut Step<Mo14Message>) {
        let count = self.est_values.entry(self.r).or_default().count(v);

        if count >= self.t + 1 && !self.echoed.contains(&(self.r, v)) {
            self.bcast_est(v, step);
        }
        if count >= 2 * self.t + 1 {
            self.bin_values.entry(self.r).or_default()[v as usize] = true;
        }
    }

    fn first_bin_value(&self) -> Option<bool> {
        let bin = self.bin_values.get(&self.r)?;
        if bin[1] {
            Some(true)
        } else if bin[0] {
            Some(false)
        } else {
            None
        }
    }

    /// The `vals` set accepted from the aux votes of this round, when a
    /// quorum of `n - t` backs it.
    fn accepted_values(&self) -> Option<AcceptedValues> {
        let bin = self.bin_values.get(&self.r)?;
        let aux = self.aux_values.get(&self.r)?;
        let quorum = self.n - self.t;

        match (bin[0], bin[1]) {
            (true, false) if aux.count(false) >= quorum => Some(AcceptedValues::Single(false)),
            (false, true) if aux.count(true) >= quorum => Some(AcceptedValues::Single(true)),
            (true, true) => {
                if aux.union_count() >= quorum {
                    Some(AcceptedValues::Both)
                } else if aux.count(false) >= quorum {
                    Some(AcceptedValues::Single(false))
                } else if aux.count(true) >= quorum {
                    Some(AcceptedValues::Single(true))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn bcast_est(&mut self, v: bool, step: &mut Step<Mo14Message>) {
        let v = self.maybe_flip(v);
        self.echoed.insert((self.r, v));
        step.broadcast(Mo14Message::Est { r: self.r, v });
    }

    fn bcast_aux(&mut self, v: bool, step: &mut Step<Mo14Message>) {
        let v = self.maybe_flip(v);
        step.broadcast(Mo14Message::Aux { r: self.r, v });
    }

    fn maybe_flip(&self, v: bool) -> bool {
        if self.byzantine {
            rand::random()
        } else {
            v
        }
    }

    /// Vote sets are only needed while the instance runs; once stopped
    /// they would otherwise grow with every straggler round.
    fn drop_round_state(&mut self) {
        self.est_values.clear();
        self.aux_values.clear();
        self.bin_values.clear();
        self.echoed.clear();
        self.sent_aux.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptedValues {
    Single(bool),
    Both,
}
