use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use block::{Cons, CpBlock, TxBlock};
use consensus::{Acs, AcsOutput, Coin, Outcome, SharedCoinTape, Step, Target};
use messages::{Instruction, Message};
use primitives::{random_nonce, NodeId, Round, SeqNum};
use rand::seq::SliceRandom;
use rand::Rng;
use telemetry::{debug, info, warn};
use trust_config::NodeConfig;
use trust_core::{Keypair, Signature};
use trustchain::{ChainError, TrustChain};

use crate::result::{NodeError, Result};
use crate::stats::TrafficStats;
use crate::transport::Transport;

/// Pause new transactions once this many per committee member await
/// verification.
const PENDING_TX_FACTOR: usize = 20;

/// Periodic summary log interval.
const SUMMARY_INTERVAL_SECS: u64 = 20;

/// Everything collected for one consensus round before the local
/// checkpoint can be cut: the agreed result, promoter signatures over
/// it, and the checkpoints peers sent for the next proposal.
#[derive(Debug, Default)]
pub struct RoundState {
    pub cons: Option<Cons>,
    pub sigs: BTreeMap<NodeId, Signature>,
    pub cps: Vec<CpBlock>,
    asked: bool,
    started_at: Option<Instant>,
}

impl RoundState {
    /// Records an agreed result. Returns whether it was new; a result
    /// conflicting with the stored one is an error (promoters of the
    /// same round never disagree).
    fn new_cons(&mut self, cons: Cons) -> Result<bool> {
        match &self.cons {
            None => {
                self.cons = Some(cons);
                Ok(true)
            }
            Some(existing) if *existing == cons => Ok(false),
            Some(_) => Err(ChainError::ConsMismatch(cons.round).into()),
        }
    }

    fn new_sig(&mut self, s: Signature) -> bool {
        if self.sigs.contains_key(&s.vk) {
            return false;
        }
        self.sigs.insert(s.vk, s);
        true
    }

    /// Stores a peer checkpoint for the next proposal, one per owner.
    fn new_cp(&mut self, cp: CpBlock) {
        if self.cps.iter().all(|existing| existing.owner() != cp.owner()) {
            self.cps.push(cp);
        }
    }

    fn touch(&mut self, now: Instant) {
        self.started_at.get_or_insert(now);
    }
}

/// Drives the consensus rounds for one node: collects checkpoints, runs
/// ACS when in the committee, gathers signatures on the output, appends
/// the local checkpoint and rotates the promoter set.
pub struct TrustChainRunner {
    config: NodeConfig,
    tc: TrustChain,
    transport: Arc<dyn Transport>,
    coin: Arc<dyn Coin + Send + Sync>,

    /// Whole population, sorted, self included.
    peers: Vec<NodeId>,
    promoters: Vec<NodeId>,
    acs: Option<Acs>,
    round_states: BTreeMap<Round, RoundState>,
    /// ACS start scheduled after the settle delay.
    pending_acs: Option<(Round, Instant)>,
    bootstrapping: bool,

    instruction: Option<Instruction>,
    next_tx_at: Option<Instant>,
    next_validation_at: Option<Instant>,
    validation_enabled: bool,
    last_summary_at: Option<Instant>,

    pub stats: TrafficStats,
}

impl TrustChainRunner {
    pub fn new(
        keypair: Keypair,
        config: NodeConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.protocol.validate()?;
        Ok(TrustChainRunner {
            config,
            tc: TrustChain::new(keypair),
            transport,
            coin: Arc::new(SharedCoinTape),
            peers: vec![],
            promoters: vec![],
            acs: None,
            round_states: BTreeMap::new(),
            pending_acs: None,
            bootstrapping: false,
            instruction: None,
            next_tx_at: None,
            next_validation_at: None,
            validation_enabled: false,
            last_summary_at: None,
            stats: TrafficStats::new(),
        })
    }

    pub fn vk(&self) -> NodeId {
        self.tc.vk()
    }

    pub fn tc(&self) -> &TrustChain {
        &self.tc
    }

    pub fn tc_mut(&mut self) -> &mut TrustChain {
        &mut self.tc
    }

    pub fn promoters(&self) -> &[NodeId] {
        &self.promoters
    }

    pub fn is_promoter(&self) -> bool {
        self.promoters.contains(&self.tc.vk())
    }

    pub fn latest_round(&self) -> Round {
        self.tc.latest_round()
    }

    fn n(&self) -> usize {
        self.config.protocol.n
    }

    fn t(&self) -> usize {
        self.config.protocol.t
    }

    /// Installs the peer table from the (external) discovery service.
    pub fn set_peers(&mut self, mut peers: Vec<NodeId>) {
        if !peers.contains(&self.tc.vk()) {
            peers.push(self.tc.vk());
        }
        peers.sort();
        peers.dedup();
        self.peers = peers;
    }

    /// All nodes are online: the first `n` ids in sorted order form the
    /// bootstrap committee and everyone sends them its genesis block.
    pub fn bootstrap(&mut self, now: Instant) -> Result<()> {
        self.promoters = self.peers.iter().take(self.n()).copied().collect();
        self.round_states.entry(0).or_default().touch(now);

        let genesis = self.tc.genesis().clone();
        self.multicast(&self.promoters.clone(), Message::Cp { cp: genesis })?;
        self.bootstrapping = true;
        info!(
            promoters = self.promoters.len(),
            "TC: bootstrap, genesis sent to initial committee"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // message entry point

    pub fn handle_message(
        &mut self,
        from: NodeId,
        msg: Message,
        now: Instant,
    ) -> Result<Outcome<()>> {
        match msg {
            Message::Ping { .. } => {
                let reply = Message::Pong {
                    vk: self.tc.vk(),
                    port: self.config.listen_port,
                };
                self.send(&from, reply)?;
                Ok(Outcome::handled())
            }
            Message::Pong { .. } => Ok(Outcome::handled()),
            Message::Dummy { m } => {
                debug!(from = %from.short(), bytes = m.len(), "got dummy message");
                Ok(Outcome::handled())
            }

            Message::Acs(inner) => self.handle_acs(from, inner, now),
            Message::Bracha(_) | Message::Mo14(_) => {
                // standalone protocol instances are a harness concern;
                // consensus traffic arrives inside the ACS envelope
                debug!(from = %from.short(), "ignoring standalone consensus message");
                Ok(Outcome::handled())
            }

            Message::TxReq { tx } => self.handle_tx_req(from, tx),
            Message::TxResp { seq, tx } => self.handle_tx_resp(from, seq, tx),
            Message::ValidationReq {
                seq,
                seq_counterparty,
            } => self.handle_validation_req(from, seq, seq_counterparty),
            Message::ValidationResp { seq, pieces, .. } => {
                self.tc.verify_tx(seq, &pieces)?;
                Ok(Outcome::handled())
            }

            Message::Cp { cp } => self.handle_cp(from, cp, now),
            Message::SigWithRound { s, r } => self.handle_sig(from, s, r, now),
            Message::Cons { cons } => self.handle_cons(from, cons, now),
            Message::AskCons { r } => self.handle_ask_cons(from, r),

            Message::Instruction(instruction) => {
                self.apply_instruction(instruction, now);
                Ok(Outcome::handled())
            }
            Message::Discover { .. } | Message::DiscoverReply { .. } => {
                // the discovery exchange belongs to the bootstrap service
                debug!(from = %from.short(), "ignoring discovery message");
                Ok(Outcome::handled())
            }
        }
    }

    // ------------------------------------------------------------------
    // consensus: ACS plumbing

    fn handle_acs(
        &mut self,
        from: NodeId,
        msg: consensus::AcsMessage,
        now: Instant,
    ) -> Result<Outcome<()>> {
        if self.config.is_omitting() {
            return Ok(Outcome::handled());
        }

        let Some(acs) = self.acs.as_mut() else {
            return if msg.round > self.tc.latest_round() {
                // a committee member that has not opened this round yet
                Ok(Outcome::Replay)
            } else {
                Ok(Outcome::handled())
            };
        };

        let (outcome, step) = acs.handle(from, msg)?;
        self.dispatch_acs_step(step)?;

        match outcome {
            Outcome::Replay => Ok(Outcome::Replay),
            Outcome::Handled(Some(output)) => {
                self.handle_cons_from_acs(output, now)?;
                Ok(Outcome::handled())
            }
            Outcome::Handled(None) => Ok(Outcome::handled()),
        }
    }

    /// ACS finished: collate the agreed checkpoint bundles into a
    /// `Cons`, hand the result to the committees and sign it.
    fn handle_cons_from_acs(&mut self, output: AcsOutput, now: Instant) -> Result<()> {
        let r = output.round;
        let mut blocks: Vec<CpBlock> = vec![];
        for (proposer, bytes) in &output.values {
            match bincode::deserialize::<Vec<CpBlock>>(bytes) {
                Ok(cps) => blocks.extend(cps),
                Err(e) => {
                    // a Byzantine proposal; the agreed set tolerates it
                    warn!(proposer = %proposer.short(), %e, "TC: undecodable ACS entry");
                }
            }
        }

        let cons = Cons::new(r, blocks);
        info!(round = r, cp_count = cons.count(), "TC: handling cons from ACS");

        self.round_states.entry(r).or_default().touch(now);
        self.round_state_new_cons(r, cons.clone())?;

        let future_promoters = cons.get_promoters(self.n());
        self.multicast(&future_promoters, Message::Cons { cons: cons.clone() })?;
        self.gossip(Message::Cons { cons: cons.clone() }, &future_promoters)?;

        let s = self.tc.sign(&cons.hash());
        let mut sig_set = future_promoters;
        for p in self.promoters.clone() {
            if !sig_set.contains(&p) {
                sig_set.push(p);
            }
        }
        self.multicast(&sig_set, Message::SigWithRound { s, r })?;
        self.gossip(Message::SigWithRound { s, r }, &sig_set)?;

        // signatures may already be buffered for this round
        self.try_add_cp(r, now)
    }

    fn round_state_new_cons(&mut self, r: Round, cons: Cons) -> Result<bool> {
        self.round_states.entry(r).or_default().new_cons(cons)
    }

    fn handle_sig(
        &mut self,
        from: NodeId,
        s: Signature,
        r: Round,
        now: Instant,
    ) -> Result<Outcome<()>> {
        debug!(from = %from.short(), r, "TC: received signature");
        if r >= self.tc.latest_round() {
            let state = self.round_states.entry(r).or_default();
            state.touch(now);
            if state.new_sig(s) {
                self.try_add_cp(r, now)?;
                self.gossip(Message::SigWithRound { s, r }, &[from])?;
            }
        }
        Ok(Outcome::handled())
    }

    fn handle_cp(&mut self, from: NodeId, cp: CpBlock, now: Instant) -> Result<Outcome<()>> {
        debug!(from = %from.short(), round = cp.round(), "TC: received checkpoint");
        if cp.owner() != from {
            return Err(block::BlockError::BadSignature(cp.owner()).into());
        }
        cp.s
            .verify(&cp.owner(), &cp.inner.hash())
            .map_err(|_| block::BlockError::BadSignature(cp.owner()))?;
        if cp.round() >= self.tc.latest_round() {
            let state = self.round_states.entry(cp.round()).or_default();
            state.touch(now);
            state.new_cp(cp);
        }
        Ok(Outcome::handled())
    }

    fn handle_cons(&mut self, from: NodeId, cons: Cons, now: Instant) -> Result<Outcome<()>> {
        debug!(from = %from.short(), round = cons.round, "TC: received cons");
        if cons.round >= self.tc.latest_round() {
            let r = cons.round;
            self.round_states.entry(r).or_default().touch(now);
            if self.round_state_new_cons(r, cons.clone())? {
                self.try_add_cp(r, now)?;
                self.gossip(Message::Cons { cons }, &[from])?;
            }
        }
        Ok(Outcome::handled())
    }

    /// A node that saw enough signatures but no result polls a random
    /// promoter; promoters answer unconditionally.
    fn handle_ask_cons(&mut self, from: NodeId, r: Round) -> Result<Outcome<()>> {
        if let Some(cons) = self.tc.cons(r) {
            let msg = Message::Cons { cons: cons.clone() };
            self.send(&from, msg)?;
        }
        Ok(Outcome::handled())
    }

    /// Cuts the local checkpoint for round `r` once both the agreed
    /// result and `t + 1` signatures are in.
    fn try_add_cp(&mut self, r: Round, now: Instant) -> Result<()> {
        if self.tc.latest_round() >= r {
            return Ok(());
        }
        let need = self.t() + 1;
        let state = self.round_states.entry(r).or_default();
        if state.sigs.len() < need {
            return Ok(());
        }
        if state.cons.is_none() {
            // enough signatures but no result: poll one promoter, once
            if !state.asked {
                state.asked = true;
                info!(round = r, "TC: no consensus result yet, asking a promoter");
                if let Some(promoter) = self
                    .promoters
                    .clone()
                    .choose(&mut rand::thread_rng())
                    .copied()
                {
                    self.send(&promoter, Message::AskCons { r })?;
                }
            }
            return Ok(());
        }

        self.add_cp(r, now)
    }

    fn add_cp(&mut self, r: Round, now: Instant) -> Result<()> {
        let state = self.round_states.entry(r).or_default();
        let Some(cons) = state.cons.clone() else {
            return Ok(());
        };
        let sigs: Vec<Signature> = state.sigs.values().copied().collect();
        let started_at = state.started_at;

        let prev_cp_digest = self.tc.latest_cp().hash();
        let committee = self.promoters.clone();
        if let Err(e) = self.tc.new_cp(1, cons.clone(), sigs, &committee, self.t()) {
            warn!(round = r, %e, "TC: could not cut checkpoint");
            return Ok(());
        }
        if self.tc.cp_agreed_round(&prev_cp_digest).is_none() {
            info!(round = r, "TC: my previous CP not in consensus");
        }

        self.promoters = cons.get_promoters(self.n());
        let (sent, sent_bytes, recv, recv_bytes) = self.stats.round_delta();
        info!(
            round = r,
            cp_count = cons.count(),
            duration_secs = started_at.map(|t| now.duration_since(t).as_secs()),
            sent,
            sent_bytes,
            recv,
            recv_bytes,
            "TC: round closed"
        );
        info!(
            round = r,
            promoters = %self
                .promoters
                .iter()
                .map(|p| p.short())
                .collect::<Vec<_>>()
                .join(","),
            "TC: updated promoters"
        );

        // consensus instances for this or earlier rounds are settled
        if self.acs.as_ref().is_some_and(|acs| acs.round() <= r) {
            self.acs = None;
        }

        let own_cp = self.tc.latest_cp().clone();
        self.multicast(&self.promoters.clone(), Message::Cp { cp: own_cp.clone() })?;

        if self.is_promoter() && !self.config.is_omitting() {
            self.round_states.entry(r).or_default().new_cp(own_cp);
            self.pending_acs = Some((r + 1, now + self.config.consensus_delay));
            info!(round = r, "TC: promoter, next round scheduled");
        } else {
            info!(round = r, "TC: not a promoter");
        }
        Ok(())
    }

    fn start_acs(&mut self, round: Round, now: Instant) -> Result<()> {
        if self.config.is_omitting() {
            return Ok(());
        }
        if self.tc.latest_round() >= round {
            info!(round, "TC: round already closed by someone else, not starting");
            self.acs = None;
            return Ok(());
        }

        let cps = self
            .round_states
            .get(&(round - 1))
            .map(|state| state.cps.clone())
            .unwrap_or_default();
        info!(round, cp_count = cps.len(), "TC: starting ACS");

        let mut acs = Acs::new(
            self.tc.vk(),
            round,
            self.promoters.clone(),
            self.t(),
            Arc::clone(&self.coin),
            self.config.is_byzantine(),
        )?;
        let payload = bincode::serialize(&cps)?;
        let step = acs.start(&payload)?;
        self.acs = Some(acs);
        self.round_states.entry(round).or_default().touch(now);
        self.dispatch_acs_step(step)
    }

    fn dispatch_acs_step(&mut self, step: Step<consensus::AcsMessage>) -> Result<()> {
        if self.config.is_omitting() {
            return Ok(());
        }
        for (target, m) in step.messages {
            let msg = Message::Acs(m);
            match target {
                Target::All => self.multicast(&self.promoters.clone(), msg)?,
                Target::Node(to) => self.send(&to, msg)?,
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // transactions & validation

    fn handle_tx_req(&mut self, from: NodeId, tx: TxBlock) -> Result<Outcome<()>> {
        let initiator_seq = tx.seq();
        let own_half = self.tc.receive_tx(from, tx)?;
        self.send(
            &from,
            Message::TxResp {
                seq: initiator_seq,
                tx: own_half,
            },
        )?;
        Ok(Outcome::handled())
    }

    fn handle_tx_resp(&mut self, from: NodeId, seq: SeqNum, tx: TxBlock) -> Result<Outcome<()>> {
        if tx.owner() != from {
            return Err(block::BlockError::BadSignature(tx.owner()).into());
        }
        self.tc.add_other_half(seq, tx)?;
        Ok(Outcome::handled())
    }

    /// Creates one transaction with `counterparty`, throttled by the
    /// pending-unverified bound.
    pub fn make_tx(&mut self, counterparty: NodeId) -> Result<()> {
        if self.validation_enabled
            && self.tc.verifiable_txs().len() > PENDING_TX_FACTOR * self.n()
        {
            info!("TC: throttling transaction creation");
            return Ok(());
        }

        // typical transaction sized payload
        let len = rand::thread_rng().gen_range(400..=600);
        let m: Vec<u8> = (0..len).map(|_| rand::random::<u8>()).collect();

        self.make_tx_with(counterparty, m, random_nonce()).map(|_| ())
    }

    /// Creates and sends one transaction with explicit payload and
    /// nonce, returning the local seq.
    pub fn make_tx_with(
        &mut self,
        counterparty: NodeId,
        m: Vec<u8>,
        nonce: primitives::Nonce,
    ) -> Result<SeqNum> {
        if counterparty == self.tc.vk() {
            return Err(NodeError::Other("cannot transact with myself".to_string()));
        }

        let seq = self.tc.new_tx(counterparty, m, nonce)?;
        let tx = self
            .tc
            .tx(seq)
            .cloned()
            .ok_or(ChainError::NotATransaction(seq))?;
        self.send(&counterparty, Message::TxReq { tx })?;
        Ok(seq)
    }

    /// Starts the validation protocol for the transaction at `seq`,
    /// consulting the fragment cache first.
    pub fn send_validation_req(&mut self, seq: SeqNum) -> Result<()> {
        if self.tc.verify_tx_from_cache(seq) {
            return Ok(());
        }

        let latest_round = self.tc.latest_round();
        let Some(tx) = self.tc.tx_mut(seq) else {
            return Err(ChainError::NotATransaction(seq).into());
        };
        let Some(other_half) = tx.other_half.as_deref() else {
            return Err(ChainError::MissingOtherHalf(seq).into());
        };
        let counterparty = tx.inner.counterparty;
        let seq_counterparty = other_half.seq();
        tx.request_sent_round = Some(latest_round);

        if self.config.ignore_promoters && self.promoters.contains(&counterparty) {
            return Ok(());
        }

        debug!(seq, seq_counterparty, to = %counterparty.short(), "TC: sent validation request");
        self.send(
            &counterparty,
            Message::ValidationReq {
                seq,
                seq_counterparty,
            },
        )?;
        Ok(())
    }

    fn handle_validation_req(
        &mut self,
        from: NodeId,
        seq: SeqNum,
        seq_counterparty: SeqNum,
    ) -> Result<Outcome<()>> {
        let pieces = self.tc.agreed_pieces(seq_counterparty);
        if pieces.is_empty() {
            // the enclosing round has not been agreed yet; the requester
            // will retry in a later round
            warn!(
                seq_counterparty,
                known_rounds = ?self.tc.known_rounds().collect::<Vec<_>>(),
                "TC: no agreed pieces to answer with"
            );
            return Ok(Outcome::handled());
        }

        self.send(
            &from,
            Message::ValidationResp {
                seq,
                seq_counterparty,
                pieces,
            },
        )?;
        Ok(Outcome::handled())
    }

    /// One validation sweep: pick a random pending transaction and ask
    /// its counterparty for proof, at most once per round per tx.
    pub fn validation_sweep(&mut self) -> Result<()> {
        if self.config.ignore_promoters && self.is_promoter() {
            return Ok(());
        }
        let latest_round = self.tc.latest_round();
        if latest_round < 2 {
            return Ok(());
        }

        let candidates: Vec<SeqNum> = self
            .tc
            .verifiable_txs()
            .into_iter()
            .filter(|seq| {
                self.tc
                    .tx(*seq)
                    .map(|tx| tx.request_sent_round != Some(latest_round))
                    .unwrap_or(false)
            })
            .collect();

        if let Some(seq) = candidates.choose(&mut rand::thread_rng()).copied() {
            self.send_validation_req(seq)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // timers

    fn apply_instruction(&mut self, instruction: Instruction, now: Instant) {
        info!(?instruction, "TC: received instruction");
        let delay = std::time::Duration::from_millis(instruction.delay_ms);
        if instruction.wants_tx() {
            self.next_tx_at = Some(now + delay);
        }
        if instruction.wants_validation() {
            self.validation_enabled = true;
            self.next_validation_at = Some(now + delay);
        }
        self.instruction = Some(instruction);
    }

    /// The node's timer tick: bootstrap completion, scheduled ACS
    /// starts, state pruning, transaction and validation intervals.
    pub fn on_tick(&mut self, now: Instant) -> Result<()> {
        if self.bootstrapping {
            self.bootstrap_tick(now)?;
        }

        if let Some((round, at)) = self.pending_acs {
            if now >= at {
                self.pending_acs = None;
                self.start_acs(round, now)?;
            }
        }

        self.collect_rubbish();

        if self.next_tx_at.is_some_and(|at| now >= at) {
            let interval = self
                .instruction
                .and_then(|i| i.param)
                .map(std::time::Duration::from_millis)
                .unwrap_or(self.config.tx_interval);
            self.next_tx_at = Some(now + interval);
            if let Some(counterparty) = self.pick_tx_counterparty() {
                self.make_tx(counterparty)?;
            }
        }

        if self.next_validation_at.is_some_and(|at| now >= at) {
            self.next_validation_at = Some(now + self.config.validation_interval);
            self.validation_sweep()?;
        }

        let due = self
            .last_summary_at
            .map(|at| now.duration_since(at).as_secs() >= SUMMARY_INTERVAL_SECS)
            .unwrap_or(true);
        if due {
            self.last_summary_at = Some(now);
            info!(
                tx_count = self.tc.tx_count(),
                validated = self.tc.validated_tx_count(),
                "TC: summary"
            );
        }
        Ok(())
    }

    fn bootstrap_tick(&mut self, now: Instant) -> Result<()> {
        if !self.is_promoter() {
            self.bootstrapping = false;
            return Ok(());
        }
        let got = self
            .round_states
            .get(&0)
            .map(|state| state.cps.len())
            .unwrap_or(0);
        if got >= self.n() {
            self.bootstrapping = false;
            self.start_acs(1, now)?;
        } else {
            debug!(got, need = self.n(), "TC: bootstrap waiting for genesis blocks");
        }
        Ok(())
    }

    /// Round state below the latest closed round is never read again.
    fn collect_rubbish(&mut self) {
        let latest = self.tc.latest_round();
        self.round_states.retain(|r, _| *r >= latest);
    }

    fn pick_tx_counterparty(&mut self) -> Option<NodeId> {
        let me = self.tc.vk();
        if self.config.ignore_promoters && self.is_promoter() {
            return None;
        }

        let random = self
            .instruction
            .map(|i| i.random_counterparty())
            .unwrap_or(false);
        if random {
            let candidates: Vec<NodeId> = self
                .peers
                .iter()
                .filter(|p| **p != me)
                .filter(|p| !self.config.ignore_promoters || !self.promoters.contains(p))
                .copied()
                .collect();
            return candidates.choose(&mut rand::thread_rng()).copied();
        }

        // fixed pairing: the node at an even index transacts with its
        // odd successor
        let idx = self.peers.iter().position(|p| *p == me)?;
        if idx % 2 == 0 {
            self.peers.get(idx + 1).copied()
        } else {
            None
        }
    }

    // ------------------------------------------------------------------
    // sending

    fn send(&mut self, to: &NodeId, msg: Message) -> Result<()> {
        self.stats.record_sent(&msg);
        self.transport.send(to, msg)
    }

    fn multicast(&mut self, targets: &[NodeId], msg: Message) -> Result<()> {
        for target in targets {
            self.send(target, msg.clone())?;
        }
        Ok(())
    }

    /// Forwards `msg` to a few random peers outside `exclude`.
    fn gossip(&mut self, msg: Message, exclude: &[NodeId]) -> Result<()> {
        let me = self.tc.vk();
        let mut candidates: Vec<NodeId> = self
            .peers
            .iter()
            .filter(|p| **p != me && !exclude.contains(p))
            .copied()
            .collect();
        candidates.shuffle(&mut rand::thread_rng());
        candidates.truncate(self.config.gossip_fanout);

        for target in candidates {
            self.send(&target, msg.clone())?;
        }
        Ok(())
    }
}
