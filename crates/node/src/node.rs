use std::time::{Duration, Instant};

use messages::Message;
use primitives::NodeId;
use telemetry::warn;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::dispatcher::Dispatcher;
use crate::result::Result;
use crate::runner::TrustChainRunner;

/// Wire frames handed to the node by its transport, tagged with the
/// authenticated sender.
pub type InboundFrame = (NodeId, Vec<u8>);

const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// The single logical task of a node: one queue carries inbound frames,
/// timer ticks drain the replay queue and drive the round timers. All
/// state mutation happens here; the transport only feeds the channel.
pub struct Node {
    runner: TrustChainRunner,
    dispatcher: Dispatcher,
    inbox: UnboundedReceiver<InboundFrame>,
}

impl Node {
    pub fn new(runner: TrustChainRunner) -> (Self, UnboundedSender<InboundFrame>) {
        let (tx, rx) = unbounded_channel();
        (
            Node {
                runner,
                dispatcher: Dispatcher::new(),
                inbox: rx,
            },
            tx,
        )
    }

    pub fn runner(&self) -> &TrustChainRunner {
        &self.runner
    }

    pub fn runner_mut(&mut self) -> &mut TrustChainRunner {
        &mut self.runner
    }

    /// Runs until the transport side of the inbox is dropped.
    pub async fn run(mut self) -> Result<()> {
        let mut tick = tokio::time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                maybe_frame = self.inbox.recv() => match maybe_frame {
                    Some((from, frame)) => self.handle_frame(from, frame),
                    None => break,
                },
                _ = tick.tick() => {
                    let now = Instant::now();
                    self.dispatcher.drain_replays(&mut self.runner, now);
                    if let Err(e) = self.runner.on_tick(now) {
                        warn!(%e, "tick failed");
                    }
                }
            }
        }
        Ok(())
    }

    fn handle_frame(&mut self, from: NodeId, frame: Vec<u8>) {
        match Message::decode(&frame) {
            Ok(msg) => {
                self.runner.stats.record_received(frame.len());
                self.dispatcher
                    .dispatch(&mut self.runner, from, msg, Instant::now());
            }
            Err(e) => warn!(from = %from.short(), %e, "undecodable frame"),
        }
    }
}
