use std::collections::VecDeque;
use std::time::Instant;

use consensus::Outcome;
use messages::Message;
use primitives::NodeId;
use telemetry::warn;

use crate::runner::TrustChainRunner;

/// Routes decoded messages into the runner and owns the replay queue:
/// a message whose precondition is not met yet goes to the tail and is
/// re-delivered on the next tick. Errors are logged and the message
/// dropped; they never cross the dispatch boundary.
#[derive(Debug, Default)]
pub struct Dispatcher {
    replay: VecDeque<(NodeId, Message)>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatch(
        &mut self,
        runner: &mut TrustChainRunner,
        from: NodeId,
        msg: Message,
        now: Instant,
    ) {
        match runner.handle_message(from, msg.clone(), now) {
            Ok(Outcome::Replay) => self.replay.push_back((from, msg)),
            Ok(Outcome::Handled(_)) => {}
            Err(e) => {
                warn!(from = %from.short(), kind = msg.kind(), %e, "dropping message");
            }
        }
    }

    /// Re-delivers queued messages, bounded by the queue length at the
    /// start of the drain so that messages which replay again cannot
    /// livelock the tick.
    pub fn drain_replays(&mut self, runner: &mut TrustChainRunner, now: Instant) {
        let budget = self.replay.len();
        for _ in 0..budget {
            let Some((from, msg)) = self.replay.pop_front() else {
                break;
            };
            self.dispatch(runner, from, msg, now);
        }
    }

    pub fn pending_replays(&self) -> usize {
        self.replay.len()
    }
}
