use primitives::NodeId;

/// Where an outgoing protocol message should go. `All` means every
/// member of the current committee, the sender included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    All,
    Node(NodeId),
}

/// The outgoing traffic produced by feeding one message into a protocol
/// state machine. Protocol components never touch the network; callers
/// drain the step and hand its messages to the transport.
#[derive(Debug)]
pub struct Step<M> {
    pub messages: Vec<(Target, M)>,
}

impl<M> Default for Step<M> {
    fn default() -> Self {
        Step { messages: vec![] }
    }
}

impl<M> Step<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, to: NodeId, message: M) {
        self.messages.push((Target::Node(to), message));
    }

    pub fn broadcast(&mut self, message: M) {
        self.messages.push((Target::All, message));
    }

    pub fn extend(&mut self, other: Step<M>) {
        self.messages.extend(other.messages);
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Re-wraps every message, used when an inner protocol's traffic is
    /// lifted into an outer envelope.
    pub fn map<N>(self, f: impl Fn(M) -> N) -> Step<N> {
        Step {
            messages: self
                .messages
                .into_iter()
                .map(|(target, m)| (target, f(m)))
                .collect(),
        }
    }
}

/// How a handler disposed of a message. `Replay` asks the dispatcher to
/// re-enqueue the message untouched because a precondition (round, RBC
/// delivery) is not met yet; handlers must not have mutated state in
/// that case.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome<O> {
    Handled(Option<O>),
    Replay,
}

impl<O> Outcome<O> {
    pub fn handled() -> Self {
        Outcome::Handled(None)
    }

    pub fn delivered(output: O) -> Self {
        Outcome::Handled(Some(output))
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, Outcome::Replay)
    }
}
