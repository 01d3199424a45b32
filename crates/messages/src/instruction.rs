use serde::{Deserialize, Serialize};

/// What the (external) discovery service tells a node to do once the
/// peer table is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstructionKind {
    /// Participate in consensus only.
    BootstrapOnly,
    /// Exchange transactions with a fixed neighbour.
    Tx,
    /// Exchange and validate with a fixed neighbour.
    TxValidate,
    /// Exchange transactions with random peers.
    TxRandom,
    /// Exchange and validate with random peers.
    TxRandomValidate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Delay before acting, in milliseconds.
    pub delay_ms: u64,
    pub kind: InstructionKind,
    /// Kind-specific parameter (the transaction interval in ms).
    pub param: Option<u64>,
}

impl Instruction {
    pub fn wants_tx(&self) -> bool {
        !matches!(self.kind, InstructionKind::BootstrapOnly)
    }

    pub fn wants_validation(&self) -> bool {
        matches!(
            self.kind,
            InstructionKind::TxValidate | InstructionKind::TxRandomValidate
        )
    }

    pub fn random_counterparty(&self) -> bool {
        matches!(
            self.kind,
            InstructionKind::TxRandom | InstructionKind::TxRandomValidate
        )
    }
}
