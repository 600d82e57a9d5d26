use std::fmt;

/// Where a [`crate::SendPipeline`] currently stands.
///
/// Stages are only ever entered in declaration order. `Failed` is terminal and may be entered
/// from any stage before `Done`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    KeysLoaded,
    UtxosFetched,
    UtxoSelected,
    SourceTxFetched,
    Built,
    Signed,
    Finalized,
    Broadcast,
    Done,
    Failed { reason: String },
}

impl PipelineStage {
    /// `Done` and `Failed` accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Failed { .. })
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Idle => write!(f, "idle"),
            PipelineStage::KeysLoaded => write!(f, "keys loaded"),
            PipelineStage::UtxosFetched => write!(f, "utxos fetched"),
            PipelineStage::UtxoSelected => write!(f, "utxo selected"),
            PipelineStage::SourceTxFetched => write!(f, "source transaction fetched"),
            PipelineStage::Built => write!(f, "built"),
            PipelineStage::Signed => write!(f, "signed"),
            PipelineStage::Finalized => write!(f, "finalized"),
            PipelineStage::Broadcast => write!(f, "broadcast"),
            PipelineStage::Done => write!(f, "done"),
            PipelineStage::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}
