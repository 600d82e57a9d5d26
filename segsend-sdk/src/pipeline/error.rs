use crate::client::EsploraError;
use crate::helper::ConfigError;
use crate::pipeline::PipelineStage;
use segsend_bitcoin_transactions::error::BitcoinTxError;

/// Why a stage could not be completed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineFailure {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Gateway(#[from] EsploraError),

    #[error(transparent)]
    Transaction(#[from] BitcoinTxError),

    /// `run` was called on a pipeline that already ended
    #[error("The pipeline already ran and ended as {0}")]
    AlreadyRun(PipelineStage),
}

/// A failed run: the stage that could not be reached and the reason.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Send pipeline failed at stage '{stage}': {failure}")]
pub struct PipelineError {
    pub stage: PipelineStage,
    #[source]
    pub failure: PipelineFailure,
}

impl PipelineError {
    pub fn new(stage: PipelineStage, failure: impl Into<PipelineFailure>) -> Self {
        Self {
            stage,
            failure: failure.into(),
        }
    }

    /// The relay's rejection reason, if the run failed because the relay refused the
    /// transaction.
    pub fn broadcast_rejection(&self) -> Option<&str> {
        match &self.failure {
            PipelineFailure::Gateway(EsploraError::BroadcastError(reason)) => Some(reason),
            _ => None,
        }
    }

    /// True when no spendable output was found, whether the gateway or the selector noticed.
    pub fn is_no_funds(&self) -> bool {
        matches!(
            self.failure,
            PipelineFailure::Gateway(EsploraError::NoFundsError(_))
                | PipelineFailure::Transaction(BitcoinTxError::NoFunds)
        )
    }

    /// Numeric code for logs: the transaction error code where there is one, 1 otherwise.
    pub fn error_code(&self) -> u32 {
        match &self.failure {
            PipelineFailure::Transaction(err) => u32::from(err.clone()),
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_stage_and_reason() {
        let err = PipelineError::new(
            PipelineStage::Broadcast,
            EsploraError::BroadcastError("insufficient fee".to_string()),
        );

        assert_eq!(
            err.to_string(),
            "Send pipeline failed at stage 'broadcast': Broadcast rejected: insufficient fee"
        );
        assert_eq!(err.broadcast_rejection(), Some("insufficient fee"));
        assert_eq!(err.error_code(), 1);
    }

    #[test]
    fn recognizes_no_funds_from_either_side() {
        let from_gateway = PipelineError::new(
            PipelineStage::UtxosFetched,
            EsploraError::NoFundsError("tb1q".to_string()),
        );
        let from_selector = PipelineError::new(PipelineStage::UtxoSelected, BitcoinTxError::NoFunds);

        assert!(from_gateway.is_no_funds());
        assert!(from_selector.is_no_funds());
        assert_eq!(from_selector.error_code(), 800);
        assert_eq!(from_selector.broadcast_rejection(), None);
    }
}
