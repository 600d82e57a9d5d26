use hex::FromHexError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, thiserror::Error)]
pub enum EsploraError {
    /// Transport failure, timeout, unexpected HTTP status or a missing resource.
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("No spendable outputs for address {0}")]
    NoFundsError(String),

    /// The relay refused the transaction; carries its rejection reason verbatim.
    #[error("Broadcast rejected: {0}")]
    BroadcastError(String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("FromHexError: {0}")]
    FromHexError(String),
}

impl From<serde_json::Error> for EsploraError {
    fn from(err: serde_json::Error) -> Self {
        EsploraError::ParseError(err.to_string())
    }
}

impl From<reqwest::Error> for EsploraError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EsploraError::NetworkError(format!("Request timed out: {}", err))
        } else {
            EsploraError::NetworkError(err.to_string())
        }
    }
}

impl From<FromHexError> for EsploraError {
    fn from(err: FromHexError) -> Self {
        EsploraError::FromHexError(err.to_string())
    }
}

impl From<bitcoin::consensus::encode::Error> for EsploraError {
    fn from(err: bitcoin::consensus::encode::Error) -> Self {
        EsploraError::ParseError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EsploraError>;
