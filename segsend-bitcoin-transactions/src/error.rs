use bitcoin::{OutPoint, ScriptBuf};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BitcoinTxError {
    #[error("No spendable outputs were provided")]
    NoFunds,

    #[error("Insufficient funds: {required} sats required, {available} sats available")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("An arithmetic overflow ocurred while summing amounts")]
    AmountOverflow,

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Segwit v0 outputs require a compressed public key")]
    UncompressedKey,

    #[error("The key belongs to a different network than {0}")]
    NetworkMismatch(bitcoin::Network),

    #[error("The source transaction does not match utxo {outpoint}: {reason}")]
    SourceTransactionMismatch { outpoint: OutPoint, reason: String },

    #[error("The spent output is not a P2WPKH program: {0}")]
    UnsupportedSpendScript(ScriptBuf),

    #[error("Invalid partially signed transaction: {0}")]
    InvalidPsbt(String),

    #[error("Input index {index} is out of range ({inputs} inputs)")]
    InputIndexOutOfRange { index: usize, inputs: usize },

    #[error("The key does not control the output spent by input {0}")]
    KeyMismatch(usize),

    #[error("Failed to sign input {index}: {reason}")]
    SigningFailed { index: usize, reason: String },

    #[error("Input {index} cannot be finalized: {reason}")]
    FinalizationError { index: usize, reason: String },

    #[error("Invalid transaction encoding: {0}")]
    InvalidTransactionEncoding(String),
}

impl From<BitcoinTxError> for u32 {
    fn from(error: BitcoinTxError) -> u32 {
        match error {
            BitcoinTxError::NoFunds => 800,
            BitcoinTxError::InsufficientFunds { .. } => 801,
            BitcoinTxError::AmountOverflow => 802,
            BitcoinTxError::InvalidKey(_) => 803,
            BitcoinTxError::UncompressedKey => 804,
            BitcoinTxError::NetworkMismatch(_) => 805,
            BitcoinTxError::SourceTransactionMismatch { .. } => 806,
            BitcoinTxError::UnsupportedSpendScript(_) => 807,
            BitcoinTxError::InvalidPsbt(_) => 808,
            BitcoinTxError::InputIndexOutOfRange { .. } => 809,
            BitcoinTxError::KeyMismatch(_) => 810,
            BitcoinTxError::SigningFailed { .. } => 811,
            BitcoinTxError::FinalizationError { .. } => 812,
            BitcoinTxError::InvalidTransactionEncoding(_) => 813,
        }
    }
}
