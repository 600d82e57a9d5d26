use crate::helper::keys::{with_secret_key_file, KeyFileError};
use bitcoin::{Address, Network, ScriptBuf};
use segsend_bitcoin_transactions::{
    constants::{DEFAULT_AMOUNT_TO_SEND, DEFAULT_FEE},
    error::BitcoinTxError,
    ChangePolicy, KeyMaterial, Payment,
};
use serde::{Deserialize, Serialize};
use std::{fmt, fs, path::Path, path::PathBuf, str::FromStr, time::Duration};

pub const TESTNET_ESPLORA_URL: &str = "https://blockstream.info/testnet/api";
pub const REGTEST_ESPLORA_URL: &str = "http://127.0.0.1:3002";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/* -------------------------------------------------------------------------- */
/*                               ERROR HANDLING                               */
/* -------------------------------------------------------------------------- */
/// Error type for loading and validating a [`SendConfig`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Unable to read config {path}: {reason}")]
    Io { path: String, reason: String },
    /// The configuration is not valid JSON for this schema
    #[error("Invalid config: {0}")]
    Parse(String),
    /// The destination is not an address at all
    #[error("Invalid destination address {address}: {reason}")]
    InvalidDestination { address: String, reason: String },
    /// The esplora base URL is empty or not http(s)
    #[error("Invalid esplora url: {0}")]
    InvalidEsploraUrl(String),
    /// Nothing to pay
    #[error("amount_to_send must be greater than zero")]
    ZeroAmount,
    /// `amount_to_send + fee` does not fit in a u64
    #[error("amount_to_send + fee overflows")]
    AmountOverflow,
    /// Neither `secret_key` nor `secret_key_file` is set
    #[error("No secret key configured: set secret_key or secret_key_file")]
    MissingSecretKey,
    /// The inline secret key could not be parsed
    #[error("Invalid secret key: {0}")]
    InvalidSecretKey(BitcoinTxError),
    #[error(transparent)]
    KeyFile(#[from] KeyFileError),
}

fn default_amount_to_send() -> u64 {
    DEFAULT_AMOUNT_TO_SEND
}

fn default_fee() -> u64 {
    DEFAULT_FEE
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

/* -------------------------------------------------------------------------- */
/*                                 SEND CONFIG                                */
/* -------------------------------------------------------------------------- */
/// Everything a single send run needs. Passed into the pipeline explicitly; nothing is read
/// from process-wide state.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct SendConfig {
    /// Network the key, the destination and the indexer belong to
    pub network: Network,
    /// Base URL of the esplora-compatible indexer and relay
    pub esplora_url: String,
    /// WIF or 64 character hex secret. Takes precedence over `secret_key_file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_file: Option<PathBuf>,
    pub destination_address: String,
    /// Satoshis paid to the destination
    #[serde(default = "default_amount_to_send")]
    pub amount_to_send: u64,
    /// Fixed fee in satoshis
    #[serde(default = "default_fee")]
    pub fee: u64,
    #[serde(default)]
    pub change_policy: ChangePolicy,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl fmt::Debug for SendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendConfig")
            .field("network", &self.network)
            .field("esplora_url", &self.esplora_url)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("secret_key_file", &self.secret_key_file)
            .field("destination_address", &self.destination_address)
            .field("amount_to_send", &self.amount_to_send)
            .field("fee", &self.fee)
            .field("change_policy", &self.change_policy)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl SendConfig {
    /// Public testnet indexer, default amount and fee.
    pub fn testnet(secret_key: impl Into<String>, destination_address: impl Into<String>) -> Self {
        Self::preset(
            Network::Testnet,
            TESTNET_ESPLORA_URL,
            secret_key.into(),
            destination_address.into(),
        )
    }

    /// Local esplora on its default regtest port.
    pub fn regtest(secret_key: impl Into<String>, destination_address: impl Into<String>) -> Self {
        Self::preset(
            Network::Regtest,
            REGTEST_ESPLORA_URL,
            secret_key.into(),
            destination_address.into(),
        )
    }

    fn preset(
        network: Network,
        esplora_url: &str,
        secret_key: String,
        destination_address: String,
    ) -> Self {
        Self {
            network,
            esplora_url: esplora_url.to_string(),
            secret_key: Some(secret_key),
            secret_key_file: None,
            destination_address,
            amount_to_send: DEFAULT_AMOUNT_TO_SEND,
            fee: DEFAULT_FEE,
            change_policy: ChangePolicy::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_json_str(&json)
    }

    /// Smallest UTXO value able to fund the payment: `amount_to_send + fee`.
    pub fn min_utxo_value(&self) -> Result<u64, ConfigError> {
        self.amount_to_send
            .checked_add(self.fee)
            .ok_or(ConfigError::AmountOverflow)
    }

    /// Locking script of the destination, checked against `network`.
    pub fn destination_script(&self) -> Result<ScriptBuf, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidDestination {
            address: self.destination_address.clone(),
            reason,
        };

        let address = Address::from_str(self.destination_address.trim())
            .map_err(|e| invalid(e.to_string()))?
            .require_network(self.network)
            .map_err(|e| invalid(e.to_string()))?;

        Ok(address.script_pubkey())
    }

    pub fn payment(&self) -> Result<Payment, ConfigError> {
        Ok(Payment {
            destination: self.destination_script()?,
            amount: self.amount_to_send,
            fee: self.fee,
        })
    }

    /// Loads the signing key: the inline `secret_key` if present, otherwise `secret_key_file`
    /// (which is created with a fresh key when missing).
    pub fn load_key_material(&self) -> Result<KeyMaterial, ConfigError> {
        match (&self.secret_key, &self.secret_key_file) {
            (Some(secret), _) => KeyMaterial::from_secret_str(secret, self.network)
                .map_err(ConfigError::InvalidSecretKey),
            (None, Some(path)) => Ok(with_secret_key_file(path, self.network)?),
            (None, None) => Err(ConfigError::MissingSecretKey),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Checks everything that can be checked without touching the key file or the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.esplora_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidEsploraUrl(self.esplora_url.clone()));
        }

        if self.amount_to_send == 0 {
            return Err(ConfigError::ZeroAmount);
        }
        self.min_utxo_value()?;
        self.destination_script()?;

        if self.secret_key.is_none() && self.secret_key_file.is_none() {
            return Err(ConfigError::MissingSecretKey);
        }

        Ok(())
    }
}
