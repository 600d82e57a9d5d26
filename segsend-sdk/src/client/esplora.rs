use crate::client::error::{EsploraError, Result};
use crate::client::{ChainDataGateway, NOT_FOUND_CODE};
use bitcoin::{Address, Txid};
use segsend_bitcoin_transactions::utxo_info::UtxoInfo;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Applied to every request unless [`EsploraClient::with_timeout`] says otherwise.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// EsploraClient talks to an esplora-compatible indexer (`/address/{a}/utxo`,
/// `/tx/{txid}/hex`, `POST /tx`). Every call is a single blocking request bounded by the
/// client timeout; a timeout surfaces as [`EsploraError::NetworkError`].
#[derive(Clone, Debug)]
pub struct EsploraClient {
    url: String,
    client: reqwest::blocking::Client,
}

impl EsploraClient {
    /// Create a new EsploraClient for the given base URL, e.g. `https://blockstream.info/testnet/api`
    pub fn new(url: &str) -> Result<Self> {
        Self::with_timeout(url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EsploraError::NetworkError(format!("Failed to build client: {}", e)))?;

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Unspent outputs of `address` as returned by the indexer. May be empty.
    pub fn get_address_utxos(&self, address: &Address) -> Result<Vec<UtxoInfo>> {
        let body = self.get(&format!("address/{}/utxo", address))?;

        serde_json::from_str(&body)
            .map_err(|e| EsploraError::ParseError(format!("Failed to deserialize utxos: {}", e)))
    }

    /// Hex encoded transaction `txid`. A missing transaction is a [`EsploraError::NetworkError`].
    pub fn get_transaction_hex(&self, txid: &Txid) -> Result<String> {
        match self.get_optional(&format!("tx/{}/hex", txid))? {
            Some(body) => Ok(body.trim().to_string()),
            None => Err(EsploraError::NetworkError(format!(
                "Transaction not found: {}",
                txid
            ))),
        }
    }

    /// Posts a hex encoded transaction to the relay.
    ///
    /// A 4xx answer is a rejection of the transaction itself and becomes
    /// [`EsploraError::BroadcastError`] carrying the response body; a 5xx answer is a service
    /// failure and becomes [`EsploraError::NetworkError`].
    pub fn post_transaction_hex(&self, raw_tx_hex: &str) -> Result<Txid> {
        let url = format!("{}/tx", self.url);
        debug!(url = %url, bytes = raw_tx_hex.len() / 2, "posting transaction");

        let response = match self
            .client
            .post(&url)
            .header("content-type", "text/plain")
            .body(raw_tx_hex.to_string())
            .send()
        {
            Ok(res) => res,
            Err(e) => return Err(e.into()),
        };

        let status = response.status();
        let body = response.text().map_err(|e| {
            EsploraError::NetworkError(format!("Failed to read response text: {}", e))
        })?;

        if status.is_client_error() {
            return Err(EsploraError::BroadcastError(body.trim().to_string()));
        }
        if !status.is_success() {
            return Err(EsploraError::NetworkError(format!(
                "HTTP {}: {}",
                status,
                body.trim()
            )));
        }

        Txid::from_str(body.trim()).map_err(|e| {
            EsploraError::ParseError(format!("Relay returned an invalid txid {:?}: {}", body, e))
        })
    }

    fn get(&self, path: &str) -> Result<String> {
        self.get_optional(path)?
            .ok_or_else(|| EsploraError::NetworkError(format!("Not found: /{}", path)))
    }

    /// Returns None if the resource was not found (404)
    fn get_optional(&self, path: &str) -> Result<Option<String>> {
        let url = format!("{}/{}", self.url, path);
        debug!(url = %url, "GET");

        let response = match self.client.get(&url).send() {
            Ok(res) => res,
            Err(e) => return Err(e.into()),
        };

        let status = response.status();
        if status.as_u16() == NOT_FOUND_CODE {
            return Ok(None);
        }

        let body = response.text().map_err(|e| {
            EsploraError::NetworkError(format!("Failed to read response text: {}", e))
        })?;

        if !status.is_success() {
            return Err(EsploraError::NetworkError(format!(
                "HTTP {}: {}",
                status,
                body.trim()
            )));
        }

        Ok(Some(body))
    }
}

impl ChainDataGateway for EsploraClient {
    fn fetch_utxos(&self, address: &Address) -> Result<Vec<UtxoInfo>> {
        let utxos = self.get_address_utxos(address)?;
        if utxos.is_empty() {
            return Err(EsploraError::NoFundsError(address.to_string()));
        }

        debug!(address = %address, count = utxos.len(), "fetched utxos");
        Ok(utxos)
    }

    fn fetch_raw_transaction(&self, txid: &Txid) -> Result<Vec<u8>> {
        let raw_hex = self.get_transaction_hex(txid)?;

        Ok(hex::decode(raw_hex)?)
    }

    fn broadcast(&self, raw_tx: &[u8]) -> Result<Txid> {
        self.post_transaction_hex(&hex::encode(raw_tx))
    }
}
