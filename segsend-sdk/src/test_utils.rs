//! In-memory chain data gateway and fixtures for pipeline tests.

use crate::client::{ChainDataGateway, EsploraError, Result};
use crate::helper::SendConfig;
use bitcoin::{
    consensus::encode::{deserialize, serialize},
    Address, ScriptBuf, Transaction, Txid,
};
use segsend_bitcoin_transactions::{
    test_utils::{funding_transaction, unsigned_transaction},
    utxo_info::UtxoInfo,
    SignedTransaction,
};
use std::cell::RefCell;
use std::collections::HashMap;

pub use segsend_bitcoin_transactions::test_utils::{receiver, sender, SENDER_SECRET};

/// 1000 sats to the receiver with a 200 sat fee, signed by the sender.
pub fn config() -> SendConfig {
    SendConfig::testnet(SENDER_SECRET, receiver().address().to_string())
}

pub fn signed_transaction(value: u64, amount: u64, fee: u64) -> SignedTransaction {
    unsigned_transaction(value, amount, fee)
        .sign(&sender(), 0)
        .unwrap()
        .finalize()
        .unwrap()
}

/// Calls seen by the gateway, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    FetchUtxos(String),
    FetchRawTransaction(Txid),
    Broadcast(Vec<u8>),
}

/// Serves fixed UTXOs and their funding transactions and records every call.
pub struct FixtureGateway {
    values: Vec<u64>,
    utxos: Vec<UtxoInfo>,
    transactions: HashMap<Txid, Vec<u8>>,
    rejection: Option<String>,
    calls: RefCell<Vec<Call>>,
}

impl FixtureGateway {
    /// One funding transaction per value, the n-th paying the sender at output n.
    pub fn funded(values: &[u64]) -> Self {
        Self::funded_to(sender().script_pubkey(), values)
    }

    fn funded_to(script_pubkey: ScriptBuf, values: &[u64]) -> Self {
        let mut utxos = Vec::new();
        let mut transactions = HashMap::new();

        for (vout, value) in values.iter().enumerate() {
            let (tx, utxo) = funding_transaction(script_pubkey.clone(), *value, vout as u32);
            transactions.insert(utxo.txid, serialize(&tx));
            utxos.push(utxo);
        }

        Self {
            values: values.to_vec(),
            utxos,
            transactions,
            rejection: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Every broadcast is refused with `reason`.
    pub fn rejecting(mut self, reason: &str) -> Self {
        self.rejection = Some(reason.to_string());
        self
    }

    /// Same values, but locked to the receiver's key.
    pub fn pay_utxos_to_receiver(&mut self) {
        let rejection = self.rejection.take();
        *self = Self::funded_to(receiver().script_pubkey(), &self.values);
        self.rejection = rejection;
    }

    pub fn corrupt_source_transactions(&mut self) {
        for raw_tx in self.transactions.values_mut() {
            *raw_tx = vec![0xde, 0xad];
        }
    }

    pub fn utxos(&self) -> &[UtxoInfo] {
        &self.utxos
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn requests(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn broadcasts(&self) -> Vec<Vec<u8>> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                Call::Broadcast(raw_tx) => Some(raw_tx.clone()),
                _ => None,
            })
            .collect()
    }
}

impl ChainDataGateway for FixtureGateway {
    fn fetch_utxos(&self, address: &Address) -> Result<Vec<UtxoInfo>> {
        self.calls
            .borrow_mut()
            .push(Call::FetchUtxos(address.to_string()));

        if self.utxos.is_empty() {
            return Err(EsploraError::NoFundsError(address.to_string()));
        }
        Ok(self.utxos.clone())
    }

    fn fetch_raw_transaction(&self, txid: &Txid) -> Result<Vec<u8>> {
        self.calls
            .borrow_mut()
            .push(Call::FetchRawTransaction(*txid));

        self.transactions
            .get(txid)
            .cloned()
            .ok_or_else(|| EsploraError::NetworkError(format!("Transaction not found: {}", txid)))
    }

    fn broadcast(&self, raw_tx: &[u8]) -> Result<Txid> {
        self.calls.borrow_mut().push(Call::Broadcast(raw_tx.to_vec()));

        if let Some(reason) = &self.rejection {
            return Err(EsploraError::BroadcastError(reason.clone()));
        }

        let transaction: Transaction = deserialize(raw_tx)?;
        Ok(transaction.compute_txid())
    }
}
