use bitcoin::{Address, Txid};
use segsend_bitcoin_transactions::utxo_info::UtxoInfo;

use crate::client::error::Result;

/// The chain indexing service as seen by the send pipeline.
///
/// Implementations perform exactly one attempt per call; retries, if wanted, belong in a
/// wrapping implementation.
pub trait ChainDataGateway {
    /// Unspent outputs of `address`, in the order the service returns them.
    ///
    /// Fails with [`crate::EsploraError::NoFundsError`] when the address has none.
    fn fetch_utxos(&self, address: &Address) -> Result<Vec<UtxoInfo>>;

    /// Raw wire bytes of the transaction `txid`.
    fn fetch_raw_transaction(&self, txid: &Txid) -> Result<Vec<u8>>;

    /// Submits raw transaction bytes and returns the txid reported by the relay.
    fn broadcast(&self, raw_tx: &[u8]) -> Result<Txid>;
}

impl<G: ChainDataGateway + ?Sized> ChainDataGateway for &G {
    fn fetch_utxos(&self, address: &Address) -> Result<Vec<UtxoInfo>> {
        (**self).fetch_utxos(address)
    }

    fn fetch_raw_transaction(&self, txid: &Txid) -> Result<Vec<u8>> {
        (**self).fetch_raw_transaction(txid)
    }

    fn broadcast(&self, raw_tx: &[u8]) -> Result<Txid> {
        (**self).broadcast(raw_tx)
    }
}
