use crate::client::{ChainDataGateway, Result};
use bitcoin::Txid;
use segsend_bitcoin_transactions::SignedTransaction;
use tracing::{debug, info, warn};

/// Outcome of a relay submission.
///
/// `txid` is what the relay answered and is the authoritative id. Acceptance by the relay does
/// not mean the transaction is confirmed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BroadcastResult {
    pub txid: Txid,
    pub local_txid: Txid,
}

impl BroadcastResult {
    pub fn txid_matches(&self) -> bool {
        self.txid == self.local_txid
    }
}

/// Serializes `signed` to its wire encoding and submits it once through `gateway`.
///
/// No script validation happens here; the relay decides.
pub fn broadcast<G: ChainDataGateway>(
    signed: &SignedTransaction,
    gateway: &G,
) -> Result<BroadcastResult> {
    let raw_tx = signed.serialize();
    let local_txid = signed.txid();
    debug!(txid = %local_txid, bytes = raw_tx.len(), vsize = signed.vsize(), "broadcasting");

    let txid = gateway.broadcast(&raw_tx)?;

    let result = BroadcastResult { txid, local_txid };
    if result.txid_matches() {
        info!(txid = %txid, "relay accepted transaction");
    } else {
        warn!(
            relay_txid = %txid,
            local_txid = %local_txid,
            "relay returned a different txid than the one computed locally"
        );
    }

    Ok(result)
}
