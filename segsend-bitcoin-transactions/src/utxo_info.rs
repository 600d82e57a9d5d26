use bitcoin::{BlockHash, OutPoint, Txid};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Confirmation state of an unspent output as reported by the indexer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UtxoStatus {
    pub confirmed: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub block_height: Option<u32>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub block_hash: Option<BlockHash>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub block_time: Option<u64>,
}

/// A spendable output of the sender's address.
///
/// The JSON layout matches the `GET /address/{address}/utxo` response of an
/// esplora indexer, so values can be deserialized directly from the wire.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UtxoInfo {
    pub txid: Txid,
    pub vout: u32,
    /// Value in satoshis.
    pub value: u64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub status: UtxoStatus,
}

impl UtxoInfo {
    pub fn new(txid: Txid, vout: u32, value: u64) -> Self {
        Self {
            txid,
            vout,
            value,
            status: UtxoStatus::default(),
        }
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            txid: self.txid,
            vout: self.vout,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.status.confirmed
    }
}

impl PartialEq for UtxoInfo {
    fn eq(&self, other: &Self) -> bool {
        self.txid == other.txid && self.vout == other.vout
    }
}

impl Eq for UtxoInfo {}

impl std::fmt::Display for UtxoInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

impl AsRef<UtxoInfo> for UtxoInfo {
    fn as_ref(&self) -> &UtxoInfo {
        self
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;
    use std::str::FromStr;

    const TXID: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

    #[test]
    fn deserializes_confirmed_esplora_utxo() {
        let json = format!(
            r#"{{
                "txid": "{TXID}",
                "vout": 1,
                "status": {{
                    "confirmed": true,
                    "block_height": 2540123,
                    "block_hash": "000000000000000a7d0e1a2e3c3b4e45bd8f0f1a54e0c53e1e4e7c9f1b2d3a4c",
                    "block_time": 1700000000
                }},
                "value": 5000
            }}"#
        );

        let utxo: UtxoInfo = serde_json::from_str(&json).unwrap();

        assert_eq!(utxo.txid, Txid::from_str(TXID).unwrap());
        assert_eq!(utxo.vout, 1);
        assert_eq!(utxo.value, 5000);
        assert!(utxo.is_confirmed());
        assert_eq!(utxo.status.block_height, Some(2540123));
        assert_eq!(utxo.status.block_time, Some(1700000000));
    }

    #[test]
    fn deserializes_mempool_utxo_without_block_fields() {
        let json = format!(
            r#"{{"txid": "{TXID}", "vout": 0, "status": {{"confirmed": false}}, "value": 1200}}"#
        );

        let utxo: UtxoInfo = serde_json::from_str(&json).unwrap();

        assert!(!utxo.is_confirmed());
        assert_eq!(utxo.status.block_height, None);
        assert_eq!(utxo.status.block_hash, None);
    }

    #[test]
    fn displays_as_outpoint() {
        let utxo = UtxoInfo::new(Txid::from_str(TXID).unwrap(), 3, 1);

        assert_eq!(utxo.to_string(), format!("{TXID}:3"));
        assert_eq!(utxo.outpoint().to_string(), format!("{TXID}:3"));
    }

    #[test]
    fn equality_ignores_value_and_status() {
        let txid = Txid::from_str(TXID).unwrap();
        let a = UtxoInfo::new(txid, 0, 1000);
        let mut b = UtxoInfo::new(txid, 0, 2000);
        b.status.confirmed = true;

        assert_eq!(a, b);
        assert_ne!(a, UtxoInfo::new(txid, 1, 1000));
    }
}
