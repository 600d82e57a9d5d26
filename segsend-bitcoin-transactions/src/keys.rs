use bitcoin::{
    address::Address,
    key::{CompressedPublicKey, PrivateKey},
    secp256k1::{Secp256k1, SecretKey},
    Network, NetworkKind, PublicKey, ScriptBuf,
};
use rand_core::OsRng;

use crate::error::BitcoinTxError;

/* -------------------------------------------------------------------------- */
/*                                KEY MATERIAL                                */
/* -------------------------------------------------------------------------- */
/// A single secp256k1 keypair together with its P2WPKH (segwit v0) address.
///
/// The address is derived once on construction from the compressed public key
/// and the network the key was loaded for. The value is immutable afterwards.
#[derive(Clone)]
pub struct KeyMaterial {
    private_key: PrivateKey,
    public_key: CompressedPublicKey,
    address: Address,
    network: Network,
}

impl KeyMaterial {
    /// Generates a fresh keypair from the operating system RNG.
    pub fn generate(network: Network) -> Self {
        let secp = Secp256k1::new();

        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);

        let private_key = PrivateKey::new(secret_key, network);
        let public_key = CompressedPublicKey(public_key);

        Self::assemble(private_key, public_key, network)
    }

    /// Parses a WIF encoded private key.
    ///
    /// Uncompressed keys are rejected because a P2WPKH program commits to the
    /// hash of the compressed serialization.
    pub fn from_wif(wif: &str, network: Network) -> Result<Self, BitcoinTxError> {
        let private_key = PrivateKey::from_wif(wif.trim())
            .map_err(|e| BitcoinTxError::InvalidKey(e.to_string()))?;

        if private_key.network != NetworkKind::from(network) {
            return Err(BitcoinTxError::NetworkMismatch(network));
        }

        Self::from_private_key(private_key, network)
    }

    /// Builds the key material from a hex encoded 32-byte secret scalar.
    pub fn from_secret_hex(secret_hex: &str, network: Network) -> Result<Self, BitcoinTxError> {
        let bytes = hex::decode(secret_hex.trim())
            .map_err(|e| BitcoinTxError::InvalidKey(e.to_string()))?;

        Self::from_secret_bytes(&bytes, network)
    }

    pub fn from_secret_bytes(bytes: &[u8], network: Network) -> Result<Self, BitcoinTxError> {
        if bytes.len() != 32 {
            return Err(BitcoinTxError::InvalidKey(format!(
                "expected 32 secret bytes, got {}",
                bytes.len()
            )));
        }

        let secret_key =
            SecretKey::from_slice(bytes).map_err(|e| BitcoinTxError::InvalidKey(e.to_string()))?;

        Self::from_private_key(PrivateKey::new(secret_key, network), network)
    }

    /// Accepts either a WIF string or a hex encoded secret.
    pub fn from_secret_str(secret: &str, network: Network) -> Result<Self, BitcoinTxError> {
        match Self::from_wif(secret, network) {
            Ok(keys) => Ok(keys),
            Err(BitcoinTxError::NetworkMismatch(network)) => {
                Err(BitcoinTxError::NetworkMismatch(network))
            }
            Err(_) => Self::from_secret_hex(secret, network),
        }
    }

    pub fn from_private_key(
        private_key: PrivateKey,
        network: Network,
    ) -> Result<Self, BitcoinTxError> {
        if !private_key.compressed {
            return Err(BitcoinTxError::UncompressedKey);
        }

        let secp = Secp256k1::new();
        let public_key = CompressedPublicKey::from_private_key(&secp, &private_key)
            .map_err(|_| BitcoinTxError::UncompressedKey)?;

        Ok(Self::assemble(private_key, public_key, network))
    }

    fn assemble(private_key: PrivateKey, public_key: CompressedPublicKey, network: Network) -> Self {
        let address = Address::p2wpkh(&public_key, network);

        Self {
            private_key,
            public_key,
            address,
            network,
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.private_key.inner
    }

    pub fn compressed_public_key(&self) -> CompressedPublicKey {
        self.public_key
    }

    /// The public key in the form used as a PSBT partial signature key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::new(self.public_key.0)
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Locking script of [`Self::address`]; used both for spent outputs and change.
    pub fn script_pubkey(&self) -> ScriptBuf {
        self.address.script_pubkey()
    }

    pub fn to_wif(&self) -> String {
        self.private_key.to_wif()
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("public_key", &self.public_key)
            .field("address", &self.address)
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}
