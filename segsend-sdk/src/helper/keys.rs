use bitcoin::Network;
use segsend_bitcoin_transactions::{error::BitcoinTxError, KeyMaterial};
use std::{
    fs,
    io::{ErrorKind, Write},
    path::Path,
};
use tracing::info;

/* -------------------------------------------------------------------------- */
/*                               ERROR HANDLING                               */
/* -------------------------------------------------------------------------- */
/// Error type for loading key material from disk
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KeyFileError {
    /// The file exists but could not be read, or a new key could not be written
    #[error("Key file I/O error: {0}")]
    Io(String),
    /// The file content is neither a WIF string, a hex secret nor a JSON byte array
    #[error("Key file content is not a valid secret key: {0}")]
    InvalidContent(String),
    /// The secret parsed but does not make a usable segwit key
    #[error("Key error: {0}")]
    Key(#[from] BitcoinTxError),
}

/* -------------------------------------------------------------------------- */
/*                         LOADS OR CREATES A KEY FILE                        */
/* -------------------------------------------------------------------------- */
/// Loads the signing key stored at `file_path`.
///
/// Accepted contents: a WIF string, a 64 character hex secret, or a JSON array of 32 bytes.
/// When the file does not exist a fresh key is generated and written as WIF, so the printed
/// address can be funded before the next run.
pub fn with_secret_key_file(
    file_path: impl AsRef<Path>,
    network: Network,
) -> Result<KeyMaterial, KeyFileError> {
    let file_path = file_path.as_ref();

    match fs::read_to_string(file_path) {
        Ok(content) => parse_secret(&content, network),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let keys = KeyMaterial::generate(network);
            write_new_key_file(file_path, &keys.to_wif()).map_err(|e| {
                KeyFileError::Io(format!("Unable to write {}: {}", file_path.display(), e))
            })?;

            info!(
                path = %file_path.display(),
                address = %keys.address(),
                "generated new key file"
            );
            Ok(keys)
        }
        Err(e) => Err(KeyFileError::Io(format!(
            "Unable to read {}: {}",
            file_path.display(),
            e
        ))),
    }
}

/// Creates `file_path` readable by the owner only and writes `contents` to it.
fn write_new_key_file(file_path: &Path, contents: &str) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(file_path)?;
    file.write_all(contents.as_bytes())
}

fn parse_secret(content: &str, network: Network) -> Result<KeyMaterial, KeyFileError> {
    let content = content.trim();

    match KeyMaterial::from_secret_str(content, network) {
        Ok(keys) => return Ok(keys),
        Err(BitcoinTxError::NetworkMismatch(network)) => {
            return Err(BitcoinTxError::NetworkMismatch(network).into())
        }
        Err(_) => {}
    }

    let secret_bytes: Vec<u8> = serde_json::from_str(content).map_err(|_| {
        KeyFileError::InvalidContent(
            "neither a WIF string, a hex secret nor a serialized vector of bytes".to_string(),
        )
    })?;

    Ok(KeyMaterial::from_secret_bytes(&secret_bytes, network)?)
}
