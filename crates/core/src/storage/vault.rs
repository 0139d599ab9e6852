use std::path::Path;

use crate::errors::CoreError;
use crate::sync::connection::Credentials;

use super::encryption::{self, KdfParams};
use super::format::{self, Envelope};

/// Encrypted at-rest storage for broker credentials.
///
/// Flow: Credentials → bincode → AES-256-GCM(Argon2id(passphrase)) → PHCV envelope
pub struct CredentialVault;

impl CredentialVault {
    /// Seal credentials under a passphrase with default KDF costs.
    pub fn seal(credentials: &Credentials, passphrase: &str) -> Result<Vec<u8>, CoreError> {
        Self::seal_with_params(credentials, passphrase, KdfParams::default())
    }

    pub fn seal_with_params(
        credentials: &Credentials,
        passphrase: &str,
        kdf_params: KdfParams,
    ) -> Result<Vec<u8>, CoreError> {
        let plaintext = bincode::serialize(credentials)
            .map_err(|e| CoreError::Serialization(format!("credentials: {e}")))?;

        let envelope = Envelope {
            version: format::CURRENT_VERSION,
            kdf_params,
            salt: encryption::random_bytes()?,
            nonce: encryption::random_bytes()?,
        };
        let key = encryption::derive_key(passphrase, &envelope.salt, &envelope.kdf_params)?;
        let ciphertext = encryption::seal(&plaintext, &key, &envelope.nonce)?;

        Ok(format::encode(&envelope, &ciphertext))
    }

    /// Open a sealed vault. A wrong passphrase is [`CoreError::Decryption`].
    pub fn open(data: &[u8], passphrase: &str) -> Result<Credentials, CoreError> {
        let (envelope, ciphertext) = format::decode(data)?;
        let key = encryption::derive_key(passphrase, &envelope.salt, &envelope.kdf_params)?;
        let plaintext = encryption::open(ciphertext, &key, &envelope.nonce)?;

        bincode::deserialize(&plaintext)
            .map_err(|e| CoreError::Deserialization(format!("credentials: {e}")))
    }

    pub fn save_to_file(
        credentials: &Credentials,
        path: impl AsRef<Path>,
        passphrase: &str,
    ) -> Result<(), CoreError> {
        let bytes = Self::seal(credentials, passphrase)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load_from_file(path: impl AsRef<Path>, passphrase: &str) -> Result<Credentials, CoreError> {
        let bytes = std::fs::read(path)?;
        Self::open(&bytes, passphrase)
    }
}
