//! Card-number encryption at rest.
//!
//! Card numbers are stored as `v1:<fernet token>`. The version tag makes
//! legacy rows (raw digits written before encryption was introduced)
//! structurally distinguishable from ciphertext, so reads never have to
//! attempt a decryption just to find out what kind of row they hold.

use fernet::Fernet;

use crate::error::AppError;

/// Version tag prefixed to every encrypted value.
const ENC_PREFIX: &str = "v1:";

/// Symmetric cipher for card numbers, keyed from process configuration.
///
/// Built once at startup and passed into storage calls explicitly.
pub struct CardCipher {
    fernet: Fernet,
}

impl CardCipher {
    /// Builds the cipher from a base64url-encoded 32-byte Fernet key.
    ///
    /// # Errors
    /// Returns `AppError::Crypto` when the key is not a valid Fernet key.
    pub fn new(key: &str) -> Result<Self, AppError> {
        let fernet = Fernet::new(key)
            .ok_or_else(|| AppError::Crypto("ENCRYPTION_KEY is not a valid Fernet key".to_string()))?;
        Ok(Self { fernet })
    }

    /// Generates a fresh random key (for provisioning / tests).
    pub fn generate_key() -> String {
        Fernet::generate_key()
    }

    /// Encrypts a plaintext card number into a tagged stored value.
    pub fn encrypt(&self, plaintext: &str) -> String {
        format!("{}{}", ENC_PREFIX, self.fernet.encrypt(plaintext.as_bytes()))
    }

    /// True when a stored value carries the encryption tag.
    pub fn is_encrypted(stored: &str) -> bool {
        stored.starts_with(ENC_PREFIX)
    }

    /// Decrypts a tagged stored value.
    ///
    /// # Errors
    /// Returns `AppError::Crypto` when the value is untagged or the
    /// token does not verify under the configured key.
    pub fn decrypt(&self, stored: &str) -> Result<String, AppError> {
        let token = stored
            .strip_prefix(ENC_PREFIX)
            .ok_or_else(|| AppError::Crypto("value is not an encrypted card".to_string()))?;
        let plaintext = self
            .fernet
            .decrypt(token)
            .map_err(|_| AppError::Crypto("card token failed to decrypt".to_string()))?;
        String::from_utf8(plaintext).map_err(|_| AppError::Crypto("decrypted card is not UTF-8".to_string()))
    }

    /// Returns the displayable card number for a stored value.
    ///
    /// Tagged values are decrypted; legacy untagged rows are returned
    /// unchanged. A tagged value that fails to decrypt (key rotation
    /// gone wrong) is also returned raw rather than erroring, so a
    /// single bad row cannot take down a listing.
    pub fn reveal(&self, stored: &str) -> String {
        if Self::is_encrypted(stored) {
            match self.decrypt(stored) {
                Ok(plaintext) => plaintext,
                Err(e) => {
                    log::warn!("Failed to decrypt stored card: {}", e);
                    stored.to_string()
                }
            }
        } else {
            stored.to_string()
        }
    }
}
