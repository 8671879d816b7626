//! Symmetric encryption for the cache layers
//!
//! PBKDF2-HMAC-SHA256 key derivation and AES-256-CBC with PKCS7 padding.
//!
//! CBC carries no authentication tag. A wrong key or corrupted payload is
//! rejected by the padding check in most cases; every caller in this crate also
//! deserializes the plaintext, so a payload that happens to unpad cleanly is
//! still rejected before anything reaches a caller.
//!
//! ## Key handling
//!
//! Derived and generated keys live in [`KeyMaterial`], which zeroes itself on
//! drop. Salts and IVs come from the operating system CSPRNG.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::Hmac;
use pbkdf2::pbkdf2;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use tracing::{debug, error, instrument};
use zeroize::ZeroizeOnDrop;

use crate::errors::{Result, VaultdexError};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES-256 key size in bytes
pub const KEY_SIZE: usize = 32;

/// CBC IV size in bytes (one AES block)
pub const IV_SIZE: usize = 16;

/// Default salt size in bytes
pub const SALT_SIZE: usize = 32;

/// Default PBKDF2 iterations
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;

/// Key material that zeroizes on drop
#[derive(ZeroizeOnDrop)]
pub struct KeyMaterial {
    key: [u8; KEY_SIZE],
}

impl KeyMaterial {
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Get the raw key bytes (use with care)
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial").field("key", &"[REDACTED]").finish()
    }
}

/// Encryption primitive shared by the persistent cache and the session index.
///
/// Holds only algorithm parameters; all key material is passed in per call.
#[derive(Debug, Clone, Copy)]
pub struct CryptoBox {
    iterations: u32,
}

impl Default for CryptoBox {
    fn default() -> Self {
        Self { iterations: DEFAULT_PBKDF2_ITERATIONS }
    }
}

impl CryptoBox {
    /// Create a crypto box with a custom PBKDF2 iteration count
    pub fn new(iterations: u32) -> Self {
        Self { iterations: iterations.max(1) }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Derive a 256-bit key from a password and salt.
    ///
    /// CPU-bound; async callers should run it on the blocking pool.
    #[instrument(skip(self, password, salt), fields(iterations = self.iterations, salt_len = salt.len()))]
    pub fn derive_key(&self, password: &str, salt: &[u8]) -> Result<KeyMaterial> {
        let mut key = [0u8; KEY_SIZE];
        pbkdf2::<Hmac<Sha256>>(password.as_bytes(), salt, self.iterations, &mut key).map_err(
            |e| {
                error!("PBKDF2 key derivation failed");
                VaultdexError::encryption(format!("Key derivation failed: {}", e))
            },
        )?;
        Ok(KeyMaterial::new(key))
    }

    /// Encrypt with a freshly generated IV.
    ///
    /// Returns `(ciphertext, iv)`.
    #[instrument(skip(self, plaintext, key), fields(plaintext_len = plaintext.len()))]
    pub fn encrypt(&self, plaintext: &[u8], key: &KeyMaterial) -> Result<(Vec<u8>, [u8; IV_SIZE])> {
        let iv = Self::generate_iv()?;
        let ciphertext = self.encrypt_with_iv(plaintext, key, &iv);

        debug!(ciphertext_len = ciphertext.len(), "Encrypted payload");

        Ok((ciphertext, iv))
    }

    /// Encrypt with a caller-supplied IV.
    ///
    /// Reusing an IV under one key leaks equality of plaintext prefixes. Only
    /// the session index does this, with a key that never leaves the process.
    pub fn encrypt_with_iv(
        &self,
        plaintext: &[u8],
        key: &KeyMaterial,
        iv: &[u8; IV_SIZE],
    ) -> Vec<u8> {
        Aes256CbcEnc::new(&(*key.as_bytes()).into(), &(*iv).into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    /// Decrypt a payload produced by [`CryptoBox::encrypt`]
    #[instrument(skip(self, ciphertext, key, iv), fields(ciphertext_len = ciphertext.len()))]
    pub fn decrypt(&self, ciphertext: &[u8], key: &KeyMaterial, iv: &[u8]) -> Result<Vec<u8>> {
        let iv: &[u8; IV_SIZE] = iv.try_into().map_err(|_| {
            VaultdexError::decryption(format!(
                "Invalid IV length: expected {} bytes, got {} bytes",
                IV_SIZE,
                iv.len()
            ))
        })?;

        if ciphertext.is_empty() || ciphertext.len() % IV_SIZE != 0 {
            return Err(VaultdexError::decryption(format!(
                "Ciphertext length {} is not a positive multiple of the block size",
                ciphertext.len()
            )));
        }

        Aes256CbcDec::new(&(*key.as_bytes()).into(), &(*iv).into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| {
                debug!("Padding check failed - wrong key or corrupted data");
                VaultdexError::decryption("Invalid padding - wrong key or corrupted data")
            })
    }

    /// Generate a random salt of `size` bytes
    pub fn generate_salt(size: usize) -> Result<Vec<u8>> {
        let mut salt = vec![0u8; size];
        fill_random(&mut salt)?;
        Ok(salt)
    }

    /// Generate a random CBC IV
    pub fn generate_iv() -> Result<[u8; IV_SIZE]> {
        let mut iv = [0u8; IV_SIZE];
        fill_random(&mut iv)?;
        Ok(iv)
    }

    /// Generate a random 256-bit key
    pub fn generate_key() -> Result<KeyMaterial> {
        let mut key = [0u8; KEY_SIZE];
        fill_random(&mut key)?;
        Ok(KeyMaterial::new(key))
    }
}

fn fill_random(buf: &mut [u8]) -> Result<()> {
    OsRng.try_fill_bytes(buf).map_err(|e| {
        error!("Failed to read from the system random source");
        VaultdexError::encryption(format!("Random generation failed: {}", e))
    })
}
