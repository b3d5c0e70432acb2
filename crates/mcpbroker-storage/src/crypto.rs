//! AES-256-GCM value transformer.
//!
//! Output layout is `nonce || ciphertext || tag`. The resource context is
//! bound as associated data, so ciphertext copied onto a record with a
//! different context fails to decrypt.

use anyhow::{Context, Result};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

use crate::encryption::ValueTransformer;

/// Size of the encryption key (32 bytes = 256 bits).
pub const KEY_SIZE: usize = 32;

/// Size of the nonce (12 bytes for AES-GCM).
const NONCE_SIZE: usize = 12;

/// AES-256-GCM transformer for secret fields.
pub struct AesGcmTransformer {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl AesGcmTransformer {
    /// Create a transformer with the given 32-byte key.
    pub fn new(key: &[u8; KEY_SIZE]) -> Result<Self> {
        let unbound_key = UnboundKey::new(&AES_256_GCM, key)
            .map_err(|_| anyhow::anyhow!("Failed to create encryption key"))?;

        Ok(Self {
            key: LessSafeKey::new(unbound_key),
            rng: SystemRandom::new(),
        })
    }
}

impl ValueTransformer for AesGcmTransformer {
    fn transform_to_storage(&self, data: &[u8], context: &str) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| anyhow::anyhow!("Failed to generate nonce"))?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = data.to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::from(context.as_bytes()), &mut in_out)
            .map_err(|_| anyhow::anyhow!("Encryption failed"))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + in_out.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&in_out);
        Ok(result)
    }

    fn transform_from_storage(&self, data: &[u8], context: &str) -> Result<Vec<u8>> {
        if data.len() < NONCE_SIZE + AES_256_GCM.tag_len() {
            anyhow::bail!("Ciphertext too short");
        }

        let (nonce_bytes, encrypted) = data.split_at(NONCE_SIZE);
        let nonce_array: [u8; NONCE_SIZE] = nonce_bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("Invalid nonce"))?;
        let nonce = Nonce::assume_unique_for_key(nonce_array);

        let mut in_out = encrypted.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::from(context.as_bytes()), &mut in_out)
            .map_err(|_| {
                anyhow::anyhow!("Decryption failed - wrong key, context or corrupted data")
            })?;

        Ok(plaintext.to_vec())
    }
}

/// Generate a random 32-byte key.
pub fn generate_master_key() -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    let rng = SystemRandom::new();
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    rng.fill(&mut key[..])
        .map_err(|_| anyhow::anyhow!("Failed to generate random key"))?;
    Ok(key)
}

/// Parse a hex-encoded 32-byte key (64 hex characters).
pub fn parse_key_hex(value: &str) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    let bytes = Zeroizing::new(hex::decode(value.trim()).context("Key is not valid hex")?);
    if bytes.len() != KEY_SIZE {
        anyhow::bail!(
            "Key must be {} bytes ({} hex characters), got {} bytes",
            KEY_SIZE,
            KEY_SIZE * 2,
            bytes.len()
        );
    }
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(&bytes);
    Ok(key)
}
