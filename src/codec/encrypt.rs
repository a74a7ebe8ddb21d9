//! AES-256-GCM encryption pipeline stage (spec §4.3, §6's
//! `encrypt`/`decrypt`/`generate_key_iv` collaborator). The random
//! nonce generated for each `Forward` call is prepended to the
//! ciphertext so the matching `Inverse` call can recover it without a
//! side channel.

use super::{Direction, PipelineStage};
use crate::error::{Error, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// A generated symmetric key and the nonce used for the next encryption
/// call, per spec §6's `generate_key_iv()` collaborator.
pub struct KeyMaterial {
    pub key: [u8; KEY_LEN],
    pub nonce: [u8; NONCE_LEN],
}

/// Generates fresh, random key material via the OS RNG.
pub fn generate_key_iv() -> KeyMaterial {
    let mut key = [0u8; KEY_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut key);
    rand::thread_rng().fill_bytes(&mut nonce);
    KeyMaterial { key, nonce }
}

/// AES-256-GCM pipeline stage bound to a fixed key. Each `Forward` call
/// draws a fresh random nonce (never reusing the key's configured
/// nonce) and prepends it to the returned ciphertext; `Inverse` reads
/// the nonce back off the front of its input.
pub struct AesGcmStage {
    key: [u8; KEY_LEN],
}

impl AesGcmStage {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        AesGcmStage { key }
    }

    pub fn generated() -> (Self, KeyMaterial) {
        let material = generate_key_iv();
        (AesGcmStage::new(material.key), material)
    }
}

impl PipelineStage for AesGcmStage {
    fn name(&self) -> &'static str {
        "aes-256-gcm"
    }

    fn apply(&self, direction: Direction, input: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        match direction {
            Direction::Forward => {
                let mut nonce_bytes = [0u8; NONCE_LEN];
                rand::thread_rng().fill_bytes(&mut nonce_bytes);
                let nonce = Nonce::from_slice(&nonce_bytes);
                let ciphertext = cipher
                    .encrypt(nonce, input)
                    .map_err(|e| Error::CodecFailure(format!("aes-gcm encrypt: {e}")))?;
                let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
                out.extend_from_slice(&nonce_bytes);
                out.extend_from_slice(&ciphertext);
                Ok(out)
            }
            Direction::Inverse => {
                if input.len() < NONCE_LEN {
                    return Err(Error::CodecFailure("ciphertext shorter than nonce".into()));
                }
                let (nonce_bytes, ciphertext) = input.split_at(NONCE_LEN);
                let nonce = Nonce::from_slice(nonce_bytes);
                cipher
                    .decrypt(nonce, ciphertext)
                    .map_err(|e| Error::CodecFailure(format!("aes-gcm decrypt: {e}")))
            }
        }
    }
}
