//! Per-entry authenticated encryption for the local secret store.
//!
//! Each entry is sealed independently:
//!
//! ```text
//! base64( 0x01 | nonce[16] | ciphertext | tag[32] )
//! ```
//!
//! The keystream is HMAC-SHA256(enc_key, nonce | counter) in counter mode and
//! the tag is HMAC-SHA256(mac_key, version | nonce | ciphertext)
//! (encrypt-then-MAC). Both keys are derived from the supplied key material
//! with domain-separated HMAC. Every entry gets a fresh random nonce.

use crate::env::EnvSource;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

const FORMAT_VERSION: u8 = 1;
const NONCE_LEN: usize = 16;
const TAG_LEN: usize = 32;

/// Symmetric key for the local secret store.
#[derive(Clone)]
pub struct StoreKey {
    enc: [u8; 32],
    mac: [u8; 32],
    ephemeral: bool,
}

impl StoreKey {
    /// Derive a key from externally supplied key material.
    ///
    /// The material is hashed once, without salt or stretching, so it must
    /// be a high-entropy random key (for example 32 random bytes, base64
    /// encoded). Human passphrases are not safe here.
    pub fn from_secret(secret: &str) -> Self {
        let master: [u8; 32] = Sha256::digest(secret.as_bytes()).into();
        Self::from_master(master, false)
    }

    /// A random key that only lives as long as this process.
    pub fn generate() -> Self {
        let mut master = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut master);
        Self::from_master(master, true)
    }

    /// Read key material from `var`, falling back to a generated key.
    ///
    /// `var` must hold high-entropy key material, see [`StoreKey::from_secret`].
    ///
    /// Entries written under a generated key cannot be read by any later
    /// process.
    pub fn from_env(env: &dyn EnvSource, var: &str) -> Self {
        match env.var(var).filter(|v| !v.trim().is_empty()) {
            Some(secret) => Self::from_secret(&secret),
            None => {
                warn!(
                    "!!! {var} is not set: generated a temporary secret store key. \
                     Secrets cached during this process will be unreadable after it exits. !!!"
                );
                Self::generate()
            }
        }
    }

    fn from_master(master: [u8; 32], ephemeral: bool) -> Self {
        Self {
            enc: hmac_sha256(&master, &[&b"agentflow/store/enc"[..]]),
            mac: hmac_sha256(&master, &[&b"agentflow/store/mac"[..]]),
            ephemeral,
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    /// Encrypt and authenticate one entry.
    pub fn seal(&self, plaintext: &[u8]) -> String {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let mut ciphertext = plaintext.to_vec();
        self.apply_keystream(&nonce, &mut ciphertext);

        let tag = hmac_sha256(&self.mac, &[&[FORMAT_VERSION][..], &nonce[..], &ciphertext[..]]);

        let mut out = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len() + TAG_LEN);
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        out.extend_from_slice(&tag);
        STANDARD.encode(out)
    }

    /// Verify and decrypt one entry. `None` on any corruption or key mismatch.
    pub fn open(&self, sealed: &str) -> Option<Vec<u8>> {
        let raw = STANDARD.decode(sealed.trim()).ok()?;
        if raw.len() < 1 + NONCE_LEN + TAG_LEN || raw[0] != FORMAT_VERSION {
            return None;
        }

        let (body, tag) = raw.split_at(raw.len() - TAG_LEN);
        let nonce = &body[1..1 + NONCE_LEN];
        let ciphertext = &body[1 + NONCE_LEN..];

        let expected = hmac_sha256(&self.mac, &[&[FORMAT_VERSION][..], nonce, ciphertext]);
        if !bool::from(expected[..].ct_eq(tag)) {
            return None;
        }

        let mut plaintext = ciphertext.to_vec();
        self.apply_keystream(nonce, &mut plaintext);
        Some(plaintext)
    }

    fn apply_keystream(&self, nonce: &[u8], data: &mut [u8]) {
        for (counter, chunk) in data.chunks_mut(32).enumerate() {
            let counter = (counter as u64).to_be_bytes();
            let block = hmac_sha256(&self.enc, &[nonce, &counter[..]]);
            for (byte, k) in chunk.iter_mut().zip(block.iter()) {
                *byte ^= k;
            }
        }
    }
}

impl std::fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreKey")
            .field("ephemeral", &self.ephemeral)
            .finish_non_exhaustive()
    }
}

fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}
