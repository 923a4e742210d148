//! Envelope encryption for credential secrets (spec §3 "Credential", §9
//! "Encryption of secrets at rest"): a per-user KEK wraps a per-value DEK,
//! and the KEK itself is wrapped by a rotating master key (MEK), selected by
//! an id stored in the service config. Grounded on
//! `everruns-storage::encryption::EncryptionService`, generalized to the
//! extra KEK tier the spec calls for and made forward-compatible with new
//! MEK ids without touching already-wrapped KEKs.

use std::collections::HashMap;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;
const PAYLOAD_VERSION: u8 = 1;

/// A single JWK-formatted (`kty: "oct"`) symmetric master key.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JwkKey {
    pub kid: String,
    /// Base64url-encoded 32-byte key, as JWK's `k` member.
    pub k: String,
}

/// The set of master keys available for unwrapping, plus which one new
/// wraps use. Old keys are kept around purely so that KEKs wrapped under a
/// retired MEK id still decrypt (spec §9: "keep the unwrap path
/// forward-compatible with new MEK ids").
pub struct MasterKeyRing {
    current_kid: String,
    ciphers: HashMap<String, Aes256Gcm>,
}

impl MasterKeyRing {
    pub fn new(keys: &[JwkKey], current_kid: &str) -> Result<Self, StoreError> {
        let mut ciphers = HashMap::new();
        for key in keys {
            let bytes = BASE64
                .decode(key.k.as_bytes())
                .map_err(|e| StoreError::Encryption(format!("bad base64 for MEK {:?}: {e}", key.kid)))?;
            if bytes.len() != KEY_SIZE {
                return Err(StoreError::Encryption(format!(
                    "MEK {:?} must be {KEY_SIZE} bytes, got {}",
                    key.kid,
                    bytes.len()
                )));
            }
            let cipher = Aes256Gcm::new_from_slice(&bytes)
                .map_err(|e| StoreError::Encryption(format!("bad MEK {:?}: {e}", key.kid)))?;
            ciphers.insert(key.kid.clone(), cipher);
        }
        if !ciphers.contains_key(current_kid) {
            return Err(StoreError::Encryption(format!(
                "current MEK id {current_kid:?} is not present in the key ring"
            )));
        }
        Ok(Self {
            current_kid: current_kid.to_string(),
            ciphers,
        })
    }

    /// Loads `OSMO_MEK_JWKS` (a JSON array of [`JwkKey`]) and `OSMO_MEK_CURRENT_KID`.
    pub fn from_env() -> Result<Self, StoreError> {
        let jwks = std::env::var("OSMO_MEK_JWKS")
            .map_err(|_| StoreError::Encryption("OSMO_MEK_JWKS not set".to_string()))?;
        let keys: Vec<JwkKey> = serde_json::from_str(&jwks)
            .map_err(|e| StoreError::Encryption(format!("invalid OSMO_MEK_JWKS: {e}")))?;
        let current_kid = std::env::var("OSMO_MEK_CURRENT_KID")
            .map_err(|_| StoreError::Encryption("OSMO_MEK_CURRENT_KID not set".to_string()))?;
        Self::new(&keys, &current_kid)
    }

    fn cipher(&self, kid: &str) -> Result<&Aes256Gcm, StoreError> {
        self.ciphers
            .get(kid)
            .ok_or_else(|| StoreError::UnknownMasterKeyId(kid.to_string()))
    }

    pub fn current_kid(&self) -> &str {
        &self.current_kid
    }
}

/// A per-user KEK, wrapped by a named MEK. Stored alongside the user's
/// credentials; `mek_kid` records which MEK to reach for on unwrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedKek {
    pub mek_kid: String,
    pub nonce: String,
    pub ciphertext: String,
}

/// A credential value encrypted with a per-value DEK, itself wrapped by the
/// caller-supplied KEK (mirrors `EncryptedPayload` in the teacher crate, one
/// tier deeper).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedSecret {
    pub version: u8,
    pub dek_nonce: String,
    pub dek_wrapped: String,
    pub nonce: String,
    pub ciphertext: String,
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

/// Generates a fresh 32-byte KEK wrapped under the ring's current MEK,
/// suitable for a brand-new user.
pub fn generate_wrapped_kek(ring: &MasterKeyRing) -> Result<WrappedKek, StoreError> {
    let kek_bytes = random_bytes::<KEY_SIZE>();
    wrap_kek(ring, &kek_bytes)
}

fn wrap_kek(ring: &MasterKeyRing, kek_bytes: &[u8; KEY_SIZE]) -> Result<WrappedKek, StoreError> {
    let cipher = ring.cipher(&ring.current_kid)?;
    let nonce_bytes = random_bytes::<NONCE_SIZE>();
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, kek_bytes.as_ref())
        .map_err(|e| StoreError::Encryption(format!("failed to wrap KEK: {e}")))?;
    Ok(WrappedKek {
        mek_kid: ring.current_kid.clone(),
        nonce: BASE64.encode(nonce_bytes),
        ciphertext: BASE64.encode(ciphertext),
    })
}

fn unwrap_kek(ring: &MasterKeyRing, wrapped: &WrappedKek) -> Result<[u8; KEY_SIZE], StoreError> {
    let cipher = ring.cipher(&wrapped.mek_kid)?;
    let nonce_bytes = BASE64
        .decode(&wrapped.nonce)
        .map_err(|e| StoreError::Encryption(format!("bad wrapped-KEK nonce: {e}")))?;
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = BASE64
        .decode(&wrapped.ciphertext)
        .map_err(|e| StoreError::Encryption(format!("bad wrapped-KEK ciphertext: {e}")))?;
    let plaintext = cipher
        .decrypt(nonce, ciphertext.as_ref())
        .map_err(|e| StoreError::Encryption(format!("failed to unwrap KEK: {e}")))?;
    plaintext
        .try_into()
        .map_err(|_| StoreError::Encryption("unwrapped KEK had the wrong length".to_string()))
}

/// Whether `wrapped` was wrapped by a MEK other than the ring's current one,
/// i.e. it is due for re-wrapping (mirrors `EncryptionService::is_current_key`).
pub fn kek_is_stale(ring: &MasterKeyRing, wrapped: &WrappedKek) -> bool {
    wrapped.mek_kid != ring.current_kid
}

/// Re-wraps a KEK under the ring's current MEK. Returns `None` if it is
/// already current.
pub fn rewrap_kek(ring: &MasterKeyRing, wrapped: &WrappedKek) -> Result<Option<WrappedKek>, StoreError> {
    if !kek_is_stale(ring, wrapped) {
        return Ok(None);
    }
    let kek_bytes = unwrap_kek(ring, wrapped)?;
    Ok(Some(wrap_kek(ring, &kek_bytes)?))
}

/// Per-user-KEK envelope encryption, with a bounded read-through cache of
/// unwrapped KEKs (spec §9 "Shared mutable state": "(user → decrypted
/// credential) ... strictly read-through caches with bounded size and
/// mutex-protected invalidation; they are not authoritative").
pub struct EncryptionService {
    ring: MasterKeyRing,
    kek_cache: osmo_types::cache::LruCache<String, [u8; KEY_SIZE]>,
}

impl EncryptionService {
    pub fn new(ring: MasterKeyRing, kek_cache_capacity: usize) -> Self {
        Self {
            ring,
            kek_cache: osmo_types::cache::LruCache::new(kek_cache_capacity),
        }
    }

    pub fn ring(&self) -> &MasterKeyRing {
        &self.ring
    }

    pub fn generate_wrapped_kek(&self) -> Result<WrappedKek, StoreError> {
        generate_wrapped_kek(&self.ring)
    }

    pub fn rewrap_kek(&self, wrapped: &WrappedKek) -> Result<Option<WrappedKek>, StoreError> {
        rewrap_kek(&self.ring, wrapped)
    }

    /// Unwraps `wrapped`'s KEK, consulting (and populating) the per-user
    /// cache keyed by `owner`. Invalidate by evicting the user's entry (the
    /// cache is not authoritative: a miss just re-unwraps).
    fn resolve_kek(&self, owner: &str, wrapped: &WrappedKek) -> Result<[u8; KEY_SIZE], StoreError> {
        if let Some(cached) = self.kek_cache.get(&owner.to_string()) {
            return Ok(cached);
        }
        let kek = unwrap_kek(&self.ring, wrapped)?;
        self.kek_cache.set(owner.to_string(), kek);
        Ok(kek)
    }

    /// Encrypts `plaintext` with a fresh DEK, itself wrapped by `owner`'s KEK.
    pub fn encrypt(&self, owner: &str, wrapped_kek: &WrappedKek, plaintext: &[u8]) -> Result<EncryptedSecret, StoreError> {
        let kek_bytes = self.resolve_kek(owner, wrapped_kek)?;
        let kek_cipher = Aes256Gcm::new_from_slice(&kek_bytes)
            .map_err(|e| StoreError::Encryption(format!("bad KEK: {e}")))?;

        let dek_bytes = random_bytes::<KEY_SIZE>();
        let dek_nonce_bytes = random_bytes::<NONCE_SIZE>();
        let dek_nonce = Nonce::from_slice(&dek_nonce_bytes);
        let dek_wrapped = kek_cipher
            .encrypt(dek_nonce, dek_bytes.as_ref())
            .map_err(|e| StoreError::Encryption(format!("failed to wrap DEK: {e}")))?;

        let dek_cipher = Aes256Gcm::new_from_slice(&dek_bytes)
            .map_err(|e| StoreError::Encryption(format!("bad DEK: {e}")))?;
        let data_nonce_bytes = random_bytes::<NONCE_SIZE>();
        let data_nonce = Nonce::from_slice(&data_nonce_bytes);
        let ciphertext = dek_cipher
            .encrypt(data_nonce, plaintext)
            .map_err(|e| StoreError::Encryption(format!("encryption failed: {e}")))?;

        Ok(EncryptedSecret {
            version: PAYLOAD_VERSION,
            dek_nonce: BASE64.encode(dek_nonce_bytes),
            dek_wrapped: BASE64.encode(dek_wrapped),
            nonce: BASE64.encode(data_nonce_bytes),
            ciphertext: BASE64.encode(ciphertext),
        })
    }

    pub fn decrypt(&self, owner: &str, wrapped_kek: &WrappedKek, secret: &EncryptedSecret) -> Result<Vec<u8>, StoreError> {
        if secret.version != PAYLOAD_VERSION {
            return Err(StoreError::Encryption(format!(
                "unsupported secret payload version {} (expected {PAYLOAD_VERSION})",
                secret.version
            )));
        }
        let kek_bytes = self.resolve_kek(owner, wrapped_kek)?;
        let kek_cipher = Aes256Gcm::new_from_slice(&kek_bytes)
            .map_err(|e| StoreError::Encryption(format!("bad KEK: {e}")))?;

        let dek_nonce_bytes = BASE64
            .decode(&secret.dek_nonce)
            .map_err(|e| StoreError::Encryption(format!("bad DEK nonce: {e}")))?;
        let dek_nonce = Nonce::from_slice(&dek_nonce_bytes);
        let dek_wrapped = BASE64
            .decode(&secret.dek_wrapped)
            .map_err(|e| StoreError::Encryption(format!("bad wrapped DEK: {e}")))?;
        let dek_bytes = kek_cipher
            .decrypt(dek_nonce, dek_wrapped.as_ref())
            .map_err(|e| StoreError::Encryption(format!("failed to unwrap DEK: {e}")))?;

        let dek_cipher = Aes256Gcm::new_from_slice(&dek_bytes)
            .map_err(|e| StoreError::Encryption(format!("bad DEK: {e}")))?;
        let data_nonce_bytes = BASE64
            .decode(&secret.nonce)
            .map_err(|e| StoreError::Encryption(format!("bad nonce: {e}")))?;
        let data_nonce = Nonce::from_slice(&data_nonce_bytes);
        let ciphertext = BASE64
            .decode(&secret.ciphertext)
            .map_err(|e| StoreError::Encryption(format!("bad ciphertext: {e}")))?;

        dek_cipher
            .decrypt(data_nonce, ciphertext.as_ref())
            .map_err(|e| StoreError::Encryption(format!("decryption failed (data may be corrupted): {e}")))
    }
}

/// Generates a new random MEK in JWK form, for operators rotating keys.
pub fn generate_mek(kid: &str) -> JwkKey {
    let key = random_bytes::<KEY_SIZE>();
    JwkKey {
        kid: kid.to_string(),
        k: BASE64.encode(key),
    }
}
