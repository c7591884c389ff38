//! Secret Store (C1): AES-256-GCM sealing, masking, constant-time compare.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("encryption key not initialized")]
    KeyNotInitialized,
    #[error("sealed value is truncated")]
    Truncated,
    #[error("sealed value is not valid base64")]
    InvalidBase64,
    #[error("authentication failed: ciphertext was tampered with or the key is wrong")]
    AuthenticationFailed,
}

/// Authenticated encryption for credential material. One `SecretStore` per
/// process, constructed once from configuration; holds only the derived key.
pub struct SecretStore {
    cipher: Aes256Gcm,
}

impl SecretStore {
    /// Derive a 32-byte key from operator-supplied secret material by
    /// right-padding/truncating. This is intentionally weak KDF hygiene,
    /// kept for compatibility with existing 32-char operator secrets; see
    /// design notes for the recommended HKDF-based replacement.
    pub fn new(secret: &[u8]) -> Result<Self, CryptoError> {
        if secret.is_empty() {
            return Err(CryptoError::KeyNotInitialized);
        }
        let mut key = [0u8; KEY_LEN];
        let n = secret.len().min(KEY_LEN);
        key[..n].copy_from_slice(&secret[..n]);
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::KeyNotInitialized)?;
        Ok(Self { cipher })
    }

    /// Seal plaintext with a fresh random 96-bit IV. Output is
    /// `base64(IV || ciphertext || tag)`.
    pub fn seal(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::KeyNotInitialized)?;

        let mut packed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        packed.extend_from_slice(&nonce_bytes);
        packed.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(packed))
    }

    /// Open a sealed value, authenticating the GCM tag. Any truncation or
    /// tamper yields `CryptoError::AuthenticationFailed`/`Truncated`.
    pub fn open(&self, sealed: &str) -> Result<String, CryptoError> {
        let packed = BASE64.decode(sealed).map_err(|_| CryptoError::InvalidBase64)?;
        if packed.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::Truncated);
        }

        let (nonce_bytes, ciphertext) = packed.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::AuthenticationFailed)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::AuthenticationFailed)
    }
}

/// Mask a plaintext secret for external display: exactly `"****"` when
/// `len < 5`, otherwise `"****"` plus the last four characters. Lossy by design.
pub fn mask(plaintext: &str) -> String {
    let chars: Vec<char> = plaintext.chars().collect();
    if chars.len() < 5 {
        "****".to_string()
    } else {
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("****{}", tail)
    }
}

/// Constant-time byte comparison: never short-circuits on the first
/// mismatch, only on a length mismatch (which itself leaks no byte content).
pub fn constant_time_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// A header name/value pair projected from a decrypted credential, ready to
/// attach to an outbound probe request.
pub struct AuthHeader {
    pub name: String,
    pub value: String,
}

/// Project a decrypted credential onto the `Authorization`/custom header the
/// Prober should send. `username` is only meaningful for BASIC_AUTH.
pub fn project_auth_header(
    kind: crate::model::CredentialType,
    value: &str,
    username: Option<&str>,
    header_name: Option<&str>,
) -> AuthHeader {
    use crate::model::CredentialType::*;
    match kind {
        BearerToken => AuthHeader {
            name: "Authorization".to_string(),
            value: format!("Bearer {}", value),
        },
        ApiKey => AuthHeader {
            name: header_name.unwrap_or("X-API-Key").to_string(),
            value: value.to_string(),
        },
        BasicAuth => {
            let user = username.unwrap_or("");
            let encoded = BASE64.encode(format!("{}:{}", user, value));
            AuthHeader {
                name: "Authorization".to_string(),
                value: format!("Basic {}", encoded),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SecretStore {
        SecretStore::new(b"0123456789abcdef0123456789abcdef").unwrap()
    }

    #[test]
    fn round_trip() {
        let s = store();
        let sealed = s.seal("my-secret-token").unwrap();
        assert_eq!(s.open(&sealed).unwrap(), "my-secret-token");
    }

    #[test]
    fn different_plaintexts_decrypt_differently() {
        let s = store();
        let a = s.seal("alpha").unwrap();
        let b = s.seal("beta").unwrap();
        assert_ne!(s.open(&a).unwrap(), s.open(&b).unwrap());
    }

    #[test]
    fn iv_uniqueness_across_seals_of_same_plaintext() {
        let s = store();
        let a = s.seal("same-value").unwrap();
        let b = s.seal("same-value").unwrap();
        assert_ne!(a, b);
        assert_eq!(s.open(&a).unwrap(), s.open(&b).unwrap());
    }

    #[test]
    fn tamper_is_rejected() {
        let s = store();
        let mut sealed = s.seal("tamper-me").unwrap();
        sealed.push('A');
        assert!(s.open(&sealed).is_err());
    }

    #[test]
    fn truncated_is_rejected() {
        let s = store();
        assert!(matches!(s.open("AA=="), Err(CryptoError::Truncated)));
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let s = store();
        assert!(matches!(s.open("not valid base64!!"), Err(CryptoError::InvalidBase64)));
    }

    #[test]
    fn mask_boundaries() {
        assert_eq!(mask("abcd"), "****");
        assert_eq!(mask("abcde"), "****bcde");
        assert_eq!(mask(""), "****");
    }

    #[test]
    fn constant_time_equal_basic() {
        assert!(constant_time_equal(b"abc", b"abc"));
        assert!(!constant_time_equal(b"abc", b"abd"));
        assert!(!constant_time_equal(b"abc", b"ab"));
    }

    #[test]
    fn basic_auth_header_matches_scenario() {
        let header = project_auth_header(
            crate::model::CredentialType::BasicAuth,
            "s3cret",
            Some("alice"),
            None,
        );
        assert_eq!(header.name, "Authorization");
        assert_eq!(header.value, "Basic YWxpY2U6czNjcmV0");
    }

    #[test]
    fn bearer_header() {
        let header =
            crate::crypto::project_auth_header(crate::model::CredentialType::BearerToken, "tok", None, None);
        assert_eq!(header.value, "Bearer tok");
    }

    #[test]
    fn api_key_header_defaults_name() {
        let header =
            crate::crypto::project_auth_header(crate::model::CredentialType::ApiKey, "key123", None, None);
        assert_eq!(header.name, "X-API-Key");
    }
}
