//! Cryptographic primitives: HMAC-MD5-96, HMAC-SHA1-96, and DES/3DES-CBC.
//!
//! These are the four algorithms the supported profile allows (RFC 2402/2406
//! restricted to 96-bit truncated ICVs and single/triple DES). Rather than
//! hand-roll MD5, SHA-1, DES, or HMAC, this module is a thin dispatch layer
//! over the RustCrypto crates (`md-5`, `sha1`, `hmac`, `des`, `cbc`), the same
//! way the rest of this engine leans on audited crates for primitives it
//! doesn't own.

mod des;
mod hmac_auth;

pub use des::{tdes_cbc_decrypt, tdes_cbc_encrypt};
pub use hmac_auth::{hmac_md5_96, hmac_sha1_96, icv_matches};

use crate::core::error::CryptoError;
use crate::core::{AUTH_MD5_KEY_LEN, AUTH_SHA1_KEY_LEN, AUTH_ICV_SIZE, ENC_3DES_KEY_LEN, ENC_DES_KEY_LEN};

/// Authentication algorithm carried by an SA, mirroring `IPSEC_HMAC_MD5` /
/// `IPSEC_HMAC_SHA1` from the reference engine's `sa.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAlgorithm {
    /// HMAC-MD5-96 (RFC 2403).
    HmacMd5,
    /// HMAC-SHA1-96 (RFC 2404).
    HmacSha1,
}

impl AuthAlgorithm {
    /// Expected authentication key length for this algorithm.
    pub fn key_len(self) -> usize {
        match self {
            AuthAlgorithm::HmacMd5 => AUTH_MD5_KEY_LEN,
            AuthAlgorithm::HmacSha1 => AUTH_SHA1_KEY_LEN,
        }
    }

    /// Compute the 96-bit truncated ICV for `data` under `key`.
    pub fn compute_icv(self, key: &[u8], data: &[u8]) -> Result<[u8; AUTH_ICV_SIZE], CryptoError> {
        if key.len() != self.key_len() {
            return Err(CryptoError::BadKeyLength {
                expected: self.key_len(),
                actual: key.len(),
            });
        }
        Ok(match self {
            AuthAlgorithm::HmacMd5 => hmac_md5_96(key, data),
            AuthAlgorithm::HmacSha1 => hmac_sha1_96(key, data),
        })
    }

    /// Verify `icv` against the ICV computed over `data` under `key`.
    pub fn verify_icv(self, key: &[u8], data: &[u8], icv: &[u8]) -> Result<(), CryptoError> {
        let expected = self.compute_icv(key, data)?;
        if icv_matches(&expected, icv) {
            Ok(())
        } else {
            Err(CryptoError::IcvMismatch)
        }
    }
}

/// Encryption algorithm carried by an SA, mirroring `IPSEC_DES` /
/// `IPSEC_3DES` from the reference engine's `sa.h`. `IPSEC_IDEA` is named in
/// the original schema but never implemented there either; it surfaces here
/// as [`CryptoError::UnsupportedAlgorithm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncAlgorithm {
    /// Single DES-CBC (RFC 2405).
    Des,
    /// Triple DES-EDE-CBC (RFC 2451).
    TripleDes,
}

impl EncAlgorithm {
    /// Expected encryption key length for this algorithm.
    pub fn key_len(self) -> usize {
        match self {
            EncAlgorithm::Des => ENC_DES_KEY_LEN,
            EncAlgorithm::TripleDes => ENC_3DES_KEY_LEN,
        }
    }

    /// Encrypt `plaintext` in place under CBC mode, returning the
    /// ciphertext. `plaintext.len()` must already be a multiple of the
    /// block size (8); callers pad before calling this.
    pub fn encrypt(self, key: &[u8], iv: &[u8; 8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.check_key(key)?;
        match self {
            EncAlgorithm::Des => des::des_cbc_encrypt(key, iv, plaintext),
            EncAlgorithm::TripleDes => des::tdes_cbc_encrypt(key, iv, plaintext),
        }
    }

    /// Decrypt `ciphertext` under CBC mode, returning the plaintext.
    pub fn decrypt(self, key: &[u8], iv: &[u8; 8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.check_key(key)?;
        match self {
            EncAlgorithm::Des => des::des_cbc_decrypt(key, iv, ciphertext),
            EncAlgorithm::TripleDes => des::tdes_cbc_decrypt(key, iv, ciphertext),
        }
    }

    fn check_key(self, key: &[u8]) -> Result<(), CryptoError> {
        if key.len() != self.key_len() {
            return Err(CryptoError::BadKeyLength {
                expected: self.key_len(),
                actual: key.len(),
            });
        }
        Ok(())
    }
}
