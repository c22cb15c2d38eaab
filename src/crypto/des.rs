//! DES-CBC (RFC 2405) and 3DES-EDE-CBC (RFC 2451), used only because the
//! supported profile names them; neither is fit for new deployments.

use cbc::{Decryptor, Encryptor};
use cipher::block_padding::NoPadding;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use des::{Des, TdesEde3};

use crate::core::error::CryptoError;

fn check_block_aligned(data: &[u8]) -> Result<(), CryptoError> {
    if data.len() % 8 != 0 {
        return Err(CryptoError::UnalignedData(data.len()));
    }
    Ok(())
}

/// Encrypt `plaintext` (already padded to a multiple of 8 bytes) with
/// single DES-CBC.
pub fn des_cbc_encrypt(key: &[u8], iv: &[u8; 8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    check_block_aligned(plaintext)?;
    let cipher = Encryptor::<Des>::new_from_slices(key, iv)
        .map_err(|_| CryptoError::BadKeyLength { expected: 8, actual: key.len() })?;
    let mut buf = plaintext.to_vec();
    let len = buf.len();
    let out = cipher
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .map_err(|_| CryptoError::UnalignedData(len))?;
    Ok(out.to_vec())
}

/// Decrypt `ciphertext` with single DES-CBC.
pub fn des_cbc_decrypt(key: &[u8], iv: &[u8; 8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    check_block_aligned(ciphertext)?;
    let cipher = Decryptor::<Des>::new_from_slices(key, iv)
        .map_err(|_| CryptoError::BadKeyLength { expected: 8, actual: key.len() })?;
    let mut buf = ciphertext.to_vec();
    let len = buf.len();
    let out = cipher
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| CryptoError::UnalignedData(len))?;
    Ok(out.to_vec())
}

/// Encrypt `plaintext` (already padded to a multiple of 8 bytes) with
/// 3DES-EDE-CBC under a 24-byte key (three independent 8-byte subkeys).
pub fn tdes_cbc_encrypt(key: &[u8], iv: &[u8; 8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    check_block_aligned(plaintext)?;
    let cipher = Encryptor::<TdesEde3>::new_from_slices(key, iv)
        .map_err(|_| CryptoError::BadKeyLength { expected: 24, actual: key.len() })?;
    let mut buf = plaintext.to_vec();
    let len = buf.len();
    let out = cipher
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .map_err(|_| CryptoError::UnalignedData(len))?;
    Ok(out.to_vec())
}

/// Decrypt `ciphertext` with 3DES-EDE-CBC.
pub fn tdes_cbc_decrypt(key: &[u8], iv: &[u8; 8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    check_block_aligned(ciphertext)?;
    let cipher = Decryptor::<TdesEde3>::new_from_slices(key, iv)
        .map_err(|_| CryptoError::BadKeyLength { expected: 24, actual: key.len() })?;
    let mut buf = ciphertext.to_vec();
    let len = buf.len();
    let out = cipher
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| CryptoError::UnalignedData(len))?;
    Ok(out.to_vec())
}
