//! HMAC-MD5-96 (RFC 2403) and HMAC-SHA1-96 (RFC 2404): full HMAC truncated
//! to the leftmost 96 bits.

use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;

use crate::core::AUTH_ICV_SIZE;

/// Compute HMAC-MD5 over `data` under `key` and truncate to 96 bits.
pub fn hmac_md5_96(key: &[u8], data: &[u8]) -> [u8; AUTH_ICV_SIZE] {
    let mut mac = Hmac::<Md5>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    let full = mac.finalize().into_bytes();
    let mut icv = [0u8; AUTH_ICV_SIZE];
    icv.copy_from_slice(&full[..AUTH_ICV_SIZE]);
    icv
}

/// Compute HMAC-SHA1 over `data` under `key` and truncate to 96 bits.
pub fn hmac_sha1_96(key: &[u8], data: &[u8]) -> [u8; AUTH_ICV_SIZE] {
    let mut mac = Hmac::<Sha1>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    let full = mac.finalize().into_bytes();
    let mut icv = [0u8; AUTH_ICV_SIZE];
    icv.copy_from_slice(&full[..AUTH_ICV_SIZE]);
    icv
}

/// Constant-time comparison of a computed ICV against the one on the wire.
/// `icv` may be any length; a length mismatch is treated as a mismatch
/// rather than a panic.
pub fn icv_matches(expected: &[u8; AUTH_ICV_SIZE], icv: &[u8]) -> bool {
    if icv.len() != AUTH_ICV_SIZE {
        return false;
    }
    let mut diff = 0u8;
    for (a, b) in expected.iter().zip(icv.iter()) {
        diff |= a ^ b;
    }
    diff == 0
}
