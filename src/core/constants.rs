//! Protocol constants for the embedded IPsec engine.
//!
//! These values are fixed by the supported profile (RFC 2402/2406, 96-bit
//! truncated ICVs, 32-bit replay windows) and MUST NOT be changed per-SA.

// =============================================================================
// IP / MTU
// =============================================================================

/// Minimum IPv4 header size in bytes (no options).
pub const IP_HDR_SIZE: usize = 20;

/// Maximum size of a packet this engine will process, inner or outer.
pub const IPSEC_MTU: usize = 1400;

/// IANA protocol number for AH (RFC 4302).
pub const IPPROTO_AH: u8 = 51;

/// IANA protocol number for ESP (RFC 4303).
pub const IPPROTO_ESP: u8 = 50;

/// Protocol number for IP-in-IP encapsulation (used as the AH/ESP next-header).
pub const IPPROTO_IPIP: u8 = 0x04;

/// Protocol number for TCP.
pub const IPPROTO_TCP: u8 = 6;

/// Protocol number for UDP.
pub const IPPROTO_UDP: u8 = 17;

/// Default TTL written into the outer IP header on encapsulation.
pub const DEFAULT_OUTER_TTL: u8 = 64;

// =============================================================================
// AH (RFC 2402 / 4302)
// =============================================================================

/// Fixed AH header size (next_header, len, reserved, SPI, sequence), before the ICV.
pub const AH_HDR_SIZE: usize = 12;

/// Truncated ICV length supported by this engine (96 bits).
pub const AUTH_ICV_SIZE: usize = 12;

/// Total AH region size: header + 96-bit ICV.
pub const AH_TOTAL_SIZE: usize = AH_HDR_SIZE + AUTH_ICV_SIZE;

/// Wire value of the AH `payload_length` field for a 96-bit ICV:
/// `(AH_TOTAL_SIZE / 4) - 2 == 4`.
pub const AH_PAYLOAD_LEN_FIELD: u8 = 4;

/// Bytes of prefix headroom an outbound AH packet needs: outer IP + AH + ICV.
pub const AH_ENCAP_HEADROOM: usize = IP_HDR_SIZE + AH_TOTAL_SIZE;

// =============================================================================
// ESP (RFC 2406 / 4303)
// =============================================================================

/// ESP header size: SPI (4) + sequence number (4).
pub const ESP_HDR_SIZE: usize = 8;

/// CBC IV size for (3)DES.
pub const ESP_IV_SIZE: usize = 8;

/// DES/3DES cipher block size.
pub const DES_BLOCK_SIZE: usize = 8;

/// Bytes of prefix headroom an outbound ESP packet needs: outer IP + ESP header + IV.
pub const ESP_ENCAP_PREFIX: usize = IP_HDR_SIZE + ESP_HDR_SIZE + ESP_IV_SIZE;

/// Bytes of suffix headroom an outbound ESP packet may need in the worst case:
/// up to 7 bytes of padding, plus the pad-length byte, next-header byte, and
/// a 96-bit ICV.
pub const ESP_ENCAP_MAX_SUFFIX: usize = 7 + 1 + 1 + AUTH_ICV_SIZE;

// =============================================================================
// KEY MATERIAL
// =============================================================================

/// Maximum encryption key length carried by an SA (3DES: 24 bytes).
pub const MAX_ENC_KEY_LEN: usize = 24;

/// Maximum authentication key length carried by an SA (HMAC-SHA1: 20 bytes).
pub const MAX_AUTH_KEY_LEN: usize = 20;

/// Authentication key length used for HMAC-MD5.
pub const AUTH_MD5_KEY_LEN: usize = 16;

/// Authentication key length used for HMAC-SHA1.
pub const AUTH_SHA1_KEY_LEN: usize = 20;

/// Encryption key length used for single DES.
pub const ENC_DES_KEY_LEN: usize = 8;

/// Encryption key length used for 3DES (EDE, three independent 8-byte keys).
pub const ENC_3DES_KEY_LEN: usize = 24;

// =============================================================================
// ANTI-REPLAY
// =============================================================================

/// Replay window width in sequence numbers (fixed at 32 for this profile).
pub const REPLAY_WINDOW_SIZE: u32 = 32;

/// Sequence number value that is never sent and never accepted.
pub const SEQ_RESERVED: u32 = 0;

// =============================================================================
// DATABASE CAPACITY
// =============================================================================

/// Default number of usable slots in a single SAD or SPD table.
pub const DEFAULT_TABLE_CAPACITY: usize = 10;

/// Default number of network interfaces (database sets) supported.
pub const DEFAULT_INTERFACE_COUNT: usize = 1;
