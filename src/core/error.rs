//! Error types for the embedded IPsec engine.
//!
//! Layered the way the reference engine's status taxonomy (§6) is layered:
//! a leaf error per subsystem, composed into [`IpsecError`] for the two
//! pipeline entry points. Every `IpsecError` variant corresponds 1:1 to a
//! caller-visible status code from the spec so a host can match on it
//! directly instead of maintaining its own lookup table.

use thiserror::Error;

/// Errors raised while parsing or synthesizing packet headers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Buffer too short to contain the header it claims to hold.
    #[error("truncated packet: need at least {need} bytes, have {have}")]
    Truncated {
        /// Minimum required length.
        need: usize,
        /// Actual buffer length.
        have: usize,
    },

    /// IPv4 `version`/`ihl` nibble pair was not a plausible IPv4 header.
    #[error("malformed IPv4 header: version/ihl byte {0:#04x}")]
    BadVersionIhl(u8),

    /// AH `payload_length` field was not 4 (i.e. the AH region was not the
    /// 24 bytes this engine supports for 96-bit ICVs).
    #[error("unsupported AH length: payload_length field = {0} (only 4 is supported)")]
    BadAhLength(u8),

    /// Declared inner/outer total length did not fit the supplied buffer
    /// or fell outside `IPSEC_MTU`.
    #[error("packet length {0} out of range")]
    BadLength(usize),

    /// Caller-provided headroom/tailroom was insufficient for the requested
    /// transform.
    #[error("insufficient buffer room: need {need} bytes of {kind}, have {have}")]
    InsufficientRoom {
        /// Which region was short (`"prefix headroom"` or `"suffix room"`).
        kind: &'static str,
        /// Bytes required.
        need: usize,
        /// Bytes available.
        have: usize,
    },
}

/// Errors raised by the cryptographic primitives and the transforms that
/// invoke them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// SA named an authentication or encryption algorithm this engine does
    /// not implement.
    #[error("unsupported algorithm")]
    UnsupportedAlgorithm,

    /// Computed ICV did not match the one carried on the wire.
    #[error("ICV mismatch")]
    IcvMismatch,

    /// Anti-replay window rejected the sequence number.
    #[error("replay detected")]
    ReplayDetected,

    /// Key material was the wrong length for the selected algorithm.
    #[error("bad key length: expected {expected}, got {actual}")]
    BadKeyLength {
        /// Expected key length in bytes.
        expected: usize,
        /// Actual key length supplied.
        actual: usize,
    },

    /// Plaintext/ciphertext length was not a multiple of the cipher's block
    /// size.
    #[error("data length {0} is not a multiple of the block size")]
    UnalignedData(usize),
}

/// Errors raised by Security Association Database operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SadError {
    /// Table has no free slots left.
    #[error("SAD table full")]
    TableFull,

    /// Handle did not reference a currently-used entry in this table.
    #[error("invalid or stale SAD handle")]
    InvalidHandle,

    /// Deletion was refused because an SPD entry still points at this SA
    /// (see `DESIGN.md`, SA-deletion policy).
    #[error("SA is still referenced by {0} SPD entr(ies)")]
    StillReferenced(usize),
}

/// Errors raised by Security Policy Database operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpdError {
    /// Table has no free slots left.
    #[error("SPD table full")]
    TableFull,

    /// Handle did not reference a currently-used entry in this table.
    #[error("invalid or stale SPD handle")]
    InvalidHandle,

    /// An APPLY entry was added or bound without an SA reference.
    #[error("APPLY policy requires a bound SA")]
    ApplyWithoutSa,
}

/// Top-level status returned by the pipeline entry points (`ipsec_input`,
/// `ipsec_output`) and by database configuration calls.
///
/// Each variant names a status from the spec's §6 caller-visible taxonomy;
/// `Success` is represented by `Ok(..)` rather than a variant here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IpsecError {
    /// Generic processing failure (ICV mismatch, unknown algorithm, etc.)
    /// that doesn't warrant its own variant at the pipeline level.
    #[error("{0}")]
    Failure(String),

    /// Requested mode/feature is recognized but not implemented (anything
    /// other than tunnel mode).
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// Packet failed structural validation before any crypto ran.
    #[error("bad packet: {0}")]
    BadPacket(#[from] WireError),

    /// SA or packet named a protocol this engine does not dispatch on
    /// (anything other than AH or ESP).
    #[error("bad protocol: {0}")]
    BadProtocol(u8),

    /// Authentication or decryption failed.
    #[error("bad key / crypto failure: {0}")]
    BadKey(#[from] CryptoError),

    /// Inner packet's TTL was zero at encapsulation time.
    #[error("TTL expired")]
    TtlExpired,

    /// Inbound SAD lookup found no matching SA.
    #[error("no SA found for this (dest, protocol, spi)")]
    NoSaFound,

    /// SPD lookup found no matching policy.
    #[error("no policy found for this selector")]
    NoPolicyFound,

    /// SPD policy was DISCARD, or the SPD's bound SA did not match the SA
    /// actually used to process the packet (SPI mismatch).
    #[error("policy mismatch")]
    PolicyMismatch,

    /// Supplied buffer length/headroom did not agree with the packet it
    /// claims to describe.
    #[error("data size error: {0}")]
    DataSizeError(String),

    /// Operation was attempted on a database set that has not been loaded.
    #[error("database set not initialized")]
    NotInitialized,
}

impl From<SadError> for IpsecError {
    fn from(e: SadError) -> Self {
        IpsecError::Failure(e.to_string())
    }
}

impl From<SpdError> for IpsecError {
    fn from(e: SpdError) -> Self {
        IpsecError::Failure(e.to_string())
    }
}
