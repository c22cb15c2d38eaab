//! IPv4 header parsing, synthesis, and the Internet checksum.

use super::buffer::{PacketBuf, PacketBufMut};
use super::constants::{IPPROTO_AH, IPPROTO_ESP, IPPROTO_IPIP, IPPROTO_TCP, IPPROTO_UDP, IP_HDR_SIZE};
use super::error::WireError;
use super::Ipv4Addr4;

/// IP protocol number, narrowed to the handful this engine dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Authentication Header (RFC 4302).
    Ah,
    /// Encapsulating Security Payload (RFC 4303).
    Esp,
    /// IP-in-IP (the tunnel-mode next-header value this engine writes).
    IpIp,
    /// TCP, relevant only for SPD port selectors.
    Tcp,
    /// UDP, relevant only for SPD port selectors.
    Udp,
    /// Anything else, carried through unexamined.
    Other(u8),
}

impl From<u8> for Protocol {
    fn from(value: u8) -> Self {
        match value {
            IPPROTO_AH => Protocol::Ah,
            IPPROTO_ESP => Protocol::Esp,
            IPPROTO_IPIP => Protocol::IpIp,
            IPPROTO_TCP => Protocol::Tcp,
            IPPROTO_UDP => Protocol::Udp,
            other => Protocol::Other(other),
        }
    }
}

impl From<Protocol> for u8 {
    fn from(value: Protocol) -> Self {
        match value {
            Protocol::Ah => IPPROTO_AH,
            Protocol::Esp => IPPROTO_ESP,
            Protocol::IpIp => IPPROTO_IPIP,
            Protocol::Tcp => IPPROTO_TCP,
            Protocol::Udp => IPPROTO_UDP,
            Protocol::Other(other) => other,
        }
    }
}

/// Internet checksum (RFC 1071): ones-complement sum of 16-bit words,
/// folded and complemented. Matches the reference engine's
/// `ipsec_ip_chksum` byte for byte, including its handling of an odd
/// trailing byte (padded with a zero low byte).
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }
    if let [last] = chunks.remainder() {
        sum += (*last as u32) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Read-only view over an IPv4 header (no options support, matching the
/// reference engine's `ip_hdr_len` computation being trusted but never
/// exercised beyond 20 bytes).
#[derive(Debug, Clone, Copy)]
pub struct Ipv4Header<'a> {
    buf: PacketBuf<'a>,
}

impl<'a> Ipv4Header<'a> {
    /// Parse an IPv4 header from the start of `bytes`.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, WireError> {
        let buf = PacketBuf::new(bytes);
        let v_hl = buf.u8_at(0)?;
        if v_hl >> 4 != 4 {
            return Err(WireError::BadVersionIhl(v_hl));
        }
        if buf.len() < IP_HDR_SIZE {
            return Err(WireError::Truncated {
                need: IP_HDR_SIZE,
                have: buf.len(),
            });
        }
        Ok(Self { buf })
    }

    /// Header length in bytes, from the low nibble of the version/IHL byte.
    pub fn header_len(&self) -> usize {
        ((self.buf.u8_at(0).unwrap() & 0x0F) as usize) << 2
    }

    /// `total_length` field: header plus payload, in bytes.
    pub fn total_length(&self) -> u16 {
        self.buf.u16_at(2).unwrap()
    }

    /// Type-of-service byte.
    pub fn tos(&self) -> u8 {
        self.buf.u8_at(1).unwrap()
    }

    /// Time-to-live.
    pub fn ttl(&self) -> u8 {
        self.buf.u8_at(8).unwrap()
    }

    /// Upper-layer protocol.
    pub fn protocol(&self) -> Protocol {
        Protocol::from(self.buf.u8_at(9).unwrap())
    }

    /// Source address.
    pub fn src(&self) -> Ipv4Addr4 {
        Ipv4Addr4(self.buf.slice(12, 4).unwrap().try_into().unwrap())
    }

    /// Destination address.
    pub fn dst(&self) -> Ipv4Addr4 {
        Ipv4Addr4(self.buf.slice(16, 4).unwrap().try_into().unwrap())
    }

    /// The full header, including any options, as raw bytes.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.buf.slice(0, self.header_len()).unwrap()
    }

    /// Everything after the header: the upper-layer payload.
    pub fn payload(&self) -> Result<&'a [u8], WireError> {
        self.buf.rest(self.header_len())
    }
}

/// Mutable view for synthesizing a tunnel-mode outer IPv4 header.
pub struct Ipv4HeaderMut<'a> {
    buf: PacketBufMut<'a>,
}

impl<'a> Ipv4HeaderMut<'a> {
    /// Wrap the first [`IP_HDR_SIZE`] bytes of `bytes` as a fixed 20-byte
    /// header (no options are ever written by this engine).
    pub fn new(bytes: &'a mut [u8]) -> Result<Self, WireError> {
        if bytes.len() < IP_HDR_SIZE {
            return Err(WireError::Truncated {
                need: IP_HDR_SIZE,
                have: bytes.len(),
            });
        }
        let mut buf = PacketBufMut::new(&mut bytes[..IP_HDR_SIZE]);
        buf.put_u8(0, 0x45)?; // version 4, IHL 5 (20 bytes, no options)
        Ok(Self { buf })
    }

    /// Set the type-of-service byte.
    pub fn set_tos(&mut self, tos: u8) -> Result<&mut Self, WireError> {
        self.buf.put_u8(1, tos)?;
        Ok(self)
    }

    /// Set the `total_length` field.
    pub fn set_total_length(&mut self, len: u16) -> Result<&mut Self, WireError> {
        self.buf.put_u16(2, len)?;
        Ok(self)
    }

    /// Set the time-to-live.
    pub fn set_ttl(&mut self, ttl: u8) -> Result<&mut Self, WireError> {
        self.buf.put_u8(8, ttl)?;
        Ok(self)
    }

    /// Set the upper-layer protocol.
    pub fn set_protocol(&mut self, protocol: Protocol) -> Result<&mut Self, WireError> {
        self.buf.put_u8(9, protocol.into())?;
        Ok(self)
    }

    /// Set the source address.
    pub fn set_src(&mut self, addr: Ipv4Addr4) -> Result<&mut Self, WireError> {
        self.buf.put_bytes(12, &addr.0)?;
        Ok(self)
    }

    /// Set the destination address.
    pub fn set_dst(&mut self, addr: Ipv4Addr4) -> Result<&mut Self, WireError> {
        self.buf.put_bytes(16, &addr.0)?;
        Ok(self)
    }

    /// Zero the checksum field, recompute it over the 20-byte header, and
    /// write it back. Must be called last, after every other field is set.
    pub fn finalize_checksum(&mut self) -> Result<(), WireError> {
        self.buf.put_u16(10, 0)?;
        let checksum = internet_checksum(self.buf.as_slice());
        self.buf.put_u16(10, checksum)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 1071 §3 worked example.
    #[test]
    fn checksum_matches_rfc_1071_example() {
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(internet_checksum(&data), 0x220d);
    }

    #[test]
    fn checksum_of_valid_header_is_zero_when_included() {
        let mut header = [0u8; IP_HDR_SIZE];
        {
            let mut h = Ipv4HeaderMut::new(&mut header).unwrap();
            h.set_ttl(64).unwrap();
            h.set_protocol(Protocol::Esp).unwrap();
            h.set_total_length(64).unwrap();
            h.set_src(Ipv4Addr4::new(10, 0, 0, 1)).unwrap();
            h.set_dst(Ipv4Addr4::new(10, 0, 0, 2)).unwrap();
            h.finalize_checksum().unwrap();
        }
        assert_eq!(internet_checksum(&header), 0);
    }

    #[test]
    fn parse_rejects_non_ipv4_version() {
        let mut header = [0u8; IP_HDR_SIZE];
        header[0] = 0x65; // version 6
        assert!(matches!(
            Ipv4Header::parse(&header),
            Err(WireError::BadVersionIhl(0x65))
        ));
    }

    #[test]
    fn parse_reads_fields_written_by_the_mut_view() {
        let mut header = [0u8; IP_HDR_SIZE];
        {
            let mut h = Ipv4HeaderMut::new(&mut header).unwrap();
            h.set_ttl(64).unwrap();
            h.set_protocol(Protocol::Ah).unwrap();
            h.set_src(Ipv4Addr4::new(192, 168, 1, 1)).unwrap();
            h.set_dst(Ipv4Addr4::new(192, 168, 1, 2)).unwrap();
            h.finalize_checksum().unwrap();
        }
        let parsed = Ipv4Header::parse(&header).unwrap();
        assert_eq!(parsed.ttl(), 64);
        assert_eq!(parsed.protocol(), Protocol::Ah);
        assert_eq!(parsed.src(), Ipv4Addr4::new(192, 168, 1, 1));
        assert_eq!(parsed.dst(), Ipv4Addr4::new(192, 168, 1, 2));
        assert_eq!(parsed.header_len(), IP_HDR_SIZE);
    }
}
