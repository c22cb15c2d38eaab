//! Authentication Header, tunnel mode (RFC 2402 §3.3/§3.4).
//!
//! Grounded on `ipsec_ah_encapsulate`/`ipsec_ah_check` in the reference
//! engine's `ah.c`: the outer IP header's mutable fields (ToS, flags and
//! fragment offset, TTL, header checksum — RFC 2402 §3.3.3.1.1.1) are
//! zeroed before the ICV is computed and restored afterward, and on
//! decapsulation the anti-replay check runs *before* the ICV is verified
//! while the window is only ever updated *after* — so a packet that merely
//! guesses a fresh-looking sequence number but fails authentication can
//! never advance the window.

use crate::core::buffer::PacketBufMut;
use crate::core::error::{CryptoError, IpsecError, WireError};
use crate::core::{
    Ipv4Header, Ipv4HeaderMut, Protocol, AH_HDR_SIZE, AH_PAYLOAD_LEN_FIELD, AH_TOTAL_SIZE,
    DEFAULT_OUTER_TTL, IPPROTO_IPIP, IPSEC_MTU, IP_HDR_SIZE,
};
use crate::sad::SadEntry;

/// Zero the outer header's mutable fields in place: ToS, flags/fragment
/// offset, TTL, checksum.
fn zero_mutable_fields(packet: &mut [u8]) {
    packet[1] = 0;
    packet[6] = 0;
    packet[7] = 0;
    packet[8] = 0;
    packet[10] = 0;
    packet[11] = 0;
}

/// Encapsulate `inner` (a complete IPv4 packet) in a new outer IPv4 + AH
/// header, authenticated end to end under `sa`.
///
/// Increments `sa.seq` and uses the new value as this packet's sequence
/// number, so two calls never reuse a sequence number.
pub fn encapsulate(inner: &[u8], sa: &mut SadEntry) -> Result<Vec<u8>, IpsecError> {
    let (auth_alg, auth_key) = sa
        .auth
        .as_ref()
        .ok_or(IpsecError::BadKey(CryptoError::UnsupportedAlgorithm))?;

    let inner_hdr = Ipv4Header::parse(inner)?;
    if inner_hdr.ttl() == 0 {
        return Err(IpsecError::TtlExpired);
    }

    let total_len = IP_HDR_SIZE + AH_TOTAL_SIZE + inner.len();
    if total_len > IPSEC_MTU {
        return Err(IpsecError::DataSizeError(format!(
            "AH-encapsulated length {total_len} exceeds MTU {IPSEC_MTU}"
        )));
    }

    let seq = sa
        .seq
        .checked_add(1)
        .ok_or_else(|| IpsecError::DataSizeError("AH sequence number space exhausted".into()))?;

    let tos = inner_hdr.tos();
    let mut out = vec![0u8; total_len];
    out[IP_HDR_SIZE + AH_TOTAL_SIZE..].copy_from_slice(inner);

    {
        let mut outer = Ipv4HeaderMut::new(&mut out[..IP_HDR_SIZE])?;
        outer.set_protocol(Protocol::Ah)?;
        outer.set_src(sa.tunnel_source)?;
        outer.set_dst(sa.dest)?;
        outer.set_total_length(total_len as u16)?;
    }
    {
        let mut ah = PacketBufMut::new(&mut out[IP_HDR_SIZE..IP_HDR_SIZE + AH_HDR_SIZE]);
        ah.put_u8(0, IPPROTO_IPIP)?;
        ah.put_u8(1, AH_PAYLOAD_LEN_FIELD)?;
        ah.put_u16(2, 0)?;
        ah.put_u32(4, sa.spi.0)?;
        ah.put_u32(8, seq)?;
    }

    zero_mutable_fields(&mut out);
    let icv = auth_alg.compute_icv(auth_key, &out)?;
    out[IP_HDR_SIZE + AH_HDR_SIZE..IP_HDR_SIZE + AH_TOTAL_SIZE].copy_from_slice(&icv);

    out[1] = tos;
    out[8] = DEFAULT_OUTER_TTL;
    {
        let mut outer = Ipv4HeaderMut::new(&mut out[..IP_HDR_SIZE])?;
        outer.set_tos(tos)?;
        outer.set_ttl(DEFAULT_OUTER_TTL)?;
        outer.finalize_checksum()?;
    }

    sa.seq = seq;
    Ok(out)
}

/// Verify and strip an AH-protected packet, returning the original inner
/// packet.
///
/// Checks the anti-replay window before computing the ICV, and only
/// commits the window update once the ICV has verified, per RFC 2402's
/// (and this engine's) required ordering.
pub fn check(outer: &[u8], sa: &mut SadEntry) -> Result<Vec<u8>, IpsecError> {
    let (auth_alg, auth_key) = sa
        .auth
        .as_ref()
        .ok_or(IpsecError::BadKey(CryptoError::UnsupportedAlgorithm))?;

    let hdr = Ipv4Header::parse(outer)?;
    if hdr.header_len() != IP_HDR_SIZE {
        return Err(IpsecError::BadPacket(WireError::BadLength(hdr.header_len())));
    }
    if outer.len() < IP_HDR_SIZE + AH_TOTAL_SIZE {
        return Err(IpsecError::BadPacket(WireError::Truncated {
            need: IP_HDR_SIZE + AH_TOTAL_SIZE,
            have: outer.len(),
        }));
    }

    let payload_len_field = outer[IP_HDR_SIZE + 1];
    if payload_len_field != AH_PAYLOAD_LEN_FIELD {
        return Err(IpsecError::BadPacket(WireError::BadAhLength(payload_len_field)));
    }

    let seq = u32::from_be_bytes(
        outer[IP_HDR_SIZE + 8..IP_HDR_SIZE + AH_HDR_SIZE]
            .try_into()
            .unwrap(),
    );
    sa.replay_window
        .check(seq)
        .map_err(IpsecError::BadKey)?;

    let received_icv = &outer[IP_HDR_SIZE + AH_HDR_SIZE..IP_HDR_SIZE + AH_TOTAL_SIZE];
    let mut scratch = outer.to_vec();
    zero_mutable_fields(&mut scratch);
    scratch[IP_HDR_SIZE + AH_HDR_SIZE..IP_HDR_SIZE + AH_TOTAL_SIZE].fill(0);
    auth_alg.verify_icv(auth_key, &scratch, received_icv)?;

    sa.replay_window.update(seq);

    Ok(outer[IP_HDR_SIZE + AH_TOTAL_SIZE..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Ipv4Addr4;
    use crate::crypto::AuthAlgorithm;
    use crate::replay::ReplayWindow;
    use crate::sad::Mode;

    fn test_sa(dest: Ipv4Addr4, source: Ipv4Addr4) -> SadEntry {
        SadEntry {
            dest,
            dest_mask: Ipv4Addr4::new(255, 255, 255, 255),
            spi: crate::core::Spi(42),
            protocol: Protocol::Ah,
            mode: Mode::Tunnel,
            auth: Some((AuthAlgorithm::HmacMd5, vec![0x0b; 16])),
            enc: None,
            seq: 0,
            replay_window: ReplayWindow::new(),
            tunnel_source: source,
            lifetime: None,
            path_mtu: None,
        }
    }

    fn inner_packet() -> Vec<u8> {
        let mut packet = vec![0u8; IP_HDR_SIZE + 8];
        let total_len = packet.len() as u16;
        let mut hdr = Ipv4HeaderMut::new(&mut packet[..IP_HDR_SIZE]).unwrap();
        hdr.set_ttl(64).unwrap();
        hdr.set_protocol(Protocol::Udp).unwrap();
        hdr.set_total_length(total_len).unwrap();
        hdr.set_src(Ipv4Addr4::new(192, 168, 1, 10)).unwrap();
        hdr.set_dst(Ipv4Addr4::new(192, 168, 2, 10)).unwrap();
        hdr.finalize_checksum().unwrap();
        packet
    }

    #[test]
    fn scenario_hmac_md5_roundtrip() {
        let mut out_sa = test_sa(Ipv4Addr4::new(10, 0, 0, 2), Ipv4Addr4::new(10, 0, 0, 1));
        let mut in_sa = test_sa(Ipv4Addr4::new(10, 0, 0, 2), Ipv4Addr4::new(10, 0, 0, 1));

        let inner = inner_packet();
        let outer = encapsulate(&inner, &mut out_sa).unwrap();
        assert_eq!(out_sa.seq, 1);

        let recovered = check(&outer, &mut in_sa).unwrap();
        assert_eq!(recovered, inner);
        assert_eq!(in_sa.replay_window.last_seq(), 1);
    }

    #[test]
    fn tampered_payload_fails_icv() {
        let mut out_sa = test_sa(Ipv4Addr4::new(10, 0, 0, 2), Ipv4Addr4::new(10, 0, 0, 1));
        let mut in_sa = test_sa(Ipv4Addr4::new(10, 0, 0, 2), Ipv4Addr4::new(10, 0, 0, 1));

        let inner = inner_packet();
        let mut outer = encapsulate(&inner, &mut out_sa).unwrap();
        let last = outer.len() - 1;
        outer[last] ^= 0xff;

        assert_eq!(check(&outer, &mut in_sa), Err(IpsecError::BadKey(CryptoError::IcvMismatch)));
    }

    #[test]
    fn replayed_packet_is_rejected() {
        let mut out_sa = test_sa(Ipv4Addr4::new(10, 0, 0, 2), Ipv4Addr4::new(10, 0, 0, 1));
        let mut in_sa = test_sa(Ipv4Addr4::new(10, 0, 0, 2), Ipv4Addr4::new(10, 0, 0, 1));

        let inner = inner_packet();
        let outer = encapsulate(&inner, &mut out_sa).unwrap();
        check(&outer, &mut in_sa).unwrap();

        assert_eq!(
            check(&outer, &mut in_sa),
            Err(IpsecError::BadKey(CryptoError::ReplayDetected))
        );
    }

    #[test]
    fn zero_ttl_inner_packet_is_rejected() {
        let mut sa = test_sa(Ipv4Addr4::new(10, 0, 0, 2), Ipv4Addr4::new(10, 0, 0, 1));
        let mut inner = inner_packet();
        {
            let mut hdr = Ipv4HeaderMut::new(&mut inner[..IP_HDR_SIZE]).unwrap();
            hdr.set_ttl(0).unwrap();
            hdr.finalize_checksum().unwrap();
        }
        assert_eq!(encapsulate(&inner, &mut sa), Err(IpsecError::TtlExpired));
    }
}
