//! `ipsec_input` / `ipsec_output` orchestration (§4.6): SPD lookup, SAD
//! lookup, and AH/ESP dispatch wired together behind two entry points.
//!
//! `DbSet` bundles one SAD with one SPD, mirroring the reference engine's
//! `struct db_set` (one SAD/SPD pair per network interface). Construction
//! follows the teacher's builder-pattern shape: [`DbSet::with_capacity`]
//! for an empty pair of the default size, [`DbSet::load`] for bulk-
//! installing a pre-populated configuration the way `ipsec_spd_load_dbs`
//! installs static descriptor arrays at boot.

use crate::ah;
use crate::audit::{AuditEvent, AuditSink};
use crate::core::error::IpsecError;
use crate::core::{Ipv4Addr4, Ipv4Header, Protocol, Spi, DEFAULT_TABLE_CAPACITY};
use crate::esp;
use crate::sad::{SadEntry, SadRef, SadTable};
use crate::spd::{PolicyAction, Selector, SpdEntry, SpdTable};

/// A pre-populated SA to install via [`DbSet::load`], referencing other
/// SAs in the same batch by position rather than by handle (handles don't
/// exist until insertion).
pub struct SadBlueprint {
    /// The SA to install.
    pub entry: SadEntry,
}

/// A pre-populated policy to install via [`DbSet::load`].
pub struct SpdBlueprint {
    /// The selector this policy matches.
    pub selector: Selector,
    /// What to do with matching traffic.
    pub action: PolicyAction,
    /// Index into the batch's SAD blueprints, for `Apply` policies.
    pub sa_index: Option<usize>,
}

/// One interface's worth of IPsec configuration: its Security Association
/// Database paired with its Security Policy Database.
pub struct DbSet {
    /// This interface's Security Association Database.
    pub sad: SadTable,
    /// This interface's Security Policy Database.
    pub spd: SpdTable,
}

impl DbSet {
    /// An empty database set with room for `capacity` SAs and `capacity`
    /// policies.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sad: SadTable::with_capacity(capacity),
            spd: SpdTable::with_capacity(capacity),
        }
    }

    /// Bulk-install a pre-populated configuration, the way
    /// `ipsec_spd_load_dbs` installs static descriptor arrays at startup.
    pub fn load(sad_entries: Vec<SadBlueprint>, spd_entries: Vec<SpdBlueprint>) -> Result<Self, IpsecError> {
        let mut sad = SadTable::with_capacity(sad_entries.len().max(DEFAULT_TABLE_CAPACITY));
        let mut handles: Vec<SadRef> = Vec::with_capacity(sad_entries.len());
        for blueprint in sad_entries {
            handles.push(sad.add(blueprint.entry)?);
        }

        let mut spd = SpdTable::with_capacity(spd_entries.len().max(DEFAULT_TABLE_CAPACITY));
        for blueprint in spd_entries {
            let sa = blueprint.sa_index.and_then(|i| handles.get(i).copied());
            spd.add(SpdEntry {
                selector: blueprint.selector,
                action: blueprint.action,
                sa,
            })?;
        }

        Ok(Self { sad, spd })
    }
}

fn tcp_udp_ports(payload: &[u8]) -> Option<(u16, u16)> {
    if payload.len() < 4 {
        return None;
    }
    let src = u16::from_be_bytes([payload[0], payload[1]]);
    let dst = u16::from_be_bytes([payload[2], payload[3]]);
    Some((src, dst))
}

fn selector_tuple(packet: &[u8]) -> Result<(Ipv4Addr4, Ipv4Addr4, Protocol, Option<u16>, Option<u16>), IpsecError> {
    let hdr = Ipv4Header::parse(packet)?;
    let protocol = hdr.protocol();
    let ports = matches!(protocol, Protocol::Tcp | Protocol::Udp)
        .then(|| hdr.payload().ok().and_then(tcp_udp_ports))
        .flatten();
    let (sport, dport) = ports.map_or((None, None), |(s, d)| (Some(s), Some(d)));
    Ok((hdr.src(), hdr.dst(), protocol, sport, dport))
}

/// Process an outbound packet: find its policy, and either apply IPsec,
/// bypass it, or discard it.
pub fn ipsec_output(packet: &[u8], db: &mut DbSet, audit: &mut dyn AuditSink) -> Result<Vec<u8>, IpsecError> {
    let (src, dst, protocol, sport, dport) = selector_tuple(packet)?;
    let policy_ref = db
        .spd
        .lookup(src, dst, protocol, sport, dport)
        .ok_or(IpsecError::NoPolicyFound)?;
    let policy = db.spd.get(policy_ref)?.clone();

    match policy.action {
        PolicyAction::Bypass => {
            audit.record(AuditEvent::Bypass);
            Ok(packet.to_vec())
        }
        PolicyAction::Discard => {
            audit.record(AuditEvent::Discard);
            Err(IpsecError::Failure("packet discarded by policy".into()))
        }
        PolicyAction::Apply => {
            let sa_ref = policy.sa.ok_or(IpsecError::Failure("APPLY policy missing SA binding".into()))?;
            let sa = db.sad.get_mut(sa_ref)?;
            let result = match sa.protocol {
                Protocol::Ah => ah::encapsulate(packet, sa),
                Protocol::Esp => esp::encapsulate_with_random_iv(packet, sa),
                other => Err(IpsecError::BadProtocol(other.into())),
            };
            match &result {
                Ok(_) => audit.record(AuditEvent::Apply),
                Err(_) => audit.record(AuditEvent::Failure { detail: "outbound transform failed" }),
            }
            result
        }
    }
}

/// Process an inbound packet: decapsulate protected traffic, then confirm
/// the policy for the recovered inner packet actually calls for the SA
/// that protected it.
pub fn ipsec_input(packet: &[u8], db: &mut DbSet, audit: &mut dyn AuditSink) -> Result<Vec<u8>, IpsecError> {
    let (src, dst, protocol, sport, dport) = selector_tuple(packet)?;

    if !matches!(protocol, Protocol::Ah | Protocol::Esp) {
        let policy_ref = db
            .spd
            .lookup(src, dst, protocol, sport, dport)
            .ok_or(IpsecError::NoPolicyFound)?;
        let policy = db.spd.get(policy_ref)?;
        return match policy.action {
            PolicyAction::Bypass => {
                audit.record(AuditEvent::Bypass);
                Ok(packet.to_vec())
            }
            PolicyAction::Discard => {
                audit.record(AuditEvent::Discard);
                Err(IpsecError::Failure("packet discarded by policy".into()))
            }
            PolicyAction::Apply => {
                audit.record(AuditEvent::PolicyMismatch);
                Err(IpsecError::PolicyMismatch)
            }
        };
    }

    let spi_offset = crate::core::IP_HDR_SIZE + if protocol == Protocol::Ah { 4 } else { 0 };
    if packet.len() < spi_offset + 4 {
        return Err(IpsecError::BadPacket(crate::core::error::WireError::Truncated {
            need: spi_offset + 4,
            have: packet.len(),
        }));
    }
    let spi = Spi(u32::from_be_bytes(packet[spi_offset..spi_offset + 4].try_into().unwrap()));

    let sa_ref = db
        .sad
        .lookup(dst, protocol, spi)
        .ok_or(IpsecError::NoSaFound)?;
    let sa = db.sad.get_mut(sa_ref)?;

    let decapsulated = match protocol {
        Protocol::Ah => ah::check(packet, sa),
        Protocol::Esp => esp::decapsulate(packet, sa),
        _ => unreachable!("matched above"),
    };
    let inner = match decapsulated {
        Ok(inner) => inner,
        Err(e @ IpsecError::BadKey(crate::core::error::CryptoError::ReplayDetected)) => {
            audit.record(AuditEvent::SeqMismatch);
            return Err(e);
        }
        Err(e) => {
            audit.record(AuditEvent::Failure { detail: "inbound transform failed" });
            return Err(e);
        }
    };

    let (isrc, idst, iproto, isport, idport) = selector_tuple(&inner)?;
    let policy_ref = match db.spd.lookup(isrc, idst, iproto, isport, idport) {
        Some(p) => p,
        None => {
            audit.record(AuditEvent::PolicyMismatch);
            return Err(IpsecError::NoPolicyFound);
        }
    };
    let policy = db.spd.get(policy_ref)?;

    match policy.action {
        PolicyAction::Apply if policy.sa == Some(sa_ref) => {
            audit.record(AuditEvent::Apply);
            Ok(inner)
        }
        PolicyAction::Apply => {
            audit.record(AuditEvent::SpiMismatch);
            Err(IpsecError::PolicyMismatch)
        }
        _ => {
            audit.record(AuditEvent::PolicyMismatch);
            Err(IpsecError::PolicyMismatch)
        }
    }
}
