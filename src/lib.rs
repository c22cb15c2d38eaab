//! # ipsec-core
//!
//! An embedded IPsec engine: AH and ESP tunnel-mode transforms over IPv4,
//! manually-keyed Security Associations, and the SAD/SPD tables that bind
//! traffic selectors to them.
//!
//! This crate implements the subset of RFC 2401/2402/2406 a gateway with
//! fixed, pre-shared keys needs:
//!
//! - **AH** (RFC 2402): HMAC-MD5-96 or HMAC-SHA1-96 integrity over the
//!   whole tunneled packet.
//! - **ESP** (RFC 2406): DES-CBC or 3DES-CBC confidentiality, optionally
//!   combined with the same HMAC options for integrity.
//! - **Anti-replay** (§4.1): a 32-bit sliding window, one per inbound SA.
//! - **SAD/SPD**: fixed-capacity tables, manually provisioned — there is
//!   no key exchange here, by design.
//!
//! ## What this crate does not do
//!
//! No IKE, no transport mode, no IPv6, no fragmentation, no network I/O.
//! The two pipeline entry points, [`pipeline::ipsec_input`] and
//! [`pipeline::ipsec_output`], take and return complete IPv4 packets as
//! byte slices; wiring them to an actual network interface is the host's
//! job. The core never logs or otherwise performs I/O either — install an
//! [`audit::AuditSink`] if you want to observe what the pipeline is doing.
//!
//! ## Example
//!
//! ```
//! use ipsec_core::prelude::*;
//!
//! let gateway_a = Ipv4Addr4::new(10, 0, 0, 1);
//! let gateway_b = Ipv4Addr4::new(10, 0, 0, 2);
//!
//! let sa = SadEntry {
//!     dest: gateway_b,
//!     dest_mask: Ipv4Addr4::new(255, 255, 255, 255),
//!     spi: Spi(500),
//!     protocol: Protocol::Esp,
//!     mode: Mode::Tunnel,
//!     auth: Some((AuthAlgorithm::HmacSha1, vec![0x0b; 20])),
//!     enc: Some((EncAlgorithm::Des, vec![0x01; 8])),
//!     seq: 0,
//!     replay_window: ReplayWindow::new(),
//!     tunnel_source: gateway_a,
//!     lifetime: None,
//!     path_mtu: None,
//! };
//!
//! let mut db = DbSet::with_capacity(4);
//! let sa_ref = db.sad.add(sa).unwrap();
//! db.spd
//!     .add(SpdEntry { selector: Selector::any(), action: PolicyAction::Apply, sa: Some(sa_ref) })
//!     .unwrap();
//! ```
//!
//! ## Feature flags
//!
//! - `std` (default): enables `std::error::Error` impls via `thiserror`
//!   and anything else that assumes an allocator and the standard library.
//!   The transforms and tables themselves never require more than `alloc`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod ah;
pub mod audit;
pub mod core;
pub mod crypto;
pub mod esp;
pub mod pipeline;
pub mod replay;
pub mod sad;
pub mod spd;

/// Convenience re-exports of the types most callers need.
pub mod prelude {
    pub use crate::ah;
    pub use crate::audit::{AuditEvent, AuditSink, NullAuditSink};
    pub use crate::core::*;
    pub use crate::crypto::{AuthAlgorithm, EncAlgorithm};
    pub use crate::esp;
    pub use crate::pipeline::{ipsec_input, ipsec_output, DbSet, SadBlueprint, SpdBlueprint};
    pub use crate::replay::ReplayWindow;
    pub use crate::sad::{Mode, SadEntry, SadRef, SadTable};
    pub use crate::spd::{
        PolicyAction, PortSelector, ProtocolSelector, Selector, SpdEntry, SpdRef, SpdTable,
    };
}

pub use core::error::IpsecError;
pub use pipeline::{ipsec_input, ipsec_output, DbSet};
