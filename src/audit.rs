//! Audit event plumbing.
//!
//! The core never performs I/O: every place the reference engine would
//! have printed a log line or bumped a counter, this crate instead hands a
//! [`AuditEvent`] to whatever [`AuditSink`] the host installed. A host that
//! doesn't care installs [`NullAuditSink`]; one that does can forward
//! events to its own logging or metrics stack.

/// Something worth telling the host about while processing a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent {
    /// A packet was successfully processed under an APPLY policy.
    Apply,
    /// A packet was allowed through unprotected under a BYPASS policy.
    Bypass,
    /// A packet was dropped under a DISCARD policy.
    Discard,
    /// An inbound packet's SPI did not match the SA its SPD policy names.
    SpiMismatch,
    /// An inbound packet's sequence number failed the anti-replay check.
    SeqMismatch,
    /// No SPD policy matched the packet's selector.
    PolicyMismatch,
    /// Processing failed for a reason not covered by the above.
    Failure {
        /// A short, static description of what went wrong.
        detail: &'static str,
    },
}

/// The seam a host installs to observe pipeline outcomes.
pub trait AuditSink {
    /// Record that `event` occurred.
    fn record(&mut self, event: AuditEvent);
}

/// An [`AuditSink`] that discards every event, for hosts and tests that
/// don't need auditing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&mut self, _event: AuditEvent) {}
}
