//! Security Policy Database: ordered selectors mapping traffic to an
//! action (apply IPsec, bypass it, or discard), with APPLY entries bound
//! to the [`crate::sad::SadRef`] that protects them.
//!
//! Threaded the same way as [`crate::sad::SadTable`] (arena + generation-
//! checked handles + an insertion-order list), since the reference
//! engine's SPD is the same `first`/`next`-pointer-chained table shape as
//! the SAD, just holding `struct ipsec_policy_entry` instead of
//! `struct ipsec_sa`. Lookup is first-match over that insertion order,
//! matching the original's linear scan.

use crate::core::error::SpdError;
use crate::core::{Ipv4Addr4, Protocol};
use crate::sad::SadRef;

/// A port selector: match any port, or an exact value. TCP/UDP only;
/// other protocols ignore ports entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSelector {
    /// Matches any port.
    Any,
    /// Matches exactly this port.
    Exact(u16),
}

impl PortSelector {
    fn matches(self, port: u16) -> bool {
        match self {
            PortSelector::Any => true,
            PortSelector::Exact(p) => p == port,
        }
    }
}

/// A protocol selector: match any upper-layer protocol, or an exact one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolSelector {
    /// Matches any protocol.
    Any,
    /// Matches exactly this protocol.
    Exact(Protocol),
}

/// Traffic selector: the (masked source, masked destination, protocol,
/// ports) tuple a policy applies to.
#[derive(Debug, Clone, Copy)]
pub struct Selector {
    /// Source address to match against.
    pub src: Ipv4Addr4,
    /// Source network mask.
    pub src_mask: Ipv4Addr4,
    /// Destination address to match against.
    pub dst: Ipv4Addr4,
    /// Destination network mask.
    pub dst_mask: Ipv4Addr4,
    /// Upper-layer protocol to match.
    pub protocol: ProtocolSelector,
    /// Source port, meaningful only for TCP/UDP.
    pub src_port: PortSelector,
    /// Destination port, meaningful only for TCP/UDP.
    pub dst_port: PortSelector,
}

impl Selector {
    /// Build a selector that matches every packet (the catch-all rule a
    /// policy table typically ends with).
    pub fn any() -> Self {
        Self {
            src: Ipv4Addr4::UNSPECIFIED,
            src_mask: Ipv4Addr4::UNSPECIFIED,
            dst: Ipv4Addr4::UNSPECIFIED,
            dst_mask: Ipv4Addr4::UNSPECIFIED,
            protocol: ProtocolSelector::Any,
            src_port: PortSelector::Any,
            dst_port: PortSelector::Any,
        }
    }

    /// Whether this selector matches the given packet tuple.
    pub fn matches(
        &self,
        src: Ipv4Addr4,
        dst: Ipv4Addr4,
        protocol: Protocol,
        src_port: Option<u16>,
        dst_port: Option<u16>,
    ) -> bool {
        if src.masked(self.src_mask) != self.src.masked(self.src_mask) {
            return false;
        }
        if dst.masked(self.dst_mask) != self.dst.masked(self.dst_mask) {
            return false;
        }
        match self.protocol {
            ProtocolSelector::Any => {}
            ProtocolSelector::Exact(p) if p == protocol => {}
            ProtocolSelector::Exact(_) => return false,
        }
        if let (PortSelector::Exact(_), Some(port)) = (self.src_port, src_port) {
            if !self.src_port.matches(port) {
                return false;
            }
        }
        if let (PortSelector::Exact(_), Some(port)) = (self.dst_port, dst_port) {
            if !self.dst_port.matches(port) {
                return false;
            }
        }
        true
    }
}

/// What to do with traffic matching a policy's selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyAction {
    /// Apply IPsec using the bound SA.
    Apply,
    /// Let the packet through unprotected.
    Bypass,
    /// Drop the packet.
    Discard,
}

/// A Security Policy Database entry.
#[derive(Debug, Clone)]
pub struct SpdEntry {
    /// Traffic this policy governs.
    pub selector: Selector,
    /// What to do with matching traffic.
    pub action: PolicyAction,
    /// The SA to use, required when `action == Apply`.
    pub sa: Option<SadRef>,
}

/// A handle into a [`SpdTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpdRef {
    index: usize,
    generation: u32,
}

struct Slot {
    generation: u32,
    entry: Option<SpdEntry>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Fixed-capacity Security Policy Database.
pub struct SpdTable {
    slots: Vec<Slot>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl SpdTable {
    /// Build an empty table with room for `capacity` entries (the reference
    /// engine's fixed `IPSEC_MAX_SPD_ENTRIES`, default 10).
    pub fn with_capacity(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                generation: 0,
                entry: None,
                prev: None,
                next: None,
            })
            .collect();
        Self {
            slots,
            free: (0..capacity).rev().collect(),
            head: None,
            tail: None,
        }
    }

    /// Total capacity.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of policies currently installed.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Whether the table has no installed policies.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Install `entry`, appending it to the end of the match order.
    pub fn add(&mut self, entry: SpdEntry) -> Result<SpdRef, SpdError> {
        if entry.action == PolicyAction::Apply && entry.sa.is_none() {
            return Err(SpdError::ApplyWithoutSa);
        }
        let index = self.free.pop().ok_or(SpdError::TableFull)?;
        let slot = &mut self.slots[index];
        slot.entry = Some(entry);
        slot.prev = self.tail;
        slot.next = None;
        let generation = slot.generation;

        if let Some(tail) = self.tail {
            self.slots[tail].next = Some(index);
        } else {
            self.head = Some(index);
        }
        self.tail = Some(index);

        Ok(SpdRef { index, generation })
    }

    fn slot(&self, policy: SpdRef) -> Result<&Slot, SpdError> {
        let slot = self.slots.get(policy.index).ok_or(SpdError::InvalidHandle)?;
        if slot.generation != policy.generation || slot.entry.is_none() {
            return Err(SpdError::InvalidHandle);
        }
        Ok(slot)
    }

    /// Resolve a handle to its entry.
    pub fn get(&self, policy: SpdRef) -> Result<&SpdEntry, SpdError> {
        self.slot(policy)?.entry.as_ref().ok_or(SpdError::InvalidHandle)
    }

    /// Bind or rebind the SA an APPLY policy uses.
    pub fn bind_sa(&mut self, policy: SpdRef, sa: SadRef) -> Result<(), SpdError> {
        self.slot(policy)?;
        let entry = self.slots[policy.index].entry.as_mut().unwrap();
        entry.sa = Some(sa);
        Ok(())
    }

    /// Remove `policy` from the table.
    pub fn delete(&mut self, policy: SpdRef) -> Result<SpdEntry, SpdError> {
        self.slot(policy)?;
        let (prev, next) = {
            let slot = &self.slots[policy.index];
            (slot.prev, slot.next)
        };

        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }

        let slot = &mut self.slots[policy.index];
        let entry = slot.entry.take().ok_or(SpdError::InvalidHandle)?;
        slot.prev = None;
        slot.next = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(policy.index);
        Ok(entry)
    }

    /// First-match policy lookup for a packet's five-tuple.
    pub fn lookup(
        &self,
        src: Ipv4Addr4,
        dst: Ipv4Addr4,
        protocol: Protocol,
        src_port: Option<u16>,
        dst_port: Option<u16>,
    ) -> Option<SpdRef> {
        self.iter().find_map(|(r, e)| {
            e.selector
                .matches(src, dst, protocol, src_port, dst_port)
                .then_some(r)
        })
    }

    /// Remove every policy, resetting the table to empty.
    pub fn flush(&mut self) {
        for slot in self.slots.iter_mut() {
            if slot.entry.is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
            slot.entry = None;
            slot.prev = None;
            slot.next = None;
        }
        self.head = None;
        self.tail = None;
        self.free = (0..self.slots.len()).rev().collect();
    }

    /// Iterate installed entries in match order.
    pub fn iter(&self) -> impl Iterator<Item = (SpdRef, &SpdEntry)> {
        let mut cursor = self.head;
        core::iter::from_fn(move || {
            let index = cursor?;
            let slot = &self.slots[index];
            cursor = slot.next;
            slot.entry
                .as_ref()
                .map(|e| (SpdRef { index, generation: slot.generation }, e))
        })
    }
}

impl core::fmt::Debug for SpdTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SpdTable")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

impl core::fmt::Display for SpdTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "SPD ({}/{} entries):", self.len(), self.capacity())?;
        for (_, e) in self.iter() {
            writeln!(f, "  action={:?} src={} dst={}", e.action, e.selector.src, e.selector.dst)?;
        }
        Ok(())
    }
}
