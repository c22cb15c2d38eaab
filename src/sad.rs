//! Security Association Database: a fixed-capacity arena of [`SadEntry`],
//! threaded into an insertion-order list so [`SadTable::iter`] and the
//! `Debug`/`Display` dump walk entries in the order they were added, the
//! way the reference engine's SAD walks its `first`/`next`-pointer chain.
//!
//! The reference engine threads this list through raw pointers living
//! inside each `struct ipsec_sa` (`sa.h`: `IPSEC_MAX_SAD_ENTRIES = 10`,
//! `first`/`last` on the table, `next` on each entry). That's rewritten
//! here as a slot arena addressed by [`SadRef`] (an index plus a generation
//! counter, so a handle into a deleted-and-reused slot is rejected instead
//! of silently aliasing) with `prev`/`next` indices replacing the raw
//! pointers.

use zeroize::Zeroize;

use crate::core::error::SadError;
use crate::core::{Ipv4Addr4, Protocol, Spi};
use crate::crypto::{AuthAlgorithm, EncAlgorithm};
use crate::replay::ReplayWindow;

/// Tunnel vs. transport mode. Only `Tunnel` is implemented; see the
/// crate's Non-goals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Tunnel mode: the original packet is encapsulated behind a new outer
    /// IP header (the only mode this engine implements).
    Tunnel,
    /// Transport mode. Recognized but not implemented.
    Transport,
}

/// A Security Association: the keying material and parameters for one
/// direction of one AH or ESP flow.
#[derive(Debug, Clone, PartialEq)]
pub struct SadEntry {
    /// Destination address this SA applies to (outer tunnel endpoint on
    /// output, the address the packet arrived addressed to on input).
    pub dest: Ipv4Addr4,
    /// Network mask applied to both `dest` and the packet's destination
    /// before `SadTable::lookup` compares them, so one SA can cover a
    /// destination subnet rather than a single host.
    pub dest_mask: Ipv4Addr4,
    /// Security Parameter Index, unique per (dest, protocol).
    pub spi: Spi,
    /// AH or ESP.
    pub protocol: Protocol,
    /// Tunnel or transport.
    pub mode: Mode,
    /// Authentication algorithm and key, if this SA authenticates.
    pub auth: Option<(AuthAlgorithm, Vec<u8>)>,
    /// Encryption algorithm and key, if this SA encrypts (ESP only).
    pub enc: Option<(EncAlgorithm, Vec<u8>)>,
    /// Outbound sequence number, incremented for every packet sent under
    /// this SA. Unused on inbound SAs, which use `replay_window` instead.
    pub seq: u32,
    /// Inbound anti-replay window. Unused on outbound SAs.
    pub replay_window: ReplayWindow,
    /// Tunnel-mode encapsulation source address (this gateway's outer
    /// address), written into the outer IP header on output.
    pub tunnel_source: Ipv4Addr4,
    /// Soft lifetime in seconds, recorded but never enforced by the core
    /// (a host may poll this to decide when to retire an SA out-of-band).
    pub lifetime: Option<u32>,
    /// Path MTU hint, recorded but never enforced by the core.
    pub path_mtu: Option<u16>,
}

impl Drop for SadEntry {
    fn drop(&mut self) {
        if let Some((_, key)) = self.auth.as_mut() {
            key.zeroize();
        }
        if let Some((_, key)) = self.enc.as_mut() {
            key.zeroize();
        }
    }
}

/// A handle into a [`SadTable`]. Carries a generation counter so a handle
/// to a deleted-then-reused slot is rejected rather than silently aliased.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SadRef {
    index: usize,
    generation: u32,
}

struct Slot {
    generation: u32,
    entry: Option<SadEntry>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Fixed-capacity Security Association Database.
pub struct SadTable {
    slots: Vec<Slot>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl SadTable {
    /// Build an empty table with room for `capacity` entries (the reference
    /// engine's fixed `IPSEC_MAX_SAD_ENTRIES`, default 10).
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

    /// Number of SAs currently installed.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Whether the table has no installed SAs.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserve a free slot without filling it in. Mirrors
    /// `ipsec_sad_get_free`, which hands the caller a pointer to an unused
    /// entry to populate before linking it with [`SadTable::add`].
    pub fn get_free(&self) -> Result<usize, SadError> {
        self.free.last().copied().ok_or(SadError::TableFull)
    }

    /// Install `entry`, appending it to the insertion-order list, and
    /// return a handle to it.
    pub fn add(&mut self, entry: SadEntry) -> Result<SadRef, SadError> {
        let index = self.free.pop().ok_or(SadError::TableFull)?;
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

        Ok(SadRef { index, generation })
    }

    /// Resolve a handle to its entry.
    pub fn get(&self, sa: SadRef) -> Result<&SadEntry, SadError> {
        self.slot(sa)?.entry.as_ref().ok_or(SadError::InvalidHandle)
    }

    /// Resolve a handle to its entry, mutably.
    pub fn get_mut(&mut self, sa: SadRef) -> Result<&mut SadEntry, SadError> {
        let slot = self.slots.get_mut(sa.index).ok_or(SadError::InvalidHandle)?;
        if slot.generation != sa.generation {
            return Err(SadError::InvalidHandle);
        }
        slot.entry.as_mut().ok_or(SadError::InvalidHandle)
    }

    fn slot(&self, sa: SadRef) -> Result<&Slot, SadError> {
        let slot = self.slots.get(sa.index).ok_or(SadError::InvalidHandle)?;
        if slot.generation != sa.generation || slot.entry.is_none() {
            return Err(SadError::InvalidHandle);
        }
        Ok(slot)
    }

    /// Remove `sa` from the table, unlinking it from the insertion-order
    /// list and returning its slot to the free list.
    pub fn delete(&mut self, sa: SadRef) -> Result<SadEntry, SadError> {
        self.slot(sa)?;
        let (prev, next) = {
            let slot = &self.slots[sa.index];
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

        let slot = &mut self.slots[sa.index];
        let entry = slot.entry.take().ok_or(SadError::InvalidHandle)?;
        slot.prev = None;
        slot.next = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(sa.index);
        Ok(entry)
    }

    /// Find the SA matching an inbound packet's (destination, protocol,
    /// SPI) triple — the lookup key RFC 4301 mandates for inbound
    /// processing. `dest` is matched against each entry's `dest` under that
    /// entry's own `dest_mask`, the way `ipsec_sad_lookup` matches via
    /// `ipsec_ip_addr_maskcmp`, so a subnet-scoped SA matches any
    /// destination within its subnet.
    pub fn lookup(&self, dest: Ipv4Addr4, protocol: Protocol, spi: Spi) -> Option<SadRef> {
        self.iter().find_map(|(r, e)| {
            (dest.masked(e.dest_mask) == e.dest.masked(e.dest_mask)
                && e.protocol == protocol
                && e.spi == spi)
                .then_some(r)
        })
    }

    /// Choose an SPI for a new SA bound to the given destination and
    /// protocol: the lowest value not already in use by that pair so SPIs
    /// stay small and human-readable in test fixtures, matching
    /// `ipsec_sad_get_spi`'s role of handing out a locally-unique SPI
    /// before the SA's keying material is provisioned out-of-band.
    pub fn get_spi(&self, dest: Ipv4Addr4, protocol: Protocol) -> Spi {
        let mut candidate = 1u32;
        loop {
            let taken = self.iter().any(|(_, e)| {
                dest.masked(e.dest_mask) == e.dest.masked(e.dest_mask)
                    && e.protocol == protocol
                    && e.spi.0 == candidate
            });
            if !taken {
                return Spi(candidate);
            }
            candidate += 1;
        }
    }

    /// Remove every SA, resetting the table to empty.
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

    /// Iterate installed entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (SadRef, &SadEntry)> {
        let mut cursor = self.head;
        core::iter::from_fn(move || {
            let index = cursor?;
            let slot = &self.slots[index];
            cursor = slot.next;
            slot.entry
                .as_ref()
                .map(|e| (SadRef { index, generation: slot.generation }, e))
        })
    }
}

impl core::fmt::Debug for SadTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SadTable")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

impl core::fmt::Display for SadTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "SAD ({}/{} entries):", self.len(), self.capacity())?;
        for (_, e) in self.iter() {
            writeln!(f, "  dest={} spi={} protocol={:?}", e.dest, e.spi, e.protocol)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(dest: Ipv4Addr4, protocol: Protocol, spi: u32) -> SadEntry {
        SadEntry {
            dest,
            dest_mask: Ipv4Addr4::new(255, 255, 255, 255),
            spi: Spi(spi),
            protocol,
            mode: Mode::Tunnel,
            auth: None,
            enc: None,
            seq: 0,
            replay_window: ReplayWindow::new(),
            tunnel_source: Ipv4Addr4::UNSPECIFIED,
            lifetime: None,
            path_mtu: None,
        }
    }

    #[test]
    fn add_then_lookup_round_trips() {
        let mut table = SadTable::with_capacity(4);
        let dest = Ipv4Addr4::new(10, 0, 0, 1);
        let handle = table.add(entry(dest, Protocol::Esp, 7)).unwrap();
        assert_eq!(table.lookup(dest, Protocol::Esp, Spi(7)), Some(handle));
        assert_eq!(table.get(handle).unwrap().spi, Spi(7));
    }

    #[test]
    fn table_full_is_reported() {
        let mut table = SadTable::with_capacity(1);
        table.add(entry(Ipv4Addr4::UNSPECIFIED, Protocol::Ah, 1)).unwrap();
        assert_eq!(
            table.add(entry(Ipv4Addr4::UNSPECIFIED, Protocol::Ah, 2)),
            Err(SadError::TableFull)
        );
    }

    #[test]
    fn stale_handle_after_delete_is_rejected() {
        let mut table = SadTable::with_capacity(2);
        let handle = table.add(entry(Ipv4Addr4::UNSPECIFIED, Protocol::Ah, 1)).unwrap();
        table.delete(handle).unwrap();
        assert_eq!(table.get(handle), Err(SadError::InvalidHandle));

        // The reclaimed slot can be reused, but the old handle must not
        // alias the new occupant.
        let new_handle = table.add(entry(Ipv4Addr4::UNSPECIFIED, Protocol::Ah, 2)).unwrap();
        assert_ne!(handle, new_handle);
        assert_eq!(table.get(handle), Err(SadError::InvalidHandle));
        assert!(table.get(new_handle).is_ok());
    }

    #[test]
    fn iteration_preserves_insertion_order() {
        let mut table = SadTable::with_capacity(4);
        let a = table.add(entry(Ipv4Addr4::new(1, 1, 1, 1), Protocol::Ah, 1)).unwrap();
        let b = table.add(entry(Ipv4Addr4::new(2, 2, 2, 2), Protocol::Esp, 2)).unwrap();
        table.delete(a).unwrap();
        let c = table.add(entry(Ipv4Addr4::new(3, 3, 3, 3), Protocol::Esp, 3)).unwrap();

        let order: Vec<_> = table.iter().map(|(r, _)| r).collect();
        assert_eq!(order, vec![b, c]);
    }

    #[test]
    fn get_spi_skips_in_use_values() {
        let mut table = SadTable::with_capacity(4);
        let dest = Ipv4Addr4::new(1, 1, 1, 1);
        table.add(entry(dest, Protocol::Esp, 1)).unwrap();
        assert_eq!(table.get_spi(dest, Protocol::Esp), Spi(2));
    }

    #[test]
    fn flush_empties_the_table() {
        let mut table = SadTable::with_capacity(4);
        table.add(entry(Ipv4Addr4::UNSPECIFIED, Protocol::Ah, 1)).unwrap();
        table.add(entry(Ipv4Addr4::UNSPECIFIED, Protocol::Esp, 2)).unwrap();
        table.flush();
        assert!(table.is_empty());
        assert_eq!(table.capacity(), 4);
    }

    #[test]
    fn lookup_matches_any_host_under_a_subnet_scoped_dest_mask() {
        let mut table = SadTable::with_capacity(4);
        let mut subnet_sa = entry(Ipv4Addr4::new(10, 0, 0, 0), Protocol::Esp, 7);
        subnet_sa.dest_mask = Ipv4Addr4::new(255, 255, 255, 0);
        let handle = table.add(subnet_sa).unwrap();

        assert_eq!(
            table.lookup(Ipv4Addr4::new(10, 0, 0, 42), Protocol::Esp, Spi(7)),
            Some(handle)
        );
        assert_eq!(table.lookup(Ipv4Addr4::new(10, 0, 1, 1), Protocol::Esp, Spi(7)), None);
    }
}
