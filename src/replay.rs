//! 32-bit sliding-window anti-replay (§4.1), one instance per inbound SA.
//!
//! The reference engine implements this as two free functions
//! (`ipsec_check_replay_window` / `ipsec_update_replay_window`) operating on
//! a `lastSeq`/`bitField` pair that both AH and ESP kept as **module-level
//! globals**, shared across every SA — a replay check on one SA's traffic
//! could be satisfied or defeated by another SA's sequence numbers. This
//! type fixes that by making the window part of [`crate::sad::SadEntry`]
//! instead, generalizing the teacher's connection-scoped `NonceWindow` (a
//! 2048-bit window keyed on a 64-bit AEAD nonce) to the 32-bit window this
//! profile's wire sequence number requires.
//!
//! `check` is a pure predicate; `update` is the mutating commit. Callers
//! MUST only call `update` after the packet's ICV has verified — checking
//! and committing are deliberately two calls, not one, so a forged packet
//! that merely guesses a plausible sequence number can never shift the
//! window.

use crate::core::error::CryptoError;
use crate::core::REPLAY_WINDOW_SIZE;

/// Per-SA anti-replay window state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayWindow {
    last_seq: u32,
    bitmap: u32,
}

impl ReplayWindow {
    /// A freshly keyed window: no sequence number has been seen yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest sequence number accepted so far.
    pub fn last_seq(&self) -> u32 {
        self.last_seq
    }

    /// Whether `seq` would be accepted: not the reserved value, not older
    /// than the window, and not a duplicate of one already seen.
    ///
    /// Does not mutate the window — call [`ReplayWindow::update`]
    /// separately once the packet's ICV has verified.
    pub fn check(&self, seq: u32) -> Result<(), CryptoError> {
        if seq == 0 {
            return Err(CryptoError::ReplayDetected);
        }
        if seq > self.last_seq {
            return Ok(());
        }
        let diff = self.last_seq - seq;
        if diff >= REPLAY_WINDOW_SIZE {
            return Err(CryptoError::ReplayDetected);
        }
        if self.bitmap & (1u32 << diff) != 0 {
            return Err(CryptoError::ReplayDetected);
        }
        Ok(())
    }

    /// Record `seq` as received. Only valid to call after `check(seq)`
    /// returned `Ok` and the packet's ICV verified.
    pub fn update(&mut self, seq: u32) {
        if seq > self.last_seq {
            let diff = seq - self.last_seq;
            if diff < REPLAY_WINDOW_SIZE {
                self.bitmap <<= diff;
                self.bitmap |= 1;
            } else {
                self.bitmap = 1;
            }
            self.last_seq = seq;
        } else {
            let diff = self.last_seq - seq;
            self.bitmap |= 1u32 << diff;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_window_seq_zero_always_rejects() {
        let window = ReplayWindow::new();
        assert_eq!(window.check(0), Err(CryptoError::ReplayDetected));
    }

    #[test]
    fn replay_window_accepts_strictly_increasing_sequence() {
        let mut window = ReplayWindow::new();
        for seq in 1..=10u32 {
            assert!(window.check(seq).is_ok());
            window.update(seq);
        }
        assert_eq!(window.last_seq(), 10);
    }

    #[test]
    fn replay_window_rejects_exact_duplicate() {
        let mut window = ReplayWindow::new();
        window.check(5).unwrap();
        window.update(5);
        assert_eq!(window.check(5), Err(CryptoError::ReplayDetected));
    }

    #[test]
    fn replay_window_accepts_seq_at_last_seq_plus_window() {
        let mut window = ReplayWindow::new();
        window.check(100).unwrap();
        window.update(100);
        // 100 - (100 - 31) == 31 < REPLAY_WINDOW_SIZE, so still in window.
        assert!(window.check(69).is_ok());
    }

    #[test]
    fn replay_window_rejects_seq_older_than_window() {
        let mut window = ReplayWindow::new();
        window.check(100).unwrap();
        window.update(100);
        // diff = 100 - 60 = 40 >= 32.
        assert_eq!(window.check(60), Err(CryptoError::ReplayDetected));
    }

    #[test]
    fn replay_window_accepts_out_of_order_within_window_once() {
        let mut window = ReplayWindow::new();
        window.check(100).unwrap();
        window.update(100);

        assert!(window.check(90).is_ok());
        window.update(90);

        // Replaying 90 again must now be rejected.
        assert_eq!(window.check(90), Err(CryptoError::ReplayDetected));
    }

    #[test]
    fn replay_window_large_forward_jump_resets_bitmap() {
        let mut window = ReplayWindow::new();
        window.check(5).unwrap();
        window.update(5);

        window.check(1000).unwrap();
        window.update(1000);
        assert_eq!(window.last_seq(), 1000);

        // Immediately below the new last_seq is accepted (fresh bitmap).
        assert!(window.check(999).is_ok());
    }
}
