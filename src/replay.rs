//! Replay protection and sequence numbering.
//!
//! Inbound data packets go through a [`ReplayWindow`], the sliding bitmap
//! OpenVPN uses on unreliable transports. Outbound counters live in a
//! [`BidirectionalState`].

use tracing::trace;

const HIDDEN_WINSIZE: u32 = 128;
const REDUNDANT_BIT_SHIFTS: u32 = 5;
const REDUNDANT_BITS: u32 = 1 << REDUNDANT_BIT_SHIFTS;
const BITMAP_LEN: usize = (HIDDEN_WINSIZE >> REDUNDANT_BIT_SHIFTS) as usize;
const BITMAP_INDEX_MASK: u32 = BITMAP_LEN as u32 - 1;
const BITMAP_LOC_MASK: u32 = REDUNDANT_BITS - 1;

/// Number of packet ids behind the highest one that are still accepted.
pub const REPLAY_WINSIZE: u32 = HIDDEN_WINSIZE - REDUNDANT_BITS;

/// Sliding-window replay filter over 32-bit packet ids.
///
/// The window tracks the last [`REPLAY_WINSIZE`] ids below the highest one
/// seen. The bitmap is one word larger than the window so that advancing the
/// window only ever clears whole words.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReplayWindow {
    bitmap: [u32; BITMAP_LEN],
    highest: u32,
}

impl ReplayWindow {
    /// Creates an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest packet id accepted so far.
    pub fn highest(&self) -> u32 {
        self.highest
    }

    /// Checks `packet_id` and records it.
    ///
    /// Returns `true` if the id must be dropped: it is zero, it fell behind
    /// the window, or it was already seen. Any other id is accepted exactly
    /// once.
    pub fn is_replayed(&mut self, packet_id: u32) -> bool {
        if packet_id == 0 {
            return true;
        }
        if u64::from(REPLAY_WINSIZE) + u64::from(packet_id) < u64::from(self.highest) {
            trace!(packet_id, highest = self.highest, "packet id behind the replay window");
            return true;
        }

        let p_index = packet_id >> REDUNDANT_BIT_SHIFTS;
        if packet_id > self.highest {
            let curr_index = self.highest >> REDUNDANT_BIT_SHIFTS;
            let diff = (p_index - curr_index).min(BITMAP_LEN as u32);
            for i in 1..=diff {
                self.bitmap[((curr_index + i) & BITMAP_INDEX_MASK) as usize] = 0;
            }
            self.highest = packet_id;
        }

        let word = &mut self.bitmap[(p_index & BITMAP_INDEX_MASK) as usize];
        let bit = 1u32 << (packet_id & BITMAP_LOC_MASK);
        if *word & bit != 0 {
            trace!(packet_id, "duplicate packet id");
            return true;
        }
        *word |= bit;
        false
    }

    /// Forgets every id seen so far.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A pair of inbound and outbound values restored together.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct BidirectionalState<T> {
    /// Inbound value.
    pub inbound: T,
    /// Outbound value.
    pub outbound: T,
    reset_value: T,
}

impl<T: Clone> BidirectionalState<T> {
    /// Creates a state with both sides set to `value`, also used on reset.
    pub fn new(value: T) -> Self {
        Self {
            inbound: value.clone(),
            outbound: value.clone(),
            reset_value: value,
        }
    }

    /// Restores both sides to the initial value.
    pub fn reset(&mut self) {
        self.inbound = self.reset_value.clone();
        self.outbound = self.reset_value.clone();
    }
}

impl BidirectionalState<u32> {
    /// Returns the current outbound value and advances it.
    pub(crate) fn next_outbound(&mut self) -> u32 {
        let value = self.outbound;
        self.outbound = self.outbound.wrapping_add(1);
        value
    }
}
