use super::replacer::Replacer;
use crate::typedef::FrameId;

/// One position on the clock ring, addressed directly by frame id.
#[derive(Clone, Copy, Default, Debug)]
struct ClockSlot {
    /// Whether the frame is currently evictable.
    present: bool,
    /// Second-chance bit, set on unpin and cleared by a passing hand.
    ref_bit: bool,
}

/// Implements the CLOCK (second-chance) replacement policy.
///
/// The ring has one slot per frame; a frame occupies its own slot while it
/// is evictable. The hand sweeps the ring on eviction, clearing reference
/// bits and taking the first unreferenced entry it meets.
#[derive(Debug)]
pub struct ClockReplacer {
    slots: Vec<ClockSlot>,
    clock_hand: usize,
    evictable: usize, // Number of occupied slots
}

impl ClockReplacer {
    /// Creates a replacer for a pool of `pool_size` frames, initially empty.
    pub fn new(pool_size: usize) -> Self {
        Self {
            slots: vec![ClockSlot::default(); pool_size],
            clock_hand: 0,
            evictable: 0,
        }
    }

    /// Advances the clock hand one position, returning where it pointed.
    fn advance_hand(&mut self) -> usize {
        let hand = self.clock_hand;
        self.clock_hand += 1;
        if self.clock_hand == self.slots.len() {
            self.clock_hand = 0;
        }
        hand
    }
}

impl Replacer for ClockReplacer {
    /// Sweeps the ring from the hand. A referenced entry loses its second
    /// chance and is passed over; the first unreferenced entry is vacated
    /// and returned. At most two sweeps of the occupied population run
    /// before an entry is out of chances, so the loop terminates.
    fn evict(&mut self) -> Option<FrameId> {
        if self.evictable == 0 {
            return None;
        }
        loop {
            let position = self.advance_hand();
            let slot = &mut self.slots[position];
            if !slot.present {
                continue;
            }
            if slot.ref_bit {
                slot.ref_bit = false;
            } else {
                slot.present = false;
                self.evictable -= 1;
                return Some(position);
            }
        }
    }

    /// Removes the frame from the evictable set. No-op if it is absent
    /// or out of range.
    fn pin(&mut self, frame_id: FrameId) {
        self.remove(frame_id);
    }

    /// Inserts the frame into the evictable set and gives it a second
    /// chance. Re-unpinning a present frame refreshes its reference bit.
    fn unpin(&mut self, frame_id: FrameId) {
        let Some(slot) = self.slots.get_mut(frame_id) else {
            return;
        };
        if !slot.present {
            slot.present = true;
            self.evictable += 1;
        }
        slot.ref_bit = true;
    }

    fn evictable_count(&self) -> usize {
        self.evictable
    }

    fn remove(&mut self, frame_id: FrameId) {
        let Some(slot) = self.slots.get_mut(frame_id) else {
            return;
        };
        if slot.present {
            slot.present = false;
            slot.ref_bit = false;
            self.evictable -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_replacer_basic() {
        let mut replacer = ClockReplacer::new(7);
        replacer.unpin(1);
        replacer.unpin(2);
        replacer.unpin(3);
        replacer.unpin(4);
        replacer.unpin(5);
        replacer.unpin(6);
        replacer.unpin(1);
        assert_eq!(replacer.evictable_count(), 6);

        // Every entry holds a reference bit, so the first sweep clears
        // them in hand order and the second sweep takes 1, 2, 3.
        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), Some(3));

        replacer.pin(3);
        replacer.pin(4);
        assert_eq!(replacer.evictable_count(), 2);

        replacer.unpin(4);

        assert_eq!(replacer.evict(), Some(5));
        assert_eq!(replacer.evict(), Some(6));
        assert_eq!(replacer.evict(), Some(4));

        assert_eq!(replacer.evictable_count(), 0);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_clock_replacer_second_chance() {
        let mut replacer = ClockReplacer::new(3);
        replacer.unpin(0);
        replacer.unpin(1);
        replacer.unpin(2);

        // First sweep clears all three reference bits, second selects 0.
        assert_eq!(replacer.evict(), Some(0));

        // 0 comes back freshly referenced; 1 and 2 are out of chances, and
        // the hand sits just past 0's slot.
        replacer.unpin(0);
        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), Some(0));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_clock_replacer_refresh_keeps_entry_referenced() {
        let mut replacer = ClockReplacer::new(4);
        replacer.unpin(0);
        replacer.unpin(1);

        assert_eq!(replacer.evict(), Some(0));

        // Re-unpin 0 and add a newcomer; 1 lost its reference bit during
        // the first sweep, so it goes before either referenced entry.
        replacer.unpin(0);
        replacer.unpin(3);
        assert_eq!(replacer.evict(), Some(1));

        // Unpinning an already-present frame only refreshes its bit.
        replacer.unpin(0);
        replacer.unpin(0);
        assert_eq!(replacer.evictable_count(), 2);
    }

    #[test]
    fn test_clock_replacer_pin_and_remove() {
        let mut replacer = ClockReplacer::new(5);
        replacer.unpin(0);
        replacer.unpin(1);
        replacer.unpin(2);

        replacer.pin(1);
        assert_eq!(replacer.evictable_count(), 2);

        // Pinning an absent frame has no effect.
        replacer.pin(1);
        replacer.pin(4);
        assert_eq!(replacer.evictable_count(), 2);

        replacer.remove(0);
        assert_eq!(replacer.evictable_count(), 1);
        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_clock_replacer_out_of_range_ignored() {
        let mut replacer = ClockReplacer::new(2);
        replacer.unpin(7);
        assert_eq!(replacer.evictable_count(), 0);

        replacer.unpin(0);
        replacer.pin(7);
        replacer.remove(9);
        assert_eq!(replacer.evictable_count(), 1);
        assert_eq!(replacer.evict(), Some(0));
    }

    #[test]
    fn test_clock_replacer_empty() {
        let mut replacer = ClockReplacer::new(0);
        assert_eq!(replacer.evict(), None);
        replacer.unpin(0);
        assert_eq!(replacer.evictable_count(), 0);
    }
}
