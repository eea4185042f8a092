//! Whole-structure invariant checks for tests.
//!
//! `debug_validate` walks every graph the allocator maintains and asserts
//! the properties that must hold between operations: neighbor coverage of
//! the full range, no adjacent free regions, bin membership, bitfield and
//! counter consistency, and slot conservation. O(nodes); test use only.

use fixedbitset::FixedBitSet;

use super::bin_map::{LEAF_INDEX_MASK, NUM_LEAF_BINS, NUM_TOP_BINS, TOP_INDEX_SHIFT};
use super::node_pool::NIL;
use super::range_alloc::RangeAllocator;
use super::small_float;

impl RangeAllocator {
    pub(crate) fn debug_validate(&self) {
        let pool = self.pool();
        let capacity = pool.capacity();

        // Slot conservation: the stack and the live nodes partition the
        // slot array.
        let mut on_stack = FixedBitSet::with_capacity(capacity as usize);
        for &slot in pool.stacked_slots() {
            assert!(
                !on_stack.contains(slot as usize),
                "slot {slot} appears twice on the stack",
            );
            on_stack.insert(slot as usize);
        }
        let live_count = capacity - pool.available();

        // The neighbor list has exactly one head among live nodes.
        let mut head = NIL;
        for slot in 0..capacity {
            if on_stack.contains(slot as usize) {
                continue;
            }
            if pool[slot].neighbor_prev == NIL {
                assert_eq!(head, NIL, "two neighbor-list heads: {head} and {slot}");
                head = slot;
            }
        }
        assert_ne!(head, NIL, "no neighbor-list head");

        // Walk it: a gapless, overlap-free partition of [0, size), never
        // two free nodes in a row.
        let mut cursor = 0u64;
        let mut walked = 0u32;
        let mut free_sum = 0u64;
        let mut free_count = 0u32;
        let mut prev_free = false;
        let mut slot = head;
        while slot != NIL {
            let node = pool[slot];
            assert!(!on_stack.contains(slot as usize), "stacked slot {slot} linked as a neighbor");
            assert_eq!(u64::from(node.offset), cursor, "gap or overlap at slot {slot}");
            cursor += u64::from(node.size);
            walked += 1;

            if !node.used {
                assert!(!prev_free, "adjacent free nodes at offset {}", node.offset);
                free_sum += u64::from(node.size);
                free_count += 1;
            }
            prev_free = !node.used;

            if node.neighbor_next != NIL {
                assert_eq!(
                    pool[node.neighbor_next].neighbor_prev,
                    slot,
                    "broken neighbor back-link at slot {slot}",
                );
            }
            slot = node.neighbor_next;
        }
        assert_eq!(cursor, u64::from(self.total_size()), "neighbor list does not end at the range size");
        assert_eq!(walked, live_count, "live node not reachable from the neighbor list");
        assert_eq!(free_sum, u64::from(self.free_storage()), "free-storage counter out of sync");

        // Bin lists: every chain node is free, sized for its bin, and
        // back-linked; the chains cover every free node exactly once.
        let mut chained = 0u32;
        for bin in 0..NUM_LEAF_BINS as u32 {
            let head = self.bin_heads()[bin as usize];
            let top = (bin >> TOP_INDEX_SHIFT) as usize;
            let leaf = bin & LEAF_INDEX_MASK;
            let leaf_bit_set = u32::from(self.bins().leaf_word(top)) & (1 << leaf) != 0;
            assert_eq!(
                leaf_bit_set,
                head != NIL,
                "leaf bit for bin {bin} disagrees with its head",
            );

            let mut prev = NIL;
            let mut slot = head;
            while slot != NIL {
                let node = pool[slot];
                assert!(!node.used, "allocated node {slot} filed in bin {bin}");
                assert_eq!(
                    small_float::encode_round_down(node.size),
                    bin,
                    "node {slot} of size {} filed in bin {bin}",
                    node.size,
                );
                assert_eq!(node.bin_prev, prev, "broken bin back-link at slot {slot}");
                chained += 1;
                prev = slot;
                slot = node.bin_next;
            }
        }
        assert_eq!(chained, free_count, "bin chains disagree with the free node count");

        // Top word mirrors the leaf words.
        for top in 0..NUM_TOP_BINS {
            let top_bit_set = self.bins().top_word() & (1 << top) != 0;
            assert_eq!(
                top_bit_set,
                self.bins().leaf_word(top) != 0,
                "top bit {top} disagrees with its leaf word",
            );
        }
    }
}
