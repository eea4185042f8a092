//! Allocator facade: carve-off on allocate, coalescing on free.
//!
//! The allocator owns no memory. It partitions an externally supplied range
//! of `size` units into non-overlapping subranges and hands out starting
//! offsets; interpreting an offset (GPU heap, large buffer, index space) is
//! the caller's business. Free regions are filed into 256 size-class bins
//! keyed by the small-float encoding; a two-level bitfield finds the lowest
//! bin that fits a request in two bit scans. Every public operation is a
//! constant number of scans, link updates, and integer ops.
//!
//! Not thread-safe. Every operation mutates one shared state graph, and
//! queries read fields the mutators write. Concurrent callers must
//! serialize externally, typically with a coarse mutex.

use super::bin_map::{BinMap, NUM_LEAF_BINS};
use super::node_pool::{self, NIL, Node, NodePool};
use super::small_float;
use super::stats;
use std::fmt;

/// Default node pool capacity. Bounds live allocations plus free regions at
/// any moment; each allocation can add at most one node (the split
/// remainder) and each free removes up to two.
pub const DEFAULT_MAX_ALLOCS: u32 = 128 * 1024;

/// Receipt for one allocated subrange.
///
/// Pass it back to [`RangeAllocator::free`] exactly once. The receipt is
/// `Copy` for ergonomics; freeing a copy twice is a misuse caught by debug
/// assertions only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allocation {
    /// Starting offset of the subrange, in units.
    pub offset: u32,
    /// Node slot backing this allocation.
    pub(crate) metadata: u32,
}

/// Lower-bound snapshot of the allocator's free storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageReport {
    /// Sum of all free regions, in units.
    pub total_free_space: u32,
    /// Smallest member of the highest populated bin. A free region at
    /// least this large exists; the true largest region may exceed it by
    /// up to one mantissa step.
    pub largest_free_region: u32,
}

/// Rejected construction parameters.
#[derive(Debug)]
pub enum ConfigError {
    /// `max_allocs` was zero; the pool needs at least one node to hold the
    /// initial free region.
    ZeroNodeCapacity,
    /// `max_allocs` collides with the slot-index sentinel.
    NodeCapacityTooLarge { requested: u32, limit: u32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroNodeCapacity => {
                write!(f, "node pool capacity must be at least 1")
            }
            ConfigError::NodeCapacityTooLarge { requested, limit } => {
                write!(f, "node pool capacity {requested} exceeds limit {limit}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// O(1) offset suballocator over a contiguous range of `size` units.
pub struct RangeAllocator {
    size: u32,
    free_storage: u32,
    bins: BinMap,
    bin_heads: [u32; NUM_LEAF_BINS],
    pool: NodePool,
}

impl RangeAllocator {
    /// Manage `size` units with the default node pool capacity.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the node pool capacity is invalid.
    pub fn new(size: u32) -> Result<Self, ConfigError> {
        Self::with_max_allocs(size, DEFAULT_MAX_ALLOCS)
    }

    /// Manage `size` units with room for `max_allocs` simultaneous nodes
    /// (live allocations plus free regions).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `max_allocs` is zero or collides with the
    /// slot-index sentinel.
    pub fn with_max_allocs(size: u32, max_allocs: u32) -> Result<Self, ConfigError> {
        if max_allocs == 0 {
            return Err(ConfigError::ZeroNodeCapacity);
        }
        if max_allocs == u32::MAX {
            return Err(ConfigError::NodeCapacityTooLarge {
                requested: max_allocs,
                limit: u32::MAX - 1,
            });
        }

        let mut allocator = Self {
            size,
            free_storage: 0,
            bins: BinMap::new(),
            bin_heads: [NIL; NUM_LEAF_BINS],
            pool: NodePool::new(max_allocs),
        };
        allocator.seed_whole_range();

        stats::NODE_POOL_BYTES.add(node_pool::metadata_bytes(max_allocs));
        stats::LIVE_ALLOCATORS.add(1);

        Ok(allocator)
    }

    /// Return to the freshly constructed state: the whole range free, the
    /// slot stack refilled so slot 0 pops first.
    ///
    /// Outstanding [`Allocation`]s are invalidated. Freeing one afterwards
    /// is a misuse caught only by debug assertions.
    pub fn reset(&mut self) {
        self.free_storage = 0;
        self.bins = BinMap::new();
        self.bin_heads = [NIL; NUM_LEAF_BINS];
        self.pool.reset();
        self.seed_whole_range();
    }

    /// Storage starts as one node; allocate splits it and free re-merges
    /// the pieces.
    fn seed_whole_range(&mut self) {
        let size = self.size;
        self.insert_into_bin(size, 0);
    }

    /// Allocate `size` units.
    ///
    /// Returns the starting offset and a receipt, or `None` when no free
    /// region fits the request or the node pool is exhausted. A failed call
    /// mutates nothing. Offsets are stable for the allocation's lifetime.
    ///
    /// `allocate(0)` is legal: it yields a valid receipt whose offset is
    /// the chosen bin head's offset and whose region is empty.
    #[must_use = "the receipt is the only way to free the subrange"]
    pub fn allocate(&mut self, size: u32) -> Option<Allocation> {
        // Round up so every node in the chosen bin fits the request.
        let min_bin = small_float::encode_round_up(size);
        let bin = self.bins.find_at_least(min_bin)?;

        let slot = self.bin_heads[bin as usize];
        debug_assert_ne!(slot, NIL, "populated bin {bin} has no head");
        debug_assert!(!self.pool[slot].used, "allocated node filed in bin {bin}");

        let total = self.pool[slot].size;
        debug_assert!(total >= size, "bin {bin} head smaller than the request");

        // Splitting needs one fresh node for the remainder. Bail before
        // touching anything so a failed call leaves no trace.
        if total > size && self.pool.available() == 0 {
            return None;
        }

        // Pop the head off its bin list; the bin is LIFO.
        let next = self.pool[slot].bin_next;
        self.pool[slot].used = true;
        self.pool[slot].size = size;
        self.pool[slot].bin_next = NIL;
        self.bin_heads[bin as usize] = next;
        if next != NIL {
            self.pool[next].bin_prev = NIL;
        } else {
            self.bins.clear(bin);
        }
        self.free_storage -= total;

        // Carve the tail back into a bin and stitch it in as this node's
        // physical successor.
        let remainder = total - size;
        if remainder > 0 {
            let remainder_offset = self.pool[slot].offset + size;
            let carved = self.insert_into_bin(remainder, remainder_offset);

            let old_next = self.pool[slot].neighbor_next;
            if old_next != NIL {
                self.pool[old_next].neighbor_prev = carved;
            }
            self.pool[carved].neighbor_prev = slot;
            self.pool[carved].neighbor_next = old_next;
            self.pool[slot].neighbor_next = carved;
        }

        Some(Allocation {
            offset: self.pool[slot].offset,
            metadata: slot,
        })
    }

    /// Release an allocation, merging it with free physical neighbors.
    ///
    /// Each receipt must be freed exactly once. Debug builds assert on
    /// double frees and stale receipts; release builds omit the check.
    pub fn free(&mut self, allocation: Allocation) {
        let slot = allocation.metadata;
        debug_assert!(
            self.pool[slot].used,
            "double free or stale receipt for offset {}",
            allocation.offset,
        );

        let mut offset = self.pool[slot].offset;
        let mut size = self.pool[slot].size;
        let mut left = self.pool[slot].neighbor_prev;
        let mut right = self.pool[slot].neighbor_next;

        // Absorb a free left neighbor: the merged region starts where the
        // neighbor started.
        if left != NIL && !self.pool[left].used {
            debug_assert_eq!(self.pool[left].neighbor_next, slot);
            offset = self.pool[left].offset;
            size += self.pool[left].size;
            let beyond = self.pool[left].neighbor_prev;
            self.remove_from_bin(left);
            left = beyond;
        }

        // Absorb a free right neighbor: offset stays, sizes sum.
        if right != NIL && !self.pool[right].used {
            debug_assert_eq!(self.pool[right].neighbor_prev, slot);
            size += self.pool[right].size;
            let beyond = self.pool[right].neighbor_next;
            self.remove_from_bin(right);
            right = beyond;
        }

        // The freed node's slot goes back first so the merged region can
        // reclaim it immediately. Keeps re-allocation after free handing
        // out the same offset when nothing merged.
        self.pool.push(slot);
        let merged = self.insert_into_bin(size, offset);

        self.pool[merged].neighbor_prev = left;
        self.pool[merged].neighbor_next = right;
        if left != NIL {
            self.pool[left].neighbor_next = merged;
        }
        if right != NIL {
            self.pool[right].neighbor_prev = merged;
        }
    }

    /// Free-space summary: exact total, lower-bound largest region.
    #[must_use]
    pub fn storage_report(&self) -> StorageReport {
        let largest_free_region = match self.bins.highest() {
            Some(bin) => small_float::decode(bin),
            None => 0,
        };
        StorageReport {
            total_free_space: self.free_storage,
            largest_free_region,
        }
    }

    /// Total units in the managed range.
    #[must_use]
    pub fn total_size(&self) -> u32 {
        self.size
    }

    /// File a free region under its round-down bin and hand back the slot.
    ///
    /// Neighbor links are left untouched; the caller stitches them. The
    /// caller also guarantees a slot is available.
    fn insert_into_bin(&mut self, size: u32, offset: u32) -> u32 {
        let bin = small_float::encode_round_down(size);

        // First node in this bin: flip the occupancy bits.
        let old_head = self.bin_heads[bin as usize];
        if old_head == NIL {
            self.bins.set(bin);
        }

        let slot = self
            .pool
            .pop()
            .expect("node pool invariant broken: no slot for a free region");
        self.pool[slot] = Node {
            offset,
            size,
            bin_prev: NIL,
            bin_next: old_head,
            neighbor_prev: NIL,
            neighbor_next: NIL,
            used: false,
        };
        if old_head != NIL {
            self.pool[old_head].bin_prev = slot;
        }
        self.bin_heads[bin as usize] = slot;

        self.free_storage += size;
        slot
    }

    /// Splice a free node out of its bin list and recycle its slot.
    fn remove_from_bin(&mut self, slot: u32) {
        let Node {
            bin_prev,
            bin_next,
            size,
            ..
        } = self.pool[slot];

        if bin_prev != NIL {
            // Middle or tail of the list: plain splice.
            self.pool[bin_prev].bin_next = bin_next;
            if bin_next != NIL {
                self.pool[bin_next].bin_prev = bin_prev;
            }
        } else {
            // Head of its bin: re-derive the bin from the node size.
            let bin = small_float::encode_round_down(size);
            self.bin_heads[bin as usize] = bin_next;
            if bin_next != NIL {
                self.pool[bin_next].bin_prev = NIL;
            } else {
                self.bins.clear(bin);
            }
        }

        self.pool.push(slot);
        self.free_storage -= size;
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &NodePool {
        &self.pool
    }

    #[cfg(test)]
    pub(crate) fn bins(&self) -> &BinMap {
        &self.bins
    }

    #[cfg(test)]
    pub(crate) fn bin_heads(&self) -> &[u32; NUM_LEAF_BINS] {
        &self.bin_heads
    }

    #[cfg(test)]
    pub(crate) fn free_storage(&self) -> u32 {
        self.free_storage
    }
}

impl Drop for RangeAllocator {
    fn drop(&mut self) {
        // Teardown with outstanding allocations leaks the caller's
        // resource, not ours. Flag it where debug assertions are on, but
        // never during an unwind already in progress.
        if !std::thread::panicking() {
            debug_assert_eq!(
                self.free_storage,
                self.size,
                "allocator dropped with {} of {} units still allocated",
                self.size - self.free_storage,
                self.size,
            );
        }

        stats::NODE_POOL_BYTES.sub(node_pool::metadata_bytes(self.pool.capacity()));
        stats::LIVE_ALLOCATORS.sub(1);
    }
}
