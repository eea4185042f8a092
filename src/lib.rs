//! Offset suballocation for externally managed address ranges.
//!
//! [`RangeAllocator`] partitions a contiguous range of `N` units into
//! non-overlapping subranges and returns starting offsets; it owns no memory
//! itself. The caller decides what an offset means (a GPU heap, a large
//! buffer, an index space). Allocate, free, and query all run in O(1) with no
//! heap traffic after construction, which makes the structure usable on
//! hard-realtime paths.
//!
//! Not thread-safe: wrap an allocator in a mutex to share it across threads.

// public module: contains implementation details (hidden via pub(crate))
// and TEST_MUTEX (public for tests)
pub mod suballoc;

// allocator facade
pub use suballoc::range_alloc::{
    Allocation, ConfigError, DEFAULT_MAX_ALLOCS, RangeAllocator, StorageReport,
};

// diagnostics
pub use suballoc::stats::{MetadataFootprint, metadata_footprint};
