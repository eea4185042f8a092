pub(crate) mod bin_map;
pub(crate) mod node_pool;
pub(crate) mod range_alloc;
pub(crate) mod small_float;
pub(crate) mod stats;
#[cfg(test)]
pub(crate) mod validate;

// Serializes tests that assert on the global stats counters: read guard for
// ordinary tests, write guard for tests that measure counter deltas.
#[cfg(test)]
pub static TEST_MUTEX: std::sync::RwLock<()> = std::sync::RwLock::new(());
