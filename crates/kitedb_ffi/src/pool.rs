//! Result-container pool with admission control.

use std::collections::HashSet;

use kitedb_codec::Encoder;
use kitedb_core::QueryResults;
use parking_lot::Mutex;

/// Containers kept on the free list for reuse.
pub const RESULTS_POOL_SIZE: usize = 1024;

/// Admission ceiling: the maximum number of live containers.
pub const MAX_CONCURRENT_QUERIES: usize = 65534;

/// A reusable result container: entries plus a serialization buffer.
#[derive(Debug, Default)]
pub struct ResultsWrapper {
    /// The query results.
    pub results: QueryResults,
    /// Serialization buffer handed to the caller.
    pub ser: Encoder,
}

struct PoolState {
    free: Vec<Box<ResultsWrapper>>,
    alive: usize,
    outstanding: HashSet<usize>,
}

/// A bounded pool of result containers.
///
/// `alive` counts every container held by callers; acquisition fails
/// once it would exceed the ceiling, which caps concurrent foreign
/// queries and turns result-handle leaks into visible errors instead
/// of unbounded growth.
pub struct ResultsPool {
    state: Mutex<PoolState>,
    capacity: usize,
    ceiling: usize,
}

impl ResultsPool {
    /// Creates a pool with the given free-list capacity and admission
    /// ceiling.
    pub fn new(capacity: usize, ceiling: usize) -> Self {
        Self {
            state: Mutex::new(PoolState {
                free: Vec::new(),
                alive: 0,
                outstanding: HashSet::new(),
            }),
            capacity,
            ceiling,
        }
    }

    /// Creates the process-wide pool with default sizing.
    pub fn with_defaults() -> Self {
        Self::new(RESULTS_POOL_SIZE, MAX_CONCURRENT_QUERIES)
    }

    /// Takes a container, reusing a pooled one when available.
    ///
    /// Returns `None` when the live count would exceed the ceiling.
    pub fn acquire(&self) -> Option<Box<ResultsWrapper>> {
        let mut state = self.state.lock();
        if state.alive >= self.ceiling {
            return None;
        }
        state.alive += 1;
        Some(state.free.pop().unwrap_or_default())
    }

    /// Clears a container and returns it to the pool.
    pub fn release(&self, mut wrapper: Box<ResultsWrapper>) {
        wrapper.results.clear();
        wrapper.ser.reset();
        let mut state = self.state.lock();
        state.alive -= 1;
        if state.free.len() < self.capacity {
            state.free.push(wrapper);
        }
    }

    /// Converts a container into a raw pointer tracked as outstanding.
    pub fn hand_out(&self, wrapper: Box<ResultsWrapper>) -> usize {
        let ptr = Box::into_raw(wrapper) as usize;
        self.state.lock().outstanding.insert(ptr);
        ptr
    }

    /// Reclaims an outstanding pointer.
    ///
    /// Returns `None` for pointers that were never handed out or were
    /// already freed: the double-free detection the boundary relies
    /// on.
    pub fn take_back(&self, ptr: usize) -> Option<Box<ResultsWrapper>> {
        if ptr == 0 {
            return None;
        }
        if !self.state.lock().outstanding.remove(&ptr) {
            return None;
        }
        // Tracked pointers were produced by hand_out from a Box.
        Some(unsafe { Box::from_raw(ptr as *mut ResultsWrapper) })
    }

    /// Number of containers currently held by callers.
    pub fn alive(&self) -> usize {
        self.state.lock().alive
    }

    /// Drops pooled containers (engine teardown).
    pub fn clear(&self) {
        self.state.lock().free.clear();
    }
}
