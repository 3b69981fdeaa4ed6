//! # Atomic Tile Completion Counter
//!
//! Thread groups of one dispatch cannot wait on each other: there is no
//! device-wide barrier inside a dispatch. Instead every contributor to a
//! coarse region increments that region's counter once after publishing its
//! output. The contributor that observes `post-increment == fan_in` is the
//! last one to arrive, so every input of the region is already visible to
//! it and it alone carries on.
//!
//! ```text
//!   group 0 ──┐
//!   group 1 ──┼─► fetch_add(1) ──► 1, 2, 3  → terminate
//!   group 2 ──┤                       4     → elected (fan_in = 4)
//!   group 3 ──┘
//! ```
//!
//! The test is an equality: a counter that ever exceeds its fan-in means a
//! contributor incremented twice, which is a configuration bug.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::geometry::PyramidGeometry;

/// Outcome of one arrival at a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// Other contributors are still running.
    Pending {
        /// Post-increment counter value.
        arrived: u32,
    },
    /// This contributor was the last one; it owns the coarser work.
    Last,
}

/// Array of completion counters, one per coarse region plus the root.
#[derive(Debug)]
pub struct TileCounter {
    counters: Box<[AtomicU32]>,
}

impl TileCounter {
    /// Creates `len` zeroed counters.
    #[must_use]
    pub fn new(len: u32) -> Self {
        Self {
            counters: (0..len).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Creates the counter array for `geometry`.
    #[must_use]
    pub fn for_geometry(geometry: &PyramidGeometry) -> Self {
        Self::new(geometry.counter_len())
    }

    /// Number of counters.
    #[must_use]
    pub fn len(&self) -> u32 {
        self.counters.len() as u32
    }

    /// Returns true if there are no counters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Zeroes every counter. Must run before each dispatch.
    pub fn reset(&self) {
        for counter in self.counters.iter() {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Current value of counter `index`.
    #[must_use]
    pub fn value(&self, index: u32) -> u32 {
        self.counters[index as usize].load(Ordering::Acquire)
    }

    /// Registers one contributor at counter `index`.
    ///
    /// The increment is `AcqRel`: everything the caller published before
    /// arriving happens-before whatever the elected contributor does next.
    pub fn arrive(&self, index: u32, fan_in: u32) -> Arrival {
        let arrived = self.counters[index as usize].fetch_add(1, Ordering::AcqRel) + 1;
        if arrived == fan_in {
            return Arrival::Last;
        }
        if arrived > fan_in {
            tracing::error!(
                counter = index,
                arrived,
                fan_in,
                "tile counter exceeded its fan-in; a contributor arrived twice"
            );
            debug_assert!(arrived <= fan_in, "tile counter {index} exceeded fan-in {fan_in}");
        }
        Arrival::Pending { arrived }
    }
}
