//! # Two-Slot Pyramid Swap Chain
//!
//! ```text
//!                    ┌─────────────────────────────┐
//!                    │          SwapChain          │
//!                    │                             │
//!                    │  ┌─────────┐  ┌─────────┐   │
//!                    │  │ Slot A  │  │ Slot B  │   │
//!                    │  └────┬────┘  └────┬────┘   │
//!                    │       │            │        │
//!                    │  ┌────┴────────────┴────┐   │
//!                    │  │  current selector    │   │
//!                    │  └──────────────────────┘   │
//!                    └─────────────────────────────┘
//!                              │
//!                  ┌───────────┴───────────┐
//!                  ▼                       ▼
//!          ┌──────────────┐        ┌──────────────┐
//!          │   current    │        │   previous   │
//!          │ (build here) │        │ (read only)  │
//!          └──────────────┘        └──────────────┘
//! ```
//!
//! `swap()` only flips the selector. The slot that becomes current keeps
//! whatever it held two swaps ago until the next build overwrites it.
//!
//! Each slot remembers the serial of the build that last wrote it, so a
//! reader can tell a slot that was never written from one holding a real
//! (possibly older) pyramid.

use std::fmt;
use std::sync::Arc;

/// Identifies one of the two slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotIndex {
    /// First slot, current after allocation.
    A,
    /// Second slot.
    B,
}

impl SlotIndex {
    /// The other slot.
    #[inline]
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    #[inline]
    const fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => f.write_str("slot A"),
            Self::B => f.write_str("slot B"),
        }
    }
}

#[derive(Debug)]
struct Slot<T> {
    texture: Arc<T>,
    /// Serial of the last build that wrote this slot.
    built: Option<u64>,
}

/// Two pyramids and a selector naming the one that receives writes.
///
/// A `SwapChain` only exists fully allocated, so `current()` and
/// `previous()` always return a texture.
#[derive(Debug)]
pub struct SwapChain<T> {
    slots: [Slot<T>; 2],
    current: SlotIndex,
    swaps: u64,
}

impl<T> SwapChain<T> {
    /// Allocates both slots with `alloc`.
    ///
    /// # Errors
    ///
    /// Propagates the first allocation error unchanged.
    pub fn allocate<E>(mut alloc: impl FnMut(SlotIndex) -> Result<T, E>) -> Result<Self, E> {
        let a = alloc(SlotIndex::A)?;
        let b = alloc(SlotIndex::B)?;
        Ok(Self {
            slots: [
                Slot { texture: Arc::new(a), built: None },
                Slot { texture: Arc::new(b), built: None },
            ],
            current: SlotIndex::A,
            swaps: 0,
        })
    }

    /// Exchanges the roles of the two slots. O(1), no data movement.
    pub fn swap(&mut self) {
        self.current = self.current.other();
        self.swaps += 1;
    }

    /// Slot receiving writes.
    #[inline]
    #[must_use]
    pub const fn current_slot(&self) -> SlotIndex {
        self.current
    }

    /// Read-only slot holding the prior build.
    #[inline]
    #[must_use]
    pub const fn previous_slot(&self) -> SlotIndex {
        self.current.other()
    }

    /// Texture receiving writes.
    #[inline]
    #[must_use]
    pub fn current(&self) -> &Arc<T> {
        &self.slots[self.current.index()].texture
    }

    /// Texture of the prior build.
    #[inline]
    #[must_use]
    pub fn previous(&self) -> &Arc<T> {
        &self.slots[self.previous_slot().index()].texture
    }

    /// Texture held by `slot`.
    #[must_use]
    pub fn get(&self, slot: SlotIndex) -> &Arc<T> {
        &self.slots[slot.index()].texture
    }

    /// Records that build `serial` has written the current slot.
    pub fn mark_current_built(&mut self, serial: u64) {
        self.slots[self.current.index()].built = Some(serial);
    }

    /// Serial of the last build that wrote `slot`, if any.
    #[must_use]
    pub fn built_serial(&self, slot: SlotIndex) -> Option<u64> {
        self.slots[slot.index()].built
    }

    /// Returns true if `slot` has been written at least once.
    #[must_use]
    pub fn is_built(&self, slot: SlotIndex) -> bool {
        self.built_serial(slot).is_some()
    }

    /// Number of swaps since allocation.
    #[must_use]
    pub const fn swap_count(&self) -> u64 {
        self.swaps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> SwapChain<&'static str> {
        SwapChain::allocate(|slot| -> Result<_, ()> {
            Ok(match slot {
                SlotIndex::A => "a",
                SlotIndex::B => "b",
            })
        })
        .unwrap()
    }

    #[test]
    fn test_allocation() {
        let chain = chain();
        assert_eq!(chain.current_slot(), SlotIndex::A);
        assert_eq!(**chain.current(), "a");
        assert_eq!(**chain.previous(), "b");
        assert!(!chain.is_built(SlotIndex::A));
        assert!(!chain.is_built(SlotIndex::B));
    }

    #[test]
    fn test_allocation_error_propagates() {
        let result = SwapChain::<u32>::allocate(|slot| match slot {
            SlotIndex::A => Ok(1),
            SlotIndex::B => Err("out of memory"),
        });
        assert_eq!(result.unwrap_err(), "out of memory");
    }

    #[test]
    fn test_swap_exchanges_roles() {
        let mut chain = chain();
        let front = Arc::clone(chain.current());
        let back = Arc::clone(chain.previous());

        chain.swap();
        assert!(Arc::ptr_eq(chain.previous(), &front));
        assert!(Arc::ptr_eq(chain.current(), &back));
        assert_eq!(chain.swap_count(), 1);

        chain.swap();
        assert!(Arc::ptr_eq(chain.current(), &front));
    }

    #[test]
    fn test_build_serial_follows_slot() {
        let mut chain = chain();
        chain.mark_current_built(1);
        chain.swap();

        // The written slot is now previous and keeps its serial.
        assert_eq!(chain.built_serial(chain.previous_slot()), Some(1));
        assert!(!chain.is_built(chain.current_slot()));

        chain.mark_current_built(2);
        chain.swap();
        assert_eq!(chain.built_serial(chain.current_slot()), Some(1));
        assert_eq!(chain.built_serial(chain.previous_slot()), Some(2));
    }
}
