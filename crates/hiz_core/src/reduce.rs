//! Depth reduction operator.
//!
//! Every pyramid texel stores the reduction of the 2x2 block below it.
//! Conventional depth keeps the farthest value (`Max`) so a coarse texel is a
//! conservative occluder bound; reversed-Z buffers need `Min` for the same
//! guarantee.

use serde::{Deserialize, Serialize};

/// Reduction applied to each 2x2 block of the level below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthReduction {
    /// Keep the farthest depth (standard depth range).
    #[default]
    Max,
    /// Keep the nearest depth (reversed-Z).
    Min,
}

impl DepthReduction {
    /// Combines two depth values.
    #[inline]
    #[must_use]
    pub fn combine(self, a: f32, b: f32) -> f32 {
        match self {
            Self::Max => a.max(b),
            Self::Min => a.min(b),
        }
    }

    /// Reduces a 2x2 block.
    #[inline]
    #[must_use]
    pub fn reduce4(self, block: [f32; 4]) -> f32 {
        self.combine(self.combine(block[0], block[1]), self.combine(block[2], block[3]))
    }

    /// Value that never wins a `combine`, used for cells outside a grid.
    #[inline]
    #[must_use]
    pub const fn identity(self) -> f32 {
        match self {
            Self::Max => f32::NEG_INFINITY,
            Self::Min => f32::INFINITY,
        }
    }

    /// Mode constant understood by the downsample kernel.
    #[inline]
    #[must_use]
    pub const fn kernel_mode(self) -> u32 {
        match self {
            Self::Max => 0,
            Self::Min => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduce4() {
        let block = [0.25, 0.75, 0.5, 0.1];
        assert_eq!(DepthReduction::Max.reduce4(block), 0.75);
        assert_eq!(DepthReduction::Min.reduce4(block), 0.1);
    }

    #[test]
    fn test_identity_never_wins() {
        for op in [DepthReduction::Max, DepthReduction::Min] {
            assert_eq!(op.combine(op.identity(), 0.5), 0.5);
            assert_eq!(op.combine(0.5, op.identity()), 0.5);
        }
    }
}
