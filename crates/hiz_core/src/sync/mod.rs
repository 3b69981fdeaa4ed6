//! # Synchronization Primitives for Pyramid Builds
//!
//! ## The Problem
//!
//! ```text
//! Build N:   downsample writes pyramid
//! Consumers: refraction wants the PREVIOUS layer's pyramid
//!            occlusion culling wants the CURRENT one
//!
//! One texture:  the build overwrites what refraction is reading
//! ```
//!
//! ## The Solution
//!
//! ```text
//! SwapChain:   two pyramids, writes go to `current`, `previous` is read only
//! TileCounter: device-side counters that let the LAST thread group of a
//!              region carry on to the coarse levels (no device-wide barrier)
//! ```

mod counter;
mod swap_chain;

pub use counter::{Arrival, TileCounter};
pub use swap_chain::{SlotIndex, SwapChain};
