//! # HIZ Core
//!
//! Hierarchical depth pyramid ("Hi-Z"): every mip level of a depth image
//! built in ONE dispatch, double-buffered so consumers can read the previous
//! layer's pyramid while the current one is rebuilt.
//!
//! - Power-of-two padded pyramid geometry
//! - Last-arrival tile election, no device-wide barrier needed
//! - Two-slot swap chain with per-slot build serials
//! - Dirty-tracked controller generic over a [`PyramidBackend`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use hiz_core::{CpuBackend, DepthImage, Extent, HiZBuffer, HizConfig, HizRef};
//!
//! let config = HizConfig::default();
//! let mut hiz = HiZBuffer::new(CpuBackend::from_config(&config), config)?;
//! hiz.sync(Extent::new(1920, 1080))?;
//! hiz.set_source(depth, None);
//! hiz.update()?;
//! hiz.bind_resources(&mut pass, HizRef::Front)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod backend;
pub mod config;
pub mod controller;
pub mod downsample;
pub mod error;
pub mod geometry;
pub mod image;
pub mod reduce;
pub mod sync;

pub use backend::{CpuBackend, PyramidBackend};
pub use config::HizConfig;
pub use controller::{BindingSink, HiZBuffer, HizRef, HizStats, HIZ_TEX_SLOT};
pub use downsample::{reference_chain, DispatchReport};
pub use error::{HizError, HizResult};
pub use geometry::{Extent, KernelParams, PyramidGeometry};
pub use image::{DepthImage, MipChain};
pub use reduce::DepthReduction;
pub use sync::{Arrival, SlotIndex, SwapChain, TileCounter};
