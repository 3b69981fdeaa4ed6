//! # HIZ Rendering
//!
//! GPU side of the hierarchical depth pyramid:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     GPU PIPELINE                         │
//! ├──────────────────────────────────────────────────────────┤
//! │  Depth → DownsamplePass (1 dispatch) → GpuDepthPyramid   │
//! │                 ↓                            ↓           │
//! │          GpuTileCounter             front / back slots   │
//! │        (last-arrival election)      → consumer passes    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! [`WgpuBackend`] plugs into `hiz_core::HiZBuffer`; everything about when to
//! build, swap and bind stays in the core crate.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod backend;
pub mod counter;
pub mod device;
pub mod pass;
pub mod pyramid;
mod scope;

pub use backend::{gpu_hiz_buffer, GpuHiZBuffer, WgpuBackend};
pub use counter::GpuTileCounter;
pub use device::{GpuContext, GpuInitError, REQUIRED_STORAGE_TEXTURES};
pub use pass::{check_geometry, shader_source, DownsamplePass, GPU_MAX_MIP_COUNT, GPU_TILE_SIZE};
pub use pyramid::{GpuDepthPyramid, GpuDepthSource, PYRAMID_FORMAT};
