//! Device buffers of the last-arrival election.
//!
//! ```text
//!   counters:      [region 0][region 1] ... [region R-1][root]   atomic<u32>
//!   tile_values:   one f32 (as bits) per tile, level g
//!   region_values: one f32 (as bits) per region, level g + r
//! ```
//!
//! Only `counters` needs zeroing per build; the value arrays are fully
//! rewritten before anyone reads them.

use hiz_core::{HizResult, PyramidGeometry};

use crate::device::GpuContext;
use crate::scope::capture_allocation;

/// Counter array plus tile/region scratch for one geometry.
#[derive(Debug)]
pub struct GpuTileCounter {
    counters: wgpu::Buffer,
    tile_values: wgpu::Buffer,
    region_values: wgpu::Buffer,
    len: u32,
}

impl GpuTileCounter {
    /// Allocates the buffers for `geometry`.
    ///
    /// # Errors
    ///
    /// `ResourceAllocation` if the device rejects a buffer.
    pub fn new(ctx: &GpuContext, geometry: &PyramidGeometry) -> HizResult<Self> {
        let storage = wgpu::BufferUsages::STORAGE;
        let counters = words(
            ctx,
            "HiZ counters",
            geometry.counter_len(),
            storage | wgpu::BufferUsages::COPY_DST,
        )?;
        let tile_values = words(ctx, "HiZ tile values", geometry.tile_count(), storage)?;
        let region_values = words(ctx, "HiZ region values", geometry.region_count(), storage)?;
        Ok(Self {
            counters,
            tile_values,
            region_values,
            len: geometry.counter_len(),
        })
    }

    /// Number of counters (regions + root).
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.len
    }

    /// Returns true if there are no counters.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Counter buffer, zeroed by the pass before each dispatch.
    #[must_use]
    pub const fn counters(&self) -> &wgpu::Buffer {
        &self.counters
    }

    /// Published per-tile values.
    #[must_use]
    pub const fn tile_values(&self) -> &wgpu::Buffer {
        &self.tile_values
    }

    /// Published per-region values.
    #[must_use]
    pub const fn region_values(&self) -> &wgpu::Buffer {
        &self.region_values
    }
}

fn words(
    ctx: &GpuContext,
    label: &'static str,
    count: u32,
    usage: wgpu::BufferUsages,
) -> HizResult<wgpu::Buffer> {
    capture_allocation(&ctx.device, label, || {
        ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: u64::from(count.max(1)) * 4,
            usage,
            mapped_at_creation: false,
        })
    })
}
