//! wgpu implementation of the pyramid backend.

use hiz_core::{
    DepthReduction, Extent, HiZBuffer, HizConfig, HizResult, PyramidBackend, PyramidGeometry,
    SlotIndex,
};

use crate::counter::GpuTileCounter;
use crate::device::GpuContext;
use crate::pass::{check_geometry, DownsamplePass};
use crate::pyramid::{GpuDepthPyramid, GpuDepthSource};

/// Builds pyramids on the GPU.
#[derive(Debug)]
pub struct WgpuBackend {
    ctx: GpuContext,
    pass: DownsamplePass,
    dispatches: u64,
}

impl WgpuBackend {
    /// Compiles the downsample kernel on `ctx`.
    ///
    /// # Errors
    ///
    /// `ResourceAllocation` if pipeline creation fails.
    pub fn new(ctx: GpuContext) -> HizResult<Self> {
        let pass = DownsamplePass::new(&ctx)?;
        Ok(Self {
            ctx,
            pass,
            dispatches: 0,
        })
    }

    /// Device context.
    #[must_use]
    pub const fn context(&self) -> &GpuContext {
        &self.ctx
    }

    /// Number of dispatches submitted so far.
    #[must_use]
    pub const fn dispatch_count(&self) -> u64 {
        self.dispatches
    }
}

impl PyramidBackend for WgpuBackend {
    type Source = GpuDepthSource;
    type Pyramid = GpuDepthPyramid;
    type Counter = GpuTileCounter;

    fn allocate_pyramid(
        &mut self,
        geometry: &PyramidGeometry,
        slot: SlotIndex,
    ) -> HizResult<GpuDepthPyramid> {
        check_geometry(geometry)?;
        GpuDepthPyramid::new(&self.ctx, geometry, slot)
    }

    fn allocate_counter(&mut self, geometry: &PyramidGeometry) -> HizResult<GpuTileCounter> {
        check_geometry(geometry)?;
        GpuTileCounter::new(&self.ctx, geometry)
    }

    fn source_extent(&self, source: &GpuDepthSource) -> Extent {
        source.extent()
    }

    fn downsample(
        &mut self,
        source: &GpuDepthSource,
        layer: Option<u32>,
        target: &GpuDepthPyramid,
        counter: &GpuTileCounter,
        geometry: &PyramidGeometry,
        reduction: DepthReduction,
    ) -> HizResult<()> {
        self.pass
            .dispatch(&self.ctx, source, layer, target, counter, geometry, reduction)?;
        self.dispatches += 1;
        Ok(())
    }
}

/// Controller building on the GPU.
pub type GpuHiZBuffer = HiZBuffer<WgpuBackend>;

/// Creates a GPU controller on `ctx`.
///
/// # Errors
///
/// `InvalidConfig` if `config` fails validation, `ResourceAllocation` if the
/// kernel cannot be compiled.
pub fn gpu_hiz_buffer(ctx: GpuContext, config: HizConfig) -> HizResult<GpuHiZBuffer> {
    HiZBuffer::new(WgpuBackend::new(ctx)?, config)
}
