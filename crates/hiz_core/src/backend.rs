//! Backend seam between the pyramid controller and the device.
//!
//! The controller only decides *when* to allocate, build and bind. How a
//! pyramid is stored and how the downsample kernel runs belongs to a
//! [`PyramidBackend`]: [`CpuBackend`] runs the software executor, the
//! `hiz_rendering` crate provides the wgpu one.

use std::sync::Arc;

use crate::config::HizConfig;
use crate::downsample::{self, DispatchReport, DownsampleJob};
use crate::error::HizResult;
use crate::geometry::{Extent, PyramidGeometry};
use crate::image::{DepthImage, MipChain};
use crate::reduce::DepthReduction;
use crate::sync::{SlotIndex, TileCounter};

/// Storage and execution provider for depth pyramids.
pub trait PyramidBackend {
    /// Handle to the external source depth image.
    type Source;
    /// One mip-chain texture.
    type Pyramid;
    /// Completion counter storage.
    type Counter;

    /// Allocates one padded mip-chain texture.
    ///
    /// # Errors
    ///
    /// `ResourceAllocation` if the device cannot satisfy the request.
    fn allocate_pyramid(
        &mut self,
        geometry: &PyramidGeometry,
        slot: SlotIndex,
    ) -> HizResult<Self::Pyramid>;

    /// Allocates the counter array (and any scratch the kernel needs).
    ///
    /// # Errors
    ///
    /// `ResourceAllocation` if the device cannot satisfy the request.
    fn allocate_counter(&mut self, geometry: &PyramidGeometry) -> HizResult<Self::Counter>;

    /// Extent of a source image.
    fn source_extent(&self, source: &Self::Source) -> Extent;

    /// Builds every level of `target` from `source` in one dispatch.
    ///
    /// Resets `counter` before any group runs.
    ///
    /// # Errors
    ///
    /// Only argument validation; the reduction itself cannot fail.
    fn downsample(
        &mut self,
        source: &Self::Source,
        layer: Option<u32>,
        target: &Self::Pyramid,
        counter: &Self::Counter,
        geometry: &PyramidGeometry,
        reduction: DepthReduction,
    ) -> HizResult<()>;
}

/// Backend running the downsample on CPU worker threads.
#[derive(Debug, Default)]
pub struct CpuBackend {
    workers: usize,
    dispatches: u64,
    last_report: Option<DispatchReport>,
}

impl CpuBackend {
    /// Creates a backend spreading groups over `workers` threads.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            dispatches: 0,
            last_report: None,
        }
    }

    /// Creates a backend sized by `config.workers`.
    #[must_use]
    pub fn from_config(config: &HizConfig) -> Self {
        Self::new(config.resolved_workers())
    }

    /// Number of dispatches executed so far.
    #[must_use]
    pub const fn dispatch_count(&self) -> u64 {
        self.dispatches
    }

    /// Election report of the most recent dispatch.
    #[must_use]
    pub fn last_report(&self) -> Option<&DispatchReport> {
        self.last_report.as_ref()
    }
}

impl PyramidBackend for CpuBackend {
    type Source = Arc<DepthImage>;
    type Pyramid = MipChain;
    type Counter = TileCounter;

    fn allocate_pyramid(
        &mut self,
        geometry: &PyramidGeometry,
        _slot: SlotIndex,
    ) -> HizResult<MipChain> {
        Ok(MipChain::new(geometry))
    }

    fn allocate_counter(&mut self, geometry: &PyramidGeometry) -> HizResult<TileCounter> {
        Ok(TileCounter::for_geometry(geometry))
    }

    fn source_extent(&self, source: &Arc<DepthImage>) -> Extent {
        source.extent()
    }

    fn downsample(
        &mut self,
        source: &Arc<DepthImage>,
        layer: Option<u32>,
        target: &MipChain,
        counter: &TileCounter,
        geometry: &PyramidGeometry,
        reduction: DepthReduction,
    ) -> HizResult<()> {
        let report = downsample::dispatch(&DownsampleJob {
            source,
            layer,
            geometry,
            reduction,
            target,
            counter,
            workers: self.workers.max(1),
        })?;
        self.dispatches += 1;
        self.last_report = Some(report);
        Ok(())
    }
}
