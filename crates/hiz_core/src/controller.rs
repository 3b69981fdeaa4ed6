//! # Hierarchical-Z Buffer Controller
//!
//! Public state machine around the swap chain and the downsample pass.
//!
//! ```text
//!   Uninitialized ──sync──► Ready(dirty) ──update──► Ready(clean)
//!                               ▲                         │
//!                               └── set_dirty/swap_layer ─┘
//! ```
//!
//! Typical frame:
//!
//! ```rust,ignore
//! hiz.sync(render_extent)?;
//! hiz.set_source(depth, None);
//! hiz.set_dirty();
//!
//! for pass in passes_reading_hiz {
//!     hiz.update()?;                 // builds once, no-op afterwards
//!     hiz.bind_resources(pass, HizRef::Front)?;
//! }
//! ```
//!
//! **Double-buffer lag:** after a `swap_layer()` the back pyramid is whatever
//! the previous front held. Before anything was built into that slot its
//! content is undefined; `bind_resources(.., HizRef::Back)` reports this as
//! `UndefinedContent` (or warns, with `strict_back_reads = false`). Binding
//! anything before the first build is a `Precondition` error.

use std::sync::Arc;

use crate::backend::PyramidBackend;
use crate::config::HizConfig;
use crate::error::{HizError, HizResult};
use crate::geometry::{Extent, PyramidGeometry};
use crate::sync::{SlotIndex, SwapChain};

/// Texture slot at which the pyramid is exposed to consumers.
pub const HIZ_TEX_SLOT: u32 = 3;

/// Which pyramid a consumer reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HizRef {
    /// Previous layer depth (e.g. for refraction).
    Back,
    /// Current layer depth.
    #[default]
    Front,
}

/// Receiver of read-only pyramid bindings (a consumer pass).
pub trait BindingSink<T> {
    /// Registers `texture` at `slot`.
    fn bind_texture(&mut self, slot: u32, texture: Arc<T>);
}

/// Counters for profiling and build-count probes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HizStats {
    /// Downsample dispatches performed.
    pub builds: u64,
    /// `update()` calls that found the pyramid clean.
    pub skipped_updates: u64,
    /// `swap_layer()` calls.
    pub swaps: u64,
    /// Swap chain (re)allocations.
    pub reallocations: u64,
}

struct Allocation<B: PyramidBackend> {
    geometry: PyramidGeometry,
    chain: SwapChain<B::Pyramid>,
    counter: B::Counter,
}

/// Double-buffered depth pyramid with dirty tracking.
///
/// One instance per view: dirtiness and sources are per instance.
pub struct HiZBuffer<B: PyramidBackend> {
    backend: B,
    config: HizConfig,
    allocation: Option<Allocation<B>>,
    source: Option<B::Source>,
    layer: Option<u32>,
    is_dirty: bool,
    build_serial: u64,
    stats: HizStats,
}

impl<B: PyramidBackend> HiZBuffer<B> {
    /// Creates an uninitialized controller.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `config` fails validation.
    pub fn new(backend: B, config: HizConfig) -> HizResult<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            config,
            allocation: None,
            source: None,
            layer: None,
            is_dirty: true,
            build_serial: 0,
            stats: HizStats::default(),
        })
    }

    /// Ensures both pyramids are allocated for a source of `extent`.
    ///
    /// Reallocates (and marks dirty) only when the geometry changes; both
    /// slots start out unbuilt.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for an empty extent, `ResourceAllocation` from the
    /// backend. On error the previous allocation is kept.
    pub fn sync(&mut self, extent: Extent) -> HizResult<()> {
        let geometry = PyramidGeometry::new(extent, &self.config)?;
        if self.allocation.as_ref().is_some_and(|a| a.geometry == geometry) {
            return Ok(());
        }

        let backend = &mut self.backend;
        let chain = SwapChain::allocate(|slot| backend.allocate_pyramid(&geometry, slot))?;
        let counter = self.backend.allocate_counter(&geometry)?;

        tracing::info!(
            source = %geometry.source(),
            base = %geometry.base(),
            mips = geometry.mip_count(),
            groups = geometry.tile_count(),
            regions = geometry.region_count(),
            "allocated depth pyramid"
        );
        self.allocation = Some(Allocation { geometry, chain, counter });
        self.stats.reallocations += 1;
        self.set_dirty();
        Ok(())
    }

    /// Binds the depth image the next build reads.
    ///
    /// `layer` selects one layer of a layered source. Does not mark dirty.
    pub fn set_source(&mut self, source: B::Source, layer: Option<u32>) {
        self.source = Some(source);
        self.layer = layer;
    }

    /// Tags the front pyramid for rebuild.
    pub fn set_dirty(&mut self) {
        self.is_dirty = true;
    }

    /// Rebuilds the front pyramid from the bound source if dirty.
    ///
    /// No-op when clean; call it before every pass that reads the pyramid.
    ///
    /// # Errors
    ///
    /// `Precondition` before `set_source` or `sync`, `SourceMismatch` if the
    /// source extent differs from the synced one, backend validation errors.
    /// The pyramid stays dirty on error.
    pub fn update(&mut self) -> HizResult<()> {
        let Some(source) = self.source.as_ref() else {
            return Err(HizError::Precondition("update called before set_source"));
        };
        if !self.is_dirty {
            self.stats.skipped_updates += 1;
            return Ok(());
        }
        let Some(allocation) = self.allocation.as_mut() else {
            return Err(HizError::Precondition("update called before sync"));
        };

        let actual = self.backend.source_extent(source);
        if actual != allocation.geometry.source() {
            return Err(HizError::SourceMismatch {
                expected: allocation.geometry.source(),
                actual,
            });
        }

        self.backend.downsample(
            source,
            self.layer,
            allocation.chain.current(),
            &allocation.counter,
            &allocation.geometry,
            self.config.reduction,
        )?;

        self.build_serial += 1;
        allocation.chain.mark_current_built(self.build_serial);
        self.is_dirty = false;
        self.stats.builds += 1;
        tracing::debug!(
            serial = self.build_serial,
            slot = %allocation.chain.current_slot(),
            layer = ?self.layer,
            "depth pyramid rebuilt"
        );
        Ok(())
    }

    /// Swaps front and back pyramids and tags the new front dirty.
    ///
    /// No-op before `sync`.
    pub fn swap_layer(&mut self) {
        if let Some(allocation) = self.allocation.as_mut() {
            allocation.chain.swap();
            self.stats.swaps += 1;
            tracing::debug!(
                front = %allocation.chain.current_slot(),
                "depth pyramid layers swapped"
            );
        }
        self.set_dirty();
    }

    /// Exposes the front or back pyramid to `sink` at [`HIZ_TEX_SLOT`].
    ///
    /// # Errors
    ///
    /// `Precondition` before `sync`, before any build since the last
    /// allocation, or when the front was never built. A never-built back
    /// after some build is `UndefinedContent` with `strict_back_reads`.
    pub fn bind_resources<S>(&self, sink: &mut S, which: HizRef) -> HizResult<()>
    where
        S: BindingSink<B::Pyramid> + ?Sized,
    {
        let Some(allocation) = self.allocation.as_ref() else {
            return Err(HizError::Precondition("bind_resources called before sync"));
        };
        let chain = &allocation.chain;
        let slot = match which {
            HizRef::Front => chain.current_slot(),
            HizRef::Back => chain.previous_slot(),
        };

        if !chain.is_built(SlotIndex::A) && !chain.is_built(SlotIndex::B) {
            return Err(HizError::Precondition("bind_resources called before any build"));
        }
        if !chain.is_built(slot) {
            match which {
                HizRef::Front => {
                    return Err(HizError::Precondition("front pyramid not built since swap"));
                }
                HizRef::Back if self.config.strict_back_reads => {
                    return Err(HizError::UndefinedContent { slot });
                }
                HizRef::Back => {
                    tracing::warn!(%slot, "binding back depth pyramid with undefined content");
                }
            }
        }

        sink.bind_texture(HIZ_TEX_SLOT, Arc::clone(chain.get(slot)));
        Ok(())
    }

    /// Front pyramid (receives builds), `None` before `sync`.
    #[must_use]
    pub fn front(&self) -> Option<&Arc<B::Pyramid>> {
        self.allocation.as_ref().map(|a| a.chain.current())
    }

    /// Back pyramid (prior build), `None` before `sync`.
    #[must_use]
    pub fn back(&self) -> Option<&Arc<B::Pyramid>> {
        self.allocation.as_ref().map(|a| a.chain.previous())
    }

    /// Slot currently serving as front, `None` before `sync`.
    #[must_use]
    pub fn front_slot(&self) -> Option<SlotIndex> {
        self.allocation.as_ref().map(|a| a.chain.current_slot())
    }

    /// Returns true if the next `update()` rebuilds.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    /// Returns true once `sync` has allocated the pyramids.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.allocation.is_some()
    }

    /// Layout of the allocated pyramids.
    #[must_use]
    pub fn geometry(&self) -> Option<&PyramidGeometry> {
        self.allocation.as_ref().map(|a| &a.geometry)
    }

    /// Layer selected by `set_source`.
    #[must_use]
    pub const fn layer(&self) -> Option<u32> {
        self.layer
    }

    /// Build and swap counters.
    #[must_use]
    pub const fn stats(&self) -> HizStats {
        self.stats
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &HizConfig {
        &self.config
    }

    /// Backend reference.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable backend reference.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
