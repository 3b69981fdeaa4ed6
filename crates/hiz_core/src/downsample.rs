//! Software executor of the single-dispatch recursive downsample.
//!
//! Runs the exact protocol the device kernel runs, with thread groups mapped
//! onto worker threads:
//!
//! 1. every group loads its tile, writes mip 0 and reduces the tile down to
//!    one texel, writing each level it owns, then publishes the tile value;
//! 2. it arrives at its region counter; the last arrival reduces the region's
//!    tile values through the region levels and publishes the region value;
//! 3. region winners arrive at the root counter; the last one reduces the
//!    region values through the remaining levels.
//!
//! Groups are pulled from a shared job queue, so the order in which they
//! finish (and therefore who gets elected) varies from run to run. The counter
//! increment is the only ordering edge between groups.
//!
//! [`reference_chain`] is the naive level-by-level reduction every executor
//! is validated against.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::error::{HizError, HizResult};
use crate::geometry::{Extent, PyramidGeometry};
use crate::image::{DepthImage, MipChain};
use crate::reduce::DepthReduction;
use crate::sync::{Arrival, TileCounter};

/// Inputs of one dispatch.
#[derive(Debug, Clone, Copy)]
pub struct DownsampleJob<'a> {
    /// Source depth.
    pub source: &'a DepthImage,
    /// Layer to downsample; `None` for single-layer sources.
    pub layer: Option<u32>,
    /// Layout of the build.
    pub geometry: &'a PyramidGeometry,
    /// Reduction operator.
    pub reduction: DepthReduction,
    /// Destination chain (the swap chain's current slot).
    pub target: &'a MipChain,
    /// Completion counters, reset by the dispatch.
    pub counter: &'a TileCounter,
    /// Worker threads to spread groups over.
    pub workers: usize,
}

/// Who was elected during one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DispatchReport {
    /// Thread groups executed.
    pub groups: u32,
    /// Group ids elected per region, indexed by region.
    pub region_winners: Vec<Vec<u32>>,
    /// Group ids elected at the root counter.
    pub root_winners: Vec<u32>,
}

impl DispatchReport {
    /// Returns true if every region and the root elected exactly one group.
    #[must_use]
    pub fn is_exactly_once(&self) -> bool {
        self.root_winners.len() == 1 && self.region_winners.iter().all(|w| w.len() == 1)
    }
}

/// Runs one full pyramid build.
///
/// # Errors
///
/// Validation only, before any group runs: `SourceMismatch` if the source is
/// not the geometry's source extent, `Precondition` for a bad layer, a target
/// chain or counter array sized for another geometry.
pub fn dispatch(job: &DownsampleJob<'_>) -> HizResult<DispatchReport> {
    validate(job)?;
    job.counter.reset();

    let geometry = job.geometry;
    let executor = Executor {
        job,
        layer: job.layer.unwrap_or(0),
        tile_values: atomic_grid(geometry.tile_count()),
        region_values: atomic_grid(geometry.region_count()),
        log: Mutex::new(DispatchReport {
            groups: geometry.tile_count(),
            region_winners: vec![Vec::new(); geometry.region_count() as usize],
            root_winners: Vec::new(),
        }),
    };

    let group_count = geometry.tile_count();
    let workers = job.workers.clamp(1, group_count as usize);
    let (sender, receiver) = crossbeam_channel::bounded(group_count as usize);
    for group in 0..group_count {
        // Capacity equals the group count and the receiver is alive.
        let _ = sender.send(group);
    }
    drop(sender);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let receiver = receiver.clone();
            let executor = &executor;
            scope.spawn(move || {
                for group in receiver.iter() {
                    executor.run_group(group);
                }
            });
        }
    });

    let report = executor.log.into_inner();
    tracing::debug!(
        groups = report.groups,
        regions = report.region_winners.len(),
        workers,
        "software downsample dispatched"
    );
    Ok(report)
}

fn validate(job: &DownsampleJob<'_>) -> HizResult<()> {
    let geometry = job.geometry;
    if job.source.extent() != geometry.source() {
        return Err(HizError::SourceMismatch {
            expected: geometry.source(),
            actual: job.source.extent(),
        });
    }
    if job.layer.unwrap_or(0) >= job.source.layers() {
        return Err(HizError::Precondition("source layer out of range"));
    }
    if job.target.mip_count() != geometry.mip_count() || job.target.extent(0) != geometry.base() {
        return Err(HizError::Precondition("target pyramid was allocated for another geometry"));
    }
    if job.counter.len() != geometry.counter_len() {
        return Err(HizError::Precondition("tile counter was allocated for another geometry"));
    }
    Ok(())
}

fn atomic_grid(len: u32) -> Box<[AtomicU32]> {
    (0..len).map(|_| AtomicU32::new(0)).collect()
}

/// Values of a rectangle of one level, positioned in that level's texel space.
struct Block {
    level: u32,
    origin: (u32, u32),
    extent: Extent,
    values: Vec<f32>,
}

struct Executor<'a> {
    job: &'a DownsampleJob<'a>,
    layer: u32,
    /// One value per tile at level `group_levels`.
    tile_values: Box<[AtomicU32]>,
    /// One value per region at level `group_levels + region_levels`.
    region_values: Box<[AtomicU32]>,
    log: Mutex<DispatchReport>,
}

impl Executor<'_> {
    fn run_group(&self, group: u32) {
        let geometry = self.job.geometry;
        let tiles = geometry.tiles();
        let (tx, ty) = (group % tiles.width, group / tiles.width);
        let size = geometry.tile_size();
        let origin = (tx * size, ty * size);

        // Level 0: straight copy of the source, clamped into the padding.
        let mut values = Vec::with_capacity((size * size) as usize);
        for y in 0..size {
            for x in 0..size {
                let (gx, gy) = (origin.0 + x, origin.1 + y);
                let depth = self.job.source.load_clamped(gx, gy, self.layer);
                self.job.target.store(0, gx, gy, depth);
                values.push(depth);
            }
        }
        let tile = Block {
            level: 0,
            origin,
            extent: Extent::new(size, size),
            values,
        };
        let tile = self.reduce(tile, geometry.group_levels());
        self.tile_values[group as usize].store(tile.values[0].to_bits(), Ordering::Relaxed);

        let region = geometry.region_of_tile(tx, ty);
        if self.job.counter.arrive(region, geometry.region_fan_in(region)) == Arrival::Last {
            self.log.lock().region_winners[region as usize].push(group);
            self.run_region(group, region);
        }
    }

    fn run_region(&self, group: u32, region: u32) {
        let geometry = self.job.geometry;
        let tiles = geometry.tiles();
        let (origin, extent) = geometry.region_tiles(region);
        let block = self.gather(
            &self.tile_values,
            tiles.width,
            origin,
            extent,
            geometry.group_levels(),
        );
        let block = self.reduce(block, geometry.region_levels());
        self.region_values[region as usize].store(block.values[0].to_bits(), Ordering::Relaxed);

        let root = geometry.root_counter();
        if self.job.counter.arrive(root, geometry.root_fan_in()) == Arrival::Last {
            self.log.lock().root_winners.push(group);
            self.run_root();
        }
    }

    fn run_root(&self) {
        let geometry = self.job.geometry;
        let regions = geometry.regions();
        let level = geometry.group_levels() + geometry.region_levels();
        let block = self.gather(&self.region_values, regions.width, (0, 0), regions, level);
        let remaining = geometry.root_mips().len() as u32;
        let _ = self.reduce(block, remaining);
    }

    /// Copies a rectangle of a published grid into a block.
    ///
    /// The `AcqRel` arrival that elected the caller makes every value in the
    /// rectangle visible.
    fn gather(
        &self,
        grid: &[AtomicU32],
        grid_width: u32,
        origin: (u32, u32),
        extent: Extent,
        level: u32,
    ) -> Block {
        let mut values = Vec::with_capacity(extent.area());
        for y in origin.1..origin.1 + extent.height {
            for x in origin.0..origin.0 + extent.width {
                let bits = grid[(y * grid_width + x) as usize].load(Ordering::Relaxed);
                values.push(f32::from_bits(bits));
            }
        }
        Block { level, origin, extent, values }
    }

    /// Applies `steps` 2x2 reductions, writing every produced level the
    /// chain has.
    fn reduce(&self, mut block: Block, steps: u32) -> Block {
        let reduction = self.job.reduction;
        let mip_count = self.job.geometry.mip_count();
        for _ in 0..steps {
            let level = block.level + 1;
            let extent = block.extent.halved();
            let origin = (block.origin.0 / 2, block.origin.1 / 2);
            let mut values = Vec::with_capacity(extent.area());
            for y in 0..extent.height {
                for x in 0..extent.width {
                    let child = |dx: u32, dy: u32| {
                        let (cx, cy) = (2 * x + dx, 2 * y + dy);
                        if block.extent.contains(cx, cy) {
                            block.values[(cy * block.extent.width + cx) as usize]
                        } else {
                            reduction.identity()
                        }
                    };
                    let depth =
                        reduction.reduce4([child(0, 0), child(1, 0), child(0, 1), child(1, 1)]);
                    if level < mip_count {
                        self.job.target.store(level, origin.0 + x, origin.1 + y, depth);
                    }
                    values.push(depth);
                }
            }
            block = Block { level, origin, extent, values };
        }
        block
    }
}

/// Naive level-by-level reduction of `source` into `geometry.mip_count()`
/// row-major levels.
///
/// # Panics
///
/// Panics if `layer` is out of range for `source`.
#[must_use]
pub fn reference_chain(
    source: &DepthImage,
    layer: Option<u32>,
    geometry: &PyramidGeometry,
    reduction: DepthReduction,
) -> Vec<Vec<f32>> {
    let layer = layer.unwrap_or(0);
    assert!(layer < source.layers(), "layer {layer} out of range");

    let base = geometry.base();
    let mut levels = Vec::with_capacity(geometry.mip_count() as usize);
    let mut level0 = Vec::with_capacity(base.area());
    for y in 0..base.height {
        for x in 0..base.width {
            level0.push(source.load_clamped(x, y, layer));
        }
    }
    levels.push(level0);

    for level in 1..geometry.mip_count() {
        let above = geometry.mip_extent(level - 1);
        let here = geometry.mip_extent(level);
        let prev = &levels[level as usize - 1];
        let mut next = Vec::with_capacity(here.area());
        for y in 0..here.height {
            for x in 0..here.width {
                let at = |cx: u32, cy: u32| prev[(cy * above.width + cx) as usize];
                next.push(reduction.reduce4([
                    at(2 * x, 2 * y),
                    at(2 * x + 1, 2 * y),
                    at(2 * x, 2 * y + 1),
                    at(2 * x + 1, 2 * y + 1),
                ]));
            }
        }
        levels.push(next);
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(
        source: &DepthImage,
        geometry: &PyramidGeometry,
        workers: usize,
    ) -> (MipChain, DispatchReport) {
        let target = MipChain::new(geometry);
        let counter = TileCounter::for_geometry(geometry);
        let report = dispatch(&DownsampleJob {
            source,
            layer: None,
            geometry,
            reduction: DepthReduction::Max,
            target: &target,
            counter: &counter,
            workers,
        })
        .unwrap();
        (target, report)
    }

    #[test]
    fn test_single_tile_single_region() {
        let source = DepthImage::from_fn(Extent::new(4, 4), |x, y| (x * 4 + y) as f32);
        let geometry = PyramidGeometry::from_parts(Extent::new(4, 4), 3, 4, 1).unwrap();
        let (target, report) = run(&source, &geometry, 1);

        assert_eq!(report.groups, 1);
        assert_eq!(report.region_winners, vec![vec![0]]);
        assert_eq!(report.root_winners, vec![0]);
        assert_eq!(target.read_level(1), vec![5.0, 13.0, 7.0, 15.0]);
        assert_eq!(target.read_level(2), vec![15.0]);
    }

    #[test]
    fn test_root_stage_produces_coarsest_levels() {
        // 2x2 texel tiles, 1x1 regions: every level past 1 is built from
        // published values by elected groups.
        let extent = Extent::new(16, 16);
        let source = DepthImage::from_fn(extent, |x, y| ((x * 7 + y * 13) % 17) as f32);
        let geometry = PyramidGeometry::from_parts(extent, 5, 2, 1).unwrap();
        assert_eq!(geometry.root_mips(), 2..5);

        let (target, report) = run(&source, &geometry, 4);
        assert!(report.is_exactly_once());

        let expected = reference_chain(&source, None, &geometry, DepthReduction::Max);
        for level in 0..5 {
            assert_eq!(target.read_level(level), expected[level as usize], "level {level}");
        }
    }

    #[test]
    fn test_rejects_foreign_counter() {
        let source = DepthImage::filled(Extent::new(8, 8), 1.0);
        let geometry = PyramidGeometry::from_parts(Extent::new(8, 8), 3, 2, 2).unwrap();
        let target = MipChain::new(&geometry);
        let counter = TileCounter::new(1);
        let result = dispatch(&DownsampleJob {
            source: &source,
            layer: None,
            geometry: &geometry,
            reduction: DepthReduction::Max,
            target: &target,
            counter: &counter,
            workers: 1,
        });
        assert!(matches!(result, Err(HizError::Precondition(_))));
    }

    #[test]
    fn test_reference_chain_e2e_values() {
        let source = DepthImage::from_fn(Extent::new(6, 6), |x, y| (x + y) as f32);
        let geometry = PyramidGeometry::from_parts(Extent::new(6, 6), 2, 2, 1).unwrap();
        let levels = reference_chain(&source, None, &geometry, DepthReduction::Max);
        assert_eq!(levels[1][0], 2.0);
        assert_eq!(levels[1][2 * 3 + 2], 10.0);
    }
}
