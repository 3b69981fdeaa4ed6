//! Pyramid geometry.
//!
//! Padding, mip extents and the tile/region layout of the single-dispatch
//! downsample.
//!
//! ```text
//!   mip 0 (padded base)          tiles (level g)         regions (level g+r)
//!  ┌──┬──┬──┬──┬──┬──┐          ┌─┬─┬─┬─┬─┬─┐           ┌───┬───┐
//!  │T │T │T │T │T │T │  group   │ │ │ │ │ │ │  region   │   │   │  root
//!  ├──┼──┼──┼──┼──┼──┤ ───────► ├─┼─┼─┼─┼─┼─┤ ────────► ├───┼───┤ ──────► K-1
//!  │T │T │T │T │T │T │  levels  │ │ │ │ │ │ │  winner   │   │   │  winner
//!  └──┴──┴──┴──┴──┴──┘  0..=g   └─┴─┴─┴─┴─┴─┘  g+1..=g+r └───┴───┘
//! ```
//!
//! Each thread group owns one `T x T` tile and reduces it to a single texel at
//! level `g = log2(T)`. Tiles are grouped into `S x S` regions; the last tile
//! of a region to finish reduces the region to one texel at level `g + r`.
//! The last region to finish produces the remaining levels.

use std::fmt;
use std::ops::Range;

use bytemuck::{Pod, Zeroable};

use crate::config::HizConfig;
use crate::error::{HizError, HizResult};
use crate::reduce::DepthReduction;

/// Width and height of an image or grid, in texels or cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent {
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

impl Extent {
    /// Creates a new extent.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of cells covered.
    #[must_use]
    pub const fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Returns true if either dimension is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns true if `(x, y)` lies inside.
    #[inline]
    #[must_use]
    pub const fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    /// Divides both axes by `divisor`, rounding up.
    #[must_use]
    pub const fn div_ceil(&self, divisor: u32) -> Self {
        Self {
            width: self.width.div_ceil(divisor),
            height: self.height.div_ceil(divisor),
        }
    }

    /// One step coarser: both axes halved, rounding up.
    #[must_use]
    pub const fn halved(&self) -> Self {
        self.div_ceil(2)
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Smallest extent `>= source` whose axes survive `mip_count - 1` exact
/// halvings.
///
/// Each axis is rounded up to the next multiple of `2^(mip_count - 1)`.
///
/// # Panics
///
/// Panics if `mip_count` is zero or above 32.
#[must_use]
pub fn padded_extent(source: Extent, mip_count: u32) -> Extent {
    assert!((1..=32).contains(&mip_count), "mip_count out of range: {mip_count}");
    let block = 1u32 << (mip_count - 1);
    Extent::new(
        source.width.max(1).div_ceil(block) * block,
        source.height.max(1).div_ceil(block) * block,
    )
}

/// Extent of `level` for a chain whose level 0 is `base`.
#[must_use]
pub fn mip_extent(base: Extent, level: u32) -> Extent {
    let shift = level.min(31);
    Extent::new((base.width >> shift).max(1), (base.height >> shift).max(1))
}

/// Complete layout of one pyramid build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PyramidGeometry {
    source: Extent,
    base: Extent,
    mip_count: u32,
    group_levels: u32,
    region_levels: u32,
    tiles: Extent,
    regions: Extent,
}

impl PyramidGeometry {
    /// Computes the geometry for a source extent under `config`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration fails validation or the
    /// source is empty.
    pub fn new(source: Extent, config: &HizConfig) -> HizResult<Self> {
        config.validate()?;
        Self::from_parts(source, config.mip_count, config.tile_size, config.region_span)
    }

    /// Computes the geometry from raw parameters.
    ///
    /// `tile_size` and `region_span` must be powers of two.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` on a zero-sized source, zero mip count or
    /// non power-of-two tile/region sizes.
    pub fn from_parts(
        source: Extent,
        mip_count: u32,
        tile_size: u32,
        region_span: u32,
    ) -> HizResult<Self> {
        if source.is_empty() {
            return Err(HizError::InvalidConfig(format!("source extent {source} is empty")));
        }
        if !(1..=HizConfig::MAX_MIP_COUNT).contains(&mip_count) {
            return Err(HizError::InvalidConfig(format!(
                "mip_count must be in 1..={}, got {mip_count}",
                HizConfig::MAX_MIP_COUNT
            )));
        }
        if tile_size < 2 || !tile_size.is_power_of_two() {
            return Err(HizError::InvalidConfig(format!(
                "tile_size must be a power of two >= 2, got {tile_size}"
            )));
        }
        if region_span == 0 || !region_span.is_power_of_two() {
            return Err(HizError::InvalidConfig(format!(
                "region_span must be a power of two >= 1, got {region_span}"
            )));
        }

        let base = padded_extent(source, mip_count);
        let tiles = base.div_ceil(tile_size);
        let regions = tiles.div_ceil(region_span);

        Ok(Self {
            source,
            base,
            mip_count,
            group_levels: tile_size.trailing_zeros(),
            region_levels: region_span.trailing_zeros(),
            tiles,
            regions,
        })
    }

    /// Extent of the source depth image.
    #[must_use]
    pub const fn source(&self) -> Extent {
        self.source
    }

    /// Padded extent of mip 0.
    #[must_use]
    pub const fn base(&self) -> Extent {
        self.base
    }

    /// Fraction of the padded base covered by the source, per axis.
    ///
    /// Consumers multiply screen UVs by this to sample the pyramid.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn uv_scale(&self) -> [f32; 2] {
        [
            self.source.width as f32 / self.base.width as f32,
            self.source.height as f32 / self.base.height as f32,
        ]
    }

    /// Number of mip levels K.
    #[must_use]
    pub const fn mip_count(&self) -> u32 {
        self.mip_count
    }

    /// Extent of mip `level`.
    #[must_use]
    pub fn mip_extent(&self, level: u32) -> Extent {
        mip_extent(self.base, level)
    }

    /// Texels of mip 0 covered by one thread group, per axis.
    #[must_use]
    pub const fn tile_size(&self) -> u32 {
        1 << self.group_levels
    }

    /// Reduction steps a group performs on its own tile (`log2(tile_size)`).
    #[must_use]
    pub const fn group_levels(&self) -> u32 {
        self.group_levels
    }

    /// Tiles per region, per axis.
    #[must_use]
    pub const fn region_span(&self) -> u32 {
        1 << self.region_levels
    }

    /// Reduction steps a region winner performs (`log2(region_span)`).
    #[must_use]
    pub const fn region_levels(&self) -> u32 {
        self.region_levels
    }

    /// Tile grid, one cell per thread group.
    #[must_use]
    pub const fn tiles(&self) -> Extent {
        self.tiles
    }

    /// Region grid, one counter per cell.
    #[must_use]
    pub const fn regions(&self) -> Extent {
        self.regions
    }

    /// Number of thread groups in one dispatch.
    #[must_use]
    pub const fn tile_count(&self) -> u32 {
        self.tiles.width * self.tiles.height
    }

    /// Number of coarse regions.
    #[must_use]
    pub const fn region_count(&self) -> u32 {
        self.regions.width * self.regions.height
    }

    /// Region index owning tile `(tx, ty)`.
    #[must_use]
    pub const fn region_of_tile(&self, tx: u32, ty: u32) -> u32 {
        (ty >> self.region_levels) * self.regions.width + (tx >> self.region_levels)
    }

    /// Tile rectangle `(origin, extent)` covered by `region`, clipped to the
    /// tile grid.
    #[must_use]
    pub fn region_tiles(&self, region: u32) -> ((u32, u32), Extent) {
        let span = self.region_span();
        let rx = region % self.regions.width;
        let ry = region / self.regions.width;
        let origin = (rx * span, ry * span);
        let extent = Extent::new(
            span.min(self.tiles.width - origin.0),
            span.min(self.tiles.height - origin.1),
        );
        (origin, extent)
    }

    /// Number of groups that increment `region`'s counter in one build.
    #[must_use]
    pub fn region_fan_in(&self, region: u32) -> u32 {
        let (_, extent) = self.region_tiles(region);
        extent.width * extent.height
    }

    /// Index of the root counter, incremented once by each region winner.
    #[must_use]
    pub const fn root_counter(&self) -> u32 {
        self.region_count()
    }

    /// Number of region winners that increment the root counter.
    #[must_use]
    pub const fn root_fan_in(&self) -> u32 {
        self.region_count()
    }

    /// Length of the counter array: one per region plus the root.
    #[must_use]
    pub const fn counter_len(&self) -> u32 {
        self.region_count() + 1
    }

    /// Mip levels written by every thread group.
    #[must_use]
    pub fn group_mips(&self) -> Range<u32> {
        0..(self.group_levels + 1).min(self.mip_count)
    }

    /// Mip levels written by region winners.
    #[must_use]
    pub fn region_mips(&self) -> Range<u32> {
        let first = self.group_levels + 1;
        let end = first + self.region_levels;
        first.min(self.mip_count)..end.min(self.mip_count)
    }

    /// Mip levels written by the root winner.
    #[must_use]
    pub fn root_mips(&self) -> Range<u32> {
        let first = self.group_levels + self.region_levels + 1;
        first.min(self.mip_count)..self.mip_count
    }

    /// Constant block handed to the downsample kernel.
    #[must_use]
    pub fn kernel_params(&self, layer: Option<u32>, reduction: DepthReduction) -> KernelParams {
        KernelParams {
            source_size: [self.source.width, self.source.height],
            base_size: [self.base.width, self.base.height],
            tiles: [self.tiles.width, self.tiles.height],
            regions: [self.regions.width, self.regions.height],
            mip_count: self.mip_count,
            group_levels: self.group_levels,
            region_levels: self.region_levels,
            layer: layer.unwrap_or(0),
            reduction: reduction.kernel_mode(),
            _pad: [0; 3],
        }
    }
}

/// Geometry constants uploaded to the downsample kernel.
///
/// Layout must match `KernelParams` in `hiz_update.wgsl` (64 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct KernelParams {
    /// Source depth extent.
    pub source_size: [u32; 2],
    /// Padded mip 0 extent.
    pub base_size: [u32; 2],
    /// Tile grid (dispatch size).
    pub tiles: [u32; 2],
    /// Region grid.
    pub regions: [u32; 2],
    /// Mip level count K.
    pub mip_count: u32,
    /// `log2(tile_size)`.
    pub group_levels: u32,
    /// `log2(region_span)`.
    pub region_levels: u32,
    /// Source layer for layered depth, 0 otherwise.
    pub layer: u32,
    /// 0 = max, 1 = min.
    pub reduction: u32,
    /// Padding to 16-byte multiple.
    pub _pad: [u32; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padding_is_minimal_multiple() {
        assert_eq!(padded_extent(Extent::new(6, 6), 2), Extent::new(6, 6));
        assert_eq!(padded_extent(Extent::new(7, 5), 2), Extent::new(8, 6));
        assert_eq!(padded_extent(Extent::new(1920, 1080), 8), Extent::new(1920, 1152));
        assert_eq!(padded_extent(Extent::new(1, 1), 1), Extent::new(1, 1));
    }

    #[test]
    fn test_uv_scale_covers_source() {
        let config = HizConfig::default();
        let geometry = PyramidGeometry::new(Extent::new(1920, 1080), &config).unwrap();
        assert_eq!(geometry.uv_scale(), [1.0, 1080.0 / 1152.0]);

        let geometry = PyramidGeometry::new(Extent::new(256, 128), &config).unwrap();
        assert_eq!(geometry.uv_scale(), [1.0, 1.0]);
    }

    #[test]
    fn test_padding_exhaustive() {
        for mip_count in 1..=6 {
            let block = 1u32 << (mip_count - 1);
            for w in 1..70 {
                let source = Extent::new(w, 70 - w);
                let base = padded_extent(source, mip_count);
                assert!(base.width >= source.width.max(1));
                assert!(base.height >= source.height.max(1));
                // Every level is an exact half of the one above.
                for level in 1..mip_count {
                    let above = mip_extent(base, level - 1);
                    let here = mip_extent(base, level);
                    assert_eq!(here.width * 2, above.width);
                    assert_eq!(here.height * 2, above.height);
                }
                // Smallest such size.
                assert!(base.width - block < source.width.max(1));
                assert!(base.height - block < source.height.max(1));
            }
        }
    }

    #[test]
    fn test_tile_and_region_layout() {
        let geometry = PyramidGeometry::from_parts(Extent::new(1920, 1080), 8, 32, 8).unwrap();
        assert_eq!(geometry.base(), Extent::new(1920, 1152));
        assert_eq!(geometry.tiles(), Extent::new(60, 36));
        assert_eq!(geometry.regions(), Extent::new(8, 5));
        assert_eq!(geometry.counter_len(), 41);
        assert_eq!(geometry.group_mips(), 0..6);
        assert_eq!(geometry.region_mips(), 6..8);
        assert!(geometry.root_mips().is_empty());

        // Interior region is full, edge regions are clipped.
        assert_eq!(geometry.region_fan_in(0), 64);
        assert_eq!(geometry.region_fan_in(7), 4 * 8);
        assert_eq!(geometry.region_fan_in(39), 4 * 4);

        let total: u32 = (0..geometry.region_count()).map(|r| geometry.region_fan_in(r)).sum();
        assert_eq!(total, geometry.tile_count());
    }

    #[test]
    fn test_level_ownership_partitions_chain() {
        let geometry = PyramidGeometry::from_parts(Extent::new(512, 512), 9, 4, 2).unwrap();
        assert_eq!(geometry.group_mips(), 0..3);
        assert_eq!(geometry.region_mips(), 3..4);
        assert_eq!(geometry.root_mips(), 4..9);
    }

    #[test]
    fn test_rejects_bad_parts() {
        assert!(PyramidGeometry::from_parts(Extent::new(0, 4), 2, 2, 1).is_err());
        assert!(PyramidGeometry::from_parts(Extent::new(4, 4), 0, 2, 1).is_err());
        assert!(PyramidGeometry::from_parts(Extent::new(4, 4), 2, 3, 1).is_err());
        assert!(PyramidGeometry::from_parts(Extent::new(4, 4), 2, 2, 0).is_err());
    }

    #[test]
    fn test_kernel_params_layout() {
        assert_eq!(std::mem::size_of::<KernelParams>(), 64);
    }
}
