//! CPU depth images and mip chains.
//!
//! `DepthImage` is the software stand-in for the source depth buffer.
//! `MipChain` is the software stand-in for the pyramid texture: every texel is
//! an `AtomicU32` holding `f32` bits, so thread groups running on different
//! workers can write their disjoint texels without a lock, the same way
//! device thread groups write a storage texture.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{HizError, HizResult};
use crate::geometry::{Extent, PyramidGeometry};

/// Single-channel depth image with one or more layers.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthImage {
    extent: Extent,
    layers: u32,
    /// Row-major texels, layer after layer.
    data: Vec<f32>,
}

impl DepthImage {
    /// Creates a single-layer image filled with `depth`.
    #[must_use]
    pub fn filled(extent: Extent, depth: f32) -> Self {
        Self {
            extent,
            layers: 1,
            data: vec![depth; extent.area()],
        }
    }

    /// Creates a single-layer image from a per-texel function.
    #[must_use]
    pub fn from_fn(extent: Extent, mut f: impl FnMut(u32, u32) -> f32) -> Self {
        Self::from_layers_fn(extent, 1, |x, y, _| f(x, y))
    }

    /// Creates a layered image from a per-texel function.
    #[must_use]
    pub fn from_layers_fn(
        extent: Extent,
        layers: u32,
        mut f: impl FnMut(u32, u32, u32) -> f32,
    ) -> Self {
        let mut data = Vec::with_capacity(extent.area() * layers as usize);
        for layer in 0..layers {
            for y in 0..extent.height {
                for x in 0..extent.width {
                    data.push(f(x, y, layer));
                }
            }
        }
        Self { extent, layers, data }
    }

    /// Wraps row-major single-layer texels.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `data.len()` does not match `extent`.
    pub fn from_vec(extent: Extent, data: Vec<f32>) -> HizResult<Self> {
        if data.len() != extent.area() {
            return Err(HizError::InvalidConfig(format!(
                "depth image {extent} needs {} texels, got {}",
                extent.area(),
                data.len()
            )));
        }
        Ok(Self { extent, layers: 1, data })
    }

    /// Image extent.
    #[must_use]
    pub const fn extent(&self) -> Extent {
        self.extent
    }

    /// Number of layers.
    #[must_use]
    pub const fn layers(&self) -> u32 {
        self.layers
    }

    /// Texels of one layer, row-major.
    #[must_use]
    pub fn layer(&self, layer: u32) -> &[f32] {
        let len = self.extent.area();
        let start = layer as usize * len;
        &self.data[start..start + len]
    }

    /// Texel at `(x, y)` of `layer`.
    #[inline]
    #[must_use]
    pub fn texel(&self, x: u32, y: u32, layer: u32) -> f32 {
        let index = (layer as usize * self.extent.height as usize + y as usize)
            * self.extent.width as usize
            + x as usize;
        self.data[index]
    }

    /// Texel with coordinates clamped to the edge.
    ///
    /// Reads in the padding region replicate the last row/column.
    #[inline]
    #[must_use]
    pub fn load_clamped(&self, x: u32, y: u32, layer: u32) -> f32 {
        self.texel(
            x.min(self.extent.width - 1),
            y.min(self.extent.height - 1),
            layer,
        )
    }
}

/// Software pyramid texture: all mip levels of one padded chain.
#[derive(Debug)]
pub struct MipChain {
    extents: Vec<Extent>,
    levels: Vec<Box<[AtomicU32]>>,
}

impl MipChain {
    /// Allocates a zeroed chain for `geometry`.
    #[must_use]
    pub fn new(geometry: &PyramidGeometry) -> Self {
        let extents: Vec<Extent> = (0..geometry.mip_count())
            .map(|level| geometry.mip_extent(level))
            .collect();
        let levels = extents
            .iter()
            .map(|extent| (0..extent.area()).map(|_| AtomicU32::new(0)).collect())
            .collect();
        Self { extents, levels }
    }

    /// Number of levels.
    #[must_use]
    pub fn mip_count(&self) -> u32 {
        self.levels.len() as u32
    }

    /// Extent of `level`.
    #[must_use]
    pub fn extent(&self, level: u32) -> Extent {
        self.extents[level as usize]
    }

    /// Writes one texel. Out-of-range coordinates are ignored.
    #[inline]
    pub fn store(&self, level: u32, x: u32, y: u32, depth: f32) {
        let extent = self.extents[level as usize];
        if extent.contains(x, y) {
            let index = y as usize * extent.width as usize + x as usize;
            self.levels[level as usize][index].store(depth.to_bits(), Ordering::Relaxed);
        }
    }

    /// Reads one texel.
    #[inline]
    #[must_use]
    pub fn texel(&self, level: u32, x: u32, y: u32) -> f32 {
        let extent = self.extents[level as usize];
        let index = y as usize * extent.width as usize + x as usize;
        f32::from_bits(self.levels[level as usize][index].load(Ordering::Relaxed))
    }

    /// Copies one level out, row-major.
    #[must_use]
    pub fn read_level(&self, level: u32) -> Vec<f32> {
        self.levels[level as usize]
            .iter()
            .map(|texel| f32::from_bits(texel.load(Ordering::Relaxed)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_clamped_replicates_edge() {
        let image = DepthImage::from_fn(Extent::new(3, 2), |x, y| (x + 10 * y) as f32);
        assert_eq!(image.load_clamped(5, 0, 0), 2.0);
        assert_eq!(image.load_clamped(1, 9, 0), 11.0);
        assert_eq!(image.load_clamped(7, 7, 0), 12.0);
    }

    #[test]
    fn test_layers_are_separate() {
        let image = DepthImage::from_layers_fn(Extent::new(2, 2), 3, |_, _, layer| layer as f32);
        assert_eq!(image.layers(), 3);
        assert_eq!(image.layer(2), &[2.0; 4]);
        assert_eq!(image.texel(1, 1, 1), 1.0);
    }

    #[test]
    fn test_from_vec_checks_length() {
        assert!(DepthImage::from_vec(Extent::new(2, 2), vec![0.0; 3]).is_err());
        assert!(DepthImage::from_vec(Extent::new(2, 2), vec![0.0; 4]).is_ok());
    }

    #[test]
    fn test_mip_chain_extents() {
        let geometry = PyramidGeometry::from_parts(Extent::new(100, 60), 4, 8, 2).unwrap();
        let chain = MipChain::new(&geometry);
        assert_eq!(chain.mip_count(), 4);
        assert_eq!(chain.extent(0), Extent::new(104, 64));
        assert_eq!(chain.extent(3), Extent::new(13, 8));

        chain.store(3, 12, 7, 0.5);
        chain.store(3, 13, 7, 9.0); // out of range, ignored
        assert_eq!(chain.texel(3, 12, 7), 0.5);
        assert_eq!(chain.read_level(3).len(), 13 * 8);
    }
}
