//! # Pyramid Build Tests
//!
//! Verifies the single-dispatch build against the naive level-by-level
//! reduction, across extents that exercise padding, partial tiles and
//! partial regions.

use std::sync::Arc;

use hiz_core::{
    reference_chain, CpuBackend, DepthImage, DepthReduction, Extent, HiZBuffer, HizConfig,
    HizError, MipChain, PyramidGeometry,
};

fn noise(extent: Extent, seed: u32) -> DepthImage {
    DepthImage::from_fn(extent, |x, y| {
        let h = (x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663) ^ seed) % 1000;
        h as f32 / 1000.0
    })
}

fn build(source: Arc<DepthImage>, config: HizConfig) -> HiZBuffer<CpuBackend> {
    let mut hiz = HiZBuffer::new(CpuBackend::from_config(&config), config).unwrap();
    hiz.sync(source.extent()).unwrap();
    hiz.set_source(source, None);
    hiz.update().unwrap();
    hiz
}

fn assert_matches_reference(chain: &MipChain, expected: &[Vec<f32>]) {
    assert_eq!(chain.mip_count() as usize, expected.len());
    for (level, texels) in expected.iter().enumerate() {
        assert_eq!(&chain.read_level(level as u32), texels, "mip {level} differs");
    }
}

/// Test: every level matches the reference for odd and non-multiple extents.
#[test]
fn test_levels_match_reference_across_extents() {
    let config = HizConfig {
        mip_count: 5,
        tile_size: 4,
        region_span: 2,
        workers: 4,
        ..HizConfig::default()
    };

    for (width, height) in [(1, 1), (7, 3), (16, 16), (33, 17), (50, 9), (64, 40)] {
        let extent = Extent::new(width, height);
        let source = Arc::new(noise(extent, width * 31 + height));
        let hiz = build(Arc::clone(&source), config.clone());

        let geometry = hiz.geometry().unwrap();
        let expected = reference_chain(&source, None, geometry, DepthReduction::Max);
        assert_matches_reference(hiz.front().unwrap(), &expected);
        assert!(hiz.backend().last_report().unwrap().is_exactly_once(), "{extent}");
    }
}

/// Test: default production layout (32x32 tiles, 8x8 regions) at 1080p.
#[test]
fn test_default_layout_at_1080p() {
    let extent = Extent::new(1920, 1080);
    let source = Arc::new(noise(extent, 7));
    let hiz = build(Arc::clone(&source), HizConfig::default());

    let geometry = hiz.geometry().unwrap();
    assert_eq!(geometry.base(), Extent::new(1920, 1152));
    let expected = reference_chain(&source, None, geometry, DepthReduction::Max);
    assert_matches_reference(hiz.front().unwrap(), &expected);
}

/// Test: padding texels replicate the nearest edge texel.
#[test]
fn test_padding_clamps_to_edge() {
    let extent = Extent::new(5, 3);
    let source = Arc::new(DepthImage::from_fn(extent, |x, y| (y * 10 + x) as f32));
    let config = HizConfig {
        mip_count: 3,
        tile_size: 2,
        region_span: 2,
        ..HizConfig::default()
    };
    let hiz = build(source, config);
    let chain = hiz.front().unwrap();

    assert_eq!(chain.extent(0), Extent::new(8, 4));
    assert_eq!(chain.texel(0, 7, 0), 4.0);
    assert_eq!(chain.texel(0, 7, 3), 24.0);
    assert_eq!(chain.texel(0, 2, 3), 22.0);
    // Top-level texel covers the whole padded image.
    assert_eq!(chain.read_level(2), vec![23.0, 24.0]);
}

/// Test: min reduction keeps the nearest depth.
#[test]
fn test_min_reduction() {
    let extent = Extent::new(24, 24);
    let source = Arc::new(noise(extent, 3));
    let config = HizConfig {
        mip_count: 4,
        tile_size: 4,
        region_span: 2,
        reduction: DepthReduction::Min,
        ..HizConfig::default()
    };
    let hiz = build(Arc::clone(&source), config);

    let expected = reference_chain(&source, None, hiz.geometry().unwrap(), DepthReduction::Min);
    assert_matches_reference(hiz.front().unwrap(), &expected);
}

/// Test: a layer of a layered source is downsampled in isolation.
#[test]
fn test_layered_source_selects_layer() {
    let extent = Extent::new(12, 12);
    let source = Arc::new(DepthImage::from_layers_fn(extent, 3, |x, y, layer| {
        (layer * 1000 + y * 12 + x) as f32
    }));
    let config = HizConfig {
        mip_count: 3,
        tile_size: 2,
        region_span: 2,
        ..HizConfig::default()
    };
    let mut hiz = HiZBuffer::new(CpuBackend::new(3), config).unwrap();
    hiz.sync(extent).unwrap();
    hiz.set_source(Arc::clone(&source), Some(2));
    hiz.update().unwrap();

    assert_eq!(hiz.layer(), Some(2));
    let expected = reference_chain(&source, Some(2), hiz.geometry().unwrap(), DepthReduction::Max);
    assert_matches_reference(hiz.front().unwrap(), &expected);
    assert_eq!(hiz.front().unwrap().texel(0, 0, 0), 2000.0);
}

/// Test: a layer index past the source's layers is rejected before any write.
#[test]
fn test_layer_out_of_range() {
    let extent = Extent::new(8, 8);
    let mut hiz = HiZBuffer::new(CpuBackend::new(1), HizConfig::default()).unwrap();
    hiz.sync(extent).unwrap();
    hiz.set_source(Arc::new(DepthImage::filled(extent, 1.0)), Some(1));

    assert!(matches!(hiz.update(), Err(HizError::Precondition(_))));
    assert!(hiz.is_dirty());
    assert_eq!(hiz.backend().dispatch_count(), 0);
}

/// Test: result does not depend on how many workers race for elections.
#[test]
fn test_result_independent_of_worker_count() {
    let extent = Extent::new(100, 60);
    let source = Arc::new(noise(extent, 11));
    let mut results = Vec::new();

    for workers in [1, 2, 5, 16] {
        let config = HizConfig {
            mip_count: 6,
            tile_size: 4,
            region_span: 4,
            workers,
            ..HizConfig::default()
        };
        let hiz = build(Arc::clone(&source), config);
        let chain = hiz.front().unwrap();
        results.push((0..chain.mip_count()).map(|l| chain.read_level(l)).collect::<Vec<_>>());
    }

    assert!(results.windows(2).all(|w| w[0] == w[1]));
}

/// Test: each region and the root elect exactly one group, every build.
#[test]
fn test_election_exactly_once_over_repeated_builds() {
    let extent = Extent::new(96, 80);
    let config = HizConfig {
        mip_count: 6,
        tile_size: 4,
        region_span: 2,
        workers: 8,
        ..HizConfig::default()
    };
    let mut hiz = HiZBuffer::new(CpuBackend::from_config(&config), config).unwrap();
    hiz.sync(extent).unwrap();
    hiz.set_source(Arc::new(noise(extent, 5)), None);

    let geometry = *hiz.geometry().unwrap();
    for _ in 0..25 {
        hiz.set_dirty();
        hiz.update().unwrap();
        let report = hiz.backend().last_report().unwrap();
        assert_eq!(report.groups, geometry.tile_count());
        assert_eq!(report.region_winners.len(), geometry.region_count() as usize);
        assert!(report.is_exactly_once());
    }
}

/// Test: geometry of the build equals the one the layout reports.
#[test]
fn test_chain_extents_follow_geometry() {
    let geometry = PyramidGeometry::from_parts(Extent::new(100, 30), 4, 8, 2).unwrap();
    let chain = MipChain::new(&geometry);
    for level in 0..4 {
        assert_eq!(chain.extent(level), geometry.mip_extent(level));
    }
    assert_eq!(chain.extent(0), Extent::new(104, 32));
    assert_eq!(chain.extent(3), Extent::new(13, 4));
}
