//! GPU depth pyramid texture and its source binding.

use hiz_core::{Extent, HizError, HizResult, PyramidGeometry, SlotIndex};

use crate::device::GpuContext;
use crate::scope::capture_allocation;

/// Format of every pyramid level.
pub const PYRAMID_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

/// One padded mip-chain texture.
///
/// `view` is what consumers sample (all levels); `mip_views` are the
/// single-level storage views the downsample kernel writes.
#[derive(Debug)]
pub struct GpuDepthPyramid {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    mip_views: Vec<wgpu::TextureView>,
    base: Extent,
    slot: SlotIndex,
}

impl GpuDepthPyramid {
    /// Allocates the texture for `geometry`.
    ///
    /// # Errors
    ///
    /// `ResourceAllocation` if the device rejects the texture.
    pub fn new(ctx: &GpuContext, geometry: &PyramidGeometry, slot: SlotIndex) -> HizResult<Self> {
        let base = geometry.base();
        let limit = ctx.device.limits().max_texture_dimension_2d;
        if base.width > limit || base.height > limit {
            return Err(HizError::ResourceAllocation {
                resource: "depth pyramid texture",
                reason: format!("padded extent {base} exceeds device limit {limit}"),
            });
        }

        let label = match slot {
            SlotIndex::A => "HiZ pyramid A",
            SlotIndex::B => "HiZ pyramid B",
        };
        let texture = capture_allocation(&ctx.device, "depth pyramid texture", || {
            ctx.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: base.width,
                    height: base.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: geometry.mip_count(),
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: PYRAMID_FORMAT,
                usage: wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        })?;

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mip_views = (0..geometry.mip_count())
            .map(|level| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("HiZ mip"),
                    base_mip_level: level,
                    mip_level_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();

        Ok(Self {
            texture,
            view,
            mip_views,
            base,
            slot,
        })
    }

    /// View over every level, for consumers.
    #[must_use]
    pub const fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Single-level view of `level`.
    #[must_use]
    pub fn mip_view(&self, level: u32) -> Option<&wgpu::TextureView> {
        self.mip_views.get(level as usize)
    }

    /// Number of levels.
    #[must_use]
    pub fn mip_count(&self) -> u32 {
        self.mip_views.len() as u32
    }

    /// Extent of `level`.
    #[must_use]
    pub fn extent(&self, level: u32) -> Extent {
        hiz_core::geometry::mip_extent(self.base, level)
    }

    /// Swap chain slot this texture was allocated for.
    #[must_use]
    pub const fn slot(&self) -> SlotIndex {
        self.slot
    }

    /// Underlying texture.
    #[must_use]
    pub const fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// Copies `level` back to the host, row-major without row padding.
    ///
    /// Stalls until the GPU is idle. Tests and debugging only.
    ///
    /// # Errors
    ///
    /// `Precondition` for a level past the chain, `ResourceAllocation` if
    /// the staging buffer cannot be mapped.
    pub fn readback_level(&self, ctx: &GpuContext, level: u32) -> HizResult<Vec<f32>> {
        if level >= self.mip_count() {
            return Err(HizError::Precondition("readback level past the pyramid"));
        }
        let extent = self.extent(level);
        let row_bytes = extent.width * 4;
        let padded_row = row_bytes.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("HiZ readback"),
            size: u64::from(padded_row) * u64::from(extent.height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("HiZ readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: level,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(extent.height),
                },
            },
            wgpu::Extent3d {
                width: extent.width,
                height: extent.height,
                depth_or_array_layers: 1,
            },
        );
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        ctx.device.poll(wgpu::Maintain::Wait);
        let mapped = receiver
            .recv()
            .map_err(|err| err.to_string())
            .and_then(|result| result.map_err(|err| err.to_string()));
        if let Err(reason) = mapped {
            return Err(HizError::ResourceAllocation {
                resource: "readback buffer",
                reason,
            });
        }

        let bytes = slice.get_mapped_range();
        let mut texels = Vec::with_capacity(extent.area());
        for row in bytes.chunks(padded_row as usize).take(extent.height as usize) {
            texels.extend(
                row[..row_bytes as usize]
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            );
        }
        drop(bytes);
        staging.unmap();
        Ok(texels)
    }
}

/// Depth image the pyramid is built from.
///
/// Wraps a `Depth32Float` or `R32Float` texture; layered textures are bound
/// as arrays and one layer is selected per build.
#[derive(Debug)]
pub struct GpuDepthSource {
    view: wgpu::TextureView,
    extent: Extent,
    layers: u32,
    /// Keeps a texture created by [`GpuDepthSource::upload`] alive.
    _texture: Option<wgpu::Texture>,
}

impl GpuDepthSource {
    /// Creates a source over every layer of `texture`.
    ///
    /// # Errors
    ///
    /// `Precondition` if the texture is not a single-sampled 2D depth or
    /// `R32Float` texture with `TEXTURE_BINDING` usage.
    pub fn new(texture: &wgpu::Texture) -> HizResult<Self> {
        let aspect = match texture.format() {
            wgpu::TextureFormat::Depth32Float => wgpu::TextureAspect::DepthOnly,
            wgpu::TextureFormat::R32Float => wgpu::TextureAspect::All,
            _ => {
                return Err(HizError::Precondition(
                    "depth source must be Depth32Float or R32Float",
                ));
            }
        };
        if texture.dimension() != wgpu::TextureDimension::D2 || texture.sample_count() != 1 {
            return Err(HizError::Precondition("depth source must be a single-sampled 2D texture"));
        }
        if !texture.usage().contains(wgpu::TextureUsages::TEXTURE_BINDING) {
            return Err(HizError::Precondition("depth source needs TEXTURE_BINDING usage"));
        }

        let layers = texture.depth_or_array_layers();
        let dimension = if layers > 1 {
            wgpu::TextureViewDimension::D2Array
        } else {
            wgpu::TextureViewDimension::D2
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("HiZ source"),
            dimension: Some(dimension),
            aspect,
            base_mip_level: 0,
            mip_level_count: Some(1),
            ..Default::default()
        });

        Ok(Self {
            view,
            extent: Extent::new(texture.width(), texture.height()),
            layers,
            _texture: None,
        })
    }

    /// Uploads host depth into a fresh `R32Float` source texture.
    ///
    /// # Errors
    ///
    /// `ResourceAllocation` if the device rejects the texture.
    pub fn upload(ctx: &GpuContext, image: &hiz_core::DepthImage) -> HizResult<Self> {
        let extent = image.extent();
        let texture = capture_allocation(&ctx.device, "depth source texture", || {
            ctx.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("HiZ uploaded source"),
                size: wgpu::Extent3d {
                    width: extent.width,
                    height: extent.height,
                    depth_or_array_layers: image.layers(),
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::R32Float,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        })?;

        for layer in 0..image.layers() {
            ctx.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                    aspect: wgpu::TextureAspect::All,
                },
                bytemuck::cast_slice(image.layer(layer)),
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(extent.width * 4),
                    rows_per_image: Some(extent.height),
                },
                wgpu::Extent3d {
                    width: extent.width,
                    height: extent.height,
                    depth_or_array_layers: 1,
                },
            );
        }
        let mut source = Self::new(&texture)?;
        source._texture = Some(texture);
        Ok(source)
    }

    /// Source extent.
    #[must_use]
    pub const fn extent(&self) -> Extent {
        self.extent
    }

    /// Array layers.
    #[must_use]
    pub const fn layers(&self) -> u32 {
        self.layers
    }

    /// Returns true if the source binds as an array.
    #[must_use]
    pub const fn is_layered(&self) -> bool {
        self.layers > 1
    }

    /// View bound by the kernel.
    #[must_use]
    pub const fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}
