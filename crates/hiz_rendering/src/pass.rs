//! # Single-Dispatch Downsample Pass
//!
//! ```text
//!   clear counters ──► dispatch(tiles.x, tiles.y) ──► submit
//!                          │
//!                          ├─ every group:   mips 0..=5 of its tile
//!                          ├─ region winner: mips 6..6+r
//!                          └─ root winner:   remaining mips
//! ```
//!
//! Bind group layout (group 0):
//!
//! | binding | resource                               |
//! |---------|----------------------------------------|
//! | 0       | `KernelParams` uniform                 |
//! | 1       | source depth (2D or 2D array)          |
//! | 2       | counters                               |
//! | 3       | tile values                            |
//! | 4       | region values                          |
//! | 5..=12  | storage views of mips 0..=7            |
//!
//! Mip bindings past the pyramid's level count get a 1x1 sink texture; the
//! kernel never writes them.

use hiz_core::{DepthReduction, HizError, HizResult, PyramidGeometry};

use crate::counter::GpuTileCounter;
use crate::device::GpuContext;
use crate::pyramid::{GpuDepthPyramid, GpuDepthSource, PYRAMID_FORMAT};
use crate::scope::capture_allocation;

/// Tile edge covered by one workgroup.
pub const GPU_TILE_SIZE: u32 = 32;

/// Mip levels the kernel can write.
pub const GPU_MAX_MIP_COUNT: u32 = 8;

const SHADER_BODY: &str = include_str!("../shaders/hiz_update.wgsl");
const FLAT_SOURCE: &str = include_str!("../shaders/hiz_source_flat.wgsl");
const LAYERED_SOURCE: &str = include_str!("../shaders/hiz_source_layered.wgsl");

const FIRST_MIP_BINDING: u32 = 5;

/// Full WGSL of the flat or layered kernel variant.
#[must_use]
pub fn shader_source(layered: bool) -> String {
    let prefix = if layered { LAYERED_SOURCE } else { FLAT_SOURCE };
    format!("{prefix}\n{SHADER_BODY}")
}

/// Checks that `geometry` fits the kernel.
///
/// # Errors
///
/// `InvalidConfig` unless the tile size is [`GPU_TILE_SIZE`] and at most
/// [`GPU_MAX_MIP_COUNT`] levels are requested.
pub fn check_geometry(geometry: &PyramidGeometry) -> HizResult<()> {
    if geometry.tile_size() != GPU_TILE_SIZE {
        return Err(HizError::InvalidConfig(format!(
            "GPU downsample needs tile_size {GPU_TILE_SIZE}, got {}",
            geometry.tile_size()
        )));
    }
    if geometry.mip_count() > GPU_MAX_MIP_COUNT {
        return Err(HizError::InvalidConfig(format!(
            "GPU downsample writes at most {GPU_MAX_MIP_COUNT} mips, got {}",
            geometry.mip_count()
        )));
    }
    Ok(())
}

#[derive(Debug)]
struct Variant {
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

impl Variant {
    fn new(ctx: &GpuContext, layered: bool) -> HizResult<Self> {
        let device = &ctx.device;
        let (label, dimension) = if layered {
            ("HiZ downsample (layered)", wgpu::TextureViewDimension::D2Array)
        } else {
            ("HiZ downsample", wgpu::TextureViewDimension::D2)
        };

        capture_allocation(device, "downsample pipeline", || {
            let mut entries = vec![
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: dimension,
                        multisampled: false,
                    },
                    count: None,
                },
            ];
            entries.extend((2..FIRST_MIP_BINDING).map(|binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }));
            entries.extend((0..GPU_MAX_MIP_COUNT).map(|level| wgpu::BindGroupLayoutEntry {
                binding: FIRST_MIP_BINDING + level,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: PYRAMID_FORMAT,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            }));

            let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &entries,
            });
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(shader_source(layered).into()),
            });
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });
            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: "downsample",
            });
            Self { layout, pipeline }
        })
    }
}

/// Compiled downsample kernel plus its per-dispatch state.
#[derive(Debug)]
pub struct DownsamplePass {
    flat: Variant,
    layered: Variant,
    params: wgpu::Buffer,
    sink: wgpu::TextureView,
    _sink_texture: wgpu::Texture,
}

impl DownsamplePass {
    /// Compiles both kernel variants.
    ///
    /// # Errors
    ///
    /// `ResourceAllocation` if shader or pipeline creation fails.
    pub fn new(ctx: &GpuContext) -> HizResult<Self> {
        let flat = Variant::new(ctx, false)?;
        let layered = Variant::new(ctx, true)?;

        let params = capture_allocation(&ctx.device, "kernel params buffer", || {
            ctx.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("HiZ kernel params"),
                size: std::mem::size_of::<hiz_core::KernelParams>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        })?;
        let sink_texture = capture_allocation(&ctx.device, "mip sink texture", || {
            ctx.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("HiZ mip sink"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: PYRAMID_FORMAT,
                usage: wgpu::TextureUsages::STORAGE_BINDING,
                view_formats: &[],
            })
        })?;
        let sink = sink_texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            flat,
            layered,
            params,
            sink,
            _sink_texture: sink_texture,
        })
    }

    /// Builds every level of `target` from `source` and submits.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for geometries the kernel cannot run, `Precondition`
    /// for a layer out of range or a target/counter sized for another
    /// geometry. Nothing is recorded on error.
    #[allow(clippy::too_many_arguments)]
    pub fn dispatch(
        &self,
        ctx: &GpuContext,
        source: &GpuDepthSource,
        layer: Option<u32>,
        target: &GpuDepthPyramid,
        counter: &GpuTileCounter,
        geometry: &PyramidGeometry,
        reduction: DepthReduction,
    ) -> HizResult<()> {
        check_geometry(geometry)?;
        let layer = layer.unwrap_or(0);
        if layer >= source.layers() {
            return Err(HizError::Precondition("source layer out of range"));
        }
        if target.mip_count() != geometry.mip_count() || target.extent(0) != geometry.base() {
            return Err(HizError::Precondition("target pyramid was allocated for another geometry"));
        }
        if counter.len() != geometry.counter_len() {
            return Err(HizError::Precondition("tile counter was allocated for another geometry"));
        }

        let variant = if source.is_layered() { &self.layered } else { &self.flat };
        let params = geometry.kernel_params(Some(layer), reduction);
        ctx.queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&params));

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: self.params.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(source.view()),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: counter.counters().as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: counter.tile_values().as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: counter.region_values().as_entire_binding(),
            },
        ];
        entries.extend((0..GPU_MAX_MIP_COUNT).map(|level| wgpu::BindGroupEntry {
            binding: FIRST_MIP_BINDING + level,
            resource: wgpu::BindingResource::TextureView(
                target.mip_view(level).unwrap_or(&self.sink),
            ),
        }));
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("HiZ downsample"),
            layout: &variant.layout,
            entries: &entries,
        });

        let tiles = geometry.tiles();
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("HiZ downsample"),
            });
        encoder.clear_buffer(counter.counters(), 0, None);
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("HiZ downsample"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&variant.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(tiles.width, tiles.height, 1);
        }
        ctx.queue.submit(std::iter::once(encoder.finish()));

        tracing::debug!(
            groups = geometry.tile_count(),
            regions = geometry.region_count(),
            layered = source.is_layered(),
            layer,
            "GPU downsample submitted"
        );
        Ok(())
    }
}
