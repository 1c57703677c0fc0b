//! Voxel iteration stage: turns the density volume into captured triangles
//! on the device.

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use isoflow_engine::shader::compile_wgsl;
use isoflow_engine::texture::{Tex2D, Tex3D, Texture, TextureError, TextureName, TextureSpec, TextureUnit};
use thiserror::Error;
use wgpu::util::DeviceExt;

use super::capture::{
    self, CaptureBuffers, CaptureError, PrimitiveCount, PrimitiveCountQuery, VERTEX_STRIDE,
};
use super::case_table::{self, TABLE_COLUMNS, TABLE_ROWS};
use super::common::{storage_entry, uniform_buffer, uniform_entry};
use super::grid::{Grid, GridSpace, VERTICES_PER_TRIANGLE};
use super::polygonize::Triangle;

/// Invocations per workgroup along x; matches `@workgroup_size` in the shader.
pub const WORKGROUP_SIZE: u32 = 64;

const GENERATE_WGSL: &str = include_str!("shaders/generate.wgsl");
const FINALIZE_WGSL: &str = include_str!("shaders/finalize.wgsl");

/// Uniform block shared by the generation and finalize passes.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct GenerateParams {
    pub grid_dims: [u32; 4],
    /// xyz = world position of grid point 0, w = cell size.
    pub origin_cell: [f32; 4],
    pub iso_threshold: f32,
    pub capacity: u32,
    pub voxels_per_layer: u32,
    pub layer_count: u32,
}

impl GenerateParams {
    pub fn new(grid: &Grid, space: &GridSpace, iso_threshold: f32) -> Self {
        let [w, h, d] = grid.dims();
        Self {
            grid_dims: [w, h, d, 0],
            origin_cell: space.origin.extend(space.cell_size).to_array(),
            iso_threshold,
            capacity: grid.capture_capacity(),
            voxels_per_layer: grid.voxels_per_layer(),
            layer_count: grid.layer_count(),
        }
    }

    /// Workgroups to dispatch: voxels of a layer along x, layers along y.
    pub fn workgroups(&self) -> [u32; 3] {
        [self.voxels_per_layer.div_ceil(WORKGROUP_SIZE), self.layer_count, 1]
    }
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Texture(#[from] TextureError),

    #[error("volume is {actual:?} points but the stage was built for {expected:?}")]
    VolumeMismatch { expected: [u32; 3], actual: [u32; 3] },

    #[error("volume format {format:?} is not a single-channel float or normalized format")]
    VolumeFormat { format: wgpu::TextureFormat },
}

/// Proof that a generation pass has been recorded into the current encoder.
///
/// Handed to the surface renderer so it can only draw streams that an
/// earlier pass in the same command stream filled.
#[must_use = "the captured surface is drawn through this token"]
pub struct GeneratedSurface<'s> {
    capture: &'s CaptureBuffers,
    count_recorded: bool,
}

impl<'s> GeneratedSurface<'s> {
    pub fn capture(&self) -> &'s CaptureBuffers {
        self.capture
    }

    /// Whether this pass copied the counter for readback. False while an
    /// earlier readback is still in flight.
    pub fn count_recorded(&self) -> bool {
        self.count_recorded
    }
}

struct CachedBindGroup {
    volume: TextureName,
    generation: u64,
    bind_group: wgpu::BindGroup,
}

/// Owns the compute pipelines, the case table and the capture streams for
/// one fixed grid.
pub struct IsoSurfaceGenerator {
    grid: Grid,
    space: GridSpace,

    generate_pipeline: wgpu::ComputePipeline,
    finalize_pipeline: wgpu::ComputePipeline,
    generate_layout: wgpu::BindGroupLayout,
    finalize_bind_group: wgpu::BindGroup,

    case_table: Texture<Tex2D>,
    volume_unit: TextureUnit<Tex3D>,
    table_unit: TextureUnit<Tex2D>,

    params: GenerateParams,
    params_ubo: wgpu::Buffer,
    voxel_coords: wgpu::Buffer,
    voxel_layers: wgpu::Buffer,

    capture: CaptureBuffers,
    count_query: PrimitiveCountQuery,
    last_count: Option<PrimitiveCount>,

    cached: Option<CachedBindGroup>,
}

impl IsoSurfaceGenerator {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, grid: Grid, space: GridSpace) -> Result<Self> {
        let params = GenerateParams::new(&grid, &space, 0.0);

        let limit = device.limits().max_compute_workgroups_per_dimension;
        let [groups_x, groups_y, _] = params.workgroups();
        if groups_x > limit || groups_y > limit {
            anyhow::bail!(
                "grid {:?} needs {groups_x}x{groups_y} workgroups; device allows {limit} per dimension",
                grid.dims()
            );
        }

        let generate_shader = compile_wgsl(device, "isoflow generate shader", GENERATE_WGSL)
            .context("compiling the generation shader")?;
        let finalize_shader = compile_wgsl(device, "isoflow finalize shader", FINALIZE_WGSL)
            .context("compiling the finalize shader")?;

        let case_table = case_table::create_texture(device, queue).context("uploading the case table")?;
        let volume_unit = TextureUnit::<Tex3D>::new(0);
        let table_unit = TextureUnit::<Tex2D>::new(1);

        let capture = CaptureBuffers::new(device, &grid).context("allocating capture streams")?;
        let count_query = PrimitiveCountQuery::new(device);

        let params_ubo = uniform_buffer(device, "isoflow generate params", &params);

        let voxel_coords = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("isoflow voxel base coords"),
            contents: bytemuck::cast_slice(&grid.voxel_base_coords()),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let voxel_layers = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("isoflow voxel layers"),
            contents: bytemuck::cast_slice(&grid.voxel_layers()),
            usage: wgpu::BufferUsages::STORAGE,
        });

        let generate_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("isoflow generate bgl"),
            entries: &[
                volume_unit.layout_entry(
                    wgpu::ShaderStages::COMPUTE,
                    &TextureSpec::r32_float(grid.width(), grid.height(), grid.depth()),
                ),
                table_unit.layout_entry(
                    wgpu::ShaderStages::COMPUTE,
                    &TextureSpec::r32_sint(TABLE_COLUMNS, TABLE_ROWS),
                ),
                uniform_entry::<GenerateParams>(2, wgpu::ShaderStages::COMPUTE),
                storage_entry(3, true),
                storage_entry(4, true),
                storage_entry(5, false),
                storage_entry(6, false),
                storage_entry(7, false),
            ],
        });

        let finalize_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("isoflow finalize bgl"),
            entries: &[
                uniform_entry::<GenerateParams>(0, wgpu::ShaderStages::COMPUTE),
                storage_entry(1, false),
                storage_entry(2, false),
            ],
        });

        let finalize_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("isoflow finalize bind group"),
            layout: &finalize_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_ubo.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: capture.counter.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: capture.indirect.as_entire_binding(),
                },
            ],
        });

        let generate_pipeline = compute_pipeline(device, "isoflow generate", &generate_layout, &generate_shader);
        let finalize_pipeline = compute_pipeline(device, "isoflow finalize", &finalize_layout, &finalize_shader);

        log::info!(
            "marching cubes stage ready: grid {}x{}x{}, {} voxels, capacity {} triangles",
            grid.width(),
            grid.height(),
            grid.depth(),
            grid.voxel_count(),
            capture.capacity_triangles(),
        );

        Ok(Self {
            grid,
            space,
            generate_pipeline,
            finalize_pipeline,
            generate_layout,
            finalize_bind_group,
            case_table,
            volume_unit,
            table_unit,
            params,
            params_ubo,
            voxel_coords,
            voxel_layers,
            capture,
            count_query,
            last_count: None,
            cached: None,
        })
    }

    #[inline]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    #[inline]
    pub fn space(&self) -> &GridSpace {
        &self.space
    }

    #[inline]
    pub fn capture(&self) -> &CaptureBuffers {
        &self.capture
    }

    pub fn case_table(&self) -> &Texture<Tex2D> {
        &self.case_table
    }

    /// Most recent primitive count read back from the device.
    pub fn last_primitive_count(&self) -> Option<PrimitiveCount> {
        self.last_count
    }

    /// Records counter clear, generation, finalize and the counter copy.
    ///
    /// The threshold is written through the queue, so every pass submitted
    /// together sees the value of the last call.
    pub fn generate(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        volume: &Texture<Tex3D>,
        iso_threshold: f32,
    ) -> Result<GeneratedSurface<'_>, GenerateError> {
        volume.raw()?;
        let actual = [volume.width(), volume.height(), volume.depth()];
        if actual != self.grid.dims() {
            return Err(GenerateError::VolumeMismatch {
                expected: self.grid.dims(),
                actual,
            });
        }
        check_volume_format(volume.internal_format())?;

        self.params.iso_threshold = iso_threshold;
        queue.write_buffer(&self.params_ubo, 0, bytemuck::bytes_of(&self.params));

        let bind_group = self.ensure_bind_group(device, volume)?;

        encoder.clear_buffer(&self.capture.counter, 0, None);

        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("isoflow generate pass"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&self.generate_pipeline);
            cpass.set_bind_group(0, &bind_group, &[]);
            let [x, y, z] = self.params.workgroups();
            cpass.dispatch_workgroups(x, y, z);
        }

        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("isoflow finalize pass"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&self.finalize_pipeline);
            cpass.set_bind_group(0, &self.finalize_bind_group, &[]);
            cpass.dispatch_workgroups(1, 1, 1);
        }

        let count_recorded = self.count_query.record(encoder, &self.capture.counter);
        if !count_recorded {
            log::trace!("primitive count readback still in flight; copy skipped");
        }

        Ok(GeneratedSurface {
            capture: &self.capture,
            count_recorded,
        })
    }

    /// Bind group for `volume`, rebuilt when the volume or its storage changes.
    fn ensure_bind_group(
        &mut self,
        device: &wgpu::Device,
        volume: &Texture<Tex3D>,
    ) -> Result<wgpu::BindGroup, TextureError> {
        if let Some(cached) = &self.cached {
            if cached.volume == volume.name() && cached.generation == volume.generation() {
                return Ok(cached.bind_group.clone());
            }
        }

        let volume_bound = self.volume_unit.bind(volume)?;
        let table_bound = self.table_unit.bind(&self.case_table)?;

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("isoflow generate bind group"),
            layout: &self.generate_layout,
            entries: &[
                volume_bound.entry(),
                table_bound.entry(),
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.params_ubo.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.voxel_coords.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: self.voxel_layers.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: self.capture.positions.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: self.capture.normals.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: self.capture.counter.as_entire_binding(),
                },
            ],
        });

        log::debug!(
            "generate bind group rebuilt for volume {} (generation {})",
            volume.name(),
            volume.generation()
        );

        self.cached = Some(CachedBindGroup {
            volume: volume.name(),
            generation: volume.generation(),
            bind_group: bind_group.clone(),
        });
        Ok(bind_group)
    }

    /// Starts mapping the counter copy. Call once the encoder is submitted.
    pub fn after_submit(&mut self) {
        self.count_query.request();
    }

    /// Non-blocking: picks up a finished readback, if any.
    pub fn poll_primitive_count(&mut self, device: &wgpu::Device) -> Result<Option<PrimitiveCount>, CaptureError> {
        if !self.count_query.in_flight() {
            return Ok(None);
        }
        device.poll(wgpu::PollType::Poll)?;
        match self.count_query.try_read() {
            None => Ok(None),
            Some(result) => result.map(|count| Some(self.accept_count(count))),
        }
    }

    /// Blocks until the count recorded by the last submitted pass is read.
    pub fn read_primitive_count(&mut self, device: &wgpu::Device) -> Result<PrimitiveCount, CaptureError> {
        let count = self.count_query.read_blocking(device)?;
        Ok(self.accept_count(count))
    }

    fn accept_count(&mut self, count: PrimitiveCount) -> PrimitiveCount {
        match count.validate(self.capture.capacity_triangles()) {
            Ok(triangles) => log::trace!("generation pass emitted {triangles} triangles"),
            Err(overflow) => log::error!("{overflow}"),
        }
        self.last_count = Some(count);
        count
    }

    /// Copies the capture streams back to the host.
    ///
    /// Waits for all submitted work; intended for tests and diagnostics.
    pub fn inspect_capture(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<CapturedStream, CaptureError> {
        let staging = |label: &str, size: u64| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let size = self.capture.stream_size();
        let positions = staging("isoflow inspect positions", size);
        let normals = staging("isoflow inspect normals", size);
        let counter = staging("isoflow inspect counter", 4);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("isoflow inspect encoder"),
        });
        encoder.copy_buffer_to_buffer(&self.capture.positions, 0, &positions, 0, size);
        encoder.copy_buffer_to_buffer(&self.capture.normals, 0, &normals, 0, size);
        encoder.copy_buffer_to_buffer(&self.capture.counter, 0, &counter, 0, 4);
        queue.submit(std::iter::once(encoder.finish()));

        let reserved_vertices =
            bytemuck::pod_read_unaligned::<u32>(&capture::read_buffer_blocking(device, &counter)?[..4]);
        let written = reserved_vertices.min(self.capture.capacity()) as usize;

        let decode = |bytes: Vec<u8>| -> Vec<Vec3> {
            bytes
                .chunks_exact(VERTEX_STRIDE as usize)
                .take(written)
                .map(|c| Vec3::from_slice(&bytemuck::pod_read_unaligned::<[f32; 4]>(c)[..3]))
                .collect()
        };

        let stream = CapturedStream {
            positions: decode(capture::read_buffer_blocking(device, &positions)?),
            normals: decode(capture::read_buffer_blocking(device, &normals)?),
            reserved_vertices,
        };
        log::debug!(
            "inspected capture: {} vertices written, {} reserved",
            stream.positions.len(),
            reserved_vertices
        );
        Ok(stream)
    }
}

/// The generation shader reads the volume as `texture_3d<f32>` and uses
/// only the red channel.
fn check_volume_format(format: wgpu::TextureFormat) -> Result<(), GenerateError> {
    let float = matches!(
        format.sample_type(None, None),
        Some(wgpu::TextureSampleType::Float { .. })
    );
    if float && format.components() == 1 {
        Ok(())
    } else {
        Err(GenerateError::VolumeFormat { format })
    }
}

fn compute_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    module: &wgpu::ShaderModule,
) -> wgpu::ComputePipeline {
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        immediate_size: 0,
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module,
        entry_point: Some("main"),
        compilation_options: Default::default(),
        cache: None,
    })
}

/// Host copy of the capture streams.
#[derive(Debug, Clone, Default)]
pub struct CapturedStream {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    /// Counter value, including slots of dropped triangles.
    pub reserved_vertices: u32,
}

impl CapturedStream {
    pub fn primitive_count(&self) -> PrimitiveCount {
        PrimitiveCount::from_reserved_vertices(self.reserved_vertices)
    }

    /// Written vertices grouped into triangles.
    pub fn triangles(&self) -> Vec<Triangle> {
        let n = VERTICES_PER_TRIANGLE as usize;
        self.positions
            .chunks_exact(n)
            .zip(self.normals.chunks_exact(n))
            .map(|(p, nrm)| Triangle {
                positions: [p[0], p[1], p[2]],
                normals: [nrm[0], nrm[1], nrm[2]],
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── GenerateParams ────────────────────────────────────────────────────

    #[test]
    fn params_match_uniform_layout() {
        assert_eq!(std::mem::size_of::<GenerateParams>(), 48);
    }

    #[test]
    fn params_describe_grid() {
        let grid = Grid::new(4, 3, 5).unwrap();
        let space = GridSpace::centered(&grid, 0.5);
        let p = GenerateParams::new(&grid, &space, 0.25);
        assert_eq!(p.grid_dims, [4, 3, 5, 0]);
        assert_eq!(p.origin_cell, [-0.75, -0.5, -1.0, 0.5]);
        assert_eq!(p.capacity, 24 * 15);
        assert_eq!(p.voxels_per_layer, 6);
        assert_eq!(p.layer_count, 4);
    }

    #[test]
    fn workgroups_cover_every_voxel() {
        let grid = Grid::new(10, 10, 3).unwrap();
        let p = GenerateParams::new(&grid, &GridSpace::centered(&grid, 1.0), 0.0);
        // 81 voxels per layer need two groups of 64.
        assert_eq!(p.workgroups(), [2, 2, 1]);

        let small = Grid::new(2, 2, 2).unwrap();
        let p = GenerateParams::new(&small, &GridSpace::centered(&small, 1.0), 0.0);
        assert_eq!(p.workgroups(), [1, 1, 1]);
    }

    // ── volume format ─────────────────────────────────────────────────────

    #[test]
    fn single_channel_float_volumes_are_accepted() {
        for format in [
            wgpu::TextureFormat::R32Float,
            wgpu::TextureFormat::R16Float,
            wgpu::TextureFormat::R8Unorm,
            wgpu::TextureFormat::R16Snorm,
        ] {
            assert!(check_volume_format(format).is_ok(), "{format:?}");
        }
    }

    #[test]
    fn integer_depth_and_multichannel_volumes_are_rejected() {
        for format in [
            wgpu::TextureFormat::R32Uint,
            wgpu::TextureFormat::R32Sint,
            wgpu::TextureFormat::Depth32Float,
            wgpu::TextureFormat::Rg32Float,
            wgpu::TextureFormat::Rgba8Unorm,
        ] {
            assert!(
                matches!(check_volume_format(format), Err(GenerateError::VolumeFormat { format: f }) if f == format),
                "{format:?}"
            );
        }
    }

    // ── CapturedStream ────────────────────────────────────────────────────

    #[test]
    fn stream_groups_vertices_into_triangles() {
        let stream = CapturedStream {
            positions: vec![Vec3::X, Vec3::Y, Vec3::Z, Vec3::ONE],
            normals: vec![Vec3::Z; 4],
            reserved_vertices: 6,
        };
        let tris = stream.triangles();
        assert_eq!(tris.len(), 1);
        assert_eq!(tris[0].positions, [Vec3::X, Vec3::Y, Vec3::Z]);
        assert_eq!(stream.primitive_count(), PrimitiveCount(2));
    }
}
