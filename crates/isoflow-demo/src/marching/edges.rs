use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use isoflow_engine::render::{RenderCtx, RenderTarget};
use isoflow_engine::shader::compile_wgsl;
use wgpu::util::DeviceExt;

use crate::camera::CameraUniform;

use super::common::{depth_state, opaque_target, uniform_buffer, uniform_entry};
use super::grid::{Grid, GridSpace};

const EDGES_WGSL: &str = include_str!("shaders/edges.wgsl");

const LINE_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
struct LineStyle {
    color: [f32; 4],
}

/// World-space endpoints of every grid edge, two vertices per line.
pub fn edge_vertices(grid: &Grid, space: &GridSpace) -> Vec<[f32; 3]> {
    grid.edge_lines()
        .into_iter()
        .flat_map(|[a, b]| [space.point(a).to_array(), space.point(b).to_array()])
        .collect()
}

/// Static line list of the voxel lattice, drawn over the surface.
pub struct EdgeRenderer {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    _style_ubo: wgpu::Buffer,
    vertices: wgpu::Buffer,
    vertex_count: u32,
}

impl EdgeRenderer {
    pub fn new(
        ctx: &RenderCtx<'_>,
        camera_ubo: &wgpu::Buffer,
        grid: &Grid,
        space: &GridSpace,
        color: [f32; 4],
    ) -> Result<Self> {
        let shader = compile_wgsl(ctx.device, "isoflow edges shader", EDGES_WGSL)
            .context("compiling the voxel edge shader")?;

        let points = edge_vertices(grid, space);
        let vertex_count = u32::try_from(points.len()).context("grid has too many edges to draw")?;
        let vertices = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("isoflow edge vbo"),
            contents: bytemuck::cast_slice(&points),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let bind_group_layout = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("isoflow edges bgl"),
                entries: &[
                    uniform_entry::<CameraUniform>(0, wgpu::ShaderStages::VERTEX),
                    uniform_entry::<LineStyle>(1, wgpu::ShaderStages::FRAGMENT),
                ],
            });

        let style_ubo = uniform_buffer(ctx.device, "isoflow edge style", &LineStyle { color });

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("isoflow edges bind group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_ubo.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: style_ubo.as_entire_binding(),
                },
            ],
        });

        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("isoflow edges pipeline layout"),
                bind_group_layouts: &[&bind_group_layout],
                immediate_size: 0,
            });

        let pipeline = ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("isoflow edges pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 3]>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &LINE_ATTRS,
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(opaque_target(ctx.surface_format))],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::LineList,
                ..Default::default()
            },
            // Tested against the surface, never written.
            depth_stencil: Some(depth_state(
                ctx.depth_format,
                wgpu::CompareFunction::LessEqual,
                false,
            )),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        log::debug!("voxel edge renderer: {} lines", vertex_count / 2);

        Ok(Self {
            pipeline,
            bind_group,
            _style_ubo: style_ubo,
            vertices,
            vertex_count,
        })
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn draw(&self, target: &mut RenderTarget<'_>) {
        let color = target.load_color();
        let depth = target.load_depth();

        let mut rpass = target.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("isoflow edges pass"),
            color_attachments: &[Some(color)],
            depth_stencil_attachment: Some(depth),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, &self.bind_group, &[]);
        rpass.set_vertex_buffer(0, self.vertices.slice(..));
        rpass.draw(0..self.vertex_count, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_vertices_per_edge() {
        let grid = Grid::new(3, 3, 3).unwrap();
        let space = GridSpace::centered(&grid, 1.0);
        let verts = edge_vertices(&grid, &space);
        assert_eq!(verts.len(), grid.edge_count() * 2);
        assert_eq!(verts[0], [-1.0, -1.0, -1.0]);
        assert_eq!(verts[1], [0.0, -1.0, -1.0]);
    }

    #[test]
    fn lines_span_one_cell() {
        let grid = Grid::new(4, 2, 3).unwrap();
        let space = GridSpace::centered(&grid, 0.25);
        for pair in edge_vertices(&grid, &space).chunks_exact(2) {
            let a = glam::Vec3::from_array(pair[0]);
            let b = glam::Vec3::from_array(pair[1]);
            assert!(((a - b).length() - 0.25).abs() < 1e-6);
        }
    }
}
