use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use isoflow_engine::render::{RenderCtx, RenderTarget};
use isoflow_engine::shader::compile_wgsl;

use crate::camera::CameraUniform;

use super::capture::VERTEX_STRIDE;
use super::common::{depth_state, opaque_target, uniform_buffer, uniform_entry};
use super::generator::GeneratedSurface;

const SURFACE_WGSL: &str = include_str!("shaders/surface.wgsl");

const POSITION_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x4];
const NORMAL_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x4];

/// Blinn-Phong terms for the surface pass.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SurfaceMaterial {
    /// xyz = direction the light travels.
    pub light_dir: [f32; 4],
    pub base_color: [f32; 4],
    pub specular_color: [f32; 4],
    /// ambient, diffuse, specular, shininess.
    pub terms: [f32; 4],
}

impl Default for SurfaceMaterial {
    fn default() -> Self {
        Self {
            light_dir: [-0.4, -1.0, -0.6, 0.0],
            base_color: [0.85, 0.45, 0.2, 1.0],
            specular_color: [1.0, 1.0, 1.0, 1.0],
            terms: [0.15, 0.8, 0.5, 32.0],
        }
    }
}

/// Draws the captured streams as lit triangles.
///
/// Both faces are shaded; the vertex count comes from the indirect
/// arguments the finalize pass wrote.
pub struct SurfaceRenderer {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    _material_ubo: wgpu::Buffer,
}

impl SurfaceRenderer {
    pub fn new(ctx: &RenderCtx<'_>, camera_ubo: &wgpu::Buffer, material: SurfaceMaterial) -> Result<Self> {
        let shader = compile_wgsl(ctx.device, "isoflow surface shader", SURFACE_WGSL)
            .context("compiling the surface shader")?;

        let bind_group_layout = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("isoflow surface bgl"),
                entries: &[
                    uniform_entry::<CameraUniform>(
                        0,
                        wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ),
                    uniform_entry::<SurfaceMaterial>(1, wgpu::ShaderStages::FRAGMENT),
                ],
            });

        let material_ubo = uniform_buffer(ctx.device, "isoflow surface material", &material);

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("isoflow surface bind group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_ubo.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: material_ubo.as_entire_binding(),
                },
            ],
        });

        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("isoflow surface pipeline layout"),
                bind_group_layouts: &[&bind_group_layout],
                immediate_size: 0,
            });

        let stream = |attributes: &'static [wgpu::VertexAttribute]| wgpu::VertexBufferLayout {
            array_stride: VERTEX_STRIDE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes,
        };

        let pipeline = ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("isoflow surface pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[stream(&POSITION_ATTRS), stream(&NORMAL_ATTRS)],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(opaque_target(ctx.surface_format))],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(depth_state(ctx.depth_format, wgpu::CompareFunction::Less, true)),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        Ok(Self {
            pipeline,
            bind_group,
            _material_ubo: material_ubo,
        })
    }

    pub fn draw(&self, target: &mut RenderTarget<'_>, surface: &GeneratedSurface<'_>) {
        let capture = surface.capture();
        let color = target.load_color();
        let depth = target.load_depth();

        let mut rpass = target.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("isoflow surface pass"),
            color_attachments: &[Some(color)],
            depth_stencil_attachment: Some(depth),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, &self.bind_group, &[]);
        rpass.set_vertex_buffer(0, capture.positions().slice(..));
        rpass.set_vertex_buffer(1, capture.normals().slice(..));
        rpass.draw_indirect(capture.indirect(), 0);
    }
}
