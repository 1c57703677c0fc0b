use anyhow::Result;
use bytemuck::Zeroable;
use isoflow_engine::render::{RenderCtx, RenderTarget};
use isoflow_engine::texture::{Tex3D, Texture};

use crate::camera::{CameraUniform, OrbitCamera};

use super::capture::{CaptureError, PrimitiveCount};
use super::common::uniform_buffer;
use super::edges::EdgeRenderer;
use super::generator::{GenerateError, IsoSurfaceGenerator};
use super::grid::{Grid, GridSpace};
use super::surface::{SurfaceMaterial, SurfaceRenderer};

/// Options fixed when the renderer is built.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererOptions {
    pub material: SurfaceMaterial,
    pub edge_color: [f32; 4],
    pub show_voxel_edges: bool,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            material: SurfaceMaterial::default(),
            edge_color: [0.7, 0.75, 0.8, 1.0],
            show_voxel_edges: true,
        }
    }
}

/// Generation stage plus the two draw passes, sharing one camera block.
pub struct MarchingCubesRenderer {
    generator: IsoSurfaceGenerator,
    surface: SurfaceRenderer,
    edges: EdgeRenderer,
    camera_ubo: wgpu::Buffer,
    show_voxel_edges: bool,
}

impl MarchingCubesRenderer {
    pub fn new(ctx: &RenderCtx<'_>, grid: Grid, space: GridSpace, options: RendererOptions) -> Result<Self> {
        let generator = IsoSurfaceGenerator::new(ctx.device, ctx.queue, grid, space)?;
        let camera_ubo = uniform_buffer(ctx.device, "isoflow camera", &CameraUniform::zeroed());
        let surface = SurfaceRenderer::new(ctx, &camera_ubo, options.material)?;
        let edges = EdgeRenderer::new(ctx, &camera_ubo, &grid, &space, options.edge_color)?;

        Ok(Self {
            generator,
            surface,
            edges,
            camera_ubo,
            show_voxel_edges: options.show_voxel_edges,
        })
    }

    pub fn generator(&self) -> &IsoSurfaceGenerator {
        &self.generator
    }

    pub fn generator_mut(&mut self) -> &mut IsoSurfaceGenerator {
        &mut self.generator
    }

    /// Records generation, surface and edge passes into `target`.
    pub fn render(
        &mut self,
        ctx: &RenderCtx<'_>,
        target: &mut RenderTarget<'_>,
        camera: &OrbitCamera,
        volume: &Texture<Tex3D>,
        iso_threshold: f32,
    ) -> Result<(), GenerateError> {
        ctx.queue
            .write_buffer(&self.camera_ubo, 0, bytemuck::bytes_of(&camera.uniform()));

        let surface = self
            .generator
            .generate(ctx.device, ctx.queue, target.encoder, volume, iso_threshold)?;
        self.surface.draw(target, &surface);

        if self.show_voxel_edges {
            self.edges.draw(target);
        }
        Ok(())
    }

    /// See [`IsoSurfaceGenerator::after_submit`].
    pub fn after_submit(&mut self) {
        self.generator.after_submit();
    }

    /// See [`IsoSurfaceGenerator::poll_primitive_count`].
    pub fn poll_primitive_count(&mut self, device: &wgpu::Device) -> Result<Option<PrimitiveCount>, CaptureError> {
        self.generator.poll_primitive_count(device)
    }
}
