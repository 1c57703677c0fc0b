use anyhow::{Context, Result};
use isoflow_engine::core::{App, AppControl, FrameCtx};
use isoflow_engine::render::RenderCtx;
use isoflow_engine::texture::{Tex3D, Texture};

use crate::camera::OrbitCamera;
use crate::config::DemoConfig;
use crate::density::DensityGrid;
use crate::marching::grid::{Grid, GridSpace};
use crate::marching::{MarchingCubesRenderer, RendererOptions};

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.02,
    g: 0.02,
    b: 0.03,
    a: 1.0,
};

/// GPU state created by `init`.
struct Scene {
    volume: Texture<Tex3D>,
    renderer: MarchingCubesRenderer,
}

/// The Marching Cubes demo: a sphere density volume turned into a surface
/// every frame, seen from an orbiting camera.
pub struct MarchingCubesApp {
    config: DemoConfig,
    grid: Grid,
    space: GridSpace,
    camera: OrbitCamera,
    scene: Option<Scene>,
}

impl MarchingCubesApp {
    pub fn new(config: DemoConfig) -> Result<Self> {
        let grid = config.validate().context("invalid demo configuration")?;
        let space = config.grid_space(&grid);
        let camera = OrbitCamera::framing(config.bounding_radius(&grid), config.orbit_speed);
        Ok(Self {
            config,
            grid,
            space,
            camera,
            scene: None,
        })
    }

    pub fn config(&self) -> &DemoConfig {
        &self.config
    }

    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }
}

impl App for MarchingCubesApp {
    fn init(&mut self, ctx: &RenderCtx<'_>) -> Result<()> {
        let field = self.config.sphere(&self.grid);
        let volume = DensityGrid::sample(self.grid, &self.space, &field)
            .upload(ctx.device, ctx.queue)
            .context("uploading the density volume")?;

        let renderer = MarchingCubesRenderer::new(
            ctx,
            self.grid,
            self.space,
            RendererOptions {
                show_voxel_edges: self.config.show_voxel_edges,
                ..RendererOptions::default()
            },
        )
        .context("building the marching cubes renderer")?;

        self.camera.set_viewport(ctx.viewport);
        self.scene = Some(Scene { volume, renderer });

        log::info!(
            "demo ready: sphere radius {:.3}, iso threshold {}",
            field.radius,
            self.config.iso_threshold
        );
        Ok(())
    }

    fn logic(&mut self, ctx: &mut FrameCtx<'_, '_>) -> Result<AppControl> {
        self.camera.set_viewport(ctx.viewport());
        self.camera.update(ctx.time.elapsed);

        if let Some(scene) = self.scene.as_mut() {
            if let Some(count) = scene
                .renderer
                .poll_primitive_count(ctx.gpu.device())
                .context("reading back the primitive count")?
            {
                log::trace!("frame {}: {} triangles", ctx.time.frame_index, count.triangles());
            }
        }
        Ok(AppControl::Continue)
    }

    fn draw(&mut self, ctx: &mut FrameCtx<'_, '_>) -> Result<AppControl> {
        let Some(scene) = self.scene.as_mut() else {
            return Ok(AppControl::Continue);
        };
        let camera = &self.camera;
        let iso_threshold = self.config.iso_threshold;

        let control = ctx.render(CLEAR_COLOR, |rctx, target| {
            scene
                .renderer
                .render(rctx, target, camera, &scene.volume, iso_threshold)
                .context("recording the marching cubes passes")
        })?;

        scene.renderer.after_submit();
        Ok(control)
    }

    fn cleanup(&mut self) {
        if let Some(scene) = self.scene.take() {
            if let Some(count) = scene.renderer.generator().last_primitive_count() {
                log::info!("last frame generated {} triangles", count.triangles());
            }
        }
        log::info!("demo resources released");
    }
}
