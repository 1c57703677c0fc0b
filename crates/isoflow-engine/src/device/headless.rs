use anyhow::{Context, Result};

use crate::render::{RenderCtx, RenderTarget, Viewport};
use crate::texture::{DataType, PixelFormat, Tex2D, Texture, TextureSpec};

use super::GpuInit;
use super::init::{create_instance, request_device};

/// Color format of offscreen targets.
const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// GPU context without a window.
///
/// Used by tools and tests that record the same passes as the windowed
/// runtime but render into offscreen textures.
pub struct HeadlessGpu {
    _instance: wgpu::Instance,
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl HeadlessGpu {
    /// Acquires an adapter and device, blocking the calling thread.
    ///
    /// Fails when no adapter is available (e.g. CI without a GPU or software
    /// rasterizer).
    pub fn new() -> Result<Self> {
        Self::with_init(GpuInit::default())
    }

    pub fn with_init(init: GpuInit) -> Result<Self> {
        let instance = create_instance();

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: init.power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .context("failed to find a GPU adapter for headless rendering")?;

        let (device, queue) =
            pollster::block_on(request_device(&adapter, &init, "isoflow headless device"))?;

        Ok(Self {
            _instance: instance,
            device,
            queue,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Renderer context matching targets from [`HeadlessGpu::create_targets`].
    pub fn render_ctx(&self, width: u32, height: u32) -> RenderCtx<'_> {
        RenderCtx::new(
            &self.device,
            &self.queue,
            OFFSCREEN_FORMAT,
            wgpu::TextureFormat::Depth32Float,
            Viewport::new(width as f32, height as f32),
        )
    }

    /// Allocates color and depth textures of the given size.
    pub fn create_targets(&self, width: u32, height: u32) -> Result<OffscreenTargets> {
        let color_spec = TextureSpec {
            internal_format: OFFSCREEN_FORMAT,
            format: PixelFormat::Rgba,
            data_type: DataType::U8,
            ..TextureSpec::r32_float(width, height, 1)
        };

        let mut color = Texture::<Tex2D>::with_usage(
            "isoflow offscreen color",
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        );
        color
            .allocate_storage(&self.device, &self.queue, color_spec, None, 0)
            .context("failed to allocate offscreen color target")?;

        let mut depth = Texture::<Tex2D>::with_usage(
            "isoflow offscreen depth",
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        );
        depth
            .allocate_storage(
                &self.device,
                &self.queue,
                TextureSpec::depth32(width, height),
                None,
                0,
            )
            .context("failed to allocate offscreen depth target")?;

        Ok(OffscreenTargets {
            color_view: color.create_view()?,
            depth_view: depth.create_view()?,
            color,
            depth,
        })
    }

    pub fn create_encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    /// Submits the encoder and blocks until the device is idle.
    pub fn submit_and_wait(&self, encoder: wgpu::CommandEncoder) -> Result<()> {
        self.queue.submit(std::iter::once(encoder.finish()));
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .context("failed waiting for headless submission")?;
        Ok(())
    }
}

/// Color + depth textures standing in for a window surface.
pub struct OffscreenTargets {
    pub color: Texture<Tex2D>,
    pub depth: Texture<Tex2D>,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
}

impl OffscreenTargets {
    /// Borrows the targets for recording into `encoder`.
    pub fn target<'a>(&'a self, encoder: &'a mut wgpu::CommandEncoder) -> RenderTarget<'a> {
        RenderTarget::new(encoder, &self.color_view, &self.depth_view)
    }
}
