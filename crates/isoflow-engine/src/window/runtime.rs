use anyhow::{Context, Result};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use crate::core::{App as CoreApp, AppControl, FrameCtx, WindowCtx};
use crate::device::{Gpu, GpuInit};
use crate::render::{RenderCtx, Viewport};
use crate::time::FrameClock;

/// Window/runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    pub resizable: bool,
    /// Exit when Escape is pressed.
    pub exit_on_escape: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "isoflow".to_string(),
            initial_size: LogicalSize::new(1024.0, 768.0),
            resizable: true,
            exit_on_escape: true,
        }
    }
}

/// Entry point for the runtime.
pub struct Runtime;

impl Runtime {
    /// Opens the window, drives `app` through its lifecycle and returns once
    /// the window closes.
    ///
    /// The first error raised by the app or the device layer ends the loop
    /// and is returned here, after `cleanup` has run.
    pub fn run<A>(config: RuntimeConfig, gpu_init: GpuInit, app: A) -> Result<()>
    where
        A: 'static + CoreApp,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState::new(config, gpu_init, app);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        state.shutdown();
        match state.fatal.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[self_referencing]
struct WindowEntry {
    clock: FrameClock,

    window: Window,

    #[borrows(window)]
    #[covariant]
    gpu: Gpu<'this>,
}

/// Where the app is in its lifecycle.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Phase {
    /// No window yet; `init` has not run.
    Pending,
    /// `init` succeeded; frames are being driven.
    Running,
    /// `cleanup` has run (or `init` never succeeded).
    Finished,
}

struct AppState<A>
where
    A: CoreApp + 'static,
{
    config: RuntimeConfig,
    gpu_init: GpuInit,
    app: A,

    window: Option<WindowEntry>,
    phase: Phase,
    fatal: Option<anyhow::Error>,
}

impl<A> AppState<A>
where
    A: CoreApp + 'static,
{
    fn new(config: RuntimeConfig, gpu_init: GpuInit, app: A) -> Self {
        Self {
            config,
            gpu_init,
            app,
            window: None,
            phase: Phase::Pending,
            fatal: None,
        }
    }

    /// Records the first fatal error and stops the loop.
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        if self.fatal.is_none() {
            self.fatal = Some(err);
        }
        event_loop.exit();
    }

    fn create_window_entry(&mut self, event_loop: &ActiveEventLoop) -> Result<WindowEntry> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size)
            .with_resizable(self.config.resizable);

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let gpu_init = self.gpu_init.clone();

        WindowEntryTryBuilder {
            clock: FrameClock::default(),
            window,
            gpu_builder: |w| {
                pollster::block_on(Gpu::new(w, gpu_init)).context("GPU initialization failed")
            },
        }
        .try_build()
    }

    fn init_app(&mut self, entry: &WindowEntry) -> Result<()> {
        let app = &mut self.app;
        entry.with_gpu(|gpu| {
            let size = gpu.size();
            let rctx = RenderCtx::new(
                gpu.device(),
                gpu.queue(),
                gpu.surface_format(),
                gpu.depth_format(),
                Viewport::new(size.width as f32, size.height as f32),
            );
            app.init(&rctx)
        })
    }

    /// Runs `logic` then `draw` for one frame.
    fn drive_frame(&mut self, window_id: WindowId) -> Result<AppControl> {
        let (app, entry) = (&mut self.app, &mut self.window);
        let Some(entry) = entry.as_mut() else {
            return Ok(AppControl::Continue);
        };

        entry.with_mut(|fields| {
            let time = fields.clock.tick();
            log::trace!("frame {} (dt {:.4}s)", time.frame_index, time.dt);

            let mut ctx = FrameCtx {
                window: WindowCtx {
                    id: window_id,
                    window: fields.window,
                },
                gpu: fields.gpu,
                time,
            };

            if app.logic(&mut ctx).context("frame logic failed")? == AppControl::Exit {
                return Ok(AppControl::Exit);
            }
            app.draw(&mut ctx).context("frame draw failed")
        })
    }

    fn resize(&mut self) -> Result<()> {
        if let Some(entry) = self.window.as_mut() {
            let new_size = entry.with_window(|w| w.inner_size());
            entry.with_gpu_mut(|gpu| gpu.resize(new_size))?;
            entry.with_window(|w| w.request_redraw());
        }
        Ok(())
    }

    /// Runs `cleanup` once and releases the window and device.
    fn shutdown(&mut self) {
        if self.phase == Phase::Running {
            log::info!("shutting down");
            self.app.cleanup();
        }
        self.phase = Phase::Finished;
        self.window = None;
    }
}

impl<A> ApplicationHandler for AppState<A>
where
    A: CoreApp + 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.phase != Phase::Pending {
            return;
        }

        let entry = match self.create_window_entry(event_loop) {
            Ok(entry) => entry,
            Err(e) => {
                self.phase = Phase::Finished;
                self.fail(event_loop, e.context("failed to create initial window"));
                return;
            }
        };

        if let Err(e) = self.init_app(&entry) {
            self.phase = Phase::Finished;
            self.fail(event_loop, e.context("application init failed"));
            return;
        }

        log::info!("application initialized");
        self.phase = Phase::Running;
        entry.with_window(|w| w.request_redraw());
        self.window = Some(entry);
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.phase != Phase::Running {
            return;
        }

        // Continuous redraw: the surface is regenerated every frame.
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(entry) = &self.window {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.phase != Phase::Running {
            return;
        }

        if self.app.on_window_event(&event) == AppControl::Exit {
            event_loop.exit();
            return;
        }

        match &event {
            WindowEvent::CloseRequested => {
                log::info!("window close requested");
                event_loop.exit();
            }

            WindowEvent::KeyboardInput { event: key, .. }
                if self.config.exit_on_escape && is_escape_press(key) =>
            {
                log::info!("escape pressed");
                event_loop.exit();
            }

            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                if let Err(e) = self.resize() {
                    self.fail(event_loop, e);
                }
            }

            WindowEvent::RedrawRequested => match self.drive_frame(window_id) {
                Ok(AppControl::Continue) => {}
                Ok(AppControl::Exit) => event_loop.exit(),
                Err(e) => self.fail(event_loop, e),
            },

            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

fn is_escape_press(event: &KeyEvent) -> bool {
    event.state == ElementState::Pressed
        && !event.repeat
        && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
}
