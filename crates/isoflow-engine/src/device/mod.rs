//! GPU device + surface management.
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue
//! - creating & configuring the Surface (swapchain) and its depth buffer
//! - acquiring frames and providing encoders/views for rendering
//! - an offscreen device for tools and tests that have no window

mod context;
mod error;
mod frame;
mod headless;
mod init;
mod surface;

pub use context::Gpu;
pub use error::SurfaceErrorAction;
pub use frame::GpuFrame;
pub use headless::{HeadlessGpu, OffscreenTargets};
pub use init::GpuInit;
