//! GPU rendering context.
//!
//! Renderers receive a [`RenderCtx`] for resource creation and a
//! [`RenderTarget`] for recording passes. Each renderer owns its own GPU
//! resources (pipelines, buffers, bind groups).

mod ctx;
mod viewport;

pub use ctx::{RenderCtx, RenderTarget};
pub use viewport::Viewport;
