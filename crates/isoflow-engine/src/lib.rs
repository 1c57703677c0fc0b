//! isoflow engine crate.
//!
//! This crate owns the platform + GPU runtime pieces used by applications:
//! device and surface management, texture resources, shader compilation,
//! the window loop and the application lifecycle.

pub mod device;
pub mod window;
pub mod time;
pub mod core;

pub mod logging;
pub mod render;
pub mod shader;
pub mod texture;
