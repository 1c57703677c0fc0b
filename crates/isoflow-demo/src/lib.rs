//! Marching Cubes demo built on `isoflow-engine`.
//!
//! A density volume is uploaded as a 3D texture and turned into a triangle
//! surface on the GPU every frame. The binary opens a window; the library
//! exposes the stages for tests and other front ends.

pub mod app;
pub mod camera;
pub mod config;
pub mod density;
pub mod marching;

pub use app::MarchingCubesApp;
pub use config::{ConfigError, DemoConfig};
