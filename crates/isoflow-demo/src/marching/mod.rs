//! GPU Marching Cubes: grid, case table, generation stage and the passes
//! that draw its output.

pub mod capture;
pub mod case_table;
mod common;
pub mod edges;
pub mod generator;
pub mod grid;
pub mod polygonize;
pub mod renderer;
pub mod surface;

pub use capture::{CaptureBuffers, CaptureError, CaptureOverflow, PrimitiveCount};
pub use generator::{CapturedStream, GenerateError, GeneratedSurface, IsoSurfaceGenerator};
pub use grid::{Grid, GridError, GridSpace};
pub use renderer::{MarchingCubesRenderer, RendererOptions};
pub use surface::SurfaceMaterial;

#[cfg(test)]
mod tests {
    use isoflow_engine::shader::parse_wgsl;

    #[test]
    fn every_shader_validates() {
        let shaders = [
            ("generate", include_str!("shaders/generate.wgsl")),
            ("finalize", include_str!("shaders/finalize.wgsl")),
            ("surface", include_str!("shaders/surface.wgsl")),
            ("edges", include_str!("shaders/edges.wgsl")),
        ];
        for (label, source) in shaders {
            if let Err(e) = parse_wgsl(label, source) {
                panic!("{e}");
            }
        }
    }
}
