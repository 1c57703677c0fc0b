//! Density sources and the sampled volume uploaded to the GPU.

use glam::Vec3;
use isoflow_engine::texture::{Tex3D, Texture, TextureError, TextureSpec};
use thiserror::Error;

use crate::marching::grid::{Grid, GridSpace};

/// Scalar field sampled at every grid point.
///
/// Positive values are treated as inside when the iso threshold is 0.
pub trait DensityField {
    fn density(&self, p: Vec3) -> f32;
}

impl<F> DensityField for F
where
    F: Fn(Vec3) -> f32,
{
    fn density(&self, p: Vec3) -> f32 {
        self(p)
    }
}

/// `radius - |p - center|`: positive inside the sphere.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }
}

impl DensityField for Sphere {
    fn density(&self, p: Vec3) -> f32 {
        self.radius - (p - self.center).length()
    }
}

/// `dot(p, slope) + offset`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LinearRamp {
    pub slope: Vec3,
    pub offset: f32,
}

impl DensityField for LinearRamp {
    fn density(&self, p: Vec3) -> f32 {
        p.dot(self.slope) + self.offset
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("grid needs {expected} density samples, got {actual}")]
pub struct SampleCountMismatch {
    pub expected: usize,
    pub actual: usize,
}

/// Densities at every point of a [`Grid`], x fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityGrid {
    grid: Grid,
    values: Vec<f32>,
}

impl DensityGrid {
    /// Samples `field` at the world position of every grid point.
    pub fn sample(grid: Grid, space: &GridSpace, field: &impl DensityField) -> Self {
        let mut values = Vec::with_capacity(grid.point_count() as usize);
        for z in 0..grid.depth() {
            for y in 0..grid.height() {
                for x in 0..grid.width() {
                    values.push(field.density(space.point([x, y, z])));
                }
            }
        }
        Self { grid, values }
    }

    pub fn from_values(grid: Grid, values: Vec<f32>) -> Result<Self, SampleCountMismatch> {
        let expected = grid.point_count() as usize;
        if values.len() != expected {
            return Err(SampleCountMismatch {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self { grid, values })
    }

    /// Same value at every point.
    pub fn constant(grid: Grid, value: f32) -> Self {
        Self {
            grid,
            values: vec![value; grid.point_count() as usize],
        }
    }

    #[inline]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    #[inline]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[inline]
    pub fn at(&self, [x, y, z]: [u32; 3]) -> f32 {
        self.values[self.grid.point_index(x, y, z)]
    }

    /// Density with coordinates clamped into the grid.
    pub fn at_clamped(&self, [x, y, z]: [i64; 3]) -> f32 {
        let clamp = |v: i64, n: u32| v.clamp(0, i64::from(n) - 1) as u32;
        self.at([
            clamp(x, self.grid.width()),
            clamp(y, self.grid.height()),
            clamp(z, self.grid.depth()),
        ])
    }

    /// Central-difference gradient in grid units; border points reuse
    /// themselves as the missing neighbour.
    pub fn gradient(&self, [x, y, z]: [u32; 3]) -> Vec3 {
        let p = [i64::from(x), i64::from(y), i64::from(z)];
        let axis = |a: usize| {
            let mut lo = p;
            let mut hi = p;
            lo[a] -= 1;
            hi[a] += 1;
            (self.at_clamped(hi) - self.at_clamped(lo)) * 0.5
        };
        Vec3::new(axis(0), axis(1), axis(2))
    }

    pub fn spec(&self) -> TextureSpec {
        TextureSpec::r32_float(self.grid.width(), self.grid.height(), self.grid.depth())
    }

    /// Uploads the samples as an `R32Float` volume.
    pub fn upload(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<Texture<Tex3D>, TextureError> {
        let mut texture = Texture::<Tex3D>::new("density volume");
        self.upload_into(&mut texture, device, queue)?;
        Ok(texture)
    }

    /// Replaces the storage of an existing volume texture.
    pub fn upload_into(
        &self,
        texture: &mut Texture<Tex3D>,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<(), TextureError> {
        texture.allocate_storage(
            device,
            queue,
            self.spec(),
            Some(bytemuck::cast_slice(&self.values)),
            0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(w: u32, h: u32, d: u32) -> Grid {
        Grid::new(w, h, d).unwrap()
    }

    #[test]
    fn sphere_is_positive_inside() {
        let s = Sphere::new(Vec3::ZERO, 1.0);
        assert_eq!(s.density(Vec3::ZERO), 1.0);
        assert_eq!(s.density(Vec3::X), 0.0);
        assert!(s.density(Vec3::splat(2.0)) < 0.0);
    }

    #[test]
    fn closures_are_fields() {
        let field = |p: Vec3| p.y;
        assert_eq!(field.density(Vec3::new(0.0, 3.0, 0.0)), 3.0);
    }

    #[test]
    fn sampling_follows_point_index_order() {
        let g = grid(3, 2, 2);
        let space = GridSpace::centered(&g, 1.0);
        let ramp = LinearRamp {
            slope: Vec3::new(1.0, 10.0, 100.0),
            offset: 0.0,
        };
        let volume = DensityGrid::sample(g, &space, &ramp);
        assert_eq!(volume.values().len(), 12);
        assert_eq!(volume.at([0, 0, 0]), -1.0 - 5.0 - 50.0);
        assert_eq!(volume.at([2, 1, 1]), 1.0 + 5.0 + 50.0);
    }

    #[test]
    fn from_values_checks_length() {
        let g = grid(2, 2, 2);
        assert_eq!(
            DensityGrid::from_values(g, vec![0.0; 7]),
            Err(SampleCountMismatch { expected: 8, actual: 7 })
        );
        assert!(DensityGrid::from_values(g, vec![0.0; 8]).is_ok());
    }

    #[test]
    fn gradient_of_ramp_is_its_slope() {
        let g = grid(4, 4, 4);
        let space = GridSpace::centered(&g, 1.0);
        let ramp = LinearRamp {
            slope: Vec3::new(2.0, -1.0, 0.5),
            offset: 0.25,
        };
        let volume = DensityGrid::sample(g, &space, &ramp);
        assert_eq!(volume.gradient([1, 2, 1]), Vec3::new(2.0, -1.0, 0.5));
        // One-sided at the border: half the slope along the clamped axis.
        assert_eq!(volume.gradient([0, 1, 1]), Vec3::new(1.0, -1.0, 0.5));
    }

    #[test]
    fn spec_matches_grid() {
        let volume = DensityGrid::constant(grid(3, 4, 5), 1.0);
        let spec = volume.spec();
        assert_eq!((spec.width, spec.height, spec.depth), (3, 4, 5));
        assert_eq!(spec.byte_len(), 3 * 4 * 5 * 4);
    }
}
