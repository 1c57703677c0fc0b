use glam::Vec3;
use thiserror::Error;

/// Upper bound of triangles a single voxel can emit.
pub const MAX_TRIANGLES_PER_VOXEL: u32 = 5;

pub const VERTICES_PER_TRIANGLE: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("grid {axis} must have at least 2 points (got {value})")]
    TooSmall { axis: &'static str, value: u32 },

    #[error("grid {width}x{height}x{depth} is too large: capture capacity exceeds u32")]
    TooLarge { width: u32, height: u32, depth: u32 },
}

/// Sampling lattice of the density volume, in grid points per axis.
///
/// A voxel spans 2 x 2 x 2 neighbouring points, so a grid of `w x h x d`
/// points has `(w-1)(h-1)` voxels per layer and `d-1` layers. Fixed at
/// construction.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Grid {
    width: u32,
    height: u32,
    depth: u32,
}

impl Grid {
    pub fn new(width: u32, height: u32, depth: u32) -> Result<Self, GridError> {
        for (axis, value) in [("width", width), ("height", height), ("depth", depth)] {
            if value < 2 {
                return Err(GridError::TooSmall { axis, value });
            }
        }

        let capacity = (width - 1)
            .checked_mul(height - 1)
            .and_then(|v| v.checked_mul(depth - 1))
            .and_then(|v| v.checked_mul(MAX_TRIANGLES_PER_VOXEL * VERTICES_PER_TRIANGLE));
        let points = width.checked_mul(height).and_then(|v| v.checked_mul(depth));
        if capacity.is_none() || points.is_none() {
            return Err(GridError::TooLarge { width, height, depth });
        }

        Ok(Self { width, height, depth })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[inline]
    pub fn dims(&self) -> [u32; 3] {
        [self.width, self.height, self.depth]
    }

    #[inline]
    pub fn point_count(&self) -> u32 {
        self.width * self.height * self.depth
    }

    #[inline]
    pub fn voxels_per_layer(&self) -> u32 {
        (self.width - 1) * (self.height - 1)
    }

    #[inline]
    pub fn layer_count(&self) -> u32 {
        self.depth - 1
    }

    #[inline]
    pub fn voxel_count(&self) -> u32 {
        self.voxels_per_layer() * self.layer_count()
    }

    /// Worst-case triangle count over the whole grid.
    #[inline]
    pub fn max_triangles(&self) -> u32 {
        self.voxel_count() * MAX_TRIANGLES_PER_VOXEL
    }

    /// Vertex slots in each capture stream.
    #[inline]
    pub fn capture_capacity(&self) -> u32 {
        self.max_triangles() * VERTICES_PER_TRIANGLE
    }

    /// Linear index of a grid point, x fastest then y then z.
    #[inline]
    pub fn point_index(&self, x: u32, y: u32, z: u32) -> usize {
        ((z as usize * self.height as usize) + y as usize) * self.width as usize + x as usize
    }

    /// Base `(x, y)` of every voxel in one layer, x fastest.
    pub fn voxel_base_coords(&self) -> Vec<[u32; 2]> {
        (0..self.height - 1)
            .flat_map(|y| (0..self.width - 1).map(move |x| [x, y]))
            .collect()
    }

    /// Base `z` of every layer.
    pub fn voxel_layers(&self) -> Vec<u32> {
        (0..self.layer_count()).collect()
    }

    /// Base grid point of every voxel, layer by layer.
    pub fn voxels(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        (0..self.layer_count()).flat_map(move |z| {
            self.voxel_base_coords()
                .into_iter()
                .map(move |[x, y]| [x, y, z])
        })
    }

    /// Every segment between adjacent grid points along x, y and z.
    pub fn edge_lines(&self) -> Vec<[[u32; 3]; 2]> {
        let [w, h, d] = self.dims();
        let mut lines = Vec::with_capacity(self.edge_count());
        for z in 0..d {
            for y in 0..h {
                for x in 0..w {
                    let p = [x, y, z];
                    if x + 1 < w {
                        lines.push([p, [x + 1, y, z]]);
                    }
                    if y + 1 < h {
                        lines.push([p, [x, y + 1, z]]);
                    }
                    if z + 1 < d {
                        lines.push([p, [x, y, z + 1]]);
                    }
                }
            }
        }
        lines
    }

    pub fn edge_count(&self) -> usize {
        let [w, h, d] = self.dims().map(|v| v as usize);
        (w - 1) * h * d + w * (h - 1) * d + w * h * (d - 1)
    }
}

/// Placement of grid points in world space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GridSpace {
    /// World position of grid point `(0, 0, 0)`.
    pub origin: Vec3,
    pub cell_size: f32,
}

impl GridSpace {
    /// Grid centred on the world origin.
    pub fn centered(grid: &Grid, cell_size: f32) -> Self {
        let [w, h, d] = grid.dims();
        let extent = Vec3::new((w - 1) as f32, (h - 1) as f32, (d - 1) as f32) * cell_size;
        Self {
            origin: -extent * 0.5,
            cell_size,
        }
    }

    /// World position of a (possibly fractional) grid coordinate.
    #[inline]
    pub fn to_world(&self, grid_pos: Vec3) -> Vec3 {
        self.origin + grid_pos * self.cell_size
    }

    #[inline]
    pub fn point(&self, [x, y, z]: [u32; 3]) -> Vec3 {
        self.to_world(Vec3::new(x as f32, y as f32, z as f32))
    }
}
