use glam::Vec3;
use isoflow_engine::window::RuntimeConfig;
use thiserror::Error;
use winit::dpi::LogicalSize;

use crate::density::Sphere;
use crate::marching::grid::{Grid, GridError, GridSpace};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("screen size {width}x{height} must be non-zero")]
    ZeroScreen { width: u32, height: u32 },

    #[error("cell size must be positive and finite (got {0})")]
    CellSize(f32),

    #[error("{name} must be finite (got {value})")]
    NotFinite { name: &'static str, value: f32 },
}

/// Demo settings. Defaults open a 1024x768 window over a 3x3x3 grid.
#[derive(Debug, Clone, PartialEq)]
pub struct DemoConfig {
    pub screen_width: u32,
    pub screen_height: u32,
    pub grid_width: u32,
    pub grid_height: u32,
    pub grid_depth: u32,
    pub iso_threshold: f32,
    /// World distance between neighbouring grid points.
    pub cell_size: f32,
    /// Camera orbit in radians per second.
    pub orbit_speed: f32,
    pub show_voxel_edges: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            screen_width: 1024,
            screen_height: 768,
            grid_width: 3,
            grid_height: 3,
            grid_depth: 3,
            iso_threshold: 0.0,
            cell_size: 1.0,
            orbit_speed: 0.5,
            show_voxel_edges: true,
        }
    }
}

impl DemoConfig {
    /// Checks every field and returns the grid it describes.
    pub fn validate(&self) -> Result<Grid, ConfigError> {
        if self.screen_width == 0 || self.screen_height == 0 {
            return Err(ConfigError::ZeroScreen {
                width: self.screen_width,
                height: self.screen_height,
            });
        }
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(ConfigError::CellSize(self.cell_size));
        }
        for (name, value) in [("iso_threshold", self.iso_threshold), ("orbit_speed", self.orbit_speed)] {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite { name, value });
            }
        }
        Ok(Grid::new(self.grid_width, self.grid_height, self.grid_depth)?)
    }

    pub fn grid_space(&self, grid: &Grid) -> GridSpace {
        GridSpace::centered(grid, self.cell_size)
    }

    /// Default density source: a sphere at the origin whose radius is 0.4
    /// of the smallest grid extent.
    pub fn sphere(&self, grid: &Grid) -> Sphere {
        let min_points = grid.dims().into_iter().min().unwrap_or(2);
        let extent = (min_points - 1) as f32 * self.cell_size;
        Sphere::new(Vec3::ZERO, extent * 0.4)
    }

    /// Half-diagonal of the grid in world units.
    pub fn bounding_radius(&self, grid: &Grid) -> f32 {
        let [w, h, d] = grid.dims().map(|v| (v - 1) as f32 * self.cell_size);
        Vec3::new(w, h, d).length() * 0.5
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            title: format!(
                "isoflow: marching cubes {}x{}x{}",
                self.grid_width, self.grid_height, self.grid_depth
            ),
            initial_size: LogicalSize::new(f64::from(self.screen_width), f64::from(self.screen_height)),
            ..RuntimeConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = DemoConfig::default();
        let grid = config.validate().unwrap();
        assert_eq!(grid.dims(), [3, 3, 3]);
        assert_eq!(config.iso_threshold, 0.0);
        assert_eq!((config.screen_width, config.screen_height), (1024, 768));
    }

    #[test]
    fn degenerate_grid_is_rejected() {
        let config = DemoConfig {
            grid_depth: 1,
            ..DemoConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Grid(GridError::TooSmall { axis: "depth", value: 1 }))
        );
    }

    #[test]
    fn bad_scalars_are_rejected() {
        let zero_cell = DemoConfig {
            cell_size: 0.0,
            ..DemoConfig::default()
        };
        assert!(matches!(zero_cell.validate(), Err(ConfigError::CellSize(_))));

        let nan_iso = DemoConfig {
            iso_threshold: f32::NAN,
            ..DemoConfig::default()
        };
        assert!(matches!(
            nan_iso.validate(),
            Err(ConfigError::NotFinite { name: "iso_threshold", .. })
        ));

        let no_screen = DemoConfig {
            screen_height: 0,
            ..DemoConfig::default()
        };
        assert!(matches!(no_screen.validate(), Err(ConfigError::ZeroScreen { .. })));
    }

    #[test]
    fn sphere_fits_smallest_extent() {
        let config = DemoConfig {
            grid_width: 11,
            grid_height: 6,
            grid_depth: 9,
            cell_size: 0.5,
            ..DemoConfig::default()
        };
        let grid = config.validate().unwrap();
        let sphere = config.sphere(&grid);
        assert_eq!(sphere.center, Vec3::ZERO);
        assert!((sphere.radius - 1.0).abs() < 1e-6);
    }

    #[test]
    fn runtime_config_uses_screen_size() {
        let rc = DemoConfig::default().runtime_config();
        assert_eq!(rc.initial_size, LogicalSize::new(1024.0, 768.0));
        assert!(rc.title.contains("3x3x3"));
    }
}
