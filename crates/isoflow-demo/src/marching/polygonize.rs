//! Host-side Marching Cubes over a [`DensityGrid`].
//!
//! Performs the same per-voxel arithmetic as the generation shader and is
//! used to check GPU output and mesh properties without a device.

use glam::Vec3;

use crate::density::DensityGrid;

use super::case_table::{self, CORNER_OFFSETS, EDGE_CORNERS};
use super::grid::GridSpace;

/// Density differences below this are treated as a flat edge.
pub const FLAT_EDGE_EPSILON: f32 = 1e-6;

/// Gradients shorter than this fall back to the face normal.
pub const MIN_GRADIENT_LENGTH: f32 = 1e-12;

/// One emitted triangle in world space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Triangle {
    pub positions: [Vec3; 3],
    pub normals: [Vec3; 3],
}

/// Position of the iso crossing along an edge from `d0` to `d1`, in `[0, 1]`.
///
/// Flat edges (and non-finite ratios) resolve to the midpoint.
#[inline]
pub fn interpolation_t(d0: f32, d1: f32, iso_threshold: f32) -> f32 {
    let delta = d1 - d0;
    if delta.abs() < FLAT_EDGE_EPSILON {
        return 0.5;
    }
    let t = (iso_threshold - d0) / delta;
    if t.is_nan() { 0.5 } else { t.clamp(0.0, 1.0) }
}

/// Endpoints of edge `edge` of the voxel at `base`, lower grid point first.
#[inline]
pub fn edge_endpoints(base: [u32; 3], edge: usize) -> ([u32; 3], [u32; 3]) {
    let [a, b] = EDGE_CORNERS[edge];
    let corner = |c: usize| {
        let o = CORNER_OFFSETS[c];
        [base[0] + o[0], base[1] + o[1], base[2] + o[2]]
    };
    let (pa, pb) = (corner(a), corner(b));
    let sum = |p: [u32; 3]| p[0] + p[1] + p[2];
    if sum(pa) <= sum(pb) { (pa, pb) } else { (pb, pa) }
}

fn grid_vec(p: [u32; 3]) -> Vec3 {
    Vec3::new(p[0] as f32, p[1] as f32, p[2] as f32)
}

/// Surface vertex on one edge: world position and unnormalised outward
/// direction (towards lower density).
fn edge_vertex(
    volume: &DensityGrid,
    space: &GridSpace,
    iso_threshold: f32,
    base: [u32; 3],
    edge: usize,
) -> (Vec3, Vec3) {
    let (pa, pb) = edge_endpoints(base, edge);
    let t = interpolation_t(volume.at(pa), volume.at(pb), iso_threshold);

    let (ga, gb) = (grid_vec(pa), grid_vec(pb));
    let position = space.to_world(ga + (gb - ga) * t);

    let (na, nb) = (volume.gradient(pa), volume.gradient(pb));
    let gradient = na + (nb - na) * t;

    (position, -gradient)
}

fn resolve_normal(direction: Vec3, face: Vec3) -> Vec3 {
    if direction.length_squared() > MIN_GRADIENT_LENGTH {
        direction.normalize()
    } else {
        face
    }
}

/// Appends the triangles of the voxel whose lowest corner is `base`.
pub fn polygonize_voxel(
    volume: &DensityGrid,
    space: &GridSpace,
    iso_threshold: f32,
    base: [u32; 3],
    out: &mut Vec<Triangle>,
) {
    let corners: [f32; 8] = std::array::from_fn(|i| {
        let o = CORNER_OFFSETS[i];
        volume.at([base[0] + o[0], base[1] + o[1], base[2] + o[2]])
    });
    let case = case_table::case_index(&corners, iso_threshold);

    for edges in case_table::triangles(case) {
        let vertices = edges.map(|e| edge_vertex(volume, space, iso_threshold, base, e));
        let positions = vertices.map(|(p, _)| p);

        let face = (positions[1] - positions[0]).cross(positions[2] - positions[0]);
        let face = if face.length_squared() > MIN_GRADIENT_LENGTH {
            face.normalize()
        } else {
            Vec3::Y
        };

        out.push(Triangle {
            positions,
            normals: vertices.map(|(_, n)| resolve_normal(n, face)),
        });
    }
}

/// Extracts the iso-surface of the whole volume.
pub fn extract_surface(volume: &DensityGrid, space: &GridSpace, iso_threshold: f32) -> Vec<Triangle> {
    let mut triangles = Vec::new();
    for base in volume.grid().voxels() {
        polygonize_voxel(volume, space, iso_threshold, base, &mut triangles);
    }
    log::trace!(
        "extracted {} triangles from {} voxels",
        triangles.len(),
        volume.grid().voxel_count()
    );
    triangles
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;

    use super::*;
    use crate::density::{LinearRamp, Sphere};
    use crate::marching::grid::Grid;

    fn sampled(grid: Grid, cell_size: f32, field: &impl crate::density::DensityField) -> (DensityGrid, GridSpace) {
        let space = GridSpace::centered(&grid, cell_size);
        (DensityGrid::sample(grid, &space, field), space)
    }

    fn quantize(p: Vec3) -> [i64; 3] {
        (p * 1e4).round().as_i64vec3().to_array()
    }

    // ── interpolation_t ───────────────────────────────────────────────────

    #[test]
    fn midpoint_crossing() {
        assert_eq!(interpolation_t(-0.5, 0.5, 0.0), 0.5);
        assert_eq!(interpolation_t(0.0, 4.0, 1.0), 0.25);
    }

    #[test]
    fn flat_edge_uses_midpoint() {
        assert_eq!(interpolation_t(1.0, 1.0, 1.0), 0.5);
        assert_eq!(interpolation_t(0.3, 0.3 + 1e-7, 0.0), 0.5);
    }

    #[test]
    fn crossing_outside_edge_is_clamped() {
        assert_eq!(interpolation_t(1.0, 2.0, 0.0), 0.0);
        assert_eq!(interpolation_t(1.0, 2.0, 5.0), 1.0);
    }

    #[test]
    fn undefined_ratio_uses_midpoint() {
        // inf / inf
        assert_eq!(interpolation_t(f32::INFINITY, 1.0, 0.0), 0.5);
        assert_eq!(interpolation_t(0.0, f32::NAN, 0.0), 0.5);
    }

    proptest! {
        #[test]
        fn t_is_always_a_finite_fraction(
            d0 in -1.0e6f32..1.0e6,
            d1 in -1.0e6f32..1.0e6,
            iso in -1.0e6f32..1.0e6,
        ) {
            let t = interpolation_t(d0, d1, iso);
            prop_assert!(t.is_finite());
            prop_assert!((0.0..=1.0).contains(&t));
        }

        #[test]
        fn vertices_stay_on_their_voxel(
            values in prop::collection::vec(-1.0f32..1.0, 27),
            iso in -0.5f32..0.5,
        ) {
            let grid = Grid::new(3, 3, 3).unwrap();
            let volume = DensityGrid::from_values(grid, values).unwrap();
            let space = GridSpace::centered(&grid, 1.0);
            for base in grid.voxels() {
                let mut out = Vec::new();
                polygonize_voxel(&volume, &space, iso, base, &mut out);
                let lo = space.point(base) - Vec3::splat(1e-5);
                let hi = space.point(base.map(|v| v + 1)) + Vec3::splat(1e-5);
                for tri in &out {
                    for p in tri.positions {
                        prop_assert!(p.cmpge(lo).all() && p.cmple(hi).all());
                    }
                    for n in tri.normals {
                        prop_assert!((n.length() - 1.0).abs() < 1e-4);
                    }
                }
            }
        }
    }

    // ── edge canonicalisation ─────────────────────────────────────────────

    #[test]
    fn endpoints_are_ordered_low_to_high() {
        // Edge 2 runs from corner 2 (1,1,0) to corner 3 (0,1,0).
        assert_eq!(edge_endpoints([0, 0, 0], 2), ([0, 1, 0], [1, 1, 0]));
        // Edge 7 runs from corner 7 (0,1,1) to corner 4 (0,0,1).
        assert_eq!(edge_endpoints([1, 1, 1], 7), ([1, 1, 2], [1, 2, 2]));
        assert_eq!(edge_endpoints([0, 0, 0], 0), ([0, 0, 0], [1, 0, 0]));
    }

    // ── surfaces ──────────────────────────────────────────────────────────

    #[test]
    fn constant_field_emits_nothing() {
        let grid = Grid::new(5, 4, 3).unwrap();
        let space = GridSpace::centered(&grid, 1.0);
        for value in [-1.0, 1.0] {
            let volume = DensityGrid::constant(grid, value);
            assert!(extract_surface(&volume, &space, 0.0).is_empty());
        }
    }

    #[test]
    fn ramp_through_single_layer_is_one_quad() {
        let grid = Grid::new(2, 2, 2).unwrap();
        let ramp = LinearRamp {
            slope: Vec3::Z,
            offset: 0.0,
        };
        let (volume, space) = sampled(grid, 1.0, &ramp);

        let tris = extract_surface(&volume, &space, 0.0);
        assert_eq!(tris.len(), 2);
        for tri in &tris {
            for (p, n) in tri.positions.iter().zip(tri.normals) {
                // t = 0.5 puts every vertex on the z = 0 mid-plane.
                assert_eq!(p.z, 0.0);
                assert!((n - Vec3::NEG_Z).length() < 1e-6);
            }
        }

        let corners: Vec<_> = tris.iter().flat_map(|t| t.positions).map(quantize).collect();
        for expected in [[-5000, -5000, 0], [5000, -5000, 0], [-5000, 5000, 0], [5000, 5000, 0]] {
            assert!(corners.contains(&expected), "missing quad corner {expected:?}");
        }
    }

    #[test]
    fn ramp_across_wide_layer_tiles_every_voxel() {
        let grid = Grid::new(4, 5, 2).unwrap();
        let ramp = LinearRamp {
            slope: Vec3::Z,
            offset: 0.0,
        };
        let (volume, space) = sampled(grid, 0.5, &ramp);
        assert_eq!(extract_surface(&volume, &space, 0.0).len(), 2 * 12);
    }

    #[test]
    fn sphere_surface_is_watertight() {
        let grid = Grid::new(12, 12, 12).unwrap();
        let (volume, space) = sampled(grid, 1.0, &Sphere::new(Vec3::ZERO, 3.7));
        let tris = extract_surface(&volume, &space, 0.0);
        assert!(!tris.is_empty());

        let mut edge_uses: HashMap<([i64; 3], [i64; 3]), u32> = HashMap::new();
        for tri in &tris {
            let q = tri.positions.map(quantize);
            for (a, b) in [(q[0], q[1]), (q[1], q[2]), (q[2], q[0])] {
                let key = if a <= b { (a, b) } else { (b, a) };
                *edge_uses.entry(key).or_default() += 1;
            }
        }

        let open: Vec<_> = edge_uses.iter().filter(|(_, n)| **n != 2).collect();
        assert!(open.is_empty(), "{} edges not shared by exactly two triangles", open.len());
    }

    #[test]
    fn sphere_normals_point_outward() {
        let grid = Grid::new(10, 10, 10).unwrap();
        let (volume, space) = sampled(grid, 0.5, &Sphere::new(Vec3::ZERO, 1.6));
        for tri in extract_surface(&volume, &space, 0.0) {
            for (p, n) in tri.positions.iter().zip(tri.normals) {
                assert!(p.normalize().dot(n) > 0.8, "normal {n} at {p}");
            }
        }
    }
}
