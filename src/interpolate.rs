//! Pixel-level interpolator.
//!
//! For every valid thermal pixel: locate the nearest grid point, pick the
//! 2x2 mesh cell whose quadrant lies closest, interpolate each vertex's
//! parameters to the pixel elevation, then blend across the cell with
//! inverse-distance weights in map coordinates.

use crate::error::{Result, StError};
use crate::grid::{GridPoints, ModtranPoint, ModtranPoints};
use crate::raster::{PixelBands, NO_DATA_VALUE};
use crate::scene::{Geolocation, SceneMetadata};

/// Equatorial radius of the Earth, meters.
pub const EQUATORIAL_RADIUS: f64 = 6_378_137.0;

/// W cm^-2 -> W m^-2 for the radiance outputs.
const RADIANCE_UNIT_SCALE: f64 = 10_000.0;

const NUM_PARAMETERS: usize = 3;
const NUM_CELL_POINTS: usize = 4;

/// 9-point neighborhood as (row, col) offsets from the center.
const NEIGHBOR_OFFSETS: [(i64, i64); 9] = [
    (0, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
];

const CC: usize = 0;
const LL: usize = 1;
const LC: usize = 2;
const UL: usize = 3;
const UC: usize = 4;
const UR: usize = 5;
const RC: usize = 6;
const LR: usize = 7;
const DC: usize = 8;

/// Great-circle distance in meters between two points in decimal degrees.
pub fn haversine_distance(lon_1: f64, lat_1: f64, lon_2: f64, lat_2: f64) -> f64 {
    let lat_1_radians = lat_1.to_radians();
    let lat_2_radians = lat_2.to_radians();

    let sin_lon = ((lon_2 - lon_1).to_radians() * 0.5).sin();
    let sin_lat = ((lat_2_radians - lat_1_radians) * 0.5).sin();

    let chord = sin_lat * sin_lat + lat_1_radians.cos() * lat_2_radians.cos() * sin_lon * sin_lon;

    EQUATORIAL_RADIUS * 2.0 * chord.sqrt().min(1.0).asin()
}

/// A candidate grid point and its distance to the current pixel.
#[derive(Debug, Clone, Copy)]
struct GridItem {
    index: usize,
    distance: f64,
}

struct PixelInterpolator<'a> {
    grid: &'a GridPoints,
    modtran: &'a ModtranPoints,
}

impl<'a> PixelInterpolator<'a> {
    fn new(grid: &'a GridPoints, modtran: &'a ModtranPoints) -> Self {
        PixelInterpolator { grid, modtran }
    }

    /// Nearest grid point over the whole mesh; used for the first valid
    /// sample of each line.
    fn nearest_of_all(&self, lon: f64, lat: f64, scratch: &mut Vec<GridItem>) -> usize {
        scratch.clear();
        scratch.extend(self.grid.points.iter().map(|point| GridItem {
            index: point.index,
            distance: haversine_distance(point.lon, point.lat, lon, lat),
        }));

        scratch
            .iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
            .expect("grid has at least one point")
            .index
    }

    /// The 9-point neighborhood of `center` with distances to the pixel.
    /// Entries falling off the mesh get an infinite distance, which drops
    /// them out of the center search and the quadrant means.
    fn neighborhood(&self, center: usize, lon: f64, lat: f64) -> [GridItem; 9] {
        let rows = self.grid.rows as i64;
        let cols = self.grid.cols as i64;
        let row = (center / self.grid.cols) as i64;
        let col = (center % self.grid.cols) as i64;

        NEIGHBOR_OFFSETS.map(|(dr, dc)| {
            let (r, c) = (row + dr, col + dc);
            if r >= 0 && r < rows && c >= 0 && c < cols {
                let index = (r * cols + c) as usize;
                let point = &self.grid.points[index];
                GridItem {
                    index,
                    distance: haversine_distance(point.lon, point.lat, lon, lat),
                }
            } else {
                GridItem {
                    index: center,
                    distance: f64::INFINITY,
                }
            }
        })
    }

    /// Choose the quadrant with the smallest mean distance over its three
    /// outer points and return the enclosing cell's vertex indices in
    /// (LL, UL, UR, LR) order. `None` when every quadrant falls off the mesh.
    fn select_cell(&self, items: &[GridItem; 9]) -> Option<[usize; NUM_CELL_POINTS]> {
        let center = items[CC].index;
        let cols = self.grid.cols;

        let avg = |a: usize, b: usize, c: usize| {
            (items[a].distance + items[b].distance + items[c].distance) / 3.0
        };

        let avg_distance_ll = avg(DC, LL, LC);
        let avg_distance_ul = avg(LC, UL, UC);
        let avg_distance_ur = avg(UC, UR, RC);
        let avg_distance_lr = avg(RC, LR, DC);

        if !avg_distance_ll
            .min(avg_distance_ul)
            .min(avg_distance_ur)
            .min(avg_distance_lr)
            .is_finite()
        {
            return None;
        }

        // Lower-left vertex of the chosen cell; the cascade picks a minimal
        // quadrant, which is finite, so the index arithmetic stays on-mesh
        let lower_left = if avg_distance_ll < avg_distance_ul
            && avg_distance_ll < avg_distance_ur
            && avg_distance_ll < avg_distance_lr
        {
            center - 1 - cols
        } else if avg_distance_ul < avg_distance_ur && avg_distance_ul < avg_distance_lr {
            center - 1
        } else if avg_distance_ur < avg_distance_lr {
            center
        } else {
            center - cols
        };

        Some([
            lower_left,
            lower_left + cols,
            lower_left + cols + 1,
            lower_left + 1,
        ])
    }

    /// Shepard power-1 inverse-distance blend over the cell vertices in map
    /// coordinates. An exact vertex hit short-circuits to that vertex.
    fn interpolate_to_location(
        &self,
        vertices: [usize; NUM_CELL_POINTS],
        at_height: &[[f64; NUM_PARAMETERS]; NUM_CELL_POINTS],
        easting: f64,
        northing: f64,
    ) -> [f64; NUM_PARAMETERS] {
        let mut inv_distances = [0.0; NUM_CELL_POINTS];
        for (vertex, &index) in vertices.iter().enumerate() {
            let point = &self.grid.points[index];
            let dx = point.map_x - easting;
            let dy = point.map_y - northing;
            let distance = (dx * dx + dy * dy).sqrt();

            if distance == 0.0 {
                return at_height[vertex];
            }
            inv_distances[vertex] = 1.0 / distance;
        }

        let total: f64 = inv_distances.iter().sum();
        let inv_total = 1.0 / total;

        let mut parameters = [0.0; NUM_PARAMETERS];
        for vertex in 0..NUM_CELL_POINTS {
            let weight = inv_distances[vertex] * inv_total;
            for parameter in 0..NUM_PARAMETERS {
                parameters[parameter] += weight * at_height[vertex][parameter];
            }
        }

        parameters
    }
}

/// Linear interpolation of (tau, Lu, Ld) to `target_km` on the point's
/// elevation ladder, clamped to the bottom and top slots.
fn interpolate_to_height(point: &ModtranPoint, target_km: f64) -> [f64; NUM_PARAMETERS] {
    let count = point.elevations.len();

    // Last slot strictly below the target; stays 0 when the target sits
    // below the whole ladder
    let mut below = 0;
    for (slot_index, slot) in point.elevations.iter().enumerate() {
        if slot.elevation < target_km {
            below = slot_index;
        }
    }

    let mut above = below;
    if above != count - 1 && !(target_km < point.elevations[above].elevation) {
        above += 1;
    }

    let below_slot = &point.elevations[below];
    let below_parameters = [
        below_slot.transmission,
        below_slot.upwelled_radiance,
        below_slot.downwelled_radiance,
    ];

    if above == below {
        return below_parameters;
    }

    let above_slot = &point.elevations[above];
    let above_parameters = [
        above_slot.transmission,
        above_slot.upwelled_radiance,
        above_slot.downwelled_radiance,
    ];

    let inv_height_diff = 1.0 / (above_slot.elevation - below_slot.elevation);

    let mut at_height = [0.0; NUM_PARAMETERS];
    for parameter in 0..NUM_PARAMETERS {
        let slope = (above_parameters[parameter] - below_parameters[parameter]) * inv_height_diff;
        at_height[parameter] =
            slope * (target_km - above_slot.elevation) + above_parameters[parameter];
    }

    at_height
}

/// Interpolate (tau, Lu, Ld) to every valid thermal pixel of the scene.
///
/// Pixels whose thermal input is no-data keep the no-data sentinel in all
/// three derived bands, as do border pixels whose neighborhood has no
/// complete mesh cell.
pub fn calculate_pixel_parameters(
    meta: &SceneMetadata,
    grid: &GridPoints,
    modtran: &ModtranPoints,
    geolocation: &dyn Geolocation,
    thermal: &[f32],
    elevation: &[i16],
) -> Result<PixelBands> {
    let pixel_count = meta.pixel_count();
    if thermal.len() != pixel_count || elevation.len() != pixel_count {
        return Err(StError::Domain(format!(
            "band sizes ({}, {}) do not match the scene's {} pixels",
            thermal.len(),
            elevation.len(),
            pixel_count
        )));
    }

    log::info!(
        "Iterating through all {} pixels ({} lines x {} samples)",
        pixel_count,
        meta.lines,
        meta.samples
    );

    let interpolator = PixelInterpolator::new(grid, modtran);
    let mut bands = PixelBands::filled(pixel_count);
    let mut scratch: Vec<GridItem> = Vec::with_capacity(grid.count());

    let mut pixel = 0;
    for line in 0..meta.lines {
        if line % 1000 == 0 {
            log::info!("Processing line {line}");
        }

        let northing = meta.northing(line);
        let mut center: Option<usize> = None;

        for sample in 0..meta.samples {
            let index = pixel;
            pixel += 1;

            if thermal[index] == NO_DATA_VALUE {
                // Derived bands are prefilled with the sentinel
                continue;
            }

            let (lon, lat) = geolocation.lon_lat(line, sample)?;
            let easting = meta.easting(sample);

            let current_center = match center {
                None => interpolator.nearest_of_all(lon, lat, &mut scratch),
                Some(previous) => interpolator
                    .neighborhood(previous, lon, lat)
                    .iter()
                    .min_by(|a, b| a.distance.total_cmp(&b.distance))
                    .expect("neighborhood is non-empty")
                    .index,
            };
            center = Some(current_center);

            let items = interpolator.neighborhood(current_center, lon, lat);
            let Some(vertices) = interpolator.select_cell(&items) else {
                continue;
            };

            let height_km = elevation[index] as f64 * 0.001;
            let mut at_height = [[0.0; NUM_PARAMETERS]; NUM_CELL_POINTS];
            for (vertex, &point_index) in vertices.iter().enumerate() {
                at_height[vertex] =
                    interpolate_to_height(&modtran.points[point_index], height_km);
            }

            let parameters =
                interpolator.interpolate_to_location(vertices, &at_height, easting, northing);

            bands.transmittance[index] = parameters[0] as f32;
            bands.upwelled[index] = (parameters[1] * RADIANCE_UNIT_SCALE) as f32;
            bands.downwelled[index] = (parameters[2] * RADIANCE_UNIT_SCALE) as f32;
        }
    }

    Ok(bands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{ElevationSlot, GridPoint};
    use crate::scene::tests::synthetic_metadata;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    /// Mesh whose geographic and map coordinates are affinely linked, so the
    /// haversine center search and the map-space IDW agree geometrically.
    fn synthetic_grid(rows: usize, cols: usize) -> GridPoints {
        let points = (0..rows * cols)
            .map(|index| {
                let row = index / cols;
                let col = index % cols;
                GridPoint {
                    index,
                    row,
                    col,
                    narr_row: row as i32,
                    narr_col: col as i32,
                    lon: -95.0 + col as f64 * 0.1,
                    lat: 40.0 + row as f64 * 0.1,
                    map_x: 300_000.0 + col as f64 * 10_000.0,
                    map_y: 4_500_000.0 + row as f64 * 10_000.0,
                    run_modtran: true,
                }
            })
            .collect();

        GridPoints { rows, cols, points }
    }

    fn uniform_modtran(grid: &GridPoints, tau: f64, lu: f64, ld: f64) -> ModtranPoints {
        let points = grid
            .points
            .iter()
            .map(|point| ModtranPoint {
                row: point.row,
                col: point.col,
                narr_row: point.narr_row,
                narr_col: point.narr_col,
                lon: point.lon,
                lat: point.lat,
                map_x: point.map_x,
                map_y: point.map_y,
                ran_modtran: true,
                elevations: [0.0, 1.0, 2.0]
                    .iter()
                    .map(|&elevation| ElevationSlot {
                        elevation,
                        elevation_directory: elevation,
                        transmission: tau,
                        upwelled_radiance: lu,
                        downwelled_radiance: ld,
                    })
                    .collect(),
            })
            .collect();

        ModtranPoints { points }
    }

    /// Geolocation matching `synthetic_grid`'s affine link between map and
    /// geographic coordinates.
    struct AffineGeolocation {
        meta: SceneMetadata,
    }

    impl Geolocation for AffineGeolocation {
        fn lon_lat(&self, line: usize, sample: usize) -> Result<(f64, f64)> {
            let easting = self.meta.easting(sample);
            let northing = self.meta.northing(line);
            let lon = -95.0 + (easting - 300_000.0) / 10_000.0 * 0.1;
            let lat = 40.0 + (northing - 4_500_000.0) / 10_000.0 * 0.1;
            Ok((lon, lat))
        }
    }

    fn scene_inside_mesh(lines: usize, samples: usize) -> SceneMetadata {
        let mut meta = synthetic_metadata(lines, samples);
        // Near the (row 1, col 1) mesh point, safely inside the 3x3 mesh
        meta.ul_map_x = 309_000.0;
        meta.ul_map_y = 4_511_000.0;
        meta
    }

    #[test]
    fn haversine_of_identical_points_is_zero() {
        assert_eq!(haversine_distance(0.0, 0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn haversine_equator_to_pole() {
        let distance = haversine_distance(0.0, 0.0, 0.0, 90.0);
        assert_relative_eq!(distance, PI * EQUATORIAL_RADIUS / 2.0, epsilon = 1.0);
    }

    #[test]
    fn height_interpolation_is_linear_between_slots() {
        let grid = synthetic_grid(1, 1);
        let mut modtran = uniform_modtran(&grid, 0.0, 0.0, 0.0);
        let point = &mut modtran.points[0];
        for (slot, tau) in point.elevations.iter_mut().zip([0.9, 0.7, 0.5]) {
            slot.transmission = tau;
        }

        let at_height = interpolate_to_height(&modtran.points[0], 0.5);
        assert_relative_eq!(at_height[0], 0.8, epsilon = 1e-12);
    }

    #[test]
    fn height_above_ladder_clamps_to_top_slot() {
        let grid = synthetic_grid(1, 1);
        let mut modtran = uniform_modtran(&grid, 0.0, 0.0, 0.0);
        for (slot, tau) in modtran.points[0].elevations.iter_mut().zip([0.9, 0.7, 0.5]) {
            slot.transmission = tau;
        }

        let at_height = interpolate_to_height(&modtran.points[0], 9.0);
        assert_eq!(at_height[0], 0.5);
    }

    #[test]
    fn height_below_ladder_clamps_to_bottom_slot() {
        let grid = synthetic_grid(1, 1);
        let mut modtran = uniform_modtran(&grid, 0.0, 0.0, 0.0);
        for (slot, tau) in modtran.points[0].elevations.iter_mut().zip([0.9, 0.7, 0.5]) {
            slot.transmission = tau;
        }

        let at_height = interpolate_to_height(&modtran.points[0], -1.0);
        assert_eq!(at_height[0], 0.9);
    }

    #[test]
    fn idw_at_cell_center_averages_equidistant_vertices() {
        let grid = synthetic_grid(2, 2);
        let modtran = uniform_modtran(&grid, 0.0, 0.0, 0.0);
        let interpolator = PixelInterpolator::new(&grid, &modtran);

        let at_height = [[1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [3.0, 0.0, 0.0], [4.0, 0.0, 0.0]];
        let center_x = 305_000.0;
        let center_y = 4_505_000.0;

        let parameters =
            interpolator.interpolate_to_location([0, 2, 3, 1], &at_height, center_x, center_y);
        assert_relative_eq!(parameters[0], 2.5, epsilon = 1e-12);
    }

    #[test]
    fn idw_exact_vertex_hit_returns_vertex_values() {
        let grid = synthetic_grid(2, 2);
        let modtran = uniform_modtran(&grid, 0.0, 0.0, 0.0);
        let interpolator = PixelInterpolator::new(&grid, &modtran);

        let at_height = [[1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [3.0, 0.0, 0.0], [4.0, 0.0, 0.0]];
        let parameters = interpolator.interpolate_to_location(
            [0, 2, 3, 1],
            &at_height,
            300_000.0,
            4_500_000.0,
        );
        assert_eq!(parameters[0], 1.0);
    }

    #[test]
    fn uniform_grid_yields_uniform_pixels() {
        let grid = synthetic_grid(3, 3);
        let modtran = uniform_modtran(&grid, 0.8, 0.05, 0.12);
        let meta = scene_inside_mesh(4, 4);
        let geolocation = AffineGeolocation { meta: meta.clone() };

        let thermal = vec![10.0f32; meta.pixel_count()];
        let elevation = vec![500i16; meta.pixel_count()];

        let bands =
            calculate_pixel_parameters(&meta, &grid, &modtran, &geolocation, &thermal, &elevation)
                .unwrap();

        for pixel in 0..meta.pixel_count() {
            assert_relative_eq!(bands.transmittance[pixel] as f64, 0.8, epsilon = 1e-6);
            assert_relative_eq!(bands.upwelled[pixel] as f64, 0.05 * 1e4, epsilon = 1e-3);
            assert_relative_eq!(bands.downwelled[pixel] as f64, 0.12 * 1e4, epsilon = 1e-3);
        }
    }

    #[test]
    fn no_data_pixels_stay_no_data() {
        let grid = synthetic_grid(3, 3);
        let modtran = uniform_modtran(&grid, 0.8, 0.05, 0.12);
        let meta = scene_inside_mesh(2, 2);
        let geolocation = AffineGeolocation { meta: meta.clone() };

        let mut thermal = vec![10.0f32; meta.pixel_count()];
        thermal[1] = NO_DATA_VALUE;
        let elevation = vec![0i16; meta.pixel_count()];

        let bands =
            calculate_pixel_parameters(&meta, &grid, &modtran, &geolocation, &thermal, &elevation)
                .unwrap();

        assert_eq!(bands.transmittance[1], NO_DATA_VALUE);
        assert_eq!(bands.upwelled[1], NO_DATA_VALUE);
        assert_eq!(bands.downwelled[1], NO_DATA_VALUE);
        assert_ne!(bands.transmittance[0], NO_DATA_VALUE);
    }

    #[test]
    fn corner_center_still_finds_its_quadrant() {
        let grid = synthetic_grid(3, 3);
        let modtran = uniform_modtran(&grid, 0.6, 0.02, 0.03);
        let interpolator = PixelInterpolator::new(&grid, &modtran);

        // Pixel just inside the mesh corner: the center is point 0 and only
        // the upper-right quadrant is complete
        let (lon, lat) = (-94.99, 40.01);
        let items = interpolator.neighborhood(0, lon, lat);
        let vertices = interpolator.select_cell(&items).unwrap();
        assert_eq!(vertices, [0, 3, 4, 1]);
    }

    #[test]
    fn single_row_mesh_has_no_complete_cell() {
        let grid = synthetic_grid(1, 5);
        let modtran = uniform_modtran(&grid, 0.6, 0.02, 0.03);
        let interpolator = PixelInterpolator::new(&grid, &modtran);

        let items = interpolator.neighborhood(2, -94.8, 40.0);
        assert!(interpolator.select_cell(&items).is_none());
    }
}
