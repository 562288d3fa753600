//! The MODTRAN-point store: a mirror of the grid mesh with one slot per
//! configured elevation, filled in by the point-level reducer.

use std::fs;
use std::path::Path;

use crate::error::{Result, StError};
use crate::grid::points::GridPoints;

/// Upper bound on the configured elevation profile length.
pub const MAX_NUM_ELEVATIONS: usize = 16;

/// Atmospheric parameters at one (point, elevation).
#[derive(Debug, Clone, Copy, Default)]
pub struct ElevationSlot {
    /// Ground altitude of the MODTRAN run, km
    pub elevation: f64,
    /// Numeric tag naming the MODTRAN output subdirectory
    pub elevation_directory: f64,
    pub transmission: f64,
    pub upwelled_radiance: f64,
    pub downwelled_radiance: f64,
}

/// Mirror of one grid point, carrying its per-elevation results.
#[derive(Debug, Clone)]
pub struct ModtranPoint {
    pub row: usize,
    pub col: usize,
    pub narr_row: i32,
    pub narr_col: i32,
    pub lon: f64,
    pub lat: f64,
    pub map_x: f64,
    pub map_y: f64,
    pub ran_modtran: bool,
    pub elevations: Vec<ElevationSlot>,
}

#[derive(Debug, Clone)]
pub struct ModtranPoints {
    pub points: Vec<ModtranPoint>,
}

impl ModtranPoints {
    /// Allocate the mirror of `grid` and assign each point the elevation
    /// ladder from `modtran_elevations.txt`; the first slot of every point
    /// that ran MODTRAN is then overridden with its true ground elevation
    /// from `grid_elevations.txt`.
    pub fn initialize(grid: &GridPoints, dir: &Path) -> Result<Self> {
        let ladder = load_elevation_ladder(&dir.join("modtran_elevations.txt"))?;

        let mut points: Vec<ModtranPoint> = grid
            .points
            .iter()
            .map(|grid_point| ModtranPoint {
                row: grid_point.row,
                col: grid_point.col,
                narr_row: grid_point.narr_row,
                narr_col: grid_point.narr_col,
                lon: grid_point.lon,
                lat: grid_point.lat,
                map_x: grid_point.map_x,
                map_y: grid_point.map_y,
                ran_modtran: grid_point.run_modtran,
                elevations: ladder
                    .iter()
                    .map(|&elevation| ElevationSlot {
                        elevation,
                        elevation_directory: elevation,
                        ..ElevationSlot::default()
                    })
                    .collect(),
            })
            .collect();

        load_ground_elevations(&dir.join("grid_elevations.txt"), &mut points)?;

        Ok(ModtranPoints { points })
    }

    pub fn count(&self) -> usize {
        self.points.len()
    }
}

/// Read the configured elevation profile: a count line followed by one
/// elevation in km per line.
fn load_elevation_ladder(path: &Path) -> Result<Vec<f64>> {
    let contents = fs::read_to_string(path).map_err(|e| StError::read(path, e))?;
    let mut lines = contents.lines();

    let count: usize = lines
        .next()
        .and_then(|line| line.trim().parse().ok())
        .ok_or_else(|| StError::malformed(path, "missing or bad elevation count"))?;

    if count == 0 || count > MAX_NUM_ELEVATIONS {
        return Err(StError::malformed(
            path,
            format!("elevation count {count} outside 1..={MAX_NUM_ELEVATIONS}"),
        ));
    }

    let mut ladder = Vec::with_capacity(count);
    for _ in 0..count {
        let elevation: f64 = lines
            .next()
            .and_then(|line| line.trim().parse().ok())
            .ok_or_else(|| StError::malformed(path, "missing or bad elevation value"))?;
        ladder.push(elevation);
    }

    Ok(ladder)
}

/// Override slot 0 of each ran-MODTRAN point with the point's ground
/// elevation (given in meters) and its output-directory tag. The file order
/// matches the point order.
fn load_ground_elevations(path: &Path, points: &mut [ModtranPoint]) -> Result<()> {
    let contents = fs::read_to_string(path).map_err(|e| StError::read(path, e))?;
    let mut lines = contents.lines();

    for point in points.iter_mut().filter(|p| p.ran_modtran) {
        let line = lines
            .next()
            .ok_or_else(|| StError::malformed(path, "fewer lines than points that ran MODTRAN"))?;

        let mut fields = line.split_whitespace();
        let elevation_m: f64 = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| StError::malformed(path, "bad ground elevation"))?;
        let directory_tag: f64 = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| StError::malformed(path, "bad elevation directory tag"))?;

        let slot = &mut point.elevations[0];
        slot.elevation = elevation_m * 0.001;
        slot.elevation_directory = directory_tag;
    }

    Ok(())
}
