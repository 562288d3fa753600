//! The NARR grid-point store.
//!
//! The upstream grid generator leaves two files in the working directory:
//! `grid_points.hdr` (count, rows, cols as ASCII integers, one per line) and
//! `grid_points.bin` (packed little-endian records).

use std::fs;
use std::path::Path;

use crate::error::{Result, StError};

/// Fixed record size of `grid_points.bin`: six i32 fields followed by four
/// f64 fields (index, row, col, narr_row, narr_col, run_modtran; lon, lat,
/// map_x, map_y).
pub const GRID_POINT_RECORD_SIZE: usize = 56;

/// One point of the structured lat/lon mesh.
#[derive(Debug, Clone, Copy)]
pub struct GridPoint {
    /// Flat index, equal to row * cols + col
    pub index: usize,
    /// Mesh position, 0-based
    pub row: usize,
    pub col: usize,
    /// Upstream NARR identifiers
    pub narr_row: i32,
    pub narr_col: i32,
    /// Geographic coordinates in decimal degrees
    pub lon: f64,
    pub lat: f64,
    /// Projected coordinates in the scene's projection, meters
    pub map_x: f64,
    pub map_y: f64,
    /// Whether MODTRAN was executed for this point
    pub run_modtran: bool,
}

/// The full mesh, a regular rows x cols grid in flat index order.
#[derive(Debug, Clone)]
pub struct GridPoints {
    pub rows: usize,
    pub cols: usize,
    pub points: Vec<GridPoint>,
}

impl GridPoints {
    /// Load the grid header and binary records from `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let (count, rows, cols) = Self::load_header(&dir.join("grid_points.hdr"))?;

        let bin_path = dir.join("grid_points.bin");
        let raw = fs::read(&bin_path).map_err(|e| StError::read(&bin_path, e))?;

        if raw.len() != count * GRID_POINT_RECORD_SIZE {
            return Err(StError::malformed(
                &bin_path,
                format!(
                    "expected {} records of {} bytes, file holds {} bytes",
                    count,
                    GRID_POINT_RECORD_SIZE,
                    raw.len()
                ),
            ));
        }

        let mut points = Vec::with_capacity(count);
        for (position, record) in raw.chunks_exact(GRID_POINT_RECORD_SIZE).enumerate() {
            let point = GridPoint::from_record(record);

            if point.index != position {
                return Err(StError::malformed(
                    &bin_path,
                    format!("record {} carries index {}", position, point.index),
                ));
            }

            points.push(point);
        }

        log::info!("Loaded {} grid points ({} rows x {} cols)", count, rows, cols);

        Ok(GridPoints { rows, cols, points })
    }

    fn load_header(path: &Path) -> Result<(usize, usize, usize)> {
        let contents = fs::read_to_string(path).map_err(|e| StError::read(path, e))?;

        let mut fields = contents.split_whitespace().map(|f| f.parse::<usize>());
        let mut next = |name: &str| {
            fields
                .next()
                .and_then(|f| f.ok())
                .ok_or_else(|| StError::malformed(path, format!("missing or bad {name}")))
        };

        let count = next("count")?;
        let rows = next("rows")?;
        let cols = next("cols")?;

        if count == 0 || count != rows * cols {
            return Err(StError::malformed(
                path,
                format!("count {count} does not equal rows {rows} x cols {cols}, or is empty"),
            ));
        }

        Ok((count, rows, cols))
    }

    pub fn count(&self) -> usize {
        self.points.len()
    }
}

impl GridPoint {
    fn from_record(record: &[u8]) -> Self {
        let i32_at = |offset: usize| {
            i32::from_le_bytes(record[offset..offset + 4].try_into().unwrap())
        };
        let f64_at = |offset: usize| {
            f64::from_le_bytes(record[offset..offset + 8].try_into().unwrap())
        };

        GridPoint {
            index: i32_at(0) as usize,
            row: i32_at(4) as usize,
            col: i32_at(8) as usize,
            narr_row: i32_at(12),
            narr_col: i32_at(16),
            run_modtran: i32_at(20) != 0,
            lon: f64_at(24),
            lat: f64_at(32),
            map_x: f64_at(40),
            map_y: f64_at(48),
        }
    }
}
