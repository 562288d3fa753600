//! Flat-binary raster band I/O.
//!
//! All scene bands are headerless little-endian arrays of lines x samples
//! values, registered to the scene's reference band; the georeferencing
//! lives in the metadata, not in the band files.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, StError};

/// Sentinel for pixels with no valid data.
pub const NO_DATA_VALUE: f32 = -9999.0;

pub const THERMAL_RADIANCE_FILENAME: &str = "st_thermal_radiance.img";
pub const TRANSMITTANCE_FILENAME: &str = "st_atmospheric_transmittance.img";
pub const UPWELLED_FILENAME: &str = "st_upwelled_radiance.img";
pub const DOWNWELLED_FILENAME: &str = "st_downwelled_radiance.img";

fn read_exact_len(path: &Path, expected_bytes: usize) -> Result<Vec<u8>> {
    let raw = fs::read(path).map_err(|e| StError::read(path, e))?;
    if raw.len() != expected_bytes {
        return Err(StError::malformed(
            path,
            format!("expected {} bytes, file holds {}", expected_bytes, raw.len()),
        ));
    }
    Ok(raw)
}

pub fn read_f32_band(path: &Path, pixel_count: usize) -> Result<Vec<f32>> {
    let raw = read_exact_len(path, pixel_count * 4)?;
    Ok(raw
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
        .collect())
}

pub fn read_f64_band(path: &Path, pixel_count: usize) -> Result<Vec<f64>> {
    let raw = read_exact_len(path, pixel_count * 8)?;
    Ok(raw
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
        .collect())
}

/// Elevation bands are signed 16-bit meters.
pub fn read_i16_band(path: &Path, pixel_count: usize) -> Result<Vec<i16>> {
    let raw = read_exact_len(path, pixel_count * 2)?;
    Ok(raw
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes(c.try_into().unwrap()))
        .collect())
}

pub fn write_f32_band(path: &Path, data: &[f32]) -> Result<()> {
    let file = fs::File::create(path).map_err(|e| StError::write(path, e))?;
    let mut writer = BufWriter::new(file);

    for value in data {
        writer
            .write_all(&value.to_le_bytes())
            .map_err(|e| StError::write(path, e))?;
    }

    writer.flush().map_err(|e| StError::write(path, e))
}

/// The per-pixel interpolation outputs, one value per scene pixel.
#[derive(Debug)]
pub struct PixelBands {
    pub transmittance: Vec<f32>,
    pub upwelled: Vec<f32>,
    pub downwelled: Vec<f32>,
}

impl PixelBands {
    pub fn filled(pixel_count: usize) -> Self {
        PixelBands {
            transmittance: vec![NO_DATA_VALUE; pixel_count],
            upwelled: vec![NO_DATA_VALUE; pixel_count],
            downwelled: vec![NO_DATA_VALUE; pixel_count],
        }
    }
}

/// Stream the four intermediate bands to `dir`, returning the file names in
/// (thermal, transmittance, upwelled, downwelled) order.
pub fn write_intermediate(dir: &Path, thermal: &[f32], bands: &PixelBands) -> Result<[PathBuf; 4]> {
    let files = [
        (THERMAL_RADIANCE_FILENAME, thermal),
        (TRANSMITTANCE_FILENAME, bands.transmittance.as_slice()),
        (UPWELLED_FILENAME, bands.upwelled.as_slice()),
        (DOWNWELLED_FILENAME, bands.downwelled.as_slice()),
    ];

    let paths = files.map(|(name, _)| dir.join(name));
    for ((_, data), path) in files.iter().zip(&paths) {
        log::debug!("Writing intermediate band {}", path.display());
        write_f32_band(path, data)?;
    }

    Ok(paths)
}
