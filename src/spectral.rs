//! Sensor-specific spectral response functions.
//!
//! The response tables live under `ST_DATA_DIR` as two-column
//! wavelength/response text files, one per supported sensor.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, StError};

/// Upper bound on the per-sensor response table length.
pub const MAX_SRS_COUNT: usize = 420;

const L4_TM_SRS_COUNT: usize = 161;
const L5_TM_SRS_COUNT: usize = 171;
const L7_ETM_SRS_COUNT: usize = 249;
const L8_OLITIRS_SRS_COUNT: usize = 101;

/// Supported Landsat thermal sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensor {
    Landsat4Tm,
    Landsat5Tm,
    Landsat7Etm,
    Landsat8OliTirs,
}

impl Sensor {
    /// Dispatch on the scene's instrument and satellite codes.
    pub fn from_codes(instrument: &str, satellite: &str) -> Result<Self> {
        match (instrument, satellite) {
            ("TM", "LANDSAT_4") => Ok(Sensor::Landsat4Tm),
            ("TM", "LANDSAT_5") => Ok(Sensor::Landsat5Tm),
            ("ETM", "LANDSAT_7") => Ok(Sensor::Landsat7Etm),
            ("OLI_TIRS", "LANDSAT_8") => Ok(Sensor::Landsat8OliTirs),
            _ => Err(StError::Domain(format!(
                "unsupported instrument/satellite combination: {instrument}/{satellite}"
            ))),
        }
    }

    /// Number of rows in this sensor's response table.
    pub fn response_count(self) -> usize {
        match self {
            Sensor::Landsat4Tm => L4_TM_SRS_COUNT,
            Sensor::Landsat5Tm => L5_TM_SRS_COUNT,
            Sensor::Landsat7Etm => L7_ETM_SRS_COUNT,
            Sensor::Landsat8OliTirs => L8_OLITIRS_SRS_COUNT,
        }
    }

    fn response_filename(self) -> &'static str {
        match self {
            Sensor::Landsat4Tm => "L4_Spectral_Response.txt",
            Sensor::Landsat5Tm => "L5_Spectral_Response.txt",
            Sensor::Landsat7Etm => "L7_Spectral_Response.txt",
            Sensor::Landsat8OliTirs => "L8_Spectral_Response.txt",
        }
    }
}

/// A sensor's per-wavelength sensitivity, ordered by strictly increasing
/// wavelength in microns.
#[derive(Debug, Clone)]
pub struct SpectralResponse {
    pub wavelengths: Vec<f64>,
    pub values: Vec<f64>,
}

impl SpectralResponse {
    /// Load the response for `sensor` from `ST_DATA_DIR`.
    pub fn load(sensor: Sensor) -> Result<Self> {
        let data_dir = env::var("ST_DATA_DIR").map_err(|_| StError::MissingEnv("ST_DATA_DIR"))?;
        let path = PathBuf::from(data_dir).join(sensor.response_filename());

        log::info!("Reading spectral response file [{}]", path.display());
        Self::from_file(&path, sensor.response_count())
    }

    /// Parse a two-column whitespace-separated response table holding
    /// exactly `expected` rows.
    pub fn from_file(path: &Path, expected: usize) -> Result<Self> {
        if expected == 0 || expected > MAX_SRS_COUNT {
            return Err(StError::Domain(format!(
                "response table length {expected} outside 1..={MAX_SRS_COUNT}"
            )));
        }

        let contents = fs::read_to_string(path).map_err(|e| StError::read(path, e))?;

        let mut wavelengths = Vec::with_capacity(expected);
        let mut values = Vec::with_capacity(expected);

        for (lineno, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }

            let mut fields = line.split_whitespace();
            let wavelength = fields
                .next()
                .and_then(|f| f.parse::<f64>().ok())
                .ok_or_else(|| {
                    StError::malformed(path, format!("line {}: bad wavelength", lineno + 1))
                })?;
            let value = fields
                .next()
                .and_then(|f| f.parse::<f64>().ok())
                .ok_or_else(|| {
                    StError::malformed(path, format!("line {}: bad response value", lineno + 1))
                })?;

            wavelengths.push(wavelength);
            values.push(value);
        }

        if wavelengths.len() != expected {
            return Err(StError::malformed(
                path,
                format!("expected {} response rows, found {}", expected, wavelengths.len()),
            ));
        }

        if !wavelengths.windows(2).all(|w| w[0] < w[1]) {
            return Err(StError::malformed(
                path,
                "wavelengths are not strictly increasing",
            ));
        }

        Ok(SpectralResponse {
            wavelengths,
            values,
        })
    }

    pub fn len(&self) -> usize {
        self.wavelengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelengths.is_empty()
    }
}
