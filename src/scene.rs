//! Scene-level collaborator boundaries: metadata, geolocation, and the
//! band-product registration hand-off.
//!
//! Parsing the Landsat XML itself is the metadata collaborator's job; the
//! upstream pipeline step materializes a JSON companion next to the XML
//! (same stem, `.json` extension) with exactly the scene facts this tool
//! needs. The XML update for the new bands is likewise delegated: this tool
//! emits `st_intermediate_bands.json` for the downstream updater to fold in.

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StError};
use crate::raster;
use crate::spectral::Sensor;

#[derive(Debug, Clone, Deserialize)]
pub struct SceneMetadata {
    pub satellite: String,
    pub instrument: String,
    pub lines: usize,
    pub samples: usize,
    /// Upper-left map corner of the reference band, meters
    pub ul_map_x: f64,
    pub ul_map_y: f64,
    /// Pixel size, meters
    pub x_pixel_size: f64,
    pub y_pixel_size: f64,
    /// Band the outputs are registered to
    pub reference_band: String,
    /// Per-pixel input band files, relative to the working directory
    pub thermal_radiance_band: String,
    pub elevation_band: String,
    pub latitude_band: String,
    pub longitude_band: String,
}

impl SceneMetadata {
    /// Load the JSON companion of `xml_path`.
    pub fn load(xml_path: &Path) -> Result<Self> {
        let companion = xml_path.with_extension("json");

        log::info!("Reading scene metadata [{}]", companion.display());
        let file = fs::File::open(&companion).map_err(|e| StError::read(&companion, e))?;
        let reader = BufReader::new(file);

        let meta: SceneMetadata = serde_json::from_reader(reader)
            .map_err(|e| StError::malformed(&companion, e.to_string()))?;

        if meta.lines == 0 || meta.samples == 0 {
            return Err(StError::malformed(&companion, "empty scene dimensions"));
        }

        Ok(meta)
    }

    pub fn sensor(&self) -> Result<Sensor> {
        Sensor::from_codes(&self.instrument, &self.satellite)
    }

    pub fn pixel_count(&self) -> usize {
        self.lines * self.samples
    }

    /// Northing of the pixel centers on `line`.
    pub fn northing(&self, line: usize) -> f64 {
        self.ul_map_y - line as f64 * self.y_pixel_size
    }

    /// Easting of the pixel centers at `sample`.
    pub fn easting(&self, sample: usize) -> f64 {
        self.ul_map_x + sample as f64 * self.x_pixel_size
    }
}

/// Maps image coordinates to geographic coordinates.
///
/// Keeps all map-projection math outside this tool: the production
/// implementation reads latitude/longitude bands the upstream geolocation
/// step precomputed for the scene.
pub trait Geolocation {
    /// Geographic coordinates (lon, lat) in decimal degrees for the pixel at
    /// (line, sample).
    fn lon_lat(&self, line: usize, sample: usize) -> Result<(f64, f64)>;
}

/// Geolocation backed by per-pixel latitude and longitude bands.
pub struct GeolocationBands {
    longitude: Vec<f64>,
    latitude: Vec<f64>,
    samples: usize,
}

impl GeolocationBands {
    pub fn load(dir: &Path, meta: &SceneMetadata) -> Result<Self> {
        let pixel_count = meta.pixel_count();
        let longitude = raster::read_f64_band(&dir.join(&meta.longitude_band), pixel_count)?;
        let latitude = raster::read_f64_band(&dir.join(&meta.latitude_band), pixel_count)?;

        Ok(GeolocationBands {
            longitude,
            latitude,
            samples: meta.samples,
        })
    }
}

impl Geolocation for GeolocationBands {
    fn lon_lat(&self, line: usize, sample: usize) -> Result<(f64, f64)> {
        let index = line * self.samples + sample;
        match (self.longitude.get(index), self.latitude.get(index)) {
            (Some(&lon), Some(&lat)) => Ok((lon, lat)),
            _ => Err(StError::Domain(format!(
                "geolocation lookup outside scene at line {line}, sample {sample}"
            ))),
        }
    }
}

#[derive(Debug, Serialize)]
struct BandProduct<'a> {
    product: &'static str,
    band: &'static str,
    long_name: &'static str,
    file: &'a str,
    units: &'static str,
    reference_band: &'a str,
}

/// Hand the four new band products to the XML-updating collaborator.
pub fn write_band_registration(dir: &Path, meta: &SceneMetadata, files: &[PathBuf; 4]) -> Result<()> {
    const RADIANCE_UNITS: &str = "W/(m2 sr um)";

    let names = [
        ("st_intermediate", "st_thermal_radiance", "thermal band converted to radiance"),
        ("st_intermediate", "st_atmospheric_transmittance", "atmospheric transmittance"),
        ("st_intermediate", "st_upwelled_radiance", "upwelled radiance"),
        ("st_intermediate", "st_downwelled_radiance", "downwelled radiance"),
    ];

    let file_names: Vec<String> = files
        .iter()
        .map(|f| f.file_name().unwrap_or_default().to_string_lossy().into_owned())
        .collect();

    let products: Vec<BandProduct> = names
        .iter()
        .zip(&file_names)
        .map(|(&(product, band, long_name), file)| BandProduct {
            product,
            band,
            long_name,
            file,
            units: RADIANCE_UNITS,
            reference_band: &meta.reference_band,
        })
        .collect();

    let path = dir.join("st_intermediate_bands.json");
    let json = serde_json::to_string_pretty(&products)
        .map_err(|e| StError::malformed(&path, e.to_string()))?;
    fs::write(&path, json).map_err(|e| StError::write(&path, e))?;

    Ok(())
}
