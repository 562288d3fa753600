//! Point-level reducer.
//!
//! For every grid point that ran MODTRAN, and every configured elevation,
//! the three tabulated MODTRAN runs (273 K / albedo 0.0, 310 K / 0.0,
//! 0 K / 0.1) are convolved with the sensor's spectral response and collapsed
//! into atmospheric transmission, upwelled radiance, and downwelled radiance.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::error::{Result, StError};
use crate::grid::{ModtranPoint, ModtranPoints};
use crate::numerics::{integrate_tabulated, planck_radiance};
use crate::spectral::SpectralResponse;

/// Emissivity of a water body in the thermal band.
pub const WATER_EMISSIVITY: f64 = 0.98988;
const INV_WATER_ALBEDO: f64 = 1.0 / (1.0 - WATER_EMISSIVITY);

/// The three MODTRAN runs per elevation, as (temperature K, albedo) pairs.
/// Radiances land in matrix columns 1, 2, 3 in this order.
const RUN_TEMPERATURES: [i32; 3] = [273, 310, 0];
const RUN_ALBEDOS: [f64; 3] = [0.0, 0.0, 0.1];

/// Band-integrated blackbody radiance at `temperature`, weighted by the
/// spectral response: integral of B(lambda, T) R(lambda) over the band,
/// normalized by the integral of R.
pub fn band_integrated_blackbody(response: &SpectralResponse, temperature: f64) -> Result<f64> {
    let rs_integral = integrate_tabulated(&response.wavelengths, &response.values)?;

    let blackbody = planck_radiance(&response.wavelengths, temperature);
    let product: Vec<f64> = blackbody
        .iter()
        .zip(&response.values)
        .map(|(radiance, weight)| radiance * weight)
        .collect();
    let band_integral = integrate_tabulated(&response.wavelengths, &product)?;

    Ok(band_integral / rs_integral)
}

/// Band-integrated observed radiance for one radiance column of the MODTRAN
/// matrix, after resampling it onto the response wavelengths.
pub fn band_integrated_observed(
    matrix: &[[f64; 4]],
    response: &SpectralResponse,
    column: usize,
) -> Result<f64> {
    let rs_integral = integrate_tabulated(&response.wavelengths, &response.values)?;

    let resampled = interpolate_modtran_column(matrix, column, &response.wavelengths);
    let product: Vec<f64> = resampled
        .iter()
        .zip(&response.values)
        .map(|(radiance, weight)| radiance * weight)
        .collect();
    let band_integral = integrate_tabulated(&response.wavelengths, &product)?;

    Ok(band_integral / rs_integral)
}

/// Piecewise-linear resample of MODTRAN column `column` onto `targets`.
///
/// Matrix rows are ordered by decreasing wavelength. A target with no
/// bracketing interval extrapolates from the last two rows.
fn interpolate_modtran_column(matrix: &[[f64; 4]], column: usize, targets: &[f64]) -> Vec<f64> {
    let n = matrix.len();

    targets
        .iter()
        .map(|&target| {
            let mut lo = n - 2;
            for i in 0..n - 1 {
                if target <= matrix[i][0] && target > matrix[i + 1][0] {
                    lo = i;
                    break;
                }
            }

            let (g1, d1) = (matrix[lo][0], matrix[lo][column]);
            let (g2, d2) = (matrix[lo + 1][0], matrix[lo + 1][column]);

            d1 + (target - g1) / (g2 - g1) * (d2 - d1)
        })
        .collect()
}

/// Solve the two-run linear system Lobs = Lt * tau + Lu for (tau, Lu).
pub fn solve_transmission(
    lobs_273: f64,
    lobs_310: f64,
    lt_273: f64,
    lt_310: f64,
) -> (f64, f64) {
    let delta_radiance_inv = 1.0 / (lt_310 - lt_273);

    let tau = (lobs_310 - lobs_273) * delta_radiance_inv;
    let lu = (lt_310 * lobs_273 - lt_273 * lobs_310) * delta_radiance_inv;

    (tau, lu)
}

/// Downwelled radiance via the water-body inversion:
/// Ld = ((Lobs - Lu) / tau - Lt * eps_w) / (1 - eps_w).
pub fn downwelled_radiance(lobs_zero: f64, lu: f64, tau: f64, lt_zero: f64) -> f64 {
    ((lobs_zero - lu) / tau - lt_zero * WATER_EMISSIVITY) * INV_WATER_ALBEDO
}

#[derive(Debug, Clone, Copy)]
struct RunHeader {
    /// Ground-surface temperature of the 0 K / albedo 0.1 run, K
    zero_temp: f64,
    /// Number of tabulated radiance records in each of the three runs
    record_count: usize,
}

/// Parse an `st_modtran.hdr` file:
/// `TARGET_PIXEL_SURFACE_TEMPERATURE <K>` then `RADIANCE_RECORD_COUNT <n>`.
fn read_run_header(path: &Path) -> Result<RunHeader> {
    let contents = fs::read_to_string(path).map_err(|e| StError::read(path, e))?;
    let mut lines = contents.lines();

    let mut second_field = |name: &str| -> Result<String> {
        lines
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .map(str::to_owned)
            .ok_or_else(|| StError::malformed(path, format!("missing {name}")))
    };

    let zero_temp: f64 = second_field("TARGET_PIXEL_SURFACE_TEMPERATURE")?
        .parse()
        .map_err(|_| StError::malformed(path, "bad surface temperature"))?;
    let record_count: usize = second_field("RADIANCE_RECORD_COUNT")?
        .parse()
        .map_err(|_| StError::malformed(path, "bad radiance record count"))?;

    if record_count < 2 {
        return Err(StError::malformed(
            path,
            format!("radiance record count {record_count} is too small to interpolate"),
        ));
    }

    Ok(RunHeader {
        zero_temp,
        record_count,
    })
}

/// Read one run's wavelength/radiance pairs into matrix column `column`;
/// the wavelength column is taken from the first run.
fn read_run_data(path: &Path, matrix: &mut [[f64; 4]], column: usize) -> Result<()> {
    let contents = fs::read_to_string(path).map_err(|e| StError::read(path, e))?;

    let mut row = 0;
    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if row == matrix.len() {
            break;
        }

        let mut fields = line.split_whitespace();
        let wavelength: f64 = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| StError::malformed(path, format!("row {row}: bad wavelength")))?;
        let radiance: f64 = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| StError::malformed(path, format!("row {row}: bad radiance")))?;

        if column == 1 {
            matrix[row][0] = wavelength;
        }
        matrix[row][column] = radiance;
        row += 1;
    }

    if row < matrix.len() {
        return Err(StError::malformed(
            path,
            format!("expected {} radiance records, found {}", matrix.len(), row),
        ));
    }

    Ok(())
}

/// MODTRAN files tabulate wavelengths in decreasing order; reverse the rows
/// once if this tree was written the other way around.
fn ensure_descending(matrix: &mut [[f64; 4]]) {
    if matrix.len() >= 2 && matrix[0][0] < matrix[matrix.len() - 1][0] {
        matrix.reverse();
    }
}

fn point_directory(point: &ModtranPoint) -> String {
    format!(
        "{:03}_{:03}_{:03}_{:03}",
        point.row, point.col, point.narr_row, point.narr_col
    )
}

fn run_path(
    base_dir: &Path,
    point: &ModtranPoint,
    directory_tag: f64,
    temperature: i32,
    albedo: f64,
    file: &str,
) -> PathBuf {
    base_dir
        .join(point_directory(point))
        .join(format!("{directory_tag:.3}"))
        .join(format!("{temperature:03}"))
        .join(format!("{albedo:.1}"))
        .join(file)
}

/// Fill the elevation slots of every point that ran MODTRAN.
///
/// Points are independent, so the loop is sharded across cores; Lt(273) and
/// Lt(310) depend only on the response and are computed once per scene.
pub fn calculate_point_parameters(
    base_dir: &Path,
    response: &SpectralResponse,
    points: &mut ModtranPoints,
) -> Result<()> {
    let lt_273 = band_integrated_blackbody(response, 273.0)?;
    let lt_310 = band_integrated_blackbody(response, 310.0)?;

    log::info!(
        "Reducing MODTRAN output for {} grid points",
        points.points.iter().filter(|p| p.ran_modtran).count()
    );

    points
        .points
        .par_iter_mut()
        .filter(|point| point.ran_modtran)
        .try_for_each(|point| reduce_point(base_dir, response, lt_273, lt_310, point))
}

fn reduce_point(
    base_dir: &Path,
    response: &SpectralResponse,
    lt_273: f64,
    lt_310: f64,
    point: &mut ModtranPoint,
) -> Result<()> {
    log::debug!("Reducing point {}", point_directory(point));

    // Record counts vary per elevation; the matrix grows to the high-water
    // mark and is reused across elevations.
    let mut matrix: Vec<[f64; 4]> = Vec::new();

    for slot_index in 0..point.elevations.len() {
        let directory_tag = point.elevations[slot_index].elevation_directory;

        let header_path = run_path(base_dir, point, directory_tag, 0, 0.1, "st_modtran.hdr");
        let header = read_run_header(&header_path)?;

        if header.record_count > matrix.len() {
            matrix
                .try_reserve(header.record_count - matrix.len())
                .map_err(|_| StError::ResourceExhausted("MODTRAN radiance matrix"))?;
            matrix.resize(header.record_count, [0.0; 4]);
        }
        let rows = &mut matrix[..header.record_count];

        for (run, (&temperature, &albedo)) in
            RUN_TEMPERATURES.iter().zip(&RUN_ALBEDOS).enumerate()
        {
            let data_path = run_path(
                base_dir,
                point,
                directory_tag,
                temperature,
                albedo,
                "st_modtran.data",
            );
            read_run_data(&data_path, rows, run + 1)?;
        }
        ensure_descending(rows);

        let lobs_273 = band_integrated_observed(rows, response, 1)?;
        let lobs_310 = band_integrated_observed(rows, response, 2)?;
        let (tau, lu) = solve_transmission(lobs_273, lobs_310, lt_273, lt_310);

        let lt_zero = band_integrated_blackbody(response, header.zero_temp)?;
        let lobs_zero = band_integrated_observed(rows, response, 3)?;
        let ld = downwelled_radiance(lobs_zero, lu, tau, lt_zero);

        let slot = &mut point.elevations[slot_index];
        slot.transmission = tau;
        slot.upwelled_radiance = lu;
        slot.downwelled_radiance = ld;
    }

    Ok(())
}

/// Record which points fed the interpolation, for plotting against the
/// scene: `"index"|"map_x"|"map_y"`, one row per used point.
pub fn write_used_points(dir: &Path, points: &ModtranPoints) -> Result<()> {
    let path = dir.join("used_points.txt");
    let file = fs::File::create(&path).map_err(|e| StError::write(&path, e))?;
    let mut writer = BufWriter::new(file);

    for (index, point) in points
        .points
        .iter()
        .enumerate()
        .filter(|(_, p)| p.ran_modtran)
    {
        writeln!(
            writer,
            "\"{}\"|\"{:.6}\"|\"{:.6}\"",
            index, point.map_x, point.map_y
        )
        .map_err(|e| StError::write(&path, e))?;
    }

    writer.flush().map_err(|e| StError::write(&path, e))
}

/// Write the reduced parameter table, one row per (point, elevation):
/// `lat,lon,elevation_km,tau,Lu,Ld`.
pub fn write_point_parameters(dir: &Path, points: &ModtranPoints) -> Result<()> {
    let path = dir.join("atmospheric_parameters.txt");
    log::info!("Creating atmospheric parameters file [{}]", path.display());

    let file = fs::File::create(&path).map_err(|e| StError::write(&path, e))?;
    let mut writer = BufWriter::new(file);

    for point in points.points.iter().filter(|p| p.ran_modtran) {
        for slot in &point.elevations {
            writeln!(
                writer,
                "{:.6},{:.6},{:12.9},{:12.9},{:12.9},{:12.9}",
                point.lat,
                point.lon,
                slot.elevation,
                slot.transmission,
                slot.upwelled_radiance,
                slot.downwelled_radiance
            )
            .map_err(|e| StError::write(&path, e))?;
        }
    }

    writer.flush().map_err(|e| StError::write(&path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn linear_matrix(descending: bool) -> Vec<[f64; 4]> {
        // Radiance columns linear in wavelength, so every interpolation and
        // extrapolation is exact
        let mut rows: Vec<[f64; 4]> = (0..20)
            .map(|i| {
                let w = 14.0 - i as f64 * 0.25;
                [w, 2.0 * w + 1.0, -0.5 * w + 3.0, 0.1 * w]
            })
            .collect();
        if !descending {
            rows.reverse();
        }
        rows
    }

    #[test]
    fn recovers_tau_and_lu() {
        let (tau_in, lu_in) = (0.7, 0.3);
        let (lt_273, lt_310) = (2.0, 5.0);
        let lobs_273 = lt_273 * tau_in + lu_in;
        let lobs_310 = lt_310 * tau_in + lu_in;

        let (tau, lu) = solve_transmission(lobs_273, lobs_310, lt_273, lt_310);
        assert_relative_eq!(tau, tau_in, epsilon = 1e-10);
        assert_relative_eq!(lu, lu_in, epsilon = 1e-10);
    }

    #[test]
    fn downwelled_water_inversion() {
        let ld = downwelled_radiance(1.0, 0.3, 0.7, 0.0);
        assert_relative_eq!(ld, 98.81, epsilon = 0.1);
    }

    #[test]
    fn modtran_resample_is_exact_on_linear_data() {
        let matrix = linear_matrix(true);

        // In range, at a sample, below range, above range
        let targets = [11.3, 12.5, 8.0, 15.0];
        let values = interpolate_modtran_column(&matrix, 1, &targets);

        for (&target, &value) in targets.iter().zip(&values) {
            assert_relative_eq!(value, 2.0 * target + 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn ascending_input_is_reversed_once() {
        let mut ascending = linear_matrix(false);
        ensure_descending(&mut ascending);
        assert_eq!(ascending, linear_matrix(true));

        let mut descending = linear_matrix(true);
        ensure_descending(&mut descending);
        assert_eq!(descending, linear_matrix(true));
    }

    #[test]
    fn blackbody_at_zero_kelvin_integrates_to_zero() {
        let wavelengths: Vec<f64> = (0..40).map(|i| 10.0 + i as f64 * 0.1).collect();
        let values = vec![0.8; 40];
        let response = SpectralResponse {
            wavelengths,
            values,
        };

        let lt = band_integrated_blackbody(&response, 0.0).unwrap();
        assert_eq!(lt, 0.0);
    }

    #[test]
    fn parses_run_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("st_modtran.hdr");
        fs::write(
            &path,
            "TARGET_PIXEL_SURFACE_TEMPERATURE 284.149994\nRADIANCE_RECORD_COUNT 4299\n",
        )
        .unwrap();

        let header = read_run_header(&path).unwrap();
        assert_relative_eq!(header.zero_temp, 284.149994);
        assert_eq!(header.record_count, 4299);
    }

    #[test]
    fn rejects_truncated_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("st_modtran.hdr");
        fs::write(&path, "TARGET_PIXEL_SURFACE_TEMPERATURE 284.15\n").unwrap();

        assert!(read_run_header(&path).is_err());
    }

    #[test]
    fn rejects_short_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("st_modtran.data");
        fs::write(&path, "12.0 0.5\n11.0 0.4\n").unwrap();

        let mut matrix = vec![[0.0; 4]; 3];
        assert!(read_run_data(&path, &mut matrix, 1).is_err());
    }
}
