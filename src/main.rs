use std::path::{Path, PathBuf};

use clap::Parser;
use env_logger::Env;

use st_atmospheric_parameters::error::Result;
use st_atmospheric_parameters::grid::{GridPoints, ModtranPoints};
use st_atmospheric_parameters::interpolate;
use st_atmospheric_parameters::raster;
use st_atmospheric_parameters::reducer;
use st_atmospheric_parameters::scene::{self, GeolocationBands, SceneMetadata};
use st_atmospheric_parameters::spectral::SpectralResponse;

/// Generates interpolated atmospheric parameters covering the scene data.
///
/// Must run from the directory where the input data is located.
#[derive(Debug, Parser)]
#[command(name = "st_atmospheric_parameters")]
struct Args {
    /// Name of the input XML metadata file
    #[arg(long)]
    xml: PathBuf,

    /// Generate debug output
    #[arg(long)]
    debug: bool,
}

fn main() {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    if let Err(error) = run(&args) {
        log::error!("{error}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let working_dir = Path::new(".");

    let meta = SceneMetadata::load(&args.xml)?;
    let sensor = meta.sensor()?;
    let response = SpectralResponse::load(sensor)?;

    let grid = GridPoints::load(working_dir)?;
    let mut modtran = ModtranPoints::initialize(&grid, working_dir)?;

    reducer::write_used_points(working_dir, &modtran)?;
    reducer::calculate_point_parameters(working_dir, &response, &mut modtran)?;
    reducer::write_point_parameters(working_dir, &modtran)?;

    let pixel_count = meta.pixel_count();
    let thermal =
        raster::read_f32_band(&working_dir.join(&meta.thermal_radiance_band), pixel_count)?;
    let elevation =
        raster::read_i16_band(&working_dir.join(&meta.elevation_band), pixel_count)?;
    let geolocation = GeolocationBands::load(working_dir, &meta)?;

    let bands = interpolate::calculate_pixel_parameters(
        &meta,
        &grid,
        &modtran,
        &geolocation,
        &thermal,
        &elevation,
    )?;

    let files = raster::write_intermediate(working_dir, &thermal, &bands)?;
    scene::write_band_registration(working_dir, &meta, &files)?;

    log::info!("Atmospheric parameter generation complete");

    Ok(())
}
