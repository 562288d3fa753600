//! Atmospheric-parameter generation for Landsat surface temperature
//! processing.
//!
//! MODTRAN radiative-transfer outputs, tabulated at a sparse grid of
//! latitude, longitude and elevation, are collapsed into per-point
//! (transmission, upwelled radiance, downwelled radiance) triples and then
//! interpolated to every valid thermal pixel of the scene.

pub mod error;
pub mod grid;
pub mod interpolate;
pub mod numerics;
pub mod raster;
pub mod reducer;
pub mod scene;
pub mod spectral;

pub use error::{Result, StError};
