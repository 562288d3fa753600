pub mod modtran;
pub mod points;

pub use modtran::{ElevationSlot, ModtranPoint, ModtranPoints, MAX_NUM_ELEVATIONS};
pub use points::{GridPoint, GridPoints, GRID_POINT_RECORD_SIZE};
