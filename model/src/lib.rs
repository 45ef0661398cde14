//! Bluetooth observations of devices moving past fixed stations, grouped into sequences and cut
//! into trips.

#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod loader;
mod observation;
pub mod preprocess;
mod segmentation;
mod sequence;
mod station;

pub use self::loader::{load_raw_observations, LoadStats, RawFile};
pub use self::observation::{BTObservation, DeviceID};
pub use self::preprocess::{preprocess, PreprocessConfig, PreprocessOutput};
pub use self::segmentation::{check_segmented, segment, SegmentationConfig, SegmentationStats};
pub use self::sequence::{read_sequences, write_sequences, ObservationSequence};
pub use self::station::{
    read_stations, register_station, shared_locations, station_boundary, write_stations,
    BTStation, StationID, Stations,
};
