use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::station::{BTStation, StationID, Stations};

/// A hashed MAC address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceID(pub i64);

impl fmt::Display for DeviceID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One device staying within range of one station. Times are seconds since the Unix epoch.
#[derive(Clone, Debug, PartialEq)]
pub struct BTObservation {
    pub device: DeviceID,
    pub enter: i64,
    pub leave: i64,
    pub station: Arc<BTStation>,
    /// Who operates the station
    pub owner: String,
}

impl BTObservation {
    pub fn duration(&self) -> i64 {
        self.leave - self.enter
    }

    /// The order observations of one device are kept in.
    pub fn chronological_key(&self) -> (i64, i64) {
        (self.enter, self.leave)
    }

    /// Parses `enter leave station owner`. The device comes from the enclosing sequence.
    pub fn parse(device: DeviceID, record: &str, stations: &Stations) -> Result<Self> {
        let fields: Vec<&str> = record.split(' ').collect();
        if fields.len() != 4 {
            bail!("Bad observation record: {}", record);
        }
        let enter: i64 = fields[0]
            .parse()
            .map_err(|err| anyhow!("Bad enter time in {}: {}", record, err))?;
        let leave: i64 = fields[1]
            .parse()
            .map_err(|err| anyhow!("Bad leave time in {}: {}", record, err))?;
        let station = stations
            .get(&StationID(fields[2].to_string()))
            .ok_or_else(|| anyhow!("Observation {} refers to an unknown station", record))?
            .clone();
        Ok(Self {
            device,
            enter,
            leave,
            station,
            owner: fields[3].to_string(),
        })
    }
}

impl fmt::Display for BTObservation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.enter, self.leave, self.station.id, self.owner
        )
    }
}
