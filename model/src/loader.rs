use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use abstutil::{prettyprint_usize, Timer};
use anyhow::Result;
use chrono::{NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

use network::Point;

use crate::observation::{BTObservation, DeviceID};
use crate::sequence::ObservationSequence;
use crate::station::{register_station, shared_locations, BTStation, StationID, Stations};

/// The contents of one raw observation file.
pub struct RawFile {
    pub name: String,
    pub contents: String,
}

/// Columns of the raw CSV files, in order.
#[derive(Deserialize)]
struct RawRecord {
    device: i64,
    time: String,
    // Seconds
    duration: i64,
    station: String,
    lat: f64,
    lon: f64,
    owner: String,
}

const NUM_COLUMNS: usize = 7;

/// Problems and quirks noticed while grouping raw observations into sequences.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadStats {
    pub sequences: usize,
    pub observations: usize,
    pub skipped_records: usize,
    /// Consecutive observations of one device that overlap in time
    pub wrong_order_pairs: usize,
    /// Overlapping pairs where the second observation ends before the first
    pub nested_pairs: usize,
    pub wrong_order_sequences: usize,
    /// Summed over devices: how many different stations saw each one
    pub unique_station_visits: usize,
    /// Seconds between consecutive, non-overlapping observations
    pub total_gap_time: i64,
    pub gaps: usize,
    pub shared_locations: usize,
}

impl LoadStats {
    pub fn absorb(&mut self, other: &LoadStats) {
        self.sequences += other.sequences;
        self.observations += other.observations;
        self.skipped_records += other.skipped_records;
        self.wrong_order_pairs += other.wrong_order_pairs;
        self.nested_pairs += other.nested_pairs;
        self.wrong_order_sequences += other.wrong_order_sequences;
        self.unique_station_visits += other.unique_station_visits;
        self.total_gap_time += other.total_gap_time;
        self.gaps += other.gaps;
        self.shared_locations = self.shared_locations.max(other.shared_locations);
    }

    pub fn describe(&self) {
        info!(
            "{} devices seen in {} observations, {} records skipped",
            prettyprint_usize(self.sequences),
            prettyprint_usize(self.observations),
            prettyprint_usize(self.skipped_records)
        );
        info!(
            "{} pairs of observations overlap ({} nested), across {} devices",
            prettyprint_usize(self.wrong_order_pairs),
            prettyprint_usize(self.nested_pairs),
            prettyprint_usize(self.wrong_order_sequences)
        );
        if self.sequences > 0 {
            info!(
                "Each device visits {} stations on average",
                self.unique_station_visits as f64 / self.sequences as f64
            );
        }
        if self.gaps > 0 {
            info!(
                "Average gap between observations is {}s",
                self.total_gap_time as f64 / self.gaps as f64
            );
        }
        if self.shared_locations > 0 {
            warn!(
                "{} locations have more than one station",
                self.shared_locations
            );
        }
    }
}

/// Parses raw observation files in parallel, then groups the observations per device into
/// chronologically sorted sequences numbered from `first_id`. New stations are added to
/// `stations`; a known station ID showing up somewhere else is an error.
pub fn load_raw_observations(
    files: Vec<RawFile>,
    stations: &mut Stations,
    first_id: u64,
    timer: &mut Timer,
) -> Result<(Vec<ObservationSequence>, LoadStats)> {
    timer.start("load raw observations");
    let shared_stations = Mutex::new(std::mem::take(stations));
    let results = timer.parallelize("parse raw observation files", files, |file| {
        parse_raw_file(&file, &shared_stations)
    });
    *stations = shared_stations
        .into_inner()
        .map_err(|_| anyhow!("A thread panicked while registering stations"))?;

    let mut stats = LoadStats::default();
    let mut per_device: BTreeMap<DeviceID, Vec<BTObservation>> = BTreeMap::new();
    for result in results {
        let (observations, skipped) = result?;
        stats.skipped_records += skipped;
        for ob in observations {
            per_device
                .entry(ob.device)
                .or_insert_with(Vec::new)
                .push(ob);
        }
    }

    let mut sequences = Vec::new();
    let mut used_stations = Stations::new();
    for (_, mut observations) in per_device {
        observations.sort_by_key(|ob| ob.chronological_key());
        stats.add_device(&observations);
        for ob in &observations {
            used_stations
                .entry(ob.station.id.clone())
                .or_insert_with(|| ob.station.clone());
        }
        sequences.push(ObservationSequence::new(
            first_id + sequences.len() as u64,
            observations,
        ));
    }
    for ids in shared_locations(&used_stations) {
        let ids: Vec<String> = ids.into_iter().map(|id| id.0).collect();
        info!("Stations {} share one location", ids.join(", "));
        stats.shared_locations += 1;
    }
    stats.sequences = sequences.len();
    timer.stop("load raw observations");
    Ok((sequences, stats))
}

impl LoadStats {
    fn add_device(&mut self, observations: &[BTObservation]) {
        self.observations += observations.len();
        let mut wrong_order = false;
        for pair in observations.windows(2) {
            if pair[0].leave > pair[1].enter {
                self.wrong_order_pairs += 1;
                wrong_order = true;
                if pair[0].leave > pair[1].leave {
                    self.nested_pairs += 1;
                }
            } else {
                self.total_gap_time += pair[1].enter - pair[0].leave;
                self.gaps += 1;
            }
        }
        if wrong_order {
            self.wrong_order_sequences += 1;
        }
        self.unique_station_visits += observations
            .iter()
            .map(|ob| &ob.station.id)
            .collect::<BTreeSet<_>>()
            .len();
    }
}

/// Returns the observations and how many records were skipped.
fn parse_raw_file(
    file: &RawFile,
    stations: &Mutex<Stations>,
) -> Result<(Vec<BTObservation>, usize)> {
    let mut observations = Vec::new();
    let mut skipped = 0;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file.contents.as_bytes());
    for rec in reader.records() {
        let rec = rec.map_err(|err| anyhow!("{}: {}", file.name, err))?;
        if rec.get(0) == Some("deviceid") {
            continue;
        }
        if rec.len() != NUM_COLUMNS {
            bail!(
                "{}: expected {} fields, but found {}: {:?}",
                file.name,
                NUM_COLUMNS,
                rec.len(),
                rec
            );
        }
        let rec: RawRecord = rec
            .deserialize(None)
            .map_err(|err| anyhow!("{}: {}", file.name, err))?;

        let enter = match NaiveDateTime::parse_from_str(&rec.time, "%Y-%m-%d %H:%M:%S") {
            Ok(datetime) => Utc.from_utc_datetime(&datetime).timestamp(),
            Err(err) => {
                error!(
                    "{}: skipping observation with bad time {}: {}",
                    file.name, rec.time, err
                );
                skipped += 1;
                continue;
            }
        };

        let station = {
            let mut stations = stations
                .lock()
                .map_err(|_| anyhow!("A thread panicked while registering stations"))?;
            register_station(
                &mut stations,
                BTStation::new(
                    StationID(single_token(&rec.station)),
                    Point::new(rec.lon, rec.lat),
                ),
            )
            .map_err(|err| anyhow!("{}: {}", file.name, err))?
        };

        observations.push(BTObservation {
            device: DeviceID(rec.device),
            enter,
            leave: enter + rec.duration,
            station,
            owner: single_token(&rec.owner),
        });
    }
    Ok((observations, skipped))
}

// Sequence and station records are separated by spaces and pipes
fn single_token(x: &str) -> String {
    x.trim()
        .chars()
        .map(|c| if c.is_whitespace() || c == '|' { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, contents: &str) -> RawFile {
        RawFile {
            name: name.to_string(),
            contents: contents.to_string(),
        }
    }

    #[test]
    fn test_load_groups_and_sorts() {
        let files = vec![
            raw(
                "jan.csv",
                "deviceid,time,duration,stationid,lat,lon,owner\n\
                 5,2019-01-01 00:10:00,30,s2,-27.5,153.01,council\n\
                 5,2019-01-01 00:00:00,60,s1,-27.5,153.0,council\n\
                 9,2019-01-01 00:00:00,10,s1,-27.5,153.0,main roads\n\
                 9,not a time,10,s1,-27.5,153.0,council\n",
            ),
            raw(
                "feb.csv",
                "5,2019-01-01 00:00:30,5,s3,-27.5,153.0,council\n",
            ),
        ];
        let mut stations = Stations::new();
        let (sequences, stats) =
            load_raw_observations(files, &mut stations, 100, &mut Timer::throwaway()).unwrap();

        assert_eq!(sequences.len(), 2);
        assert_eq!(sequences[0].id, 100);
        assert_eq!(sequences[0].device(), DeviceID(5));
        let enters: Vec<i64> = sequences[0]
            .observations()
            .iter()
            .map(|ob| ob.enter)
            .collect();
        assert_eq!(enters, vec![1546300800, 1546300830, 1546301400]);
        assert_eq!(sequences[1].observations()[0].owner, "main_roads");

        assert_eq!(stations.len(), 3);
        assert_eq!(stats.observations, 4);
        assert_eq!(stats.skipped_records, 1);
        // s3 starts while s1 is still in progress, and ends before it
        assert_eq!(stats.wrong_order_pairs, 1);
        assert_eq!(stats.nested_pairs, 1);
        assert_eq!(stats.wrong_order_sequences, 1);
        assert_eq!(stats.gaps, 1);
        assert_eq!(stats.total_gap_time, 565);
        assert_eq!(stats.unique_station_visits, 4);
        // s1 and s3 are in the same place
        assert_eq!(stats.shared_locations, 1);
    }

    #[test]
    fn test_wrong_field_count() {
        let files = vec![raw("bad.csv", "5,2019-01-01 00:10:00,30,s2,-27.5,153.01\n")];
        let mut stations = Stations::new();
        assert!(load_raw_observations(files, &mut stations, 0, &mut Timer::throwaway()).is_err());
    }

    #[test]
    fn test_station_conflict() {
        let files = vec![raw(
            "moved.csv",
            "5,2019-01-01 00:10:00,30,s1,-27.5,153.01,council\n\
             6,2019-01-01 00:10:00,30,s1,-27.6,153.01,council\n",
        )];
        let mut stations = Stations::new();
        assert!(load_raw_observations(files, &mut stations, 0, &mut Timer::throwaway()).is_err());
    }
}
