use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use network::{NodeID, Point, Rectangle};

pub const DEFAULT_RADIUS_METERS: f64 = 100.0;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StationID(pub String);

impl fmt::Display for StationID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fixed Bluetooth reader.
#[derive(Clone, Debug, PartialEq)]
pub struct BTStation {
    pub id: StationID,
    pub centre: Point,
    pub radius: f64,
    /// Road nodes physically inside the detection radius, if anybody has worked that out
    pub covering_nodes: Vec<NodeID>,
}

impl BTStation {
    pub fn new(id: StationID, centre: Point) -> Self {
        Self {
            id,
            centre,
            radius: DEFAULT_RADIUS_METERS,
            covering_nodes: Vec::new(),
        }
    }

    /// Parses `id lon lat [radius]`, optionally followed by `|` and space-separated node IDs.
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.splitn(2, '|');
        let base: Vec<&str> = parts.next().unwrap_or("").split(' ').collect();
        if base.len() < 3 || base.len() > 4 {
            bail!("Bad station record: {}", line);
        }
        let lon: f64 = base[1]
            .parse()
            .map_err(|err| anyhow!("Bad longitude in station record {}: {}", line, err))?;
        let lat: f64 = base[2]
            .parse()
            .map_err(|err| anyhow!("Bad latitude in station record {}: {}", line, err))?;
        let mut station = BTStation::new(StationID(base[0].to_string()), Point::new(lon, lat));
        if base.len() == 4 {
            station.radius = base[3]
                .parse()
                .map_err(|err| anyhow!("Bad radius in station record {}: {}", line, err))?;
        }
        if let Some(nodes) = parts.next() {
            station.covering_nodes = nodes
                .split(' ')
                .filter(|id| !id.is_empty())
                .map(NodeID::new)
                .collect();
        }
        Ok(station)
    }
}

impl fmt::Display for BTStation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Full precision, so the centre survives a round trip exactly
        write!(f, "{} {} {}", self.id, self.centre.x(), self.centre.y())?;
        if self.radius != DEFAULT_RADIUS_METERS {
            write!(f, " {}", self.radius)?;
        }
        if !self.covering_nodes.is_empty() {
            let ids: Vec<&str> = self.covering_nodes.iter().map(|n| n.0.as_str()).collect();
            write!(f, "|{}", ids.join(" "))?;
        }
        Ok(())
    }
}

/// Every station seen so far, keyed by ID.
pub type Stations = BTreeMap<StationID, Arc<BTStation>>;

/// Adds a station, unless one with the same ID is already known. The same ID at a different
/// location is an error. Returns the canonical copy.
pub fn register_station(stations: &mut Stations, station: BTStation) -> Result<Arc<BTStation>> {
    if let Some(existing) = stations.get(&station.id) {
        if !existing.centre.equals_2d(&station.centre) {
            bail!(
                "Station {} appears at two locations: {} and {}",
                station.id,
                existing.centre,
                station.centre
            );
        }
        return Ok(existing.clone());
    }
    let station = Arc::new(station);
    stations.insert(station.id.clone(), station.clone());
    Ok(station)
}

/// Reads a station file, one record per line. Duplicate IDs are an error.
pub fn read_stations<R: std::io::BufRead>(reader: R) -> Result<Stations> {
    let mut stations = Stations::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let station = BTStation::parse(&line)?;
        if stations.contains_key(&station.id) {
            bail!("Station {} appears multiple times", station.id);
        }
        stations.insert(station.id.clone(), Arc::new(station));
    }
    Ok(stations)
}

pub fn write_stations<W: std::io::Write>(stations: &Stations, mut writer: W) -> Result<()> {
    for station in stations.values() {
        writeln!(writer, "{}", station)?;
    }
    Ok(())
}

/// The box covering every station's centre.
pub fn station_boundary(stations: &Stations) -> Option<Rectangle> {
    Rectangle::covering(stations.values().map(|s| s.centre))
}

/// Several readers are sometimes installed at exactly the same spot. Returns the groups of
/// station IDs sharing one location.
pub fn shared_locations(stations: &Stations) -> Vec<Vec<StationID>> {
    let mut per_location: BTreeMap<(u64, u64), Vec<StationID>> = BTreeMap::new();
    for station in stations.values() {
        per_location
            .entry(station.centre.key())
            .or_insert_with(Vec::new)
            .push(station.id.clone());
    }
    per_location
        .into_values()
        .filter(|ids| ids.len() > 1)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_station() {
        let station = BTStation::parse("s1 153.02 -27.47").unwrap();
        assert_eq!(station.id, StationID("s1".to_string()));
        assert_eq!(station.radius, DEFAULT_RADIUS_METERS);
        assert!(station.covering_nodes.is_empty());
        assert_eq!(station.to_string(), "s1 153.02 -27.47");

        let station = BTStation::parse("s2 153.1 -27.5 50|11 12 13").unwrap();
        assert_eq!(station.radius, 50.0);
        assert_eq!(
            station.covering_nodes,
            vec![NodeID::new("11"), NodeID::new("12"), NodeID::new("13")]
        );
        assert_eq!(BTStation::parse(&station.to_string()).unwrap(), station);

        assert!(BTStation::parse("s3 153.1").is_err());
        assert!(BTStation::parse("s3 153.1 -27.5 1 2").is_err());
        assert!(BTStation::parse("s3 east -27.5").is_err());
    }

    #[test]
    fn test_register_conflict() {
        let mut stations = Stations::new();
        let id = StationID("s1".to_string());
        register_station(&mut stations, BTStation::new(id.clone(), Point::new(1.0, 2.0))).unwrap();
        assert!(
            register_station(&mut stations, BTStation::new(id.clone(), Point::new(1.0, 2.0)))
                .is_ok()
        );
        assert!(
            register_station(&mut stations, BTStation::new(id, Point::new(1.0, 2.5))).is_err()
        );
        assert_eq!(stations.len(), 1);
    }

    #[test]
    fn test_read_stations_rejects_duplicates() {
        let input = "s1 1 2\ns2 3 4\n\ns1 1 2\n";
        assert!(read_stations(input.as_bytes()).is_err());
        let stations = read_stations("s1 1 2\ns2 1 2\ns3 5 5\n".as_bytes()).unwrap();
        assert_eq!(
            shared_locations(&stations),
            vec![vec![
                StationID("s1".to_string()),
                StationID("s2".to_string())
            ]]
        );
        assert_eq!(
            station_boundary(&stations),
            Some(Rectangle::new(1.0, 2.0, 5.0, 5.0))
        );
    }
}
