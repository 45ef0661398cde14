use std::fmt;

use anyhow::Result;

use crate::observation::{BTObservation, DeviceID};
use crate::station::Stations;

/// The device of a sequence with no observations.
pub const NO_DEVICE: DeviceID = DeviceID(-1);
/// The start and end time of a sequence with no observations.
pub const NO_TIME: i64 = i64::MAX;

/// Chronologically ordered observations of one device.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservationSequence {
    pub id: u64,
    observations: Vec<BTObservation>,
    device: DeviceID,
    start_time: i64,
    end_time: i64,
}

impl ObservationSequence {
    pub fn empty(id: u64) -> Self {
        Self {
            id,
            observations: Vec::new(),
            device: NO_DEVICE,
            start_time: NO_TIME,
            end_time: NO_TIME,
        }
    }

    /// Wraps observations that are already sorted. Overlaps are allowed; see `chronology_check`.
    pub fn new(id: u64, observations: Vec<BTObservation>) -> Self {
        match (observations.first(), observations.last()) {
            (Some(first), Some(last)) => Self {
                id,
                device: first.device,
                start_time: first.enter,
                end_time: last.leave,
                observations,
            },
            _ => Self::empty(id),
        }
    }

    /// Appends an observation that starts no earlier than the current end.
    pub fn push(&mut self, ob: BTObservation) -> Result<()> {
        if self.observations.is_empty() {
            self.device = ob.device;
            self.start_time = ob.enter;
        } else {
            if ob.enter < self.end_time {
                bail!(
                    "Observation entering at {} comes before the end of sequence {} at {}",
                    ob.enter,
                    self.id,
                    self.end_time
                );
            }
            if ob.device != self.device {
                bail!(
                    "Sequence {} belongs to device {}, not {}",
                    self.id,
                    self.device,
                    ob.device
                );
            }
        }
        self.end_time = ob.leave;
        self.observations.push(ob);
        Ok(())
    }

    pub fn observations(&self) -> &Vec<BTObservation> {
        &self.observations
    }

    pub fn device(&self) -> DeviceID {
        self.device
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    pub fn end_time(&self) -> i64 {
        self.end_time
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// False if any observation is still in progress when the next one starts.
    pub fn chronology_check(&self) -> bool {
        self.observations
            .windows(2)
            .all(|pair| pair[0].leave <= pair[1].enter)
    }

    /// Parses `sequenceID deviceID startTime endTime|enter leave station owner|...`.
    pub fn parse(line: &str, stations: &Stations) -> Result<Self> {
        let mut parts = line.split('|');
        let header: Vec<&str> = parts.next().unwrap_or("").split(' ').collect();
        if header.len() != 4 {
            bail!("Bad sequence header: {}", line);
        }
        let mut numbers = Vec::new();
        for field in &header {
            let x: i64 = field
                .parse()
                .map_err(|err| anyhow!("Bad sequence header {}: {}", line, err))?;
            numbers.push(x);
        }
        let id = u64::try_from(numbers[0])?;
        let device = DeviceID(numbers[1]);

        let mut observations = Vec::new();
        for record in parts {
            observations.push(BTObservation::parse(device, record, stations)?);
        }
        let seq = ObservationSequence::new(id, observations);
        if seq.device != device || seq.start_time != numbers[2] || seq.end_time != numbers[3] {
            bail!(
                "Sequence {} header says device {} from {} to {}, but its observations say \
                 device {} from {} to {}",
                id,
                device,
                numbers[2],
                numbers[3],
                seq.device,
                seq.start_time,
                seq.end_time
            );
        }
        Ok(seq)
    }
}

impl fmt::Display for ObservationSequence {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.id, self.device, self.start_time, self.end_time
        )?;
        for ob in &self.observations {
            write!(f, "|{}", ob)?;
        }
        Ok(())
    }
}

pub fn read_sequences<R: std::io::BufRead>(
    reader: R,
    stations: &Stations,
) -> Result<Vec<ObservationSequence>> {
    let mut sequences = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        sequences.push(ObservationSequence::parse(&line, stations)?);
    }
    Ok(sequences)
}

pub fn write_sequences<W: std::io::Write>(
    sequences: &[ObservationSequence],
    mut writer: W,
) -> Result<()> {
    for seq in sequences {
        writeln!(writer, "{}", seq)?;
    }
    writer.flush()?;
    Ok(())
}
