use anyhow::Result;
use geom::Duration;

use network::DistanceFunction;

use crate::observation::BTObservation;
use crate::sequence::ObservationSequence;

#[derive(Clone, Debug)]
pub struct SegmentationConfig {
    /// A longer gap between two observations may mean the device stopped somewhere
    pub max_time_gap: Duration,
    /// ... but only if it moved slower than this, in meters per second, over the gap
    pub max_cut_speed: f64,
    /// Observations longer than this count as long stays in the summary
    pub long_stay: Duration,
    /// Whole sequences slower than this, in meters per second, probably aren't vehicles
    pub pedestrian_speed: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            max_time_gap: Duration::seconds(1200.0),
            // 15km/h
            max_cut_speed: 4.17,
            long_stay: Duration::seconds(300.0),
            // 5km/h
            pedestrian_speed: 1.39,
        }
    }
}

/// Summary of segmented sequences.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SegmentationStats {
    pub sequences: usize,
    pub observations: usize,
    /// Sum of every observation's duration, each capped at the long stay threshold
    pub total_duration: f64,
    pub max_duration: i64,
    pub long_stays: usize,
    /// Sum of the non-negative gaps between consecutive observations
    pub total_time_gap: f64,
    pub gaps: usize,
    pub pedestrian_sequences: usize,
}

impl SegmentationStats {
    pub fn absorb(&mut self, other: &SegmentationStats) {
        self.sequences += other.sequences;
        self.observations += other.observations;
        self.total_duration += other.total_duration;
        self.max_duration = self.max_duration.max(other.max_duration);
        self.long_stays += other.long_stays;
        self.total_time_gap += other.total_time_gap;
        self.gaps += other.gaps;
        self.pedestrian_sequences += other.pedestrian_sequences;
    }

    pub fn describe(&self) {
        info!(
            "{} sequences after segmentation, with {} observations",
            abstutil::prettyprint_usize(self.sequences),
            abstutil::prettyprint_usize(self.observations)
        );
        if self.observations > 0 {
            info!(
                "Average observation lasts {}s (longest {}s), {} stay longer than the limit",
                self.total_duration / self.observations as f64,
                self.max_duration,
                abstutil::prettyprint_usize(self.long_stays)
            );
        }
        if self.gaps > 0 {
            info!(
                "Average gap between observations is {}s",
                self.total_time_gap / self.gaps as f64
            );
        }
        info!(
            "{} sequences move at walking speed",
            abstutil::prettyprint_usize(self.pedestrian_sequences)
        );
    }

    fn add_sequence(
        &mut self,
        seq: &ObservationSequence,
        config: &SegmentationConfig,
        dist: &dyn DistanceFunction,
    ) {
        let long_stay = config.long_stay.inner_seconds();
        self.sequences += 1;
        self.observations += seq.len();
        for ob in seq.observations() {
            let duration = ob.duration();
            self.total_duration += (duration as f64).min(long_stay);
            self.max_duration = self.max_duration.max(duration);
            if duration as f64 > long_stay {
                self.long_stays += 1;
            }
        }

        let mut distance = 0.0;
        for pair in seq.observations().windows(2) {
            distance += station_distance(&pair[0], &pair[1], dist);
            self.total_time_gap += (pair[1].enter - pair[0].leave).max(0) as f64;
            self.gaps += 1;
        }
        let span = seq.end_time() - seq.start_time();
        if span > 0 {
            let speed = distance / span as f64;
            if speed > 0.0 && speed < config.pedestrian_speed {
                self.pedestrian_sequences += 1;
            }
        }
    }
}

fn station_distance(a: &BTObservation, b: &BTObservation, dist: &dyn DistanceFunction) -> f64 {
    dist.distance(a.station.centre, b.station.centre)
}

/// Splits every sequence wherever the device seems to have stopped: a long gap covered slowly.
/// Observations entirely nested inside the one before are dropped. Sub-sequences with only one
/// observation don't say anything about movement, so they're dropped too. New sequences are
/// numbered from `first_id`.
pub fn segment(
    sequences: &[ObservationSequence],
    first_id: u64,
    config: &SegmentationConfig,
    dist: &dyn DistanceFunction,
) -> (Vec<ObservationSequence>, SegmentationStats) {
    let mut output = Vec::new();
    let mut stats = SegmentationStats::default();
    let mut next_id = first_id;
    let mut emit = |observations: Vec<BTObservation>, output: &mut Vec<ObservationSequence>| {
        if observations.len() > 1 {
            let seq = ObservationSequence::new(next_id, observations);
            next_id += 1;
            stats.add_sequence(&seq, config, dist);
            output.push(seq);
        }
    };

    for seq in sequences {
        let obs = seq.observations();
        if obs.is_empty() {
            continue;
        }
        let mut current_list = vec![obs[0].clone()];
        let mut i = 0;
        'walk: while i + 1 < obs.len() {
            let current = &obs[i];
            let mut j = i + 1;
            while obs[j].leave < current.leave {
                j += 1;
                if j == obs.len() {
                    break 'walk;
                }
            }
            let next = &obs[j];

            let time_gap = next.enter - current.leave;
            let is_stop = Duration::seconds(time_gap as f64) > config.max_time_gap
                && station_distance(current, next, dist) / (time_gap as f64)
                    < config.max_cut_speed;
            if is_stop {
                emit(std::mem::take(&mut current_list), &mut output);
            }
            current_list.push(next.clone());
            i = j;
        }
        emit(current_list, &mut output);
    }

    (output, stats)
}

/// Checks the output of `segment`.
pub fn check_segmented(sequences: &[ObservationSequence]) -> Result<()> {
    for seq in sequences {
        if seq.len() < 2 {
            bail!("Sequence {} only has {} observations", seq.id, seq.len());
        }
        for pair in seq.observations().windows(2) {
            if pair[1].leave < pair[0].leave {
                bail!(
                    "Sequence {} has an observation nested inside the previous one",
                    seq.id
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use network::{GreatCircleDistance, Point};

    use super::*;
    use crate::observation::DeviceID;
    use crate::station::{BTStation, StationID};

    fn station(id: &str, lon: f64) -> Arc<BTStation> {
        Arc::new(BTStation::new(
            StationID(id.to_string()),
            Point::new(lon, -27.5),
        ))
    }

    fn ob(station: &Arc<BTStation>, enter: i64, leave: i64) -> BTObservation {
        BTObservation {
            device: DeviceID(1),
            enter,
            leave,
            station: station.clone(),
            owner: "council".to_string(),
        }
    }

    fn times(seq: &ObservationSequence) -> Vec<(i64, i64)> {
        seq.observations()
            .iter()
            .map(|ob| (ob.enter, ob.leave))
            .collect()
    }

    #[test]
    fn test_long_slow_gap_splits() {
        // a and b are about 1km apart
        let a = station("a", 153.0);
        let b = station("b", 153.01);
        let input = vec![ObservationSequence::new(
            0,
            vec![
                ob(&a, 0, 60),
                ob(&b, 120, 180),
                // 4000s later, so about 0.25m/s
                ob(&a, 4180, 4200),
                ob(&b, 4300, 4320),
            ],
        )];
        let (output, stats) = segment(
            &input,
            10,
            &SegmentationConfig::default(),
            &GreatCircleDistance,
        );
        assert_eq!(output.len(), 2);
        assert_eq!(output[0].id, 10);
        assert_eq!(output[1].id, 11);
        assert_eq!(times(&output[0]), vec![(0, 60), (120, 180)]);
        assert_eq!(times(&output[1]), vec![(4180, 4200), (4300, 4320)]);
        assert_eq!(stats.sequences, 2);
        assert_eq!(stats.observations, 4);
        assert_eq!(stats.gaps, 2);
        check_segmented(&output).unwrap();
    }

    #[test]
    fn test_stop_between_nearby_stations() {
        let x = station("x", 153.0);
        let a = station("a", 153.001);
        // About 500m north of a
        let b = Arc::new(BTStation::new(
            StationID("b".to_string()),
            Point::new(153.001, -27.4955),
        ));
        let c = station("c", 153.002);
        let input = vec![ObservationSequence::new(
            0,
            vec![
                ob(&x, -200, -150),
                ob(&a, 0, 100),
                ob(&b, 2000, 2100),
                ob(&c, 2200, 2250),
            ],
        )];
        let (output, _) = segment(
            &input,
            0,
            &SegmentationConfig::default(),
            &GreatCircleDistance,
        );
        assert_eq!(output.len(), 2);
        assert_eq!(times(&output[0]), vec![(-200, -150), (0, 100)]);
        assert_eq!(times(&output[1]), vec![(2000, 2100), (2200, 2250)]);
    }

    #[test]
    fn test_long_fast_gap_doesnt_split() {
        // 1km in 1300s is slow, but 100km isn't
        let a = station("a", 153.0);
        let far = station("far", 154.0);
        let input = vec![ObservationSequence::new(
            0,
            vec![ob(&a, 0, 60), ob(&far, 1360, 1400)],
        )];
        let (output, _) = segment(
            &input,
            0,
            &SegmentationConfig::default(),
            &GreatCircleDistance,
        );
        assert_eq!(output.len(), 1);
        assert_eq!(output[0].len(), 2);
    }

    #[test]
    fn test_singletons_dropped() {
        let a = station("a", 153.0);
        let b = station("b", 153.01);
        // Cut after the first observation, and again before the last
        let input = vec![ObservationSequence::new(
            0,
            vec![
                ob(&a, 0, 10),
                ob(&b, 5000, 5010),
                ob(&a, 5100, 5110),
                ob(&b, 10000, 10010),
            ],
        )];
        let (output, _) = segment(
            &input,
            0,
            &SegmentationConfig::default(),
            &GreatCircleDistance,
        );
        assert_eq!(output.len(), 1);
        assert_eq!(times(&output[0]), vec![(5000, 5010), (5100, 5110)]);

        let lonely = vec![ObservationSequence::new(0, vec![ob(&a, 0, 10)])];
        assert!(segment(
            &lonely,
            0,
            &SegmentationConfig::default(),
            &GreatCircleDistance
        )
        .0
        .is_empty());
        for seq in &output {
            assert!(seq.len() >= 2);
        }
    }

    #[test]
    fn test_nested_observation_skipped() {
        let a = station("a", 153.0);
        let b = station("b", 153.01);
        let c = station("c", 153.02);
        let input = vec![ObservationSequence::new(
            0,
            vec![ob(&a, 0, 500), ob(&b, 100, 200), ob(&c, 600, 700)],
        )];
        let (output, stats) = segment(
            &input,
            0,
            &SegmentationConfig::default(),
            &GreatCircleDistance,
        );
        assert_eq!(output.len(), 1);
        assert_eq!(times(&output[0]), vec![(0, 500), (600, 700)]);
        assert_eq!(stats.total_time_gap, 100.0);
        // The 500s stay counts as a long one, capped in the total
        assert_eq!(stats.long_stays, 1);
        assert_eq!(stats.max_duration, 500);
        assert_eq!(stats.total_duration, 400.0);
    }

    #[test]
    fn test_trailing_nested_observations() {
        let a = station("a", 153.0);
        let b = station("b", 153.01);
        let input = vec![ObservationSequence::new(
            0,
            vec![ob(&a, 0, 100), ob(&b, 150, 1000), ob(&a, 200, 300)],
        )];
        let (output, _) = segment(
            &input,
            0,
            &SegmentationConfig::default(),
            &GreatCircleDistance,
        );
        assert_eq!(output.len(), 1);
        assert_eq!(times(&output[0]), vec![(0, 100), (150, 1000)]);
    }

    #[test]
    fn test_pedestrian_count() {
        let a = station("a", 153.0);
        let b = station("b", 153.01);
        // About 1km in 1000s
        let walking = ObservationSequence::new(1, vec![ob(&a, 0, 10), ob(&b, 990, 1000)]);
        // About 1km in 100s
        let driving = ObservationSequence::new(2, vec![ob(&a, 0, 10), ob(&b, 90, 100)]);
        let (_, stats) = segment(
            &[walking, driving],
            0,
            &SegmentationConfig::default(),
            &GreatCircleDistance,
        );
        assert_eq!(stats.sequences, 2);
        assert_eq!(stats.pedestrian_sequences, 1);
    }
}
