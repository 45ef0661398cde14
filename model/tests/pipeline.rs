use std::io::Write;
use std::path::PathBuf;

use abstutil::Timer;
use network::GreatCircleDistance;

use model::preprocess::{read_preprocessed, RAW_SEQUENCE_DIR};
use model::{check_segmented, read_sequences, PreprocessConfig, StationID};

// Device 1 passes s1, s2, s3, then two hours later s1 and s2 again. Device 2 is only seen once.
const JANUARY: &str = "deviceid,time,duration,stationid,lat,lon,owner\n\
    1,2019-01-01 00:00:00,30,s1,-27.5,153.0,council\n\
    1,2019-01-01 00:02:00,30,s2,-27.5,153.01,council\n\
    1,2019-01-01 00:04:00,30,s3,-27.5,153.02,council\n\
    2,2019-01-01 00:05:00,30,s3,-27.5,153.02,council\n\
    1,2019-01-01 02:00:00,30,s1,-27.5,153.0,council\n\
    1,2019-01-01 02:02:00,30,s2,-27.5,153.01,council\n";

const LOOSE: &str = "1,2019-03-01 10:00:00,30,s1,-27.5,153.0,council\n\
    1,2019-03-01 10:01:00,30,s3,-27.5,153.02,council\n";

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("bt_pipeline_{}_{}", name, std::process::id()));
    if dir.exists() {
        std::fs::remove_dir_all(&dir).unwrap();
    }
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn check_output(input: PathBuf, output_dir: PathBuf) {
    let config = PreprocessConfig::new(input, output_dir.clone());
    let result =
        model::preprocess(&config, &GreatCircleDistance, &mut Timer::throwaway()).unwrap();

    assert_eq!(result.stations.len(), 3);
    assert_eq!(result.load_stats.sequences, 3);
    assert_eq!(result.load_stats.observations, 8);
    assert_eq!(result.segmentation_stats.sequences, 3);
    let stations_box = model::station_boundary(&result.stations).unwrap();
    assert!(result.boundary.strictly_contains(&stations_box));

    let (stations, per_batch) = read_preprocessed(&output_dir).unwrap();
    assert_eq!(stations.len(), 3);
    assert!(stations.contains_key(&StationID("s2".to_string())));
    let batches: Vec<&String> = per_batch.keys().collect();
    assert_eq!(batches, vec!["2019-01", "all"]);

    let january = &per_batch["2019-01"];
    // The two-hour stop splits device 1's day, and device 2 is dropped
    assert_eq!(january.len(), 2);
    assert_eq!(january[0].len(), 3);
    assert_eq!(january[1].len(), 2);
    assert_eq!(january[0].id, 0);
    assert_eq!(january[1].id, 1);
    assert_eq!(per_batch["all"].len(), 1);
    assert_eq!(per_batch["all"][0].id, 2);
    for sequences in per_batch.values() {
        check_segmented(sequences).unwrap();
        for seq in sequences {
            assert!(seq.chronology_check());
        }
    }

    let raw = read_sequences(
        std::io::BufReader::new(
            std::fs::File::open(output_dir.join(RAW_SEQUENCE_DIR).join("Sequence_2019-01.txt"))
                .unwrap(),
        ),
        &stations,
    )
    .unwrap();
    assert_eq!(raw.len(), 2);
    assert_eq!(raw[0].len(), 5);
    assert_eq!(raw[1].len(), 1);
}

#[test]
fn preprocess_folder() {
    let dir = scratch_dir("folder");
    let input = dir.join("input");
    std::fs::create_dir_all(input.join("2019-01")).unwrap();
    std::fs::write(input.join("2019-01").join("jan.csv"), JANUARY).unwrap();
    std::fs::write(input.join("extra.csv"), LOOSE).unwrap();

    check_output(input, dir.join("output"));
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn preprocess_zip() {
    let dir = scratch_dir("zip");
    let input = dir.join("input.zip");
    let mut archive = zip::ZipWriter::new(std::fs::File::create(&input).unwrap());
    for (name, contents) in [("2019-01/jan.csv", JANUARY), ("extra.csv", LOOSE)] {
        archive
            .start_file(name, zip::write::FileOptions::default())
            .unwrap();
        archive.write_all(contents.as_bytes()).unwrap();
    }
    archive.finish().unwrap();

    check_output(input, dir.join("output"));
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn conflicting_station_is_fatal() {
    let dir = scratch_dir("conflict");
    let input = dir.join("input");
    std::fs::create_dir_all(input.join("2019-01")).unwrap();
    std::fs::create_dir_all(input.join("2019-02")).unwrap();
    std::fs::write(input.join("2019-01").join("jan.csv"), JANUARY).unwrap();
    std::fs::write(
        input.join("2019-02").join("feb.csv"),
        "1,2019-02-01 00:00:00,30,s1,-27.6,153.0,council\n",
    )
    .unwrap();

    let config = PreprocessConfig::new(input, dir.join("output"));
    assert!(model::preprocess(&config, &GreatCircleDistance, &mut Timer::throwaway()).is_err());
    std::fs::remove_dir_all(&dir).unwrap();
}
