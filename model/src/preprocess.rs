//! Turns a pile of raw observation files into station and sequence files. Every sub-folder of
//! the input (usually one per month) is processed separately; loose files make up a final batch
//! called `all`. The input can also be a zip file laid out the same way.

use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};

use abstutil::{prettyprint_usize, Timer};
use anyhow::Result;
use geom::Distance;
use zip::ZipArchive;

use network::{DistanceFunction, Rectangle};

use crate::loader::{load_raw_observations, LoadStats, RawFile};
use crate::segmentation::{segment, SegmentationConfig, SegmentationStats};
use crate::sequence::{read_sequences, write_sequences, ObservationSequence};
use crate::station::{read_stations, station_boundary, write_stations, Stations};

pub const RAW_SEQUENCE_DIR: &str = "raw_sequences";
pub const SEQUENCE_DIR: &str = "sequences";
pub const STATION_FILE: &str = "station.txt";
/// The batch of files not in any sub-folder
pub const LOOSE_BATCH: &str = "all";

pub struct PreprocessConfig {
    /// A folder or a zip file
    pub input: PathBuf,
    pub output_dir: PathBuf,
    /// How far past the outermost stations the region of interest reaches
    pub boundary_extension: Distance,
    pub segmentation: SegmentationConfig,
}

impl PreprocessConfig {
    pub fn new<P1: Into<PathBuf>, P2: Into<PathBuf>>(input: P1, output_dir: P2) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            boundary_extension: Distance::meters(1000.0),
            segmentation: SegmentationConfig::default(),
        }
    }
}

pub struct PreprocessOutput {
    pub stations: Stations,
    /// Covers every station, extended by the configured distance
    pub boundary: Rectangle,
    pub load_stats: LoadStats,
    pub segmentation_stats: SegmentationStats,
}

/// Some of the raw input files, processed together.
#[derive(Debug, PartialEq)]
pub struct Batch {
    pub name: String,
    /// Paths of files, or names of zip entries
    files: Vec<String>,
}

enum RawInput {
    Folder(PathBuf),
    Zip(ZipArchive<fs_err::File>),
}

impl RawInput {
    fn open(path: &Path) -> Result<Self> {
        if path.is_dir() {
            return Ok(RawInput::Folder(path.to_path_buf()));
        }
        let archive = ZipArchive::new(fs_err::File::open(path)?)
            .map_err(|err| anyhow!("{} isn't a folder or a zip file: {}", path.display(), err))?;
        Ok(RawInput::Zip(archive))
    }

    fn batches(&mut self) -> Result<Vec<Batch>> {
        let mut per_batch: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut loose = Vec::new();
        match self {
            RawInput::Folder(dir) => {
                for path in sorted_dir_entries(dir)? {
                    if path.is_dir() {
                        let name = file_name(&path);
                        let files: Vec<String> = sorted_dir_entries(&path)?
                            .into_iter()
                            .filter(|p| p.is_file())
                            .map(|p| p.display().to_string())
                            .collect();
                        per_batch.insert(name, files);
                    } else {
                        loose.push(path.display().to_string());
                    }
                }
            }
            RawInput::Zip(archive) => {
                for idx in 0..archive.len() {
                    let entry = archive.by_index(idx)?;
                    if entry.is_dir() {
                        continue;
                    }
                    let name = entry.name().to_string();
                    let parts: Vec<&str> = name.split('/').collect();
                    if parts.len() >= 2 {
                        per_batch
                            .entry(parts[parts.len() - 2].to_string())
                            .or_insert_with(Vec::new)
                            .push(name.clone());
                    } else {
                        loose.push(name);
                    }
                }
                for files in per_batch.values_mut() {
                    files.sort();
                }
                loose.sort();
            }
        }

        let mut batches: Vec<Batch> = per_batch
            .into_iter()
            .filter(|(_, files)| !files.is_empty())
            .map(|(name, files)| Batch { name, files })
            .collect();
        if !loose.is_empty() {
            batches.push(Batch {
                name: LOOSE_BATCH.to_string(),
                files: loose,
            });
        }
        Ok(batches)
    }

    fn read(&mut self, batch: &Batch) -> Result<Vec<RawFile>> {
        let mut results = Vec::new();
        for name in &batch.files {
            let contents = match self {
                RawInput::Folder(_) => fs_err::read_to_string(name)?,
                RawInput::Zip(archive) => {
                    let mut entry = archive
                        .by_name(name)
                        .map_err(|err| anyhow!("{name}: {err}"))?;
                    let mut contents = String::new();
                    entry.read_to_string(&mut contents)?;
                    contents
                }
            };
            results.push(RawFile {
                name: name.clone(),
                contents,
            });
        }
        Ok(results)
    }
}

fn sorted_dir_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs_err::read_dir(dir)? {
        paths.push(entry?.path());
    }
    paths.sort();
    Ok(paths)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|x| x.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn sequence_file(dir: &Path, batch: &str) -> PathBuf {
    dir.join(format!("Sequence_{}.txt", batch))
}

/// Loads, segments, and writes every batch. Stations are shared by all batches, so the same
/// station ID at two locations anywhere in the input is an error.
pub fn preprocess(
    config: &PreprocessConfig,
    dist: &dyn DistanceFunction,
    timer: &mut Timer,
) -> Result<PreprocessOutput> {
    timer.start("preprocess observations");
    let mut input = RawInput::open(&config.input)?;
    let batches = input.batches()?;
    if batches.is_empty() {
        bail!("No observation files in {}", config.input.display());
    }

    let raw_dir = config.output_dir.join(RAW_SEQUENCE_DIR);
    let segmented_dir = config.output_dir.join(SEQUENCE_DIR);
    fs_err::create_dir_all(&raw_dir)?;
    fs_err::create_dir_all(&segmented_dir)?;

    let mut stations = Stations::new();
    let mut load_stats = LoadStats::default();
    let mut segmentation_stats = SegmentationStats::default();
    let mut next_raw_id = 0;
    let mut next_segmented_id = 0;
    for batch in batches {
        info!(
            "Processing batch {} with {} files",
            batch.name,
            batch.files.len()
        );
        let files = input.read(&batch)?;
        let (raw, batch_load_stats) =
            load_raw_observations(files, &mut stations, next_raw_id, timer)?;
        next_raw_id += raw.len() as u64;
        load_stats.absorb(&batch_load_stats);

        timer.start(format!("segment batch {}", batch.name));
        let (segmented, batch_segmentation_stats) =
            segment(&raw, next_segmented_id, &config.segmentation, dist);
        next_segmented_id += segmented.len() as u64;
        segmentation_stats.absorb(&batch_segmentation_stats);
        timer.stop(format!("segment batch {}", batch.name));

        write_sequences(
            &raw,
            BufWriter::new(fs_err::File::create(sequence_file(&raw_dir, &batch.name))?),
        )?;
        write_sequences(
            &segmented,
            BufWriter::new(fs_err::File::create(sequence_file(
                &segmented_dir,
                &batch.name,
            ))?),
        )?;
        info!(
            "Batch {}: {} devices, {} sequences after segmentation",
            batch.name,
            prettyprint_usize(raw.len()),
            prettyprint_usize(segmented.len())
        );
    }

    write_stations(
        &stations,
        BufWriter::new(fs_err::File::create(config.output_dir.join(STATION_FILE))?),
    )?;

    let boundary = station_boundary(&stations)
        .ok_or_else(|| anyhow!("No stations found in {}", config.input.display()))?;
    let boundary = boundary.extend_by_dist(config.boundary_extension, dist);

    info!("{} stations in total", prettyprint_usize(stations.len()));
    load_stats.describe();
    segmentation_stats.describe();
    info!("Region of interest: {}", boundary);
    network::io::dump_bounding_box(&boundary);
    timer.stop("preprocess observations");

    Ok(PreprocessOutput {
        stations,
        boundary,
        load_stats,
        segmentation_stats,
    })
}

/// Reads the stations and segmented sequences that `preprocess` wrote, per batch.
pub fn read_preprocessed(
    output_dir: &Path,
) -> Result<(Stations, BTreeMap<String, Vec<ObservationSequence>>)> {
    let stations = read_stations(BufReader::new(fs_err::File::open(
        output_dir.join(STATION_FILE),
    )?))?;
    let mut per_batch = BTreeMap::new();
    for path in sorted_dir_entries(&output_dir.join(SEQUENCE_DIR))? {
        let name = file_name(&path);
        let batch = match name
            .strip_prefix("Sequence_")
            .and_then(|x| x.strip_suffix(".txt"))
        {
            Some(batch) => batch.to_string(),
            None => {
                warn!("Ignoring unexpected file {}", path.display());
                continue;
            }
        };
        let sequences = read_sequences(BufReader::new(fs_err::File::open(&path)?), &stations)?;
        per_batch.insert(batch, sequences);
    }
    Ok((stations, per_batch))
}
