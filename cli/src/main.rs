#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use abstutil::{prettyprint_usize, Timer};
use anyhow::Result;
use geom::{Distance, Duration};
use structopt::StructOpt;

use model::{PreprocessConfig, SegmentationConfig};
use network::{DistanceFunction, GreatCircleDistance, Rectangle, RoadNetworkGraph};

#[derive(StructOpt)]
struct Args {
    /// A folder or .zip file of raw Bluetooth observation CSV files. Sub-folders are processed
    /// separately.
    #[structopt(long)]
    observations: Option<String>,
    /// An .osm.pbf file with the road network
    #[structopt(long)]
    osm: Option<String>,
    /// Where to write everything
    #[structopt(long, default_value = "output")]
    output: String,
    /// Clip the road network to `min_lon,min_lat,max_lon,max_lat`. By default, the region
    /// around the stations is used when observations are given.
    #[structopt(long)]
    region: Option<String>,
    /// How far past the outermost stations the region reaches, in meters
    #[structopt(long, default_value = "1000")]
    boundary_extension: f64,
    /// Split trips at gaps longer than this many seconds, if the device moved slowly
    #[structopt(long, default_value = "1200")]
    max_time_gap: f64,
    /// Also write the map with every way split into straight segments
    #[structopt(long)]
    loose: bool,
    /// Also write the map with one way per physical road
    #[structopt(long)]
    undirected: bool,
    /// Count the intersections where ways cross without meeting
    #[structopt(long)]
    check_planarity: bool,
}

fn main() -> Result<()> {
    abstutil::logger::setup();

    let args = Args::from_iter(abstutil::cli_args());
    if args.observations.is_none() && args.osm.is_none() {
        bail!("Nothing to do; pass --observations, --osm, or both");
    }
    let mut timer = Timer::new("bt_trips");
    let dist: Arc<dyn DistanceFunction> = Arc::new(GreatCircleDistance);
    let output = PathBuf::from(&args.output);
    fs_err::create_dir_all(&output)?;

    let mut region = match args.region {
        Some(ref x) => Some(parse_region(x)?),
        None => None,
    };

    if let Some(ref input) = args.observations {
        let mut config = PreprocessConfig::new(input, output.join("observations"));
        config.boundary_extension = Distance::meters(args.boundary_extension);
        config.segmentation = SegmentationConfig {
            max_time_gap: Duration::seconds(args.max_time_gap),
            ..Default::default()
        };
        let result = model::preprocess(&config, dist.as_ref(), &mut timer)?;
        if region.is_none() {
            region = Some(result.boundary);
        }
    }

    if let Some(ref path) = args.osm {
        let map = network::osm::load_pbf(path, region, dist.clone(), &mut timer)?;
        let map = map.to_compact_map()?;
        write_map(&map, &output.join("map"), &mut timer)?;

        if args.check_planarity {
            let count = map.non_planar_node_count();
            if count == 0 {
                info!("The map is planar");
            } else {
                warn!(
                    "{} ways cross another without sharing an intersection",
                    prettyprint_usize(count)
                );
            }
        }
        if args.loose {
            write_map(&map.to_loose_map()?, &output.join("map_loose"), &mut timer)?;
        }
        if args.undirected {
            let (undirected, stats) = map.to_undirected_map()?;
            info!(
                "Busiest way was visited {} times",
                prettyprint_usize(stats.max_visit_count)
            );
            write_map(&undirected, &output.join("map_undirected"), &mut timer)?;
        }
    }

    Ok(())
}

fn write_map(map: &RoadNetworkGraph, dir: &Path, timer: &mut Timer) -> Result<()> {
    timer.start(format!("write {}", dir.display()));
    network::io::write_map(map, dir)?;
    network::io::export_to_geojson(map, dir.join("map.geojson"))?;
    timer.stop(format!("write {}", dir.display()));
    Ok(())
}

fn parse_region(x: &str) -> Result<Rectangle> {
    let parts = x
        .split(',')
        .map(|n| n.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| anyhow!("Bad --region {}: {}", x, err))?;
    if parts.len() != 4 {
        bail!("--region needs min_lon,min_lat,max_lon,max_lat, not {}", x);
    }
    if parts[0] >= parts[2] || parts[1] >= parts[3] {
        bail!("--region {} is empty", x);
    }
    Ok(Rectangle::new(parts[0], parts[1], parts[2], parts[3]))
}
