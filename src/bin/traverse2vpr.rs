extern crate env_logger;
extern crate log;
extern crate ply_rs;
extern crate structopt;
extern crate traverse2vpr;

use log::info;
use ply_rs::ply::{
    Addable, DefaultElement, ElementDef, Ply, Property, PropertyDef, PropertyType, ScalarType,
};
use ply_rs::writer::Writer;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use structopt::StructOpt;

use traverse2vpr::align::{assign_poses, RtkInterpolator};
use traverse2vpr::correspondence::{correspondences, CorrespondenceTable};
use traverse2vpr::dataset::{expand_cameras, Dataset};
use traverse2vpr::keyframe::{build_subsampled_traverse, save_subsampled_traverse, select_keyframes};
use traverse2vpr::metric::PoseMetric;
use traverse2vpr::pose_table::PoseTable;
use traverse2vpr::undistort::{ready_images, Passthrough};
use traverse2vpr::Error;

#[derive(StructOpt, Debug)]
struct DatasetOpt {
    /// Directory holding one directory of raw images and an `rtk.csv` pose log per traverse.
    #[structopt(long = "raw-dir", default_value = "raw", parse(from_os_str))]
    raw_dir: PathBuf,

    /// Directory receiving undistorted images and camera poses.
    #[structopt(long = "ready-dir", default_value = "ready", parse(from_os_str))]
    ready_dir: PathBuf,
}

impl DatasetOpt {
    fn dataset(&self) -> Dataset {
        Dataset::new(&self.raw_dir, &self.ready_dir)
    }
}

#[derive(StructOpt, Debug)]
struct ReadyOpt {
    #[structopt(flatten)]
    dataset: DatasetOpt,

    /// Traverses to process. Defaults to every traverse in the raw directory.
    #[structopt(long = "traverses")]
    traverses: Vec<String>,

    /// Cameras to process. `all` selects every camera.
    #[structopt(long = "cameras", default_value = "all")]
    cameras: Vec<String>,

    /// Number of worker threads.
    #[structopt(long = "workers", default_value = "4")]
    workers: usize,

    /// Redo images that are already in the ready directory.
    #[structopt(long = "overwrite")]
    overwrite: bool,

    #[structopt(short = "v", long = "verbose")]
    verbose: bool,
}

#[derive(StructOpt, Debug)]
struct AlignOpt {
    #[structopt(flatten)]
    dataset: DatasetOpt,

    /// Directory of camera extrinsics (`ins.txt`, `stereo.txt`, `mono_left.txt`, ...).
    #[structopt(long = "extrinsics-dir", parse(from_os_str))]
    extrinsics_dir: PathBuf,

    /// Traverses to process. Defaults to every traverse in the raw directory.
    #[structopt(long = "traverses")]
    traverses: Vec<String>,

    /// Cameras to process. `all` selects every camera.
    #[structopt(long = "cameras", default_value = "all")]
    cameras: Vec<String>,
}

#[derive(StructOpt, Debug)]
struct SubsampleOpt {
    #[structopt(flatten)]
    dataset: DatasetOpt,

    /// Traverse to subsample.
    #[structopt(name = "TRAVERSE")]
    traverse: String,

    /// Output directory. Each camera is written to `<OUT>/<camera>`.
    #[structopt(name = "OUT", parse(from_os_str))]
    out: PathBuf,

    /// Cameras to subsample. `all` selects every camera.
    #[structopt(long = "cameras", default_value = "stereo/left")]
    cameras: Vec<String>,

    /// Minimum pose distance between consecutive keyframes.
    #[structopt(long = "distance", default_value = "2.0")]
    distance: f64,

    /// Weight of the rotation angle relative to translation in the pose distance.
    #[structopt(long = "weight", default_value = "10")]
    weight: f64,

    #[structopt(short = "v", long = "verbose")]
    verbose: bool,
}

#[derive(StructOpt, Debug)]
struct CorrespondOpt {
    #[structopt(flatten)]
    dataset: DatasetOpt,

    /// Reference traverse. Its keyframes give the rows of the output table.
    #[structopt(name = "REFERENCE")]
    reference: String,

    /// Query traverses matched against the reference keyframes.
    #[structopt(name = "QUERY", required = true)]
    queries: Vec<String>,

    /// Output correspondence table.
    #[structopt(short = "o", long = "out", parse(from_os_str))]
    out: PathBuf,

    /// Camera whose poses are matched.
    #[structopt(long = "camera", default_value = "stereo/left")]
    camera: String,

    /// Minimum pose distance between consecutive reference keyframes.
    #[structopt(long = "threshold", default_value = "1.0")]
    threshold: f64,

    /// Weight of the rotation angle relative to translation in the pose distance.
    #[structopt(long = "weight", default_value = "15")]
    weight: f64,

    /// Warn about matches farther apart than this. Matches are kept either way.
    #[structopt(long = "sanity-threshold")]
    sanity_threshold: Option<f64>,

    /// Use the reference only as a base for the rows, leaving its own column out of the table.
    #[structopt(short = "b", long = "base")]
    base: bool,

    #[structopt(short = "v", long = "verbose")]
    verbose: bool,
}

#[derive(StructOpt, Debug)]
struct PLYOpt {
    /// Camera pose table in .csv or .bposes format.
    #[structopt(name = "FILE", parse(from_os_str))]
    input: PathBuf,

    /// Output file in .ply format.
    #[structopt(name = "OUT", parse(from_os_str))]
    out: PathBuf,

    /// Also mark the keyframes selected with this distance threshold.
    #[structopt(long = "keyframes")]
    keyframes: Option<f64>,

    /// Weight of the rotation angle used for keyframe selection.
    #[structopt(long = "weight", default_value = "10")]
    weight: f64,
}

#[derive(StructOpt, Debug)]
#[structopt(
    name = "traverse2vpr",
    about = "Tools for turning robot car traverses into visual place recognition datasets."
)]
enum Opt {
    /// Undistort raw camera images into the ready directory.
    Ready(ReadyOpt),
    /// Assign an interpolated camera pose to every ready image.
    Align(AlignOpt),
    /// Subsample a traverse into evenly spaced keyframes.
    Subsample(SubsampleOpt),
    /// Match reference keyframes to the nearest poses of query traverses.
    Correspond(CorrespondOpt),
    /// Convert a camera pose table to a .ply for visualization.
    PLY(PLYOpt),
}

fn traverses_or_all(dataset: &Dataset, traverses: &[String]) -> Result<Vec<String>, Error> {
    if traverses.is_empty() {
        dataset.raw_traverses()
    } else {
        Ok(traverses.to_vec())
    }
}

fn run_ready(opt: ReadyOpt) -> Result<(), Error> {
    let dataset = opt.dataset.dataset();
    let cameras = expand_cameras(&opt.cameras);
    let mut total = 0;
    for traverse in traverses_or_all(&dataset, &opt.traverses)? {
        for camera in &cameras {
            total += ready_images(
                &dataset,
                &Passthrough,
                &traverse,
                camera,
                opt.workers,
                opt.overwrite,
                opt.verbose,
            )?;
        }
    }
    println!("Readied {} images", total);
    Ok(())
}

fn run_align(opt: AlignOpt) -> Result<(), Error> {
    let dataset = opt.dataset.dataset();
    let cameras = expand_cameras(&opt.cameras);
    for traverse in traverses_or_all(&dataset, &opt.traverses)? {
        for camera in &cameras {
            let table = assign_poses(
                &dataset,
                &RtkInterpolator,
                &opt.extrinsics_dir,
                &traverse,
                camera,
            )?;
            println!("{} {}: {}", traverse, camera, table);
        }
    }
    Ok(())
}

fn run_subsample(opt: SubsampleOpt) -> Result<(), Error> {
    let dataset = opt.dataset.dataset();
    for camera in expand_cameras(&opt.cameras) {
        let table = PoseTable::from_file(&dataset.camera_poses(&opt.traverse, &camera))?;
        let keyframes = build_subsampled_traverse(&table, opt.weight, opt.distance, opt.verbose)?;
        let dir = save_subsampled_traverse(
            &dataset,
            &opt.traverse,
            &camera,
            &keyframes,
            &opt.out,
            opt.verbose,
        )?;
        println!(
            "Subsampled {} to {} keyframes of {} poses in {}",
            camera,
            keyframes.len(),
            table.len(),
            dir.display()
        );
    }
    Ok(())
}

fn run_correspond(opt: CorrespondOpt) -> Result<(), Error> {
    let dataset = opt.dataset.dataset();
    let metric = PoseMetric::new(opt.weight)?;

    let reference = PoseTable::from_file(&dataset.camera_poses(&opt.reference, &opt.camera))?;
    let indices = select_keyframes(&reference.poses, &metric, opt.threshold, opt.verbose)?;
    let keyframes = reference.subset(&indices)?;
    info!(
        "{}: {} keyframes of {} poses",
        opt.reference,
        keyframes.len(),
        reference.len()
    );

    let mut table = if opt.base {
        CorrespondenceTable::with_base(&opt.reference, keyframes.timestamps.clone())
    } else {
        CorrespondenceTable::new(&opt.reference, keyframes.timestamps.clone())
    };
    for query in &opt.queries {
        let poses = PoseTable::from_file(&dataset.camera_poses(query, &opt.camera))?;
        let matches = correspondences(
            &keyframes.poses,
            &poses.poses,
            &metric,
            opt.sanity_threshold,
            opt.verbose,
        )?;
        table.push_matches(query, &poses.timestamps, &matches)?;
    }
    table.write(&opt.out)?;

    println!(
        "Matched {} reference keyframes against {} query traverses",
        table.num_rows(),
        opt.queries.len()
    );
    Ok(())
}

fn vertex(xyz: [f64; 3], colour: [u8; 3]) -> DefaultElement {
    let mut point = DefaultElement::new();
    point.insert("x".to_string(), Property::Float(xyz[0] as f32));
    point.insert("y".to_string(), Property::Float(xyz[1] as f32));
    point.insert("z".to_string(), Property::Float(xyz[2] as f32));
    point.insert("red".to_string(), Property::UChar(colour[0]));
    point.insert("green".to_string(), Property::UChar(colour[1]));
    point.insert("blue".to_string(), Property::UChar(colour[2]));
    point
}

/// Write camera centres out to a ply file. Cameras are red, keyframes are green.
fn write_cameras(path: &Path, table: &PoseTable, keyframes: &[usize]) -> Result<(), std::io::Error> {
    let mut ply = Ply::<DefaultElement>::new();
    let mut point_element = ElementDef::new("vertex".to_string());
    for name in &["x", "y", "z"] {
        let p = PropertyDef::new(name.to_string(), PropertyType::Scalar(ScalarType::Float));
        point_element.properties.add(p);
    }
    for name in &["red", "green", "blue"] {
        let p = PropertyDef::new(name.to_string(), PropertyType::Scalar(ScalarType::UChar));
        point_element.properties.add(p);
    }
    ply.header.elements.add(point_element);

    let centre = |i: usize| {
        let t = table.poses[i].translation();
        [t.x, t.y, t.z]
    };
    let mut cs: Vec<_> = (0..table.len())
        .map(|i| vertex(centre(i), [255, 0, 0]))
        .collect();
    cs.extend(keyframes.iter().map(|i| vertex(centre(*i), [0, 255, 0])));
    ply.payload.insert("vertex".to_string(), cs);

    let mut file = BufWriter::new(File::create(path)?);
    let writer = Writer::new();
    writer.write_ply(&mut file, &mut ply).map(|_| ())
}

fn run_ply(opt: PLYOpt) -> Result<(), Error> {
    let table = PoseTable::from_file(&opt.input)?;
    let keyframes = match opt.keyframes {
        Some(threshold) => {
            select_keyframes(&table.poses, &PoseMetric::new(opt.weight)?, threshold, false)?
        }
        None => Vec::new(),
    };
    write_cameras(&opt.out, &table, &keyframes)?;
    println!(
        "Wrote {} cameras and {} keyframes to {}",
        table.len(),
        keyframes.len(),
        opt.out.display()
    );
    Ok(())
}

fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Opt::from_args() {
        Opt::Ready(opt) => run_ready(opt),
        Opt::Align(opt) => run_align(opt),
        Opt::Subsample(opt) => run_subsample(opt),
        Opt::Correspond(opt) => run_correspond(opt),
        Opt::PLY(opt) => run_ply(opt),
    }
}
