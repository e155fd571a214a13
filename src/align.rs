//! Camera poses from an INS/RTK pose log.
//!
//! Each readied image is assigned the pose of the INS interpolated at the image timestamp,
//! moved into the camera frame with the camera extrinsics.

use cgmath::Matrix4;
use log::info;

use std::fs::File;
use std::io::prelude::*;
use std::path::Path;

use crate::dataset::{list_images, Dataset};
use crate::error::{require, Error};
use crate::pose_table::{Csv, PoseTable, Timestamp, POSE_COLUMNS};
use crate::se3::{Pose, PoseSet};

/// Source of absolute poses at arbitrary timestamps.
pub trait PoseInterpolator {
    /// Homogeneous transforms of the vehicle at each of `timestamps`, in order, from the pose log
    /// at `log`.
    fn interpolate(&self, log: &Path, timestamps: &[Timestamp])
        -> Result<Vec<Matrix4<f64>>, Error>;
}

/// Interpolates the rows of a RobotCar INS/RTK csv log.
///
/// The log needs `timestamp`, `northing`, `easting`, `down`, `roll`, `pitch` and `yaw` columns.
/// Translations are interpolated linearly and rotations spherically between the two log rows
/// around each requested timestamp.
#[derive(Debug, Clone, Copy, Default)]
pub struct RtkInterpolator;

impl RtkInterpolator {
    /// Log rows sorted by timestamp.
    pub fn read_log(log: &Path) -> Result<Vec<(Timestamp, Pose)>, Error> {
        let csv = Csv::from_path(log)?;
        let timestamps = csv.values::<Timestamp>(csv.column("timestamp")?)?;
        let poses = PoseSet::from_xyzrpy(&csv.float_rows(&POSE_COLUMNS)?)?;
        let mut rows = timestamps
            .into_iter()
            .zip(poses.iter().cloned())
            .collect::<Vec<_>>();
        rows.sort_by_key(|r| r.0);
        Ok(rows)
    }

    /// Pose at `t` from sorted log `rows`.
    pub fn pose_at(rows: &[(Timestamp, Pose)], t: Timestamp) -> Result<Pose, Error> {
        match rows.binary_search_by_key(&t, |r| r.0) {
            Ok(i) => Ok(rows[i].1),
            Err(i) if i == 0 || i == rows.len() => Err(Error::OutOfRange(t)),
            Err(i) => {
                let (t0, p0) = rows[i - 1];
                let (t1, p1) = rows[i];
                let amount = (t - t0) as f64 / (t1 - t0) as f64;
                Ok(p0.interpolate(&p1, amount))
            }
        }
    }
}

impl PoseInterpolator for RtkInterpolator {
    fn interpolate(
        &self,
        log: &Path,
        timestamps: &[Timestamp],
    ) -> Result<Vec<Matrix4<f64>>, Error> {
        let rows = RtkInterpolator::read_log(log)?;
        timestamps
            .iter()
            .map(|t| RtkInterpolator::pose_at(&rows, *t).map(|p| p.to_matrix()))
            .collect()
    }
}

/// Read an extrinsics file holding a single `x y z roll pitch yaw` line.
pub fn read_extrinsics(path: &Path) -> Result<Pose, Error> {
    require(path)?;
    let mut contents = String::new();
    File::open(path)?.read_to_string(&mut contents)?;
    let values = contents
        .lines()
        .next()
        .unwrap_or("")
        .split_whitespace()
        .map(|x| {
            x.parse::<f64>()
                .map_err(|_| Error::ParseError(format!("{}: bad value {:?}", path.display(), x)))
        })
        .collect::<Result<Vec<_>, Error>>()?;
    Ok(PoseSet::from_xyzrpy(&[values])?[0])
}

/// Transform from the INS frame to the frame of `camera`.
///
/// Extrinsics in `dir` are given relative to the stereo camera: `ins.txt` for the INS and
/// `<camera>.txt` for the other cameras. All stereo cameras share `stereo.txt`.
pub fn camera_extrinsics(dir: &Path, camera: &str) -> Result<Pose, Error> {
    let ins = read_extrinsics(&dir.join("ins.txt"))?;
    let name = if camera.contains("stereo") {
        "stereo"
    } else {
        camera
    };
    let cam = read_extrinsics(&dir.join(format!("{}.txt", name)))?;
    Ok(ins.inverse() * cam)
}

/// Assign a pose to every readied image of `camera` in `traverse` and write `camera_poses.csv`.
///
/// Image timestamps come from the image file names.
pub fn assign_poses<I: PoseInterpolator>(
    dataset: &Dataset,
    interpolator: &I,
    extrinsics_dir: &Path,
    traverse: &str,
    camera: &str,
) -> Result<PoseTable, Error> {
    let image_dir = dataset.ready_images(traverse, camera);
    let names = list_images(&image_dir)?;
    if names.is_empty() {
        return Err(Error::MissingInput(image_dir));
    }
    let mut timestamps = names
        .iter()
        .map(|n| {
            n.trim_end_matches(".png")
                .parse::<Timestamp>()
                .map_err(|_| Error::ParseError(format!("image {} is not named by timestamp", n)))
        })
        .collect::<Result<Vec<_>, Error>>()?;
    timestamps.sort();

    let vehicle = interpolator.interpolate(&dataset.rtk_log(traverse), &timestamps)?;
    if vehicle.len() != timestamps.len() {
        return Err(Error::InvalidShape(format!(
            "interpolated {} poses for {} timestamps",
            vehicle.len(),
            timestamps.len()
        )));
    }
    let extrinsics = PoseSet::single(camera_extrinsics(extrinsics_dir, camera)?);
    let poses = PoseSet::from_matrices(&vehicle)?.compose(&extrinsics)?;

    let table = PoseTable::new(timestamps, poses)?;
    let out = dataset.camera_poses(traverse, camera);
    table.write_text(&out)?;
    info!("{} {}: wrote {} poses to {}", traverse, camera, table.len(), out.display());
    Ok(table)
}
