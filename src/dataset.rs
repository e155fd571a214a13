//! On-disk layout of a RobotCar style dataset.
//!
//! ```txt
//! <raw_dir>/<traverse>/<camera>/<timestamp>.png      raw images
//! <raw_dir>/<traverse>/rtk.csv                       INS/RTK pose log
//! <ready_dir>/<traverse>/<camera>/images/<timestamp>.png
//! <ready_dir>/<traverse>/<camera>/camera_poses.csv
//! ```
//!
//! Directories are always passed in explicitly; nothing here reads the environment.

use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::pose_table::Timestamp;

/// Every camera on the RobotCar platform.
pub const CAMERA_NAMES: [&str; 6] = [
    "stereo/left",
    "stereo/right",
    "stereo/centre",
    "mono_left",
    "mono_right",
    "mono_rear",
];

/// Expand a camera list, replacing `all` with every camera.
pub fn expand_cameras(cameras: &[String]) -> Vec<String> {
    if cameras.iter().any(|c| c == "all") {
        CAMERA_NAMES.iter().map(|c| c.to_string()).collect()
    } else {
        cameras.to_vec()
    }
}

/// Root directories of a dataset.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub raw_dir: PathBuf,
    pub ready_dir: PathBuf,
}

impl Dataset {
    pub fn new(raw_dir: impl AsRef<Path>, ready_dir: impl AsRef<Path>) -> Self {
        Dataset {
            raw_dir: raw_dir.as_ref().to_owned(),
            ready_dir: ready_dir.as_ref().to_owned(),
        }
    }

    pub fn raw_images(&self, traverse: &str, camera: &str) -> PathBuf {
        self.raw_dir.join(traverse).join(camera)
    }

    pub fn rtk_log(&self, traverse: &str) -> PathBuf {
        self.raw_dir.join(traverse).join("rtk.csv")
    }

    pub fn ready_camera(&self, traverse: &str, camera: &str) -> PathBuf {
        self.ready_dir.join(traverse).join(camera)
    }

    pub fn ready_images(&self, traverse: &str, camera: &str) -> PathBuf {
        self.ready_camera(traverse, camera).join("images")
    }

    pub fn camera_poses(&self, traverse: &str, camera: &str) -> PathBuf {
        self.ready_camera(traverse, camera).join("camera_poses.csv")
    }

    /// Traverses in the raw directory, sorted by name.
    pub fn raw_traverses(&self) -> Result<Vec<String>, Error> {
        let mut traverses = std::fs::read_dir(&self.raw_dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(|s| s.to_string()))
            .collect::<Vec<_>>();
        traverses.sort();
        Ok(traverses)
    }
}

/// Path of the image taken at `timestamp` in `dir`.
pub fn image_path(dir: &Path, timestamp: Timestamp) -> PathBuf {
    dir.join(format!("{}.png", timestamp))
}

/// File names of the `.png` images in `dir`, sorted.
pub fn list_images(dir: &Path) -> Result<Vec<String>, Error> {
    if !dir.is_dir() {
        return Err(Error::MissingInput(dir.to_path_buf()));
    }
    let mut names = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().map(|s| s.to_string()))
        .filter(|name| name.ends_with(".png"))
        .collect::<Vec<_>>();
    names.sort();
    Ok(names)
}
