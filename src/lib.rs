//! Pose geometry, keyframe selection and cross-traverse correspondences for building visual place
//! recognition datasets out of repeated robot car traverses.

extern crate byteorder;
extern crate cgmath;
extern crate csv;
extern crate image;
extern crate indicatif;
extern crate log;
extern crate nom;
extern crate rayon;

pub mod align;
pub mod correspondence;
pub mod dataset;
pub mod error;
pub mod keyframe;
pub mod metric;
pub mod pose_table;
pub mod se3;
pub mod undistort;

mod progress;

pub use error::Error;
pub use metric::PoseMetric;
pub use pose_table::{PoseTable, Timestamp};
pub use se3::{Pose, PoseSet};
