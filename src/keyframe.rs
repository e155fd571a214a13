//! Spatial subsampling of a traverse into keyframes.

use indicatif::ProgressIterator;
use log::{debug, info};

use std::path::{Path, PathBuf};

use crate::dataset::{image_path, Dataset};
use crate::error::{require, Error};
use crate::metric::PoseMetric;
use crate::pose_table::PoseTable;
use crate::progress::progress_bar;
use crate::se3::PoseSet;

/// Number of poses compared against a running keyframe. The first pose is never compared.
fn comparisons(poses: &PoseSet) -> u64 {
    poses.len().saturating_sub(1) as u64
}

/// Select keyframes from `poses` with a single greedy left-to-right scan.
///
/// The first pose is always a keyframe. Every following pose whose distance to the most recent
/// keyframe exceeds `threshold` becomes the new keyframe. Returned indices are strictly
/// increasing, and consecutive keyframes are more than `threshold` apart.
///
/// This is not a minimal cover of the traverse, just the output of this particular scan.
pub fn select_keyframes(
    poses: &PoseSet,
    metric: &PoseMetric,
    threshold: f64,
    verbose: bool,
) -> Result<Vec<usize>, Error> {
    let mut indices = vec![0];
    let mut current = poses[0];
    let pb = progress_bar(comparisons(poses), "Selecting keyframes", verbose);
    for (i, pose) in poses.iter().enumerate().skip(1).progress_with(pb) {
        let d = metric.distance(&current.into(), &(*pose).into())?;
        if d[0] > threshold {
            indices.push(i);
            current = *pose;
        }
    }
    debug!(
        "selected {} of {} poses as keyframes (threshold {}, attitude weight {})",
        indices.len(),
        poses.len(),
        threshold,
        metric.attitude_weight()
    );
    Ok(indices)
}

/// Keyframe rows of a camera pose table, selected with attitude weight `weight`.
pub fn build_subsampled_traverse(
    table: &PoseTable,
    weight: f64,
    threshold: f64,
    verbose: bool,
) -> Result<PoseTable, Error> {
    let metric = PoseMetric::new(weight)?;
    let indices = select_keyframes(&table.poses, &metric, threshold, verbose)?;
    table.subset(&indices)
}

/// Copy the keyframe images of `camera` in `traverse` to `<out_dir>/<camera>/images/` and write
/// their poses to `<out_dir>/<camera>/camera_poses.csv`.
///
/// Returns the directory written to.
pub fn save_subsampled_traverse(
    dataset: &Dataset,
    traverse: &str,
    camera: &str,
    keyframes: &PoseTable,
    out_dir: &Path,
    verbose: bool,
) -> Result<PathBuf, Error> {
    let src = dataset.ready_images(traverse, camera);
    let dst = out_dir.join(camera);
    let dst_images = dst.join("images");
    std::fs::create_dir_all(&dst_images)?;

    let pb = progress_bar(keyframes.len() as u64, "Copying keyframes", verbose);
    for t in keyframes.timestamps.iter().progress_with(pb) {
        let from = image_path(&src, *t);
        require(&from)?;
        std::fs::copy(&from, image_path(&dst_images, *t))?;
    }
    keyframes.write_text(&dst.join("camera_poses.csv"))?;
    info!(
        "{} {}: saved {} keyframes to {}",
        traverse,
        camera,
        keyframes.len(),
        dst.display()
    );
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::metric;
    use crate::se3::random_poses;
    use tempfile::tempdir;

    fn line(n: usize) -> PoseSet {
        PoseSet::from_xyzrpy(
            &(0..n)
                .map(|i| [i as f64, 0., 0., 0., 0., 0.])
                .collect::<Vec<_>>(),
        )
        .unwrap()
    }

    #[test]
    fn evenly_spaced_line() {
        let kf = select_keyframes(&line(10), &PoseMetric::translation_only(), 2.5, false).unwrap();
        assert_eq!(kf, vec![0, 3, 6, 9]);
    }

    #[test]
    fn progress_covers_every_comparison() {
        for n in &[1, 2, 10] {
            let poses = line(*n);
            assert_eq!(comparisons(&poses), poses.iter().skip(1).count() as u64);
        }
        assert_eq!(comparisons(&line(1)), 0);
        let kf = select_keyframes(&line(10), &PoseMetric::translation_only(), 2.5, true).unwrap();
        assert_eq!(kf, vec![0, 3, 6, 9]);
    }

    #[test]
    fn single_pose() {
        let kf = select_keyframes(&line(1), &PoseMetric::translation_only(), 2.5, false).unwrap();
        assert_eq!(kf, vec![0]);
    }

    #[test]
    fn rotation_counts_with_weight() {
        // standing still while turning in place
        let poses = PoseSet::from_xyzrpy(
            &(0..10)
                .map(|i| [0., 0., 0., 0., 0., i as f64 * 0.1])
                .collect::<Vec<_>>(),
        )
        .unwrap();
        let still = select_keyframes(&poses, &PoseMetric::translation_only(), 0.5, false).unwrap();
        assert_eq!(still, vec![0]);
        let turning = select_keyframes(&poses, &PoseMetric::new(10.0).unwrap(), 2.5, false).unwrap();
        assert_eq!(turning, vec![0, 3, 6, 9]);
    }

    #[test]
    fn keyframes_are_separated() {
        let poses = random_poses(200);
        let m = PoseMetric::new(5.0).unwrap();
        let kf = select_keyframes(&poses, &m, 20.0, false).unwrap();
        assert_eq!(kf[0], 0);
        assert!(kf.windows(2).all(|w| w[0] < w[1]));
        let selected = poses.select(&kf).unwrap();
        for i in 1..selected.len() {
            let d = metric(
                &selected.at(i - 1).unwrap(),
                &selected.at(i).unwrap(),
                5.0,
            )
            .unwrap();
            assert!(d[0] > 20.0);
        }
    }

    #[test]
    fn subsampled_traverse_on_disk() {
        let root = tempdir().unwrap();
        let dataset = Dataset::new(root.path().join("raw"), root.path().join("ready"));
        let timestamps = (0..10).map(|i| 1000 + i).collect::<Vec<i64>>();
        let table = PoseTable::new(timestamps.clone(), line(10)).unwrap();
        let images = dataset.ready_images("t", "mono_left");
        std::fs::create_dir_all(&images).unwrap();
        for t in &timestamps {
            std::fs::write(image_path(&images, *t), t.to_string()).unwrap();
        }

        let keyframes = build_subsampled_traverse(&table, 10.0, 2.5, false).unwrap();
        assert_eq!(keyframes.index, vec![0, 3, 6, 9]);
        assert_eq!(keyframes.timestamps, vec![1000, 1003, 1006, 1009]);

        let out = root.path().join("subsampled");
        let dst = save_subsampled_traverse(&dataset, "t", "mono_left", &keyframes, &out, false)
            .unwrap();
        assert_eq!(dst, out.join("mono_left"));
        assert_eq!(
            std::fs::read_to_string(image_path(&dst.join("images"), 1003)).unwrap(),
            "1003"
        );
        assert!(!image_path(&dst.join("images"), 1001).exists());
        let written = PoseTable::from_file(&dst.join("camera_poses.csv")).unwrap();
        assert_eq!(written.index, vec![0, 3, 6, 9]);

        assert!(build_subsampled_traverse(&table, -1.0, 2.5, false).is_err());
    }

    #[test]
    fn missing_keyframe_image() {
        let root = tempdir().unwrap();
        let dataset = Dataset::new(root.path().join("raw"), root.path().join("ready"));
        let table = PoseTable::new(vec![1, 2], line(2)).unwrap();
        match save_subsampled_traverse(&dataset, "t", "mono_left", &table, root.path(), false) {
            Err(Error::MissingInput(_)) => (),
            x => panic!("expected missing input, got {:?}", x),
        }
    }
}
