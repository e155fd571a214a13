//! Converting raw camera images into undistorted images.

use image::DynamicImage;
use indicatif::ParallelProgressIterator;
use log::info;
use rayon::prelude::*;

use std::collections::HashSet;
use std::path::Path;

use crate::dataset::{list_images, Dataset};
use crate::error::Error;
use crate::progress::progress_bar;

/// Camera model that turns a raw image file into an undistorted image.
///
/// Implementations are shared between worker threads.
pub trait Undistort: Sync {
    fn undistort(&self, raw: &Path) -> Result<DynamicImage, Error>;
}

/// Decodes images without changing them, for cameras that are already rectified.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Undistort for Passthrough {
    fn undistort(&self, raw: &Path) -> Result<DynamicImage, Error> {
        Ok(image::open(raw)?)
    }
}

/// Undistort every raw `.png` image of `camera` in `traverse` into the ready image directory.
///
/// Images are processed on a pool of `workers` threads (`0` picks one per core). Unless
/// `overwrite` is set, images that are already in the ready directory are skipped. Returns the
/// number of images written.
pub fn ready_images<U: Undistort>(
    dataset: &Dataset,
    undistorter: &U,
    traverse: &str,
    camera: &str,
    workers: usize,
    overwrite: bool,
    verbose: bool,
) -> Result<usize, Error> {
    let raw_dir = dataset.raw_images(traverse, camera);
    let ready_dir = dataset.ready_images(traverse, camera);
    let names = list_images(&raw_dir)?;

    let todo = if !overwrite && ready_dir.is_dir() {
        let done = list_images(&ready_dir)?.into_iter().collect::<HashSet<_>>();
        names
            .into_iter()
            .filter(|n| !done.contains(n))
            .collect::<Vec<_>>()
    } else {
        names
    };
    std::fs::create_dir_all(&ready_dir)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()?;
    let message = format!("{} {}", traverse, camera);
    pool.install(|| {
        todo.par_iter()
            .progress_with(progress_bar(todo.len() as u64, &message, verbose))
            .map(|name| {
                let img = undistorter.undistort(&raw_dir.join(name))?;
                img.save(ready_dir.join(name))?;
                Ok(())
            })
            .collect::<Result<Vec<()>, Error>>()
    })?;

    info!(
        "{} {}: readied {} images into {}",
        traverse,
        camera,
        todo.len(),
        ready_dir.display()
    );
    Ok(todo.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    /// Mirrors images left to right.
    struct Mirror;

    impl Undistort for Mirror {
        fn undistort(&self, raw: &Path) -> Result<DynamicImage, Error> {
            Ok(image::open(raw)?.fliph())
        }
    }

    fn raw_image(dataset: &Dataset, name: &str) {
        let dir = dataset.raw_images("t", "mono_left");
        std::fs::create_dir_all(&dir).unwrap();
        let mut img = RgbImage::new(4, 3);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.save(dir.join(name)).unwrap();
    }

    #[test]
    fn readies_and_resumes() {
        let root = tempdir().unwrap();
        let dataset = Dataset::new(root.path().join("raw"), root.path().join("ready"));
        raw_image(&dataset, "100.png");
        raw_image(&dataset, "200.png");

        assert_eq!(
            ready_images(&dataset, &Passthrough, "t", "mono_left", 2, false, false).unwrap(),
            2
        );
        let out = dataset.ready_images("t", "mono_left");
        assert!(out.join("100.png").exists());
        assert!(out.join("200.png").exists());

        raw_image(&dataset, "300.png");
        assert_eq!(
            ready_images(&dataset, &Passthrough, "t", "mono_left", 2, false, false).unwrap(),
            1
        );
        assert_eq!(
            ready_images(&dataset, &Passthrough, "t", "mono_left", 1, true, false).unwrap(),
            3
        );
    }

    #[test]
    fn applies_camera_model() {
        let root = tempdir().unwrap();
        let dataset = Dataset::new(root.path().join("raw"), root.path().join("ready"));
        raw_image(&dataset, "100.png");
        ready_images(&dataset, &Mirror, "t", "mono_left", 1, true, false).unwrap();
        let out = image::open(dataset.ready_images("t", "mono_left").join("100.png"))
            .unwrap()
            .to_rgb8();
        assert_eq!(out.get_pixel(3, 0), &Rgb([255, 0, 0]));
        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn missing_camera() {
        let root = tempdir().unwrap();
        let dataset = Dataset::new(root.path().join("raw"), root.path().join("ready"));
        match ready_images(&dataset, &Passthrough, "t", "mono_rear", 1, true, false) {
            Err(Error::MissingInput(_)) => (),
            x => panic!("expected missing input, got {:?}", x),
        }
    }
}
