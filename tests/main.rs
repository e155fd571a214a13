use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::path::*;
use std::process::Command;
use tempfile::tempdir;

/// Write a camera pose table for `traverse` with one pose per x coordinate along a straight line.
fn write_traverse(ready: &Path, traverse: &str, start: i64, xs: &[f64]) -> Vec<i64> {
    let dir = ready.join(traverse).join("stereo/left");
    std::fs::create_dir_all(dir.join("images")).unwrap();
    let mut csv = ",timestamp,northing,easting,down,roll,pitch,yaw\n".to_string();
    let mut timestamps = Vec::new();
    for (i, x) in xs.iter().enumerate() {
        let t = start + i as i64;
        csv.push_str(&format!("{},{},{},0.0,0.0,0.0,0.0,0.0\n", i, t, x));
        std::fs::write(dir.join("images").join(format!("{}.png", t)), b"").unwrap();
        timestamps.push(t);
    }
    std::fs::write(dir.join("camera_poses.csv"), csv).unwrap();
    timestamps
}

#[test]
fn correspond_two_traverses() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let ready = dir.path().join("ready");
    write_traverse(&ready, "a", 100, &(0..10).map(|i| i as f64).collect::<Vec<_>>());
    write_traverse(&ready, "b", 200, &(0..10).map(|i| i as f64 + 0.4).collect::<Vec<_>>());
    let out = dir.path().join("correspondences.txt");

    let mut cmd = Command::cargo_bin("traverse2vpr")?;
    cmd.arg("correspond")
        .arg("--ready-dir")
        .arg(&ready)
        .arg("-o")
        .arg(&out)
        .arg("a")
        .arg("b");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "Matched 5 reference keyframes against 1 query traverses",
        ));

    let table = std::fs::read_to_string(&out)?;
    assert_eq!(
        table,
        "a b\r\n100 200\r\n102 202\r\n104 204\r\n106 206\r\n108 208\r\n"
    );

    Ok(())
}

#[test]
fn correspond_against_base() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let ready = dir.path().join("ready");
    write_traverse(&ready, "base", 100, &[0., 2., 4.]);
    write_traverse(&ready, "b", 200, &[0.1, 1.9, 4.2]);
    write_traverse(&ready, "c", 300, &[4.1, 0.2]);
    let out = dir.path().join("correspondences.txt");

    let mut cmd = Command::cargo_bin("traverse2vpr")?;
    cmd.arg("correspond")
        .arg("--ready-dir")
        .arg(&ready)
        .arg("-o")
        .arg(&out)
        .arg("--base")
        .arg("base")
        .arg("b")
        .arg("c");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "Matched 3 reference keyframes against 2 query traverses",
        ));

    assert_eq!(
        std::fs::read_to_string(&out)?,
        "b c\r\n200 301\r\n201 301\r\n202 300\r\n"
    );

    Ok(())
}

#[test]
fn correspond_missing_query() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let ready = dir.path().join("ready");
    write_traverse(&ready, "a", 100, &[0., 1., 2.]);

    let mut cmd = Command::cargo_bin("traverse2vpr")?;
    cmd.arg("correspond")
        .arg("--ready-dir")
        .arg(&ready)
        .arg("-o")
        .arg(dir.path().join("out.txt"))
        .arg("a")
        .arg("missing");
    cmd.assert().failure();

    Ok(())
}

#[test]
fn subsample_traverse() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let ready = dir.path().join("ready");
    write_traverse(&ready, "a", 1000, &(0..20).map(|i| i as f64 * 0.5).collect::<Vec<_>>());
    let out = dir.path().join("subsampled");

    let mut cmd = Command::cargo_bin("traverse2vpr")?;
    cmd.arg("subsample")
        .arg("--ready-dir")
        .arg(&ready)
        .arg("a")
        .arg(&out);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("to 4 keyframes of 20 poses"));

    let images = out.join("stereo/left/images");
    for t in &[1000, 1005, 1010, 1015] {
        assert!(images.join(format!("{}.png", t)).exists());
    }
    assert!(!images.join("1001.png").exists());
    assert!(out.join("stereo/left/camera_poses.csv").exists());

    Ok(())
}

#[test]
fn ply_with_keyframes() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let ready = dir.path().join("ready");
    write_traverse(&ready, "a", 0, &(0..10).map(|i| i as f64).collect::<Vec<_>>());
    let out = dir.path().join("a.ply");

    let mut cmd = Command::cargo_bin("traverse2vpr")?;
    cmd.arg("ply")
        .arg(ready.join("a/stereo/left/camera_poses.csv"))
        .arg(&out)
        .arg("--keyframes")
        .arg("2.5");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Wrote 10 cameras and 4 keyframes"));
    assert!(std::fs::read_to_string(&out)?.starts_with("ply"));

    Ok(())
}

#[test]
fn align_images() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let raw = dir.path().join("raw");
    let ready = dir.path().join("ready");
    let extrinsics = dir.path().join("extrinsics");
    std::fs::create_dir_all(raw.join("t1"))?;
    std::fs::write(
        raw.join("t1/rtk.csv"),
        "timestamp,northing,easting,down,roll,pitch,yaw\n\
         100,0.0,0.0,0.0,0.0,0.0,0.0\n\
         300,20.0,0.0,0.0,0.0,0.0,0.0\n",
    )?;
    std::fs::create_dir_all(&extrinsics)?;
    std::fs::write(extrinsics.join("ins.txt"), "0 0 0 0 0 0\n")?;
    std::fs::write(extrinsics.join("stereo.txt"), "0 0 0 0 0 0\n")?;
    let images = ready.join("t1/stereo/left/images");
    std::fs::create_dir_all(&images)?;
    std::fs::write(images.join("150.png"), b"")?;
    std::fs::write(images.join("250.png"), b"")?;

    let mut cmd = Command::cargo_bin("traverse2vpr")?;
    cmd.arg("align")
        .arg("--raw-dir")
        .arg(&raw)
        .arg("--ready-dir")
        .arg(&ready)
        .arg("--extrinsics-dir")
        .arg(&extrinsics)
        .arg("--cameras")
        .arg("stereo/left");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "Pose table with 2 poses from 150 to 250",
        ));
    assert!(ready.join("t1/stereo/left/camera_poses.csv").exists());

    Ok(())
}

#[test]
fn ready_raw_images() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let raw = dir.path().join("raw");
    let ready = dir.path().join("ready");
    std::fs::create_dir_all(raw.join("t1/mono_left"))?;
    image::RgbImage::new(8, 6).save(raw.join("t1/mono_left/42.png"))?;

    let mut cmd = Command::cargo_bin("traverse2vpr")?;
    cmd.arg("ready")
        .arg("--raw-dir")
        .arg(&raw)
        .arg("--ready-dir")
        .arg(&ready)
        .arg("--cameras")
        .arg("mono_left")
        .arg("--workers")
        .arg("2");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Readied 1 images"));
    assert!(ready.join("t1/mono_left/images/42.png").exists());

    Ok(())
}
