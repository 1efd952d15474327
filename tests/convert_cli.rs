use std::process::Command;

use image::RgbImage;

fn convert_cmd(artworks: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_dzi-convert"));
    cmd.env("ARTWORKS_DIR", artworks)
        .env("DZI_TILER", "image")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn nonexistent_source_exits_with_failure() {
    let work = tempfile::tempdir().unwrap();
    let artworks = work.path().join("Artworks");

    let output = convert_cmd(&artworks)
        .arg(work.path().join("missing.jpg"))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("file not found"));
    assert!(!artworks.exists());
}

#[test]
fn missing_argument_is_a_usage_error() {
    let work = tempfile::tempdir().unwrap();
    let output = convert_cmd(work.path()).output().unwrap();
    assert!(!output.status.success());
}

#[test]
fn converts_and_cleans_up() {
    let work = tempfile::tempdir().unwrap();
    let artworks = work.path().join("Artworks");
    let source = work.path().join("Blue Hour.png");
    RgbImage::from_pixel(300, 200, image::Rgb([20, 40, 160]))
        .save(&source)
        .unwrap();

    let output = convert_cmd(&artworks)
        .arg(&source)
        .arg("--cleanup")
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Slug: blue-hour"));
    assert!(stdout.contains("Original image deleted"));
    assert!(artworks.join("blue-hour/blue-hour.dzi").is_file());
    assert!(artworks.join("blue-hour/blue-hour_files").is_dir());
    assert!(!source.exists());
}
