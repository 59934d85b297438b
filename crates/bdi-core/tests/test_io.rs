use std::path::PathBuf;

use ndarray::{Array2, Array3};

use bdi_core::error::BdiError;
use bdi_core::frame::{Centroid, FrameData, Star};
use bdi_core::io::fits::{inspect, read_frame, read_key_str, read_science_frame, write_cube, write_image, FitsHeader, HeaderValue};
use bdi_core::io::source::FrameSource;
use bdi_core::io::table::{CentroidRecord, CentroidTable};
use bdi_core::pipeline::{ReductionConfig, RotationConfig};

// ---------------------------------------------------------------------------
// Centroid table
// ---------------------------------------------------------------------------

const TABLE: &str = "\
#     xc1     yc1     xc2     yc2
data/BDI0933__00001_skysub.fit 251.43     188.02     262.90     430.77
# data/BDI0933__00002_skysub.fit NaN     NaN     262.31     431.12
data/BDI0933__00003_skysub.fit 250.11     187.5     263.0     429.9
";

#[test]
fn test_table_parse_keeps_tagged_rows() {
    let table = CentroidTable::parse(TABLE).unwrap();
    assert_eq!(table.n_stars, 2);
    assert_eq!(table.len(), 3);
    assert!(table.records[0].valid);
    assert!(!table.records[1].valid);
    assert_eq!(table.records[1].frame, PathBuf::from("data/BDI0933__00002_skysub.fit"));
    assert!(table.records[1].star(Star::A).x.is_nan());
    assert_eq!(table.records[1].star(Star::B), Centroid::new(262.31, 431.12));
    assert_eq!(table.valid_records().map(|(i, _)| i).collect::<Vec<_>>(), vec![0, 2]);
}

#[test]
fn test_table_tagged_row_named_like_a_column_is_kept() {
    let contents = "\
#     xc1     yc1     xc2     yc2
xcam_0001.fit 251.43     188.02     262.90     430.77
# xcam_0002.fit 250.8     187.9     262.31     431.12
# yc_0003.fit NaN     NaN     263.0     429.9
";
    let table = CentroidTable::parse(contents).unwrap();
    assert_eq!(table.n_stars, 2);
    assert_eq!(table.len(), 3);
    assert!(table.records[0].valid);
    assert!(!table.records[1].valid);
    assert_eq!(table.records[1].frame, PathBuf::from("xcam_0002.fit"));
    assert_eq!(table.records[1].star(Star::A), Centroid::new(250.8, 187.9));
    assert!(!table.records[2].valid);
    assert_eq!(table.records[2].frame, PathBuf::from("yc_0003.fit"));
}

#[test]
fn test_table_write_then_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ABLocations");
    let table = CentroidTable::parse(TABLE).unwrap();
    table.write(&path).unwrap();
    let back = CentroidTable::read(&path).unwrap();
    assert_eq!(back.len(), table.len());
    assert_eq!(back.records[0], table.records[0]);
    assert_eq!(back.records[2], table.records[2]);
    assert!(!back.records[1].valid);
}

#[test]
fn test_table_append_grows_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ABLocations");
    CentroidTable::create_file(&path, 2).unwrap();
    let record = CentroidRecord::new(
        PathBuf::from("f1.fit"),
        vec![Centroid::new(1.5, 2.5), Centroid::new(3.5, 4.5)],
    );
    CentroidTable::append_record(&path, &record).unwrap();
    CentroidTable::append_record(&path, &record).unwrap();
    let table = CentroidTable::read(&path).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.records[1], record);
}

#[test]
fn test_table_rejects_bad_rows() {
    let err = CentroidTable::parse("f.fit 1.0 2.0 3.0\n").unwrap_err();
    assert!(matches!(err, BdiError::InvalidTable { line: 1, .. }));

    let err = CentroidTable::parse("f.fit 1.0 2.0 3.0 4.0\ng.fit 1.0 2.0\n").unwrap_err();
    assert!(matches!(err, BdiError::InvalidTable { line: 2, .. }));

    let err = CentroidTable::parse("f.fit 1.0 abc 3.0 4.0\n").unwrap_err();
    assert!(matches!(err, BdiError::InvalidTable { line: 1, .. }));
}

#[test]
fn test_table_rebased_paths() {
    let table = CentroidTable::parse(TABLE).unwrap().rebased(std::path::Path::new("/archive"));
    assert_eq!(
        table.records[0].frame,
        PathBuf::from("/archive/data/BDI0933__00001_skysub.fit")
    );
}

// ---------------------------------------------------------------------------
// FITS
// ---------------------------------------------------------------------------

#[test]
fn test_fits_single_frame_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.fit");
    let data = Array2::from_shape_fn((7, 11), |(r, c)| r as f64 * 1.5 - c as f64 * 0.25);
    let mut header = FitsHeader::new();
    header.set("ROTOFF", HeaderValue::Float(183.25));
    header.set("OBJECT", HeaderValue::Text("HD 1160".into()));
    write_image(&path, &data.view(), &header).unwrap();

    let frame = read_science_frame(&path, "ROTOFF").unwrap();
    assert_eq!(frame.rotation_offset, Some(183.25));
    match frame.data {
        FrameData::Single(back) => assert_eq!(back, data),
        FrameData::Cube(_) => panic!("expected a single image"),
    }

    let info = inspect(&path).unwrap();
    assert_eq!(info.axes(), vec![11, 7]);
    assert_eq!(info.bitpix, -64);
    assert_eq!(read_key_str(&path, "OBJECT").unwrap().as_deref(), Some("HD 1160"));
    assert!(read_key_str(&path, "TELESCOP").unwrap().is_none());
}

#[test]
fn test_fits_cube_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cube.fit");
    let data = Array3::from_shape_fn((3, 4, 5), |(p, r, c)| (p * 100 + r * 10 + c) as f64);
    write_cube(&path, &data.view(), &FitsHeader::new()).unwrap();
    assert_eq!(inspect(&path).unwrap().plane_count(), 3);

    let back = read_frame(&path).unwrap();
    assert_eq!(back.plane_count(), 3);
    assert_eq!(back.plane_dim(), (4, 5));
    assert_eq!(back.plane(2), data.index_axis(ndarray::Axis(0), 2));
    assert!(read_science_frame(&path, "ROTOFF").unwrap().rotation_offset.is_none());
}

#[test]
fn test_fits_rejects_non_fits() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("junk.fit");
    std::fs::write(&path, vec![b'x'; 4000]).unwrap();
    assert!(matches!(read_frame(&path), Err(BdiError::Fits { .. })));
    assert!(inspect(&path).is_err());
}

// ---------------------------------------------------------------------------
// Frame discovery
// ---------------------------------------------------------------------------

#[test]
fn test_discover_filters_and_sorts() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["BDI__00002_skysub.fit", "BDI__00001_skysub.fit", "BDI__00003_raw.fit", "notes.txt"] {
        std::fs::write(dir.path().join(name), b"").unwrap();
    }
    let source = FrameSource::discover(dir.path(), "BDI", "_skysub.fit").unwrap();
    let names: Vec<_> = source
        .paths()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["BDI__00001_skysub.fit", "BDI__00002_skysub.fit"]);

    assert!(matches!(
        FrameSource::discover(dir.path(), "XYZ", ".fit"),
        Err(BdiError::EmptySequence)
    ));
}

#[test]
fn test_list_file_skips_blank_lines() {
    let dir = tempfile::tempdir().unwrap();
    let list = dir.path().join("frames.txt");
    std::fs::write(&list, "a.fit\n\n  b.fit  \n").unwrap();
    let source = FrameSource::from_list_file(&list).unwrap();
    assert_eq!(source.paths(), &[PathBuf::from("a.fit"), PathBuf::from("b.fit")]);
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[test]
fn test_default_config_is_valid() {
    let config = ReductionConfig::default();
    config.validate().unwrap();
    assert_eq!(config.klip.ranks, vec![1, 3, 5, 10]);
    assert_eq!(config.scan.n_stars, 2);
    assert_eq!(config.stack.box_half_size, 20);
}

#[test]
fn test_config_serde_round_trip() {
    let mut config = ReductionConfig::default();
    config.klip.ranks = vec![2, 4];
    config.scan.reference_guess = Some([120.0, 240.5]);
    let json = serde_json::to_string(&config).unwrap();
    let back: ReductionConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back.klip.ranks, vec![2, 4]);
    assert_eq!(back.scan.reference_guess, Some([120.0, 240.5]));
}

#[test]
fn test_partial_config_fills_defaults() {
    let back: ReductionConfig = serde_json::from_str(r#"{"klip": {"ranks": [7]}}"#).unwrap();
    assert_eq!(back.klip.ranks, vec![7]);
    assert_eq!(back.localize.fwhm, 10.0);
    assert_eq!(back.rotation.roll_zero_deg, 180.0);
}

#[test]
fn test_invalid_config_rejected() {
    let mut config = ReductionConfig::default();
    config.klip.ranks = vec![0];
    assert!(matches!(config.validate(), Err(BdiError::Config(_))));

    let mut config = ReductionConfig::default();
    config.scan.n_stars = 0;
    assert!(config.validate().is_err());

    let mut config = ReductionConfig::default();
    config.output.preview_format = "gif".into();
    assert!(matches!(config.validate(), Err(BdiError::Config(_))));
}

#[test]
fn test_derotation_angle() {
    let rotation = RotationConfig::default();
    assert!((rotation.derotation_angle(180.0) + 1.8).abs() < 1e-12);
    assert!((rotation.derotation_angle(270.0) - 88.2).abs() < 1e-12);
}
