mod common;

use common::{render, write_dataset, Source};

use bdi_core::detect::{find_stars, reference_stamp, scan_frames, LocalizeConfig, ScanConfig};
use bdi_core::frame::FrameData;
use bdi_core::io::source::FrameSource;
use bdi_core::pipeline::{NoOpReporter, ReductionWarning};

fn three_stars() -> Vec<Source> {
    vec![
        Source::new(60.3, 70.6, 5e4),
        Source::new(180.7, 90.2, 3e4),
        Source::new(120.4, 190.8, 2e4),
    ]
}

// ---------------------------------------------------------------------------
// Multi-star finder
// ---------------------------------------------------------------------------

#[test]
fn test_stars_returned_brightest_first() {
    let truth = three_stars();
    let frame = FrameData::Single(render((256, 256), &truth));
    let stamp = reference_stamp(&frame, Some([60.3, 70.6]), [20, 20]).unwrap();

    let found = find_stars(&stamp.view(), &frame, 3, 20.0, &LocalizeConfig::default()).unwrap();
    assert_eq!(found.len(), 3);
    for (located, expected) in found.iter().zip(&truth) {
        assert!(located.is_found());
        assert!(
            (located.centroid.x - expected.x).abs() < 0.15,
            "x {} vs {}",
            located.centroid.x,
            expected.x
        );
        assert!(
            (located.centroid.y - expected.y).abs() < 0.15,
            "y {} vs {}",
            located.centroid.y,
            expected.y
        );
    }
}

#[test]
fn test_single_star_request() {
    let truth = three_stars();
    let frame = FrameData::Single(render((256, 256), &truth));
    let stamp = reference_stamp(&frame, None, [20, 20]).unwrap();

    let found = find_stars(&stamp.view(), &frame, 1, 20.0, &LocalizeConfig::default()).unwrap();
    assert_eq!(found.len(), 1);
    assert!((found[0].centroid.x - 60.3).abs() < 0.15);
    assert!((found[0].centroid.y - 70.6).abs() < 0.15);
}

#[test]
fn test_cube_frame_searches_first_plane() {
    let truth = three_stars();
    let first = render((256, 256), &truth[..2]);
    let second = render((256, 256), &[Source::new(30.0, 30.0, 9e4)]);
    let cube = ndarray::stack(ndarray::Axis(0), &[first.view(), second.view()]).unwrap();
    let frame = FrameData::Cube(cube);
    let stamp = reference_stamp(&frame, Some([60.3, 70.6]), [20, 20]).unwrap();

    let found = find_stars(&stamp.view(), &frame, 2, 20.0, &LocalizeConfig::default()).unwrap();
    assert!((found[0].centroid.x - 60.3).abs() < 0.15);
    assert!((found[1].centroid.x - 180.7).abs() < 0.15);
}

#[test]
fn test_missing_star_yields_sentinel() {
    let frame = FrameData::Single(render((128, 128), &[Source::new(64.2, 60.4, 5e4)]));
    let stamp = reference_stamp(&frame, None, [20, 20]).unwrap();

    let found = find_stars(&stamp.view(), &frame, 2, 20.0, &LocalizeConfig::default()).unwrap();
    assert!(found[0].is_found());
    assert!(!found[1].is_found());
    assert!(!found[1].centroid.is_valid());
}

// ---------------------------------------------------------------------------
// Reference stamp
// ---------------------------------------------------------------------------

#[test]
fn test_reference_stamp_size_and_clamping() {
    let frame = FrameData::Single(render((128, 128), &[Source::new(64.0, 64.0, 5e4)]));
    let stamp = reference_stamp(&frame, Some([64.0, 64.0]), [20, 10]).unwrap();
    assert_eq!(stamp.dim(), (20, 40));

    let clamped = reference_stamp(&frame, Some([5.0, 120.0]), [20, 20]).unwrap();
    assert_eq!(clamped.dim(), (128 - 100, 25));
}

#[test]
fn test_reference_stamp_outside_frame_is_error() {
    let frame = FrameData::Single(ndarray::Array2::zeros((32, 32)));
    assert!(reference_stamp(&frame, Some([200.0, 200.0]), [10, 10]).is_err());
}

// ---------------------------------------------------------------------------
// Dataset scan
// ---------------------------------------------------------------------------

#[test]
fn test_scan_keeps_frame_order_and_tags_failures() {
    let dir = tempfile::tempdir().unwrap();
    let stars = [Source::new(44.3, 60.6, 5e4), Source::new(84.7, 66.2, 3e4)];
    let mut paths = write_dataset(dir.path(), (128, 128), &stars, 4, |i| (0.2 * i as f64, -0.1 * i as f64));

    let blank = dir.path().join("BDI0933__00009_skysub.fit");
    common::write_frame(&blank, ndarray::Array2::zeros((128, 128)), Some(180.0));
    paths.push(blank);

    let source = FrameSource::from_paths(paths.clone());
    let scan = ScanConfig {
        corr_box_half: [20, 20],
        ..ScanConfig::default()
    };
    let result = scan_frames(&source, &scan, &LocalizeConfig::default(), &NoOpReporter).unwrap();

    assert_eq!(result.table.len(), 5);
    assert_eq!(result.failed_rows(), 1);
    for (i, record) in result.table.records.iter().enumerate() {
        assert_eq!(record.frame, paths[i]);
    }
    for (i, record) in result.table.records.iter().take(4).enumerate() {
        assert!(record.valid);
        assert!((record.centroids[0].x - (44.3 + 0.2 * i as f64)).abs() < 0.15);
        assert!((record.centroids[1].y - (66.2 - 0.1 * i as f64)).abs() < 0.15);
    }
    assert!(result
        .warnings
        .iter()
        .any(|w| matches!(w, ReductionWarning::LocalizationFailed { frame: 4, .. })));
}
