mod common;

use common::{render, Source};

use bdi_core::detect::{localize_star, LocalizeConfig, LocalizeOutcome};

// ---------------------------------------------------------------------------
// Centroid accuracy
// ---------------------------------------------------------------------------

#[test]
fn test_single_source_recovered_within_tenth_pixel() {
    let config = LocalizeConfig::default();
    for &(x, y) in &[(63.3, 58.7), (40.0, 90.0), (71.55, 66.25), (20.9, 30.1)] {
        let image = render((128, 128), &[Source::new(x, y, 5e4)]);
        let found = localize_star(&image.view(), x.round() as usize + 3, y.round() as usize - 2, &config);
        assert!(found.is_found(), "no detection for ({x}, {y})");
        assert!((found.centroid.x - x).abs() < 0.15, "x {} vs {x}", found.centroid.x);
        assert!((found.centroid.y - y).abs() < 0.15, "y {} vs {y}", found.centroid.y);
    }
}

#[test]
fn test_window_clamped_at_image_edge() {
    let config = LocalizeConfig {
        box_half_size: 30,
        ..LocalizeConfig::default()
    };
    let image = render((96, 96), &[Source::new(12.4, 84.2, 5e4)]);
    let found = localize_star(&image.view(), 5, 90, &config);
    assert!(found.is_found());
    assert!((found.centroid.x - 12.4).abs() < 0.15);
    assert!((found.centroid.y - 84.2).abs() < 0.15);
    assert_eq!(found.guess, (5, 90));
}

#[test]
fn test_centroid_within_image_bounds() {
    let config = LocalizeConfig::default();
    let image = render((64, 64), &[Source::new(0.3, 32.0, 2e5)]);
    let found = localize_star(&image.view(), 2, 30, &config);
    if found.is_found() {
        assert!(found.centroid.x >= 0.0 && found.centroid.x <= 63.0);
        assert!(found.centroid.y >= 0.0 && found.centroid.y <= 63.0);
    } else {
        assert!(!found.centroid.is_valid());
    }
}

// ---------------------------------------------------------------------------
// Threshold state machine
// ---------------------------------------------------------------------------

#[test]
fn test_single_source_found_on_first_tier() {
    let image = render((128, 128), &[Source::new(64.0, 64.0, 5e4)]);
    let found = localize_star(&image.view(), 64, 64, &LocalizeConfig::default());
    assert_eq!(
        found.outcome,
        LocalizeOutcome::Found {
            tier: 0,
            threshold: 1e4,
            escalations: 0
        }
    );
}

#[test]
fn test_two_sources_raise_threshold_to_brightest() {
    let image = render(
        (160, 160),
        &[Source::new(50.2, 60.7, 5e4), Source::new(110.6, 95.3, 2e4)],
    );
    let found = localize_star(&image.view(), 80, 80, &LocalizeConfig::default());
    match found.outcome {
        LocalizeOutcome::Found {
            tier,
            threshold,
            escalations,
        } => {
            assert_eq!(tier, 0);
            assert!(escalations > 0);
            assert_eq!(threshold, 1e4 + escalations as f64 * 500.0);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!((found.centroid.x - 50.2).abs() < 0.15);
    assert!((found.centroid.y - 60.7).abs() < 0.15);
}

#[test]
fn test_escalation_stops_at_first_single_source_step() {
    let image = render(
        (160, 160),
        &[Source::new(50.2, 60.7, 5e4), Source::new(110.6, 95.3, 2e4)],
    );
    let config = LocalizeConfig::default();
    let found = localize_star(&image.view(), 80, 80, &config);
    let LocalizeOutcome::Found { escalations, .. } = found.outcome else {
        panic!("unexpected outcome {:?}", found.outcome);
    };

    // One step less still leaves both stars, so the search must not stop there.
    let short = LocalizeConfig {
        threshold: config.threshold + (escalations - 1) as f64 * config.threshold_step,
        ..config.clone()
    };
    let again = localize_star(&image.view(), 80, 80, &short);
    assert!(matches!(again.outcome, LocalizeOutcome::Found { escalations: 1, tier: 0, .. }));
    assert_eq!(again.centroid, found.centroid);
}

#[test]
fn test_faint_source_found_on_fallback_tier() {
    let config = LocalizeConfig {
        threshold: 1e6,
        retry_thresholds: vec![1e2, 5e1],
        ..LocalizeConfig::default()
    };
    let image = render((128, 128), &[Source::new(70.3, 52.8, 3e3)]);
    let found = localize_star(&image.view(), 70, 53, &config);
    assert!(matches!(found.outcome, LocalizeOutcome::Found { tier: 1, .. }));
    assert!((found.centroid.x - 70.3).abs() < 0.15);
    assert!((found.centroid.y - 52.8).abs() < 0.15);
}

#[test]
fn test_blank_image_fails_with_sentinel() {
    let image = ndarray::Array2::<f64>::zeros((64, 64));
    let found = localize_star(&image.view(), 32, 32, &LocalizeConfig::default());
    assert_eq!(found.outcome, LocalizeOutcome::Failed { tiers_tried: 3 });
    assert!(!found.is_found());
    assert!(found.centroid.x.is_nan() && found.centroid.y.is_nan());
    assert!(!found.centroid.is_valid());
}

#[test]
fn test_custom_tiers_are_tried_in_order() {
    let config = LocalizeConfig {
        threshold: 1e7,
        retry_thresholds: vec![1e6, 1e2],
        ..LocalizeConfig::default()
    };
    let image = render((128, 128), &[Source::new(64.0, 64.0, 3e4)]);
    let found = localize_star(&image.view(), 64, 64, &config);
    assert!(matches!(
        found.outcome,
        LocalizeOutcome::Found { tier: 2, threshold, .. } if threshold == 1e2
    ));
}
