use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;

use crate::error::Result;
use crate::io::fits::{write_cube, FitsHeader, HeaderValue};
use crate::io::image_io::save_preview;

use super::assemble::ReducedCube;
use super::config::OutputConfig;

/// Dataset name from a frame path: the file stem up to its first `_`.
///
/// `BDI0933__00001_skysub.fit` gives `BDI0933`.
pub fn dataset_name(frame: &Path) -> String {
    let stem = frame
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("dataset");
    match stem.split('_').next() {
        Some(head) if !head.is_empty() => head.to_string(),
        _ => stem.to_string(),
    }
}

/// Path of a reduced cube: `<dir>/<dataset>_klipcube_<a|b>[_median]<suffix>.fit`.
pub fn cube_path(config: &OutputConfig, dataset: &str, cube: &ReducedCube, median: bool) -> PathBuf {
    let kind = if median { "_median" } else { "" };
    config.directory.join(format!(
        "{dataset}_klipcube_{}{kind}{}.fit",
        cube.star.suffix(),
        config.suffix
    ))
}

/// Header cards describing a reduced cube.
pub fn cube_header(dataset: &str, cube: &ReducedCube, combination: &str) -> FitsHeader {
    let mut header = FitsHeader::new();
    header.set("DATASET", HeaderValue::Text(dataset.to_string()));
    header.set("STAR", HeaderValue::Text(cube.star.to_string()));
    header.set("KLMODES", HeaderValue::Text(format_ranks(&cube.ranks)));
    header.set("STAMPAX", HeaderValue::Int(cube.stamp_size as i64));
    header.set("NFRAMES", HeaderValue::Int(cube.frames as i64));
    header.set("COMBINE", HeaderValue::Text(combination.to_string()));
    header.set("DATE", HeaderValue::Text(Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()));
    header.set("REFSTAR", HeaderValue::Text(cube.star.other().to_string()));
    header
}

/// Write a reduced cube (and optionally its median cube and previews).
/// Returns every path written.
pub fn write_reduced_cube(cube: &ReducedCube, dataset: &str, config: &OutputConfig) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(&config.directory)?;
    let mut written = Vec::new();

    let path = cube_path(config, dataset, cube, false);
    write_cube(&path, &cube.mean.view(), &cube_header(dataset, cube, "sigma-clipped mean"))?;
    written.push(path.clone());

    if config.write_median {
        let median_path = cube_path(config, dataset, cube, true);
        write_cube(&median_path, &cube.median.view(), &cube_header(dataset, cube, "median"))?;
        written.push(median_path);
    }

    if config.preview {
        for (plane, rank) in cube.mean.outer_iter().zip(&cube.ranks) {
            let preview = path.with_file_name(format!(
                "{}_k{rank}.{}",
                path.file_stem().and_then(|s| s.to_str()).unwrap_or("klipcube"),
                config.preview_format
            ));
            save_preview(&plane, &preview)?;
            written.push(preview);
        }
    }

    info!(star = %cube.star, files = written.len(), "Output written");
    Ok(written)
}

fn format_ranks(ranks: &[usize]) -> String {
    ranks.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(",")
}
