use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BdiError, Result};

/// Ordered list of science files making up one dataset.
#[derive(Clone, Debug, Default)]
pub struct FrameSource {
    paths: Vec<PathBuf>,
}

impl FrameSource {
    pub fn from_paths(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    /// Collect every file in `dir` whose name starts with `prefix` and ends
    /// with `suffix`, sorted lexicographically by file name.
    pub fn discover(dir: &Path, prefix: &str, suffix: &str) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(prefix) && name.ends_with(suffix) {
                paths.push(entry.path());
            }
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        if paths.is_empty() {
            return Err(BdiError::EmptySequence);
        }
        Ok(Self { paths })
    }

    /// Read a list file with one frame path per line. Blank lines are skipped.
    pub fn from_list_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let paths: Vec<PathBuf> = contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(PathBuf::from)
            .collect();
        if paths.is_empty() {
            return Err(BdiError::EmptySequence);
        }
        Ok(Self { paths })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn first(&self) -> Result<&Path> {
        self.paths
            .first()
            .map(PathBuf::as_path)
            .ok_or(BdiError::EmptySequence)
    }
}
