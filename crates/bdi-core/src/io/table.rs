//! Centroid table: one whitespace-delimited row per frame.
//!
//! ```text
//! #     xc1     yc1     xc2     yc2
//! data/BDI0933__00001_skysub.fit 251.43     188.02     262.90     430.77
//! # data/BDI0933__00002_skysub.fit NaN     NaN     262.31     431.12
//! ```
//!
//! Rows whose localization failed are commented out but kept, so row `i`
//! always belongs to frame `i`.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{BdiError, Result};
use crate::frame::{Centroid, Star};

#[derive(Clone, Debug, PartialEq)]
pub struct CentroidRecord {
    pub frame: PathBuf,
    pub centroids: Vec<Centroid>,
    /// False when the row is tagged as a failed localization.
    pub valid: bool,
}

impl CentroidRecord {
    pub fn new(frame: PathBuf, centroids: Vec<Centroid>) -> Self {
        let valid = centroids.iter().all(Centroid::is_valid);
        Self {
            frame,
            centroids,
            valid,
        }
    }

    pub fn star(&self, star: Star) -> Centroid {
        self.centroids
            .get(star.index())
            .copied()
            .unwrap_or(Centroid::FAILED)
    }

    fn to_line(&self) -> String {
        let mut line = if self.valid {
            format!("{} ", self.frame.display())
        } else {
            format!("# {} ", self.frame.display())
        };
        for c in &self.centroids {
            line.push_str(&format!("{}     {}     ", c.x, c.y));
        }
        line.push('\n');
        line
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CentroidTable {
    pub n_stars: usize,
    pub records: Vec<CentroidRecord>,
}

impl CentroidTable {
    pub fn new(n_stars: usize) -> Self {
        Self {
            n_stars,
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn push(&mut self, record: CentroidRecord) -> Result<()> {
        if record.centroids.len() != self.n_stars {
            return Err(BdiError::InvalidTable {
                line: self.records.len() + 1,
                reason: format!(
                    "expected {} centroids, got {}",
                    self.n_stars,
                    record.centroids.len()
                ),
            });
        }
        self.records.push(record);
        Ok(())
    }

    /// Indices and records of rows that were localized successfully.
    pub fn valid_records(&self) -> impl Iterator<Item = (usize, &CentroidRecord)> {
        self.records.iter().enumerate().filter(|(_, r)| r.valid)
    }

    pub fn header_line(n_stars: usize) -> String {
        let mut line = String::from("#     ");
        for i in 1..=n_stars {
            line.push_str(&format!("xc{i}     yc{i}     "));
        }
        line.push('\n');
        line
    }

    /// Write the whole table, replacing any existing file.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(Self::header_line(self.n_stars).as_bytes())?;
        for record in &self.records {
            writer.write_all(record.to_line().as_bytes())?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Start a new table file containing only the header line.
    pub fn create_file(path: &Path, n_stars: usize) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(Self::header_line(n_stars).as_bytes())?;
        Ok(())
    }

    /// Append one row to an existing table file.
    pub fn append_record(path: &Path, record: &CentroidRecord) -> Result<()> {
        let mut file = OpenOptions::new().append(true).create(true).open(path)?;
        file.write_all(record.to_line().as_bytes())?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let mut n_stars: Option<usize> = None;
        let mut records = Vec::new();

        for (i, raw) in contents.lines().enumerate() {
            let line_no = i + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            let (body, valid) = match line.strip_prefix('#') {
                Some(rest) => (rest.trim(), false),
                None => (line, true),
            };
            let tokens: Vec<&str> = body.split_whitespace().collect();

            if !valid && tokens.iter().all(|t| is_column_name(t)) {
                if n_stars.is_none() && !tokens.is_empty() {
                    n_stars = Some(tokens.len() / 2);
                }
                continue;
            }

            if tokens.len() < 3 || (tokens.len() - 1) % 2 != 0 {
                return Err(BdiError::InvalidTable {
                    line: line_no,
                    reason: format!("expected a file name and x/y pairs, got {} fields", tokens.len()),
                });
            }
            let stars = (tokens.len() - 1) / 2;
            match n_stars {
                Some(n) if n != stars => {
                    return Err(BdiError::InvalidTable {
                        line: line_no,
                        reason: format!("expected {n} stars, got {stars}"),
                    });
                }
                None => n_stars = Some(stars),
                _ => {}
            }

            let mut centroids = Vec::with_capacity(stars);
            for pair in tokens[1..].chunks_exact(2) {
                let x = parse_coordinate(pair[0], line_no)?;
                let y = parse_coordinate(pair[1], line_no)?;
                centroids.push(Centroid::new(x, y));
            }
            let valid = valid && centroids.iter().all(Centroid::is_valid);
            records.push(CentroidRecord {
                frame: PathBuf::from(tokens[0]),
                centroids,
                valid,
            });
        }

        Ok(Self {
            n_stars: n_stars.unwrap_or(0),
            records,
        })
    }

    /// Prefix every relative frame path with `root`, for datasets that
    /// moved after the table was written.
    pub fn rebased(mut self, root: &Path) -> Self {
        for record in &mut self.records {
            if record.frame.is_relative() {
                record.frame = root.join(&record.frame);
            }
        }
        self
    }
}

/// `xc<N>` or `yc<N>`, the column names of the header line.
fn is_column_name(token: &str) -> bool {
    token
        .strip_prefix("xc")
        .or_else(|| token.strip_prefix("yc"))
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

fn parse_coordinate(token: &str, line: usize) -> Result<f64> {
    token.parse::<f64>().map_err(|_| BdiError::InvalidTable {
        line,
        reason: format!("cannot parse coordinate {token:?}"),
    })
}
