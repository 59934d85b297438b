use std::path::PathBuf;

use anyhow::{Context, Result};
use bdi_core::consts::ROTATION_HEADER_KEY;
use bdi_core::io::fits::{inspect, read_key_f64, read_key_str};
use clap::Args;

/// Keywords shown for every file when present.
const SUMMARY_KEYS: [&str; 3] = ["OBJECT", "DATE-OBS", "EXPTIME"];

#[derive(Args)]
pub struct InfoArgs {
    /// Input FITS file
    pub file: PathBuf,

    /// Extra header keywords to print
    #[arg(short, long = "key")]
    pub keys: Vec<String>,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let info = inspect(&args.file).with_context(|| format!("Failed to open {}", args.file.display()))?;

    println!("File:        {}", args.file.display());
    match info.axes().as_slice() {
        [w, h] => println!("Dimensions:  {w}x{h}"),
        [w, h, n] => println!("Dimensions:  {w}x{h}, {n} planes"),
        other => println!("Axes:        {other:?}"),
    }
    println!("BITPIX:      {}", info.bitpix);
    match read_key_f64(&args.file, ROTATION_HEADER_KEY)? {
        Some(rot) => println!("{ROTATION_HEADER_KEY}:      {rot}"),
        None => println!("{ROTATION_HEADER_KEY}:      missing"),
    }

    let data_mb = info.data_bytes() as f64 / (1024.0 * 1024.0);
    println!("Data size:   {data_mb:.1} MB (as f64)");

    let extra = SUMMARY_KEYS.iter().map(|k| k.to_string()).chain(args.keys.iter().cloned());
    for key in extra {
        let key = key.to_ascii_uppercase();
        if let Some(value) = read_key_str(&args.file, &key)? {
            println!("{:<12} {value}", format!("{key}:"));
        } else if args.keys.iter().any(|k| k.eq_ignore_ascii_case(&key)) {
            println!("{:<12} missing", format!("{key}:"));
        }
    }
    Ok(())
}
