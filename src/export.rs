// src/export.rs

use chrono::Local;
use csv::Writer;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::core::flatten::{FlatRecord, Flattener};
use crate::core::models::{ReconError, Report};
use crate::core::target::Target;

/// Pretty-printed JSON document, top-level keys in section order.
pub fn to_json_string(report: &Report) -> Result<String, ReconError> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub fn write_json(report: &Report, path: &Path) -> Result<(), ReconError> {
    let json = to_json_string(report)?;
    std::fs::write(path, json)?;
    info!(path = %path.display(), "JSON report written.");
    Ok(())
}

/// `Key,Value` rows, one per flattened entry.
pub fn write_flat<W: Write>(record: &FlatRecord, writer: W) -> Result<(), ReconError> {
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(["Key", "Value"])?;
    for (key, value) in record {
        wtr.write_record([key, value])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_csv(report: &Report, flattener: &Flattener, path: &Path) -> Result<(), ReconError> {
    let file = std::fs::File::create(path)?;
    write_flat(&report.flatten_with(flattener), file)?;
    info!(path = %path.display(), "CSV report written.");
    Ok(())
}

/// `recon_<host>_<timestamp>`, safe to use as a file stem.
pub fn default_stem(target: &Target) -> String {
    let host: String = target
        .host()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    format!("recon_{}_{}", host, Local::now().format("%Y%m%d_%H%M%S"))
}

/// Writes both exports next to each other in `dir` and returns their paths.
pub fn export_all(report: &Report, flattener: &Flattener, dir: &Path, stem: &str) -> Result<(PathBuf, PathBuf), ReconError> {
    std::fs::create_dir_all(dir)?;
    let json_path = dir.join(format!("{stem}.json"));
    let csv_path = dir.join(format!("{stem}.csv"));
    write_json(report, &json_path)?;
    write_csv(report, flattener, &csv_path)?;
    Ok((json_path, csv_path))
}
