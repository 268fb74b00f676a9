// src/results.rs
//
// The persisted result table: one row per (encoder config, quality), appended
// and never rewritten, plus the collation of rows into per-metric
// rate-distortion series for comparison.

use crate::error::{Result, VqError};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Metric columns eligible for rate-distortion comparison and plotting.
pub const RD_METRICS: &[&str] = &["ssimu2_mean", "butter_distance", "wxpsnr"];

pub fn metric_display_name(metric: &str) -> &'static str {
    match metric {
        "ssimu2_mean" => "SSIMULACRA2 Average",
        "butter_distance" => "Butteraugli Distance",
        "wxpsnr" => "W-XPSNR",
        _ => "Unknown metric",
    }
}

/// One row of the results table. Created once after an encode+score pass,
/// immutable thereafter.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ResultRecord {
    pub quality: u32,
    pub encode_time: f64,
    pub filesize: u64,
    pub bitrate: f64,
    pub ssimu2_mean: f64,
    pub ssimu2_hmean: f64,
    pub ssimu2_sdv: f64,
    pub ssimu2_p10: f64,
    pub butter_distance: f64,
    pub butter_max: f64,
    pub vbutter_mean: f64,
    pub vbutter_hmean: f64,
    pub vbutter_sdv: f64,
    pub vbutter_p10: f64,
    pub xpsnr_y: f64,
    pub xpsnr_u: f64,
    pub xpsnr_v: f64,
    pub wxpsnr: f64,
}

impl ResultRecord {
    pub fn metric_value(&self, metric: &str) -> Option<f64> {
        match metric {
            "ssimu2_mean" => Some(self.ssimu2_mean),
            "butter_distance" => Some(self.butter_distance),
            "wxpsnr" => Some(self.wxpsnr),
            _ => None,
        }
    }
}

/// Append one row, creating the file with a header row when absent. Rows are
/// never rewritten in place; a rerun with the same key appends a new row.
pub fn append_record(path: &Path, record: &ResultRecord) -> Result<()> {
    let exists = path.exists();
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(!exists)
        .from_writer(file);
    writer.serialize(record)?;
    writer.flush()?;
    debug!("Appended quality {} row to {}", record.quality, path.display());
    Ok(())
}

/// Read the whole table, sorted by quality ascending.
pub fn read_table(path: &Path) -> Result<Vec<ResultRecord>> {
    let mut reader = csv::Reader::from_reader(File::open(path)?);
    let mut records: Vec<ResultRecord> = Vec::new();
    for row in reader.deserialize() {
        records.push(row?);
    }
    records.sort_by_key(|r| r.quality);
    info!("Read {} rows from {}", records.len(), path.display());
    Ok(records)
}

/// Quality values already persisted, used to skip re-scoring on resume.
pub fn recorded_qualities(path: &Path) -> Result<HashSet<u32>> {
    if !path.exists() {
        return Ok(HashSet::new());
    }
    Ok(read_table(path)?.iter().map(|r| r.quality).collect())
}

fn read_headers(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_reader(File::open(path)?);
    Ok(reader
        .headers()?
        .iter()
        .map(|h| h.to_string())
        .collect())
}

/// A comparator input: one table per encoder configuration.
pub struct Dataset {
    pub label: String,
    pub records: Vec<ResultRecord>,
}

/// Load comparator inputs, refusing to proceed when the tables do not agree
/// on their column schema (partial comparison would silently drop columns).
pub fn load_datasets(paths: &[impl AsRef<Path>]) -> Result<Vec<Dataset>> {
    let mut reference_headers: Option<(String, Vec<String>)> = None;
    let mut datasets = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let headers = read_headers(path)?;
        match &reference_headers {
            None => reference_headers = Some((path.display().to_string(), headers)),
            Some((first, expected)) => {
                if *expected != headers {
                    return Err(VqError::SchemaMismatch(format!(
                        "{} and {} have different columns",
                        first,
                        path.display()
                    )));
                }
            }
        }
        let label = path
            .file_stem()
            .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().to_string());
        datasets.push(Dataset {
            label,
            records: read_table(path)?,
        });
    }
    Ok(datasets)
}

/// Per-metric rate-distortion series: (bitrate kbps, metric value) ordered
/// by quality ascending. Relies on the lower-quality-parameter implies
/// higher-bitrate invariant of the inputs.
pub fn rd_series(records: &[ResultRecord], metric: &str) -> Vec<(f64, f64)> {
    records
        .iter()
        .filter_map(|r| r.metric_value(metric).map(|v| (r.bitrate, v)))
        .collect()
}

pub fn average_encode_time(records: &[ResultRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    records.iter().map(|r| r.encode_time).sum::<f64>() / records.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(quality: u32, bitrate: f64) -> ResultRecord {
        ResultRecord {
            quality,
            bitrate,
            encode_time: 10.0,
            filesize: 1000,
            ssimu2_mean: 80.0,
            wxpsnr: 42.0,
            ..ResultRecord::default()
        }
    }

    #[test]
    fn append_creates_header_once_and_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svtav1.csv");

        append_record(&path, &record(30, 4000.0)).unwrap();
        append_record(&path, &record(40, 2000.0)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("quality,encode_time").count(), 1);

        let recorded = recorded_qualities(&path).unwrap();
        assert!(recorded.contains(&30) && recorded.contains(&40));
        assert!(!recorded.contains(&50));

        // Reading back sorts by quality ascending.
        let rows = read_table(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].quality, 30);
        assert!((rows[1].bitrate - 2000.0).abs() < 1e-12);
    }

    #[test]
    fn missing_table_has_no_recorded_qualities() {
        let dir = tempfile::tempdir().unwrap();
        let recorded = recorded_qualities(&dir.path().join("absent.csv")).unwrap();
        assert!(recorded.is_empty());
    }

    #[test]
    fn schema_mismatch_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a.csv");
        let bad = dir.path().join("b.csv");
        append_record(&good, &record(30, 4000.0)).unwrap();
        std::fs::write(&bad, "quality,bitrate\n30,4000\n").unwrap();

        match load_datasets(&[good, bad]) {
            Err(VqError::SchemaMismatch(_)) => {}
            other => panic!("expected schema mismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn rd_series_orders_by_quality() {
        let records = vec![record(20, 8000.0), record(30, 4000.0), record(40, 2000.0)];
        let series = rd_series(&records, "ssimu2_mean");
        assert_eq!(series.len(), 3);
        assert!((series[0].0 - 8000.0).abs() < 1e-12);
        assert!(rd_series(&records, "nonexistent").is_empty());
    }

    #[test]
    fn average_encode_time_over_rows() {
        let mut a = record(20, 8000.0);
        let mut b = record(30, 4000.0);
        a.encode_time = 10.0;
        b.encode_time = 20.0;
        assert!((average_encode_time(&[a, b]) - 15.0).abs() < 1e-12);
        assert_eq!(average_encode_time(&[]), 0.0);
    }
}
