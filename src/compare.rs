// src/compare.rs
//
// Comparison of two or more result tables: per-metric BD-rate against the
// first table, a human-readable report, the machine-readable bd_vs_time
// summary, and rate-distortion plots.

use crate::bdrate::{self, BdRate};
use crate::error::Result;
use crate::plot;
use crate::results::{self, RD_METRICS};
use log::info;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct CompareConfig {
    pub inputs: Vec<PathBuf>,
    pub plot_format: String,
    pub plots: bool,
    pub summary_csv: PathBuf,
}

pub fn run_compare(cfg: &CompareConfig) -> Result<()> {
    let datasets = results::load_datasets(&cfg.inputs)?;

    if cfg.plots {
        for &metric in RD_METRICS {
            plot::rd_plot(&datasets, metric, &cfg.plot_format)?;
        }
    }

    for dataset in &datasets {
        println!(
            "Average encode time for {}: {:.5} seconds",
            dataset.label,
            results::average_encode_time(&dataset.records)
        );
    }

    if datasets.len() < 2 {
        println!("Need at least two result tables to compute BD-rate values.");
        if let Some(only) = datasets.first() {
            let zeros: HashMap<&str, BdRate> = RD_METRICS
                .iter()
                .map(|m| (*m, BdRate::Delta { percent: 0.0, overlap: (0.0, 0.0) }))
                .collect();
            write_summary_row(
                &cfg.summary_csv,
                &only.label,
                results::average_encode_time(&only.records),
                &zeros,
            )?;
        }
        return Ok(());
    }

    let baseline = &datasets[0];
    // The baseline is its own reference row in the summary table.
    let baseline_zeros: HashMap<&str, BdRate> = RD_METRICS
        .iter()
        .map(|m| (*m, BdRate::Delta { percent: 0.0, overlap: (0.0, 0.0) }))
        .collect();
    write_summary_row(
        &cfg.summary_csv,
        &baseline.label,
        results::average_encode_time(&baseline.records),
        &baseline_zeros,
    )?;

    for candidate in &datasets[1..] {
        println!(
            "BD-rate values between '{}' & '{}'",
            baseline.label, candidate.label
        );
        let mut bd_rates: HashMap<&str, BdRate> = HashMap::new();
        for &metric in RD_METRICS {
            let base_series = results::rd_series(&baseline.records, metric);
            let cand_series = results::rd_series(&candidate.records, metric);
            let outcome = bdrate::bd_rate(&base_series, &cand_series);
            print_metric_line(metric, &outcome, &baseline.label, &candidate.label);
            bd_rates.insert(metric, outcome);
        }
        write_summary_row(
            &cfg.summary_csv,
            &candidate.label,
            results::average_encode_time(&candidate.records),
            &bd_rates,
        )?;
        println!();
    }
    Ok(())
}

fn print_metric_line(metric: &str, outcome: &BdRate, baseline: &str, candidate: &str) {
    let name = results::metric_display_name(metric);
    match outcome {
        BdRate::Delta { percent, overlap } => {
            let winner = if *percent < 0.0 {
                format!("{} is better", candidate)
            } else if *percent > 0.0 {
                format!("{} is better", baseline)
            } else {
                "No difference".to_string()
            };
            println!(
                "{:<22} {:7.2}% (overlap {:.2} .. {:.2}) -> {}",
                name, percent, overlap.0, overlap.1, winner
            );
        }
        BdRate::InsufficientPoints => {
            println!(
                "{:<22}     n/a -> fewer than {} usable points",
                name,
                bdrate::MIN_POINTS
            );
        }
        BdRate::InsufficientOverlap => {
            println!("{:<22}     n/a -> metric ranges do not overlap", name);
        }
    }
}

/// Append one row to the efficiency-across-presets summary: the config name,
/// its average encode time, and the per-metric BD-rate. Insufficiency is
/// written as an explicit status token, never a misleading 0.
fn write_summary_row(
    path: &Path,
    label: &str,
    avg_encode_time: f64,
    bd_rates: &HashMap<&str, BdRate>,
) -> Result<()> {
    let exists = path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if !exists {
        let header: Vec<String> = std::iter::once("name".to_string())
            .chain(std::iter::once("avg_encode_time".to_string()))
            .chain(RD_METRICS.iter().map(|m| format!("{}_bd", m)))
            .collect();
        writeln!(file, "{}", header.join(","))?;
    }
    let mut row = format!("{},{:.5}", label, avg_encode_time);
    for &metric in RD_METRICS {
        let cell = match bd_rates.get(metric) {
            Some(BdRate::Delta { percent, .. }) => format!("{:.5}", percent),
            Some(BdRate::InsufficientPoints) => "insufficient_points".to_string(),
            Some(BdRate::InsufficientOverlap) => "insufficient_overlap".to_string(),
            None => "insufficient_points".to_string(),
        };
        row.push(',');
        row.push_str(&cell);
    }
    writeln!(file, "{}", row)?;
    info!("Appended summary row for {} to {}", label, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_rows_append_with_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bd_vs_time.csv");

        let mut rates: HashMap<&str, BdRate> = HashMap::new();
        rates.insert("ssimu2_mean", BdRate::Delta { percent: -3.5, overlap: (70.0, 90.0) });
        rates.insert("butter_distance", BdRate::InsufficientPoints);
        rates.insert("wxpsnr", BdRate::InsufficientOverlap);

        write_summary_row(&path, "svtav1_p4", 12.5, &rates).unwrap();
        write_summary_row(&path, "svtav1_p6", 6.25, &rates).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "name,avg_encode_time,ssimu2_mean_bd,butter_distance_bd,wxpsnr_bd"
        );
        assert!(lines[1].starts_with("svtav1_p4,12.50000,-3.50000"));
        assert!(lines[1].contains("insufficient_points"));
        assert!(lines[1].ends_with("insufficient_overlap"));
    }
}
