// src/sweep.rs
//
// Batch sweep over quality values: one task per quality, run on a bounded
// worker pool, completions funneled over a channel to a single CSV writer.
// A failed quality point is logged and skipped; siblings continue. Rows
// already persisted for a quality are skipped before scheduling, so an
// interrupted sweep resumes where it left off.

use crate::encode::{self, Encoder};
use crate::error::{Result, VqError};
use crate::ffmpeg::{self, VideoInfo, bitrate_kbps};
use crate::kernel::KernelLanes;
use crate::results::{self, ResultRecord};
use crate::score::{self, ScoreJob};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::mpsc;

pub struct SweepConfig {
    pub inputs: Vec<PathBuf>,
    pub qualities: Vec<u32>,
    pub encoder: Encoder,
    pub encoder_args: Vec<String>,
    pub output_csv: PathBuf,
    pub kernel_script: PathBuf,
    pub every: usize,
    pub lanes: KernelLanes,
    pub jobs: usize,
    pub keep_outputs: bool,
}

/// Run the sweep. Returns the number of rows written.
pub fn run_sweep(cfg: &SweepConfig) -> Result<usize> {
    if cfg.every == 0 {
        return Err(VqError::Input("--every must be at least 1".to_string()));
    }
    let sources: Vec<VideoInfo> = cfg
        .inputs
        .iter()
        .map(|p| ffmpeg::get_video_info(p))
        .collect::<Result<_>>()?;

    let recorded = results::recorded_qualities(&cfg.output_csv)?;
    let pending: Vec<u32> = cfg
        .qualities
        .iter()
        .copied()
        .filter(|q| {
            if recorded.contains(q) {
                info!("Quality {} already recorded in {}, skipping", q, cfg.output_csv.display());
                false
            } else {
                true
            }
        })
        .collect();

    if pending.is_empty() {
        info!("Nothing to do, all quality points already recorded");
        return Ok(0);
    }
    info!(
        "Sweeping {} quality points with {} across {} source(s), {} worker(s)",
        pending.len(),
        cfg.encoder.name(),
        sources.len(),
        cfg.jobs
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cfg.jobs.max(1))
        .build()
        .map_err(|e| VqError::Input(format!("Failed to build worker pool: {}", e)))?;

    let (tx, rx) = mpsc::channel::<(u32, Result<ResultRecord>)>();
    let mut written = 0usize;
    let mut writer_error: Option<VqError> = None;

    // in_place_scope keeps the writer loop on the caller thread so it never
    // occupies a pool worker (a one-job pool would otherwise deadlock).
    pool.in_place_scope(|scope| {
        for &quality in &pending {
            let tx = tx.clone();
            let sources = &sources;
            scope.spawn(move |_| {
                let outcome = sweep_quality(cfg, sources, quality);
                // The receiver outlives every worker; a send can only fail
                // after the writer bailed out, and the row is lost anyway.
                let _ = tx.send((quality, outcome));
            });
        }
        drop(tx);

        // Single writer: rows are appended in completion order.
        for (quality, outcome) in rx.iter() {
            match outcome {
                Ok(record) => match results::append_record(&cfg.output_csv, &record) {
                    Ok(()) => {
                        info!("Recorded quality {} ({:.1} kbps)", quality, record.bitrate);
                        written += 1;
                    }
                    Err(e) => {
                        writer_error = Some(e);
                    }
                },
                Err(e) => {
                    warn!("Skipping quality {}: {}", quality, e);
                }
            }
        }
    });

    if let Some(e) = writer_error {
        return Err(e);
    }
    Ok(written)
}

/// Encode and score one quality point across all sources, averaging the
/// results into one row (multi-source sweeps characterize an encoder config,
/// not a single clip).
fn sweep_quality(cfg: &SweepConfig, sources: &[VideoInfo], quality: u32) -> Result<ResultRecord> {
    let job = ScoreJob {
        kernel_script: &cfg.kernel_script,
        every: cfg.every,
        lanes: cfg.lanes,
        progress: false,
    };

    let mut record = ResultRecord {
        quality,
        ..ResultRecord::default()
    };
    let mut time_sum = 0.0;
    let mut size_sum = 0u64;
    let mut bitrate_sum = 0.0;

    for source in sources {
        let encoded = encode::encode(
            &source.path,
            cfg.encoder,
            quality,
            &cfg.encoder_args,
            None,
        )?;
        let scores = score::score_pair(&source.path, &encoded.path, &job);
        if !cfg.keep_outputs {
            encoded.remove();
        }
        let scores = scores?;

        time_sum += encoded.encode_time;
        size_sum += encoded.filesize;
        bitrate_sum += bitrate_kbps(encoded.filesize, source.duration());

        record.ssimu2_mean += scores.ssimu2.mean;
        record.ssimu2_hmean += scores.ssimu2.harmonic_mean;
        record.ssimu2_sdv += scores.ssimu2.std_dev;
        record.ssimu2_p10 += scores.ssimu2.p10;
        record.butter_distance += scores.butter_distance;
        record.butter_max = record.butter_max.max(scores.butter_max);
        record.vbutter_mean += scores.vbutter.mean;
        record.vbutter_hmean += scores.vbutter.harmonic_mean;
        record.vbutter_sdv += scores.vbutter.std_dev;
        record.vbutter_p10 += scores.vbutter.p10;
        record.xpsnr_y += scores.xpsnr_y;
        record.xpsnr_u += scores.xpsnr_u;
        record.xpsnr_v += scores.xpsnr_v;
        record.wxpsnr += scores.wxpsnr;
    }

    let n = sources.len() as f64;
    record.encode_time = time_sum / n;
    record.filesize = (size_sum as f64 / n) as u64;
    record.bitrate = bitrate_sum / n;
    record.ssimu2_mean /= n;
    record.ssimu2_hmean /= n;
    record.ssimu2_sdv /= n;
    record.ssimu2_p10 /= n;
    record.butter_distance /= n;
    record.vbutter_mean /= n;
    record.vbutter_hmean /= n;
    record.vbutter_sdv /= n;
    record.vbutter_p10 /= n;
    record.xpsnr_y /= n;
    record.xpsnr_u /= n;
    record.xpsnr_v /= n;
    record.wxpsnr /= n;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_stride_is_rejected_before_probing() {
        let cfg = SweepConfig {
            inputs: vec![PathBuf::from("does_not_exist.mkv")],
            qualities: vec![30],
            encoder: Encoder::Svtav1,
            encoder_args: Vec::new(),
            output_csv: PathBuf::from("out.csv"),
            kernel_script: PathBuf::from("vqkernel.py"),
            every: 0,
            lanes: KernelLanes::default(),
            jobs: 1,
            keep_outputs: false,
        };
        // The stride guard fires first; a missing input would otherwise
        // surface as an input-not-found error from the probe.
        match run_sweep(&cfg) {
            Err(VqError::Input(msg)) => assert!(msg.contains("--every")),
            other => panic!("expected input error, got {:?}", other),
        }
    }
}
