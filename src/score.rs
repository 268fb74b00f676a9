// src/score.rs
//
// Per-pair metric orchestration: drives the kernel streams through the
// sample consumer, aggregates each metric, and assembles the scores for one
// (source, distorted) pair. Metric kinds have no ordering dependency and
// each aggregation owns its own buffer.

use crate::error::Result;
use crate::kernel::{self, KernelLanes, MetricKind, ScoreStream};
use crate::stats::{self, AggregateStats};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use std::path::Path;

/// All tracked metrics for one video pair.
#[derive(Debug, Clone)]
pub struct PairScores {
    pub ssimu2: AggregateStats,
    pub butter_distance: f64,
    pub butter_max: f64,
    pub vbutter: AggregateStats,
    pub xpsnr_y: f64,
    pub xpsnr_u: f64,
    pub xpsnr_v: f64,
    pub wxpsnr: f64,
}

#[derive(Debug, Clone)]
pub struct ScoreJob<'a> {
    pub kernel_script: &'a Path,
    pub every: usize,
    pub lanes: KernelLanes,
    /// Progress bars are suppressed in sweep workers.
    pub progress: bool,
}

impl ScoreJob<'_> {
    fn spinner(&self, metric: MetricKind) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg} [{elapsed}] {pos} frames")
                .expect("Invalid progress template"),
        );
        bar.set_message(format!("Calculating {} scores", metric.label()));
        bar
    }
}

/// Score one pair across all tracked metrics.
pub fn score_pair(source: &Path, distorted: &Path, job: &ScoreJob) -> Result<PairScores> {
    let ssimu2_values = collect_scripted(source, distorted, MetricKind::Ssimulacra2, job)?;
    let ssimu2 = stats::aggregate(MetricKind::Ssimulacra2, &ssimu2_values)?;

    let distances = collect_scripted(source, distorted, MetricKind::ButteraugliDistance, job)?;
    let butter_distance = stats::mean(&distances);
    let butter_max = stats::max_value(&distances);
    debug!("{}: {:.5}", MetricKind::ButteraugliMax.label(), butter_max);
    let vbutter_values: Vec<f64> = distances.iter().map(|&d| stats::butter_to_vbutter(d)).collect();
    let vbutter = stats::aggregate(MetricKind::ButteraugliDistance, &vbutter_values)?;

    let workdir = distorted.parent().unwrap_or_else(|| Path::new("."));
    let xpsnr = kernel::xpsnr_frames(source, distorted, workdir)?;
    let xpsnr_y = stats::mean(&kernel::collect_sample(
        MetricKind::XpsnrY,
        xpsnr.y.into_iter().map(Ok),
    )?);
    let xpsnr_u = stats::mean(&kernel::collect_sample(
        MetricKind::XpsnrU,
        xpsnr.u.into_iter().map(Ok),
    )?);
    let xpsnr_v = stats::mean(&kernel::collect_sample(
        MetricKind::XpsnrV,
        xpsnr.v.into_iter().map(Ok),
    )?);
    let wxpsnr = stats::weighted_xpsnr(xpsnr_y, xpsnr_u, xpsnr_v);

    info!(
        "Scored {} vs {}: SSIMULACRA2 {:.3}, Butteraugli {:.3}, W-XPSNR {:.3}",
        source.display(),
        distorted.display(),
        ssimu2.mean,
        butter_distance,
        wxpsnr
    );

    Ok(PairScores {
        ssimu2,
        butter_distance,
        butter_max,
        vbutter,
        xpsnr_y,
        xpsnr_u,
        xpsnr_v,
        wxpsnr,
    })
}

fn collect_scripted(
    source: &Path,
    distorted: &Path,
    metric: MetricKind,
    job: &ScoreJob,
) -> Result<Vec<f64>> {
    let stream = ScoreStream::spawn(
        job.kernel_script,
        source,
        distorted,
        metric,
        job.every,
        job.lanes,
    )?;
    let bar = job.spinner(metric);
    let values = kernel::collect_sample(metric, stream.inspect(|_| bar.inc(1)))?;
    bar.finish_and_clear();
    Ok(values)
}

/// Console report for the score subcommand.
pub fn print_scores(scores: &PairScores, every: usize) {
    println!("SSIMULACRA2 scores for every {} frame:", ordinal(every));
    println!(" Average:       {:.5}", scores.ssimu2.mean);
    println!(" Harmonic Mean: {:.5}", scores.ssimu2.harmonic_mean);
    println!(" Std Deviation: {:.5}", scores.ssimu2.std_dev);
    println!(" 10th Pctile:   {:.5}", scores.ssimu2.p10);
    println!("Butteraugli scores for every {} frame:", ordinal(every));
    println!(" Distance:      {:.5}", scores.butter_distance);
    println!(" Max Distance:  {:.5}", scores.butter_max);
    println!(" Average:       {:.5}", scores.vbutter.mean);
    println!(" Harmonic Mean: {:.5}", scores.vbutter.harmonic_mean);
    println!(" Std Deviation: {:.5}", scores.vbutter.std_dev);
    println!(" 10th Pctile:   {:.5}", scores.vbutter.p10);
    println!("XPSNR scores:");
    println!(" XPSNR Y: {:.5}", scores.xpsnr_y);
    println!(" XPSNR U: {:.5}", scores.xpsnr_u);
    println!(" XPSNR V: {:.5}", scores.xpsnr_v);
    println!(" W-XPSNR: {:.5}", scores.wxpsnr);
}

fn ordinal(n: usize) -> String {
    match n {
        1 => "1st".to_string(),
        2 => "2nd".to_string(),
        3 => "3rd".to_string(),
        _ => format!("{}th", n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinal_suffixes() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(4), "4th");
        assert_eq!(ordinal(12), "12th");
    }
}
