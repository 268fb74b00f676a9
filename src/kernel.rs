// src/kernel.rs
//
// Boundary to the external metric kernels. SSIMULACRA2 and Butteraugli come
// from a VapourSynth pipeline driven as a subprocess that emits one
// "<frame_index> <value>" line per scored frame on stdout; XPSNR comes from
// FFmpeg's xpsnr filter via its per-frame stats file.

use crate::error::{Result, VqError};
use crate::ffmpeg::run_ffmpeg;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io::{BufRead, BufReader, Lines, Read};
use std::path::Path;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};

/// One sampled frame's value for one metric kind. Ephemeral; consumed
/// exactly once by the aggregator.
#[derive(Debug, Clone, Copy)]
pub struct FrameReading {
    pub frame_index: u64,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Ssimulacra2,
    ButteraugliDistance,
    ButteraugliMax,
    XpsnrY,
    XpsnrU,
    XpsnrV,
}

impl MetricKind {
    pub fn label(self) -> &'static str {
        match self {
            MetricKind::Ssimulacra2 => "SSIMULACRA2",
            MetricKind::ButteraugliDistance => "Butteraugli",
            MetricKind::ButteraugliMax => "Butteraugli max",
            MetricKind::XpsnrY => "XPSNR Y",
            MetricKind::XpsnrU => "XPSNR U",
            MetricKind::XpsnrV => "XPSNR V",
        }
    }

    /// Argument value understood by the VapourSynth kernel script.
    fn script_name(self) -> &'static str {
        match self {
            MetricKind::Ssimulacra2 => "ssimu2",
            MetricKind::ButteraugliDistance => "butter",
            _ => unreachable!("not a scripted kernel metric"),
        }
    }
}

/// Opaque parallelism hints forwarded to the kernel. Aggregation correctness
/// never depends on lane count or completion order.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelLanes {
    pub gpu_streams: usize,
    pub threads: usize,
}

/// Drain a kernel's frame stream into a finite sample, re-sorted by frame
/// index. A mid-stream kernel failure becomes an incomplete-sample error
/// (a truncated sample would silently bias the statistics); an empty sample
/// is an error too, never a silent zero.
pub fn collect_sample<I>(metric: MetricKind, stream: I) -> Result<Vec<f64>>
where
    I: Iterator<Item = Result<FrameReading>>,
{
    let mut readings: Vec<FrameReading> = Vec::new();
    for item in stream {
        match item {
            Ok(reading) => readings.push(reading),
            Err(e) => {
                let frame = readings.last().map_or(0, |r| r.frame_index + 1);
                return Err(VqError::IncompleteSample {
                    metric: metric.label(),
                    frame,
                    reason: e.to_string(),
                });
            }
        }
    }
    if readings.is_empty() {
        return Err(VqError::EmptySample(metric.label()));
    }
    readings.sort_by_key(|r| r.frame_index);
    Ok(readings.into_iter().map(|r| r.value).collect())
}

static SCORE_LINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<n>\d+)\s+(?P<v>-?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)\s*$")
        .expect("Invalid score line regex")
});

/// Lazy, non-restartable stream of frame readings produced by the kernel
/// subprocess. Exhausted after the final frame; a nonzero exit terminates
/// the stream with an error instead of a truncated success.
pub struct ScoreStream {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr: Option<ChildStderr>,
    finished: bool,
}

impl ScoreStream {
    /// Spawn the VapourSynth kernel script for the given metric and pair.
    /// `every` is the sampling stride (1 = every frame); lanes are passed
    /// through opaquely.
    pub fn spawn(
        script: &Path,
        source: &Path,
        distorted: &Path,
        metric: MetricKind,
        every: usize,
        lanes: KernelLanes,
    ) -> Result<ScoreStream> {
        let mut cmd = Command::new("python3");
        cmd.arg(script)
            .arg("--source")
            .arg(source)
            .arg("--distorted")
            .arg(distorted)
            .arg("--metric")
            .arg(metric.script_name())
            .arg("--every")
            .arg(every.to_string())
            .arg("--gpu-streams")
            .arg(lanes.gpu_streams.to_string())
            .arg("--threads")
            .arg(lanes.threads.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        info!(
            "Starting {} kernel: {} vs {}",
            metric.label(),
            source.display(),
            distorted.display()
        );
        let mut child = cmd.spawn().map_err(|e| {
            VqError::Command(format!("Failed to spawn kernel script for {}: {}", metric.label(), e))
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VqError::Command("Kernel stdout was not captured".to_string()))?;
        let stderr = child.stderr.take();
        Ok(ScoreStream {
            child,
            lines: BufReader::new(stdout).lines(),
            stderr,
            finished: false,
        })
    }
}

impl Iterator for ScoreStream {
    type Item = Result<FrameReading>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            match self.lines.next() {
                Some(Ok(line)) => {
                    if let Some(caps) = SCORE_LINE_REGEX.captures(&line) {
                        let frame_index = match caps["n"].parse::<u64>() {
                            Ok(n) => n,
                            Err(_) => {
                                self.finished = true;
                                return Some(Err(VqError::Parse(format!(
                                    "Invalid frame index in kernel output: {}",
                                    line
                                ))));
                            }
                        };
                        let value = match caps["v"].parse::<f64>() {
                            Ok(v) => v,
                            Err(_) => {
                                self.finished = true;
                                return Some(Err(VqError::Parse(format!(
                                    "Invalid score in kernel output: {}",
                                    line
                                ))));
                            }
                        };
                        return Some(Ok(FrameReading { frame_index, value }));
                    }
                    debug!("Ignoring kernel output line: {}", line);
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(VqError::Io(e)));
                }
                None => {
                    self.finished = true;
                    // Drain stderr before waiting so the child never blocks
                    // on a full pipe while exiting.
                    let mut diagnostic = String::new();
                    if let Some(mut stderr) = self.stderr.take() {
                        let _ = stderr.read_to_string(&mut diagnostic);
                    }
                    return match self.child.wait() {
                        Ok(status) if status.success() => None,
                        Ok(status) => Some(Err(kernel_exit_error(status, &diagnostic))),
                        Err(e) => Some(Err(VqError::Io(e))),
                    };
                }
            }
        }
    }
}

/// Exit failure for the kernel subprocess, carrying whatever the script
/// printed on stderr so the incomplete-sample report names the real cause.
fn kernel_exit_error(status: impl std::fmt::Display, stderr: &str) -> VqError {
    let diagnostic = stderr.trim();
    if diagnostic.is_empty() {
        VqError::Command(format!("Kernel script exited with {}", status))
    } else {
        VqError::Command(format!("Kernel script exited with {}: {}", status, diagnostic))
    }
}

static XPSNR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"n:\s*(?P<n>\d+)\s+XPSNR\s+y:\s*(?P<y>inf|[0-9]+(?:\.[0-9]*)?)\s+XPSNR\s+u:\s*(?P<u>inf|[0-9]+(?:\.[0-9]*)?)\s+XPSNR\s+v:\s*(?P<v>inf|[0-9]+(?:\.[0-9]*)?)")
        .expect("Invalid XPSNR regex")
});

/// Per-frame XPSNR readings, one stream per channel.
pub struct XpsnrFrames {
    pub y: Vec<FrameReading>,
    pub u: Vec<FrameReading>,
    pub v: Vec<FrameReading>,
}

/// Run FFmpeg's xpsnr filter over the pair and parse the per-frame stats
/// file. Frames with an infinite value on any channel are skipped.
pub fn xpsnr_frames(source: &Path, distorted: &Path, workdir: &Path) -> Result<XpsnrFrames> {
    // One stats file per distorted path so parallel sweep workers in the
    // same directory never clobber each other.
    let stem = distorted
        .file_stem()
        .map_or_else(|| "pair".to_string(), |s| s.to_string_lossy().to_string());
    let log_path = workdir.join(format!("{}_xpsnr.log", stem));
    let log_str = log_path.to_string_lossy().to_string();

    let ffmpeg_args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "warning".to_string(),
        "-i".to_string(),
        distorted.to_string_lossy().to_string(),
        "-i".to_string(),
        source.to_string_lossy().to_string(),
        "-lavfi".to_string(),
        format!("xpsnr=shortest=1:stats_file='{}'", log_str),
        "-f".to_string(),
        "null".to_string(),
        "-".to_string(),
    ];
    run_ffmpeg(&ffmpeg_args, "XPSNR calculation")?;

    if !log_path.exists() {
        return Err(VqError::Command("XPSNR stats file was not created".to_string()));
    }
    let frames = parse_xpsnr_log(&log_path)?;
    if let Err(e) = fs::remove_file(&log_path) {
        warn!("Failed to remove XPSNR stats file {}: {}", log_path.display(), e);
    }
    Ok(frames)
}

fn parse_xpsnr_log(log_path: &Path) -> Result<XpsnrFrames> {
    let content = fs::read_to_string(log_path)?;
    let mut frames = XpsnrFrames {
        y: Vec::new(),
        u: Vec::new(),
        v: Vec::new(),
    };

    let parse_value = |s: &str| -> Result<f64> {
        if s == "inf" {
            Ok(f64::INFINITY)
        } else {
            s.parse::<f64>()
                .map_err(|_| VqError::Parse(format!("Invalid XPSNR value: {}", s)))
        }
    };

    for line in content.lines() {
        if let Some(caps) = XPSNR_REGEX.captures(line) {
            let frame_index = caps["n"]
                .parse::<u64>()
                .map_err(|_| VqError::Parse("Invalid frame number in XPSNR log".to_string()))?;
            let y = parse_value(&caps["y"])?;
            let u = parse_value(&caps["u"])?;
            let v = parse_value(&caps["v"])?;
            if y.is_infinite() || u.is_infinite() || v.is_infinite() {
                debug!("Skipping frame {} with infinite XPSNR value(s)", frame_index);
                continue;
            }
            frames.y.push(FrameReading { frame_index, value: y });
            frames.u.push(FrameReading { frame_index, value: u });
            frames.v.push(FrameReading { frame_index, value: v });
        } else if line.contains("XPSNR") && line.contains("n:") {
            warn!("Failed to parse potential XPSNR line: {}", line);
        }
    }

    info!("Parsed {} frames from XPSNR stats file", frames.y.len());
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(frame_index: u64, value: f64) -> Result<FrameReading> {
        Ok(FrameReading { frame_index, value })
    }

    #[test]
    fn collects_and_resorts_by_frame_index() {
        // Kernel lanes may complete out of submission order.
        let stream = vec![reading(48, 3.0), reading(0, 1.0), reading(24, 2.0)];
        let values = collect_sample(MetricKind::Ssimulacra2, stream.into_iter()).unwrap();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn empty_stream_is_an_error() {
        let stream: Vec<Result<FrameReading>> = Vec::new();
        assert!(matches!(
            collect_sample(MetricKind::ButteraugliDistance, stream.into_iter()),
            Err(VqError::EmptySample(_))
        ));
    }

    #[test]
    fn mid_stream_failure_is_incomplete_not_truncated() {
        let stream = vec![
            reading(0, 1.0),
            reading(1, 2.0),
            Err(VqError::Command("decode error".to_string())),
            reading(3, 4.0),
        ];
        match collect_sample(MetricKind::Ssimulacra2, stream.into_iter()) {
            Err(VqError::IncompleteSample { frame, .. }) => assert_eq!(frame, 2),
            other => panic!("expected incomplete sample, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn kernel_exit_error_carries_stderr_diagnostic() {
        let err = kernel_exit_error("exit status: 1", "ModuleNotFoundError: No module named 'vapoursynth'\n");
        assert_eq!(
            err.to_string(),
            "Command failed: Kernel script exited with exit status: 1: \
             ModuleNotFoundError: No module named 'vapoursynth'"
        );
        let bare = kernel_exit_error("exit status: 2", "  \n");
        assert_eq!(bare.to_string(), "Command failed: Kernel script exited with exit status: 2");
    }

    #[test]
    fn score_line_regex_accepts_negative_and_scientific() {
        let caps = SCORE_LINE_REGEX.captures("17 -3.25").unwrap();
        assert_eq!(&caps["n"], "17");
        assert_eq!(&caps["v"], "-3.25");
        assert!(SCORE_LINE_REGEX.is_match("0 9.1e-2"));
        assert!(!SCORE_LINE_REGEX.is_match("frame 3 score 1.0"));
    }

    #[test]
    fn xpsnr_log_parsing_skips_infinite_frames() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("x.log");
        std::fs::write(
            &log,
            "n: 0  XPSNR y: 40.1  XPSNR u: 42.0  XPSNR v: 43.5\n\
             n: 1  XPSNR y: inf  XPSNR u: 42.0  XPSNR v: 43.5\n\
             n: 2  XPSNR y: 39.9  XPSNR u: 41.8  XPSNR v: 43.2\n",
        )
        .unwrap();
        let frames = parse_xpsnr_log(&log).unwrap();
        assert_eq!(frames.y.len(), 2);
        assert_eq!(frames.y[1].frame_index, 2);
        assert!((frames.u[0].value - 42.0).abs() < 1e-12);
    }
}
