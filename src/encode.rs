// src/encode.rs
//
// Encoder collaborator boundary: FFmpeg decodes the source to y4m and pipes
// into the chosen encoder's stdin. Only the (input, quality, extra args) ->
// (output path, encode time) contract matters here.

use crate::error::{Result, VqError};
use crate::ffmpeg::spawn_y4m_pipe;
use clap::ValueEnum;
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoder {
    X264,
    X265,
    Svtav1,
    Aomenc,
    Vpxenc,
}

impl Encoder {
    pub fn name(self) -> &'static str {
        match self {
            Encoder::X264 => "x264",
            Encoder::X265 => "x265",
            Encoder::Svtav1 => "svtav1",
            Encoder::Aomenc => "aomenc",
            Encoder::Vpxenc => "vpxenc",
        }
    }

    fn output_extension(self) -> &'static str {
        match self {
            Encoder::X264 => "264",
            Encoder::X265 => "265",
            _ => "ivf",
        }
    }

    fn command(self, quality: u32, output: &Path) -> Command {
        let out = output.to_string_lossy().to_string();
        match self {
            Encoder::X264 => {
                let mut cmd = Command::new("x264");
                cmd.args(["--demuxer", "y4m", "--crf", &quality.to_string(), "-o", &out, "-"]);
                cmd
            }
            Encoder::X265 => {
                let mut cmd = Command::new("x265");
                cmd.args(["--y4m", "--crf", &quality.to_string(), "-o", &out, "--input", "-"]);
                cmd
            }
            Encoder::Svtav1 => {
                let mut cmd = Command::new("SvtAv1EncApp");
                cmd.args(["-i", "-", "-b", &out, "--crf", &quality.to_string()]);
                cmd
            }
            Encoder::Aomenc => {
                let mut cmd = Command::new("aomenc");
                cmd.args([
                    "-",
                    "-o",
                    &out,
                    "--end-usage=q",
                    &format!("--cq-level={}", quality),
                ]);
                cmd
            }
            Encoder::Vpxenc => {
                let mut cmd = Command::new("vpxenc");
                cmd.args([
                    "-",
                    "-o",
                    &out,
                    "--end-usage=q",
                    &format!("--cq-level={}", quality),
                ]);
                cmd
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncodedVideo {
    pub path: PathBuf,
    pub encode_time: f64,
    pub filesize: u64,
}

impl EncodedVideo {
    /// Remove the output file once scored (sweeps discard intermediates by
    /// default).
    pub fn remove(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove encode output {}: {}", self.path.display(), e);
        }
    }
}

/// Default output path next to the working directory: `<stem>_<enc>_q<q>.<ext>`.
pub fn default_output_path(input: &Path, encoder: Encoder, quality: u32) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(|| "encode".to_string(), |s| s.to_string_lossy().to_string());
    PathBuf::from(format!(
        "{}_{}_q{}.{}",
        stem,
        encoder.name(),
        quality,
        encoder.output_extension()
    ))
}

/// Encode one (input, quality). Failure is fatal for this row only; sweep
/// siblings continue.
pub fn encode(
    input: &Path,
    encoder: Encoder,
    quality: u32,
    extra_args: &[String],
    output: Option<&Path>,
) -> Result<EncodedVideo> {
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_path(input, encoder, quality));

    info!(
        "Encoding {} at quality {} with {} -> {}",
        input.display(),
        quality,
        encoder.name(),
        output.display()
    );

    let start = Instant::now();
    let mut ffmpeg = spawn_y4m_pipe(input).map_err(|e| VqError::EncodeFailure {
        quality,
        reason: format!("Failed to start y4m pipe: {}", e),
    })?;
    let ffmpeg_stdout = ffmpeg.stdout.take().ok_or_else(|| VqError::EncodeFailure {
        quality,
        reason: "y4m pipe stdout was not captured".to_string(),
    })?;

    let mut enc_cmd = encoder.command(quality, &output);
    enc_cmd.args(extra_args.iter().filter(|a| !a.is_empty()));
    let status = enc_cmd
        .stdin(Stdio::from(ffmpeg_stdout))
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| VqError::EncodeFailure {
            quality,
            reason: format!("Failed to run {}: {}", encoder.name(), e),
        })?;

    let ffmpeg_status = ffmpeg.wait().map_err(|e| VqError::EncodeFailure {
        quality,
        reason: format!("y4m pipe failed: {}", e),
    })?;
    let encode_time = start.elapsed().as_secs_f64();

    if !status.status.success() || !ffmpeg_status.success() {
        let stderr = String::from_utf8_lossy(&status.stderr);
        return Err(VqError::EncodeFailure {
            quality,
            reason: format!(
                "{} exited with {} (ffmpeg {}): {}",
                encoder.name(),
                status.status,
                ffmpeg_status,
                stderr
            ),
        });
    }

    let filesize = fs::metadata(&output)
        .map_err(|e| VqError::EncodeFailure {
            quality,
            reason: format!("Encode output missing: {}", e),
        })?
        .len();

    info!(
        "Encoded quality {} in {:.2}s ({} bytes)",
        quality, encode_time, filesize
    );
    Ok(EncodedVideo {
        path: output,
        encode_time,
        filesize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_path_carries_identity_key() {
        let path = default_output_path(Path::new("/videos/clip.mkv"), Encoder::Svtav1, 35);
        assert_eq!(path, PathBuf::from("clip_svtav1_q35.ivf"));
        let path = default_output_path(Path::new("clip.y4m"), Encoder::X264, 20);
        assert_eq!(path, PathBuf::from("clip_x264_q20.264"));
    }

    #[test]
    fn encoder_commands_take_stdin_and_quality() {
        for enc in [
            Encoder::X264,
            Encoder::X265,
            Encoder::Svtav1,
            Encoder::Aomenc,
            Encoder::Vpxenc,
        ] {
            let cmd = enc.command(30, Path::new("out.bin"));
            let args: Vec<String> = cmd
                .get_args()
                .map(|a| a.to_string_lossy().to_string())
                .collect();
            assert!(args.iter().any(|a| a == "-"), "{:?} reads stdin", enc);
            assert!(
                args.iter().any(|a| a.contains("30")),
                "{:?} carries the quality value",
                enc
            );
        }
    }
}
