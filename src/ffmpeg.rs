// src/ffmpeg.rs

use crate::error::{Result, VqError};
use log::{debug, error, info};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

#[derive(Debug, Clone)]
pub struct VideoInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frame_count: u64,
    pub fps: f64,
}

impl VideoInfo {
    /// Clip duration in seconds, used to derive bitrate from output size.
    pub fn duration(&self) -> f64 {
        self.frame_count as f64 / self.fps
    }
}

/// Runs ffprobe to get video metadata.
pub fn get_video_info(video_path: &Path) -> Result<VideoInfo> {
    info!("Probing video file: {}", video_path.display());
    if !video_path.exists() {
        return Err(VqError::Input(format!(
            "Input video file not found: {}",
            video_path.display()
        )));
    }

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,nb_frames,r_frame_rate:format=nb_frames",
            "-of",
            "json",
            video_path
                .to_str()
                .ok_or_else(|| VqError::Input("Invalid video path".to_string()))?,
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(VqError::Io)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("ffprobe failed for {}: {}", video_path.display(), stderr);
        return Err(VqError::Command(format!(
            "ffprobe failed for {}: {}",
            video_path.display(),
            stderr
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    debug!("ffprobe output for {}: {}", video_path.display(), stdout);

    let json: serde_json::Value = serde_json::from_str(&stdout)?;

    let stream = json["streams"]
        .get(0)
        .ok_or_else(|| VqError::Parse("No video stream found in ffprobe output".to_string()))?;

    let width = stream["width"]
        .as_u64()
        .ok_or_else(|| VqError::Parse("Missing width".to_string()))? as u32;
    let height = stream["height"]
        .as_u64()
        .ok_or_else(|| VqError::Parse("Missing height".to_string()))? as u32;

    let frame_count_str_opt = stream["nb_frames"]
        .as_str()
        .or_else(|| json["format"]["nb_frames"].as_str());

    let frame_count = match frame_count_str_opt {
        Some(fc_str) => fc_str
            .parse::<u64>()
            .map_err(|e| VqError::Parse(format!("Invalid frame count value: {}", e)))?,
        None => count_frames(video_path)?,
    };

    let fps_str = stream["r_frame_rate"]
        .as_str()
        .ok_or_else(|| VqError::Parse("Missing r_frame_rate".to_string()))?;
    let fps = parse_frame_rate(fps_str)?;

    info!(
        "Detected info for {}: {}x{} @ {} fps, {} frames",
        video_path.display(),
        width,
        height,
        fps,
        frame_count
    );

    Ok(VideoInfo {
        path: video_path.to_path_buf(),
        width,
        height,
        frame_count,
        fps,
    })
}

/// Counts frames with a dedicated ffprobe pass when the container does not
/// carry a frame count.
fn count_frames(video_path: &Path) -> Result<u64> {
    info!(
        "Frame count not found in initial probe, running count_frames probe for {}",
        video_path.display()
    );
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-count_frames",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=nb_read_frames",
            "-of",
            "csv=p=0",
            video_path
                .to_str()
                .ok_or_else(|| VqError::Input("Invalid video path".to_string()))?,
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(VqError::Io)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VqError::Command(format!(
            "ffprobe count_frames failed for {}: {}",
            video_path.display(),
            stderr
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() || stdout == "N/A" {
        return Err(VqError::Parse(format!(
            "Failed to count frames for {}",
            video_path.display()
        )));
    }
    stdout
        .parse::<u64>()
        .map_err(|e| VqError::Parse(format!("Invalid frame count value '{}': {}", stdout, e)))
}

/// Parses frame rate string (e.g., "24000/1001") into f64.
fn parse_frame_rate(fps_str: &str) -> Result<f64> {
    if fps_str.contains('/') {
        let parts: Vec<&str> = fps_str.split('/').collect();
        if parts.len() == 2 {
            let num = parts[0]
                .parse::<f64>()
                .map_err(|_| VqError::Parse(format!("Invalid FPS numerator: {}", parts[0])))?;
            let den = parts[1]
                .parse::<f64>()
                .map_err(|_| VqError::Parse(format!("Invalid FPS denominator: {}", parts[1])))?;
            if den == 0.0 {
                Err(VqError::Parse("FPS denominator cannot be zero".to_string()))
            } else {
                Ok(num / den)
            }
        } else {
            Err(VqError::Parse(format!("Invalid FPS format: {}", fps_str)))
        }
    } else {
        fps_str
            .parse::<f64>()
            .map_err(|_| VqError::Parse(format!("Invalid FPS format: {}", fps_str)))
    }
}

/// Executes an FFmpeg command to completion.
pub fn run_ffmpeg(args: &[String], description: &str) -> Result<()> {
    info!("Running FFmpeg for {}: ffmpeg {}", description, args.join(" "));

    let mut command = Command::new("ffmpeg");
    command.args(args);
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let start_time = std::time::Instant::now();
    let output = command.output().map_err(VqError::Io)?;
    let duration = start_time.elapsed();

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!(
            "FFmpeg command failed for {} ({}ms): {}",
            description,
            duration.as_millis(),
            stderr
        );
        Err(VqError::Command(format!(
            "FFmpeg {} failed: {}",
            description, stderr
        )))
    } else {
        info!(
            "FFmpeg command successful for {} ({}ms)",
            description,
            duration.as_millis()
        );
        Ok(())
    }
}

/// Spawns an FFmpeg process decoding the input to 10-bit y4m on stdout, for
/// piping into an encoder's stdin.
pub fn spawn_y4m_pipe(input: &Path) -> Result<Child> {
    let mut command = Command::new("ffmpeg");
    command
        .args([
            "-hide_banner",
            "-y",
            "-loglevel",
            "error",
            "-i",
        ])
        .arg(input)
        .args([
            "-pix_fmt",
            "yuv420p10le",
            "-strict",
            "-2",
            "-f",
            "yuv4mpegpipe",
            "-",
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    command.spawn().map_err(VqError::Io)
}

/// Bitrate in kbps from output size and clip duration.
pub fn bitrate_kbps(filesize: u64, duration_secs: f64) -> f64 {
    (filesize as f64 * 8.0) / 1000.0 / duration_secs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rational_and_plain_frame_rates() {
        assert!((parse_frame_rate("24000/1001").unwrap() - 23.976).abs() < 0.001);
        assert!((parse_frame_rate("25").unwrap() - 25.0).abs() < 1e-12);
        assert!(parse_frame_rate("24/0").is_err());
        assert!(parse_frame_rate("abc").is_err());
    }

    #[test]
    fn bitrate_from_size_and_duration() {
        // 1 MB over 8 seconds = 1000 kbps
        assert!((bitrate_kbps(1_000_000, 8.0) - 1000.0).abs() < 1e-9);
    }
}
