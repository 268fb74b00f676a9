mod bdrate;
mod cli;
mod compare;
mod encode;
mod error;
mod ffmpeg;
mod kernel;
mod plot;
mod results;
mod score;
mod stats;
mod sweep;

use crate::cli::{Cli, Command};
use crate::compare::CompareConfig;
use crate::error::{Result, VqError};
use crate::kernel::KernelLanes;
use crate::score::ScoreJob;
use crate::sweep::SweepConfig;
use chrono::Local;
use log::{LevelFilter, error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

fn main() -> ExitCode {
    let start_time = Instant::now();
    let args = cli::parse_args();

    if let Err(e) = setup_logging(&args) {
        eprintln!("Error setting up logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(args) {
        Ok(()) => {
            let duration = start_time.elapsed();
            info!("Completed successfully in {:.2?}", duration);
            ExitCode::SUCCESS
        }
        Err(e) => {
            let duration = start_time.elapsed();
            error!("Failed after {:.2?}: {}", duration, e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Sets up logging to console and optionally to a file.
fn setup_logging(args: &Cli) -> std::result::Result<(), fern::InitError> {
    let base_config = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(LevelFilter::Info)
        .level_for("vqstats", LevelFilter::Debug);

    let console_config = fern::Dispatch::new().chain(std::io::stdout());
    let mut logger = base_config.chain(console_config);

    let mut log_filename = None;
    if args.log {
        let filename = format!("vqstats_{}.log", Local::now().format("%Y%m%d_%H%M%S"));
        let file_config = fern::Dispatch::new().chain(fern::log_file(&filename)?);
        logger = logger.chain(file_config);
        log_filename = Some(filename);
    }

    logger.apply()?;
    if let Some(filename) = log_filename {
        info!("Logging to file: {}", filename);
    }
    Ok(())
}

fn run(args: Cli) -> Result<()> {
    match args.command {
        Command::Score {
            source,
            distorted,
            every,
            gpu_streams,
            threads,
            script,
        } => run_score(source, distorted, every, lanes(gpu_streams, threads), script),
        Command::Encode {
            input,
            quality,
            encoder,
            keep,
            every,
            no_metrics,
            gpu_streams,
            threads,
            script,
            encoder_args,
        } => run_encode(
            input,
            quality,
            encoder,
            keep,
            every,
            no_metrics,
            lanes(gpu_streams, threads),
            script,
            encoder_args,
        ),
        Command::Sweep {
            inputs,
            quality,
            encoder,
            output,
            every,
            jobs,
            keep,
            gpu_streams,
            threads,
            script,
            encoder_args,
        } => {
            let cfg = SweepConfig {
                inputs,
                qualities: quality,
                encoder,
                encoder_args,
                output_csv: output,
                kernel_script: script,
                every,
                lanes: lanes(gpu_streams, threads),
                jobs: jobs.unwrap_or(1),
                keep_outputs: keep,
            };
            let written = sweep::run_sweep(&cfg)?;
            println!(
                "Sweep complete: {} row(s) written to {}",
                written,
                cfg.output_csv.display()
            );
            Ok(())
        }
        Command::Compare {
            inputs,
            format,
            no_plots,
            summary,
        } => {
            plot::validate_format(&format)?;
            compare::run_compare(&CompareConfig {
                inputs,
                plot_format: format,
                plots: !no_plots,
                summary_csv: summary,
            })
        }
    }
}

/// Unset thread hints default to the machine's logical CPU count; GPU
/// streams stay opt-in.
fn lanes(gpu_streams: usize, threads: usize) -> KernelLanes {
    KernelLanes {
        gpu_streams,
        threads: if threads == 0 { num_cpus::get() } else { threads },
    }
}

fn run_score(
    source: PathBuf,
    distorted: PathBuf,
    every: usize,
    lanes: KernelLanes,
    script: PathBuf,
) -> Result<()> {
    if every == 0 {
        return Err(VqError::Input("--every must be at least 1".to_string()));
    }
    let src_info = ffmpeg::get_video_info(&source)?;
    let dist_info = ffmpeg::get_video_info(&distorted)?;

    if (src_info.width, src_info.height) != (dist_info.width, dist_info.height) {
        return Err(VqError::Input(format!(
            "Resolution mismatch! Source: {}x{}, Distorted: {}x{}",
            src_info.width, src_info.height, dist_info.width, dist_info.height
        )));
    }
    if src_info.frame_count != dist_info.frame_count {
        return Err(VqError::Input(format!(
            "Frame count mismatch! Source: {}, Distorted: {}",
            src_info.frame_count, dist_info.frame_count
        )));
    }
    if (src_info.fps - dist_info.fps).abs() > 0.01 {
        return Err(VqError::Input(format!(
            "Frame rate mismatch! Source: {:.3}, Distorted: {:.3}",
            src_info.fps, dist_info.fps
        )));
    }

    println!("Source video:    {}", source.display());
    println!("Distorted video: {}", distorted.display());

    let job = ScoreJob {
        kernel_script: &script,
        every,
        lanes,
        progress: true,
    };
    let scores = score::score_pair(&source, &distorted, &job)?;
    score::print_scores(&scores, every);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_encode(
    input: PathBuf,
    quality: u32,
    encoder: encode::Encoder,
    keep: Option<PathBuf>,
    every: usize,
    no_metrics: bool,
    lanes: KernelLanes,
    script: PathBuf,
    encoder_args: Vec<String>,
) -> Result<()> {
    if every == 0 {
        return Err(VqError::Input("--every must be at least 1".to_string()));
    }
    let src_info = ffmpeg::get_video_info(&input)?;
    let encoded = encode::encode(&input, encoder, quality, &encoder_args, keep.as_deref())?;
    println!(
        "Encoded {} --> {} (took {:.2} seconds, {:.1} kbps)",
        input.display(),
        encoded.path.display(),
        encoded.encode_time,
        ffmpeg::bitrate_kbps(encoded.filesize, src_info.duration())
    );

    if !no_metrics {
        let job = ScoreJob {
            kernel_script: &script,
            every,
            lanes,
            progress: true,
        };
        let scores = score::score_pair(&input, &encoded.path, &job)?;
        score::print_scores(&scores, every);
    }

    if keep.is_none() {
        encoded.remove();
        println!("Discarded encode {}", encoded.path.display());
    }
    Ok(())
}
