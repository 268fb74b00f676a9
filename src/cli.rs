// src/cli.rs

use crate::encode::Encoder;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable logging to file (e.g., vqstats_YYYYMMDD_HHMMSS.log)
    #[arg(long, global = true)]
    pub log: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Score a source/distorted video pair across all tracked metrics
    Score {
        /// Source video path
        source: PathBuf,

        /// Distorted video path
        distorted: PathBuf,

        /// Only score every nth frame (1 = every frame)
        #[arg(short, long, default_value_t = 1)]
        every: usize,

        /// Number of GPU streams for SSIMULACRA2/Butteraugli
        #[arg(short = 'g', long, default_value_t = 0)]
        gpu_streams: usize,

        /// Number of threads for SSIMULACRA2/Butteraugli
        #[arg(short, long, default_value_t = 0)]
        threads: usize,

        /// Path to the VapourSynth kernel script
        #[arg(long, default_value = "vqkernel.py")]
        script: PathBuf,
    },

    /// Encode one quality point and score the result
    Encode {
        /// Path to source video file
        #[arg(short, long)]
        input: PathBuf,

        /// Desired CRF/quality value for the encoder
        #[arg(short, long)]
        quality: u32,

        /// Which video encoder to use
        encoder: Encoder,

        /// Keep the encode at this output path
        #[arg(short = 'b', long)]
        keep: Option<PathBuf>,

        /// Only score every nth frame (1 = every frame)
        #[arg(short, long, default_value_t = 1)]
        every: usize,

        /// Skip metrics calculations
        #[arg(short = 'n', long)]
        no_metrics: bool,

        /// Number of GPU streams for SSIMULACRA2/Butteraugli
        #[arg(short = 'g', long, default_value_t = 0)]
        gpu_streams: usize,

        /// Number of threads for SSIMULACRA2/Butteraugli
        #[arg(short, long, default_value_t = 0)]
        threads: usize,

        /// Path to the VapourSynth kernel script
        #[arg(long, default_value = "vqkernel.py")]
        script: PathBuf,

        /// Additional encoder arguments (pass these after a '--' delimiter)
        #[arg(last = true)]
        encoder_args: Vec<String>,
    },

    /// Sweep quality values for an encoder config, appending rows to a CSV
    Sweep {
        /// Path(s) to source video file(s)
        #[arg(short, long, required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,

        /// Quality values to test (e.g. -q 20 30 40 50)
        #[arg(short, long, required = true, num_args = 1..)]
        quality: Vec<u32>,

        /// Which video encoder to use
        encoder: Encoder,

        /// Path to output CSV file
        #[arg(short, long)]
        output: PathBuf,

        /// Only score every nth frame (1 = every frame)
        #[arg(short, long, default_value_t = 1)]
        every: usize,

        /// Concurrent encode+score tasks
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Keep output video files
        #[arg(short, long)]
        keep: bool,

        /// Number of GPU streams for SSIMULACRA2/Butteraugli
        #[arg(short = 'g', long, default_value_t = 0)]
        gpu_streams: usize,

        /// Number of threads for SSIMULACRA2/Butteraugli
        #[arg(short, long, default_value_t = 0)]
        threads: usize,

        /// Path to the VapourSynth kernel script
        #[arg(long, default_value = "vqkernel.py")]
        script: PathBuf,

        /// Additional encoder arguments (pass these after a '--' delimiter)
        #[arg(last = true)]
        encoder_args: Vec<String>,
    },

    /// Compare two or more result CSVs: BD-rate report and RD plots
    Compare {
        /// Path(s) to result CSV file(s); the first is the baseline
        #[arg(short, long, required = true, num_args = 2..)]
        inputs: Vec<PathBuf>,

        /// Save plots as 'png' or 'svg'
        #[arg(short, long, default_value = "png")]
        format: String,

        /// Skip plot rendering
        #[arg(long)]
        no_plots: bool,

        /// Path to the BD-rate vs encode time summary CSV
        #[arg(long, default_value = "bd_vs_time.csv")]
        summary: PathBuf,
    },
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
