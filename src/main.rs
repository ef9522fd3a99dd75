//! A CLI tool for packing MRC tomograms into JPEG stacks and back.
//!
//! Packed stacks are for visualization and annotation only, not for
//! downstream processing.
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use jpgstack::batch::{
    discover_inputs, launch_viewer, plan_jobs, resolve_output_path, run_batch_with_progress,
    BatchSummary, Job, JobMode, JobOutcome,
};
use jpgstack::config::available_cores;
use jpgstack::{read_container, CodecConfig, Container, SliceAxis};
use tracing::{error, info, Level};

/// Pack or unpack a JPEG stack
#[derive(Debug, Parser)]
#[command(name = "jpgstack", version, disable_version_flag = true)]
struct App {
    /// Show version number and exit
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Pack an MRC file, or a directory of .mrc/.rec files, into JPEG stacks
    Pack(ConvertArgs),
    /// Unpack a JPEG stack, or a directory of .jpgs files, into MRC files
    Unpack(ConvertArgs),
    /// Print the metadata of a JPEG stack as JSON
    Info {
        /// Path to the .jpgs file
        file: PathBuf,
    },
}

#[derive(Debug, Args)]
struct ConvertArgs {
    /// The input file or directory of files
    input: PathBuf,

    /// The output file or directory (default: next to the input)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// External program to open the unpacked MRC file(s) with (e.g. 3dmod)
    #[arg(short = 'e', long = "external-viewer")]
    external_viewer: Option<String>,

    /// JPEG quality (1-100); values above 95 should be avoided
    #[arg(
        short = 'q',
        long = "quality",
        default_value_t = 80,
        value_parser = clap::value_parser!(u32).range(1..=100)
    )]
    quality: u32,

    /// Number of CPU cores to use (default: all)
    #[arg(short = 'c', long = "cores")]
    cores: Option<usize>,

    /// Axis to slice volumes along when packing (0-2)
    #[arg(
        short = 'a',
        long = "axis",
        default_value_t = 0,
        value_parser = clap::value_parser!(u8).range(0..=2)
    )]
    axis: u8,

    /// Print verbose output
    #[arg(short = 'V', long = "verbose")]
    verbose: bool,
}

impl Command {
    fn verbose(&self) -> bool {
        match self {
            Command::Pack(args) | Command::Unpack(args) => args.verbose,
            Command::Info { .. } => false,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let App { command, .. } = App::parse();

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(if command.verbose() {
                Level::DEBUG
            } else {
                Level::INFO
            })
            .finish(),
    )
    .unwrap_or_else(|e| {
        eprintln!("[ERROR] Could not set up global logging subscriber: {}", e);
    });

    let result = match command {
        Command::Pack(args) => convert(JobMode::Pack, args).await,
        Command::Unpack(args) => convert(JobMode::Unpack, args).await,
        Command::Info { file } => print_info(file).await.map(|()| true),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Run a pack or unpack command; `Ok(false)` if any job failed
async fn convert(mode: JobMode, args: ConvertArgs) -> anyhow::Result<bool> {
    let start = Instant::now();
    let cores = args.cores.unwrap_or_else(available_cores).max(1);
    let config = CodecConfig::new()
        .with_quality(args.quality)?
        .with_cores(cores)
        .with_slice_axis(SliceAxis::from_index(usize::from(args.axis))?)
        .with_verbose(args.verbose);

    let outcomes = if args.input.is_dir() {
        let inputs = discover_inputs(&args.input, mode).await?;
        let out_dir = match &args.output {
            Some(dir) if !dir.is_dir() => {
                bail!("Output path {} is not a directory", dir.display())
            }
            Some(dir) => dir.clone(),
            None => args.input.clone(),
        };

        let count = inputs.len();
        match mode {
            JobMode::Pack => info!(
                "Packing {} tomograms with JPEG{} across {} CPU cores...",
                count,
                config.quality,
                cores.min(count)
            ),
            JobMode::Unpack => info!(
                "Unpacking {} tomograms across {} CPU cores...",
                count,
                cores.min(count)
            ),
        }

        // Whole files are the unit of work here, each on a single core
        let jobs = plan_jobs(inputs, Some(&out_dir), mode, &config.clone().with_cores(1));
        let progress = if args.verbose {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(count as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("Overall progress [{elapsed_precise}] {bar:40} {pos}/{len} files")
                    .context("Invalid progress bar template")?,
            );
            bar
        };
        let outcomes = run_batch_with_progress(jobs, cores, |_| progress.inc(1)).await;
        progress.finish_and_clear();
        outcomes
    } else {
        let output = resolve_output_path(&args.input, args.output.as_deref(), mode, config.quality);
        if args.verbose {
            info!("Input file: {}", args.input.display());
            info!("Output path: {}", output.display());
        }
        let job = Job::new(mode, args.input.clone(), output, config);
        let result = job.run().await;
        vec![JobOutcome {
            input: job.input,
            result,
        }]
    };

    for outcome in &outcomes {
        match &outcome.result {
            Ok(_) => info!("Successfully {} {}", past_tense(mode), outcome.describe()),
            Err(_) => error!("{}", outcome.describe()),
        }
    }

    let summary = BatchSummary::from_outcomes(&outcomes);
    if mode == JobMode::Pack && summary.succeeded > 0 {
        info!("Size reduction: {:.2}%", summary.size_reduction());
    }

    if let (JobMode::Unpack, Some(viewer)) = (mode, &args.external_viewer) {
        let unpacked: Vec<PathBuf> = outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|r| r.output.clone()))
            .collect();
        if !unpacked.is_empty() {
            launch_viewer(viewer, &unpacked);
        }
    }

    let total = outcomes.len();
    info!(
        "Total time taken to process {} tomogram{}: {:.2} seconds",
        total,
        if total == 1 { "" } else { "s" },
        start.elapsed().as_secs_f64()
    );
    if summary.failed > 0 {
        error!("{} of {} jobs failed", summary.failed, total);
    }

    Ok(summary.failed == 0)
}

fn past_tense(mode: JobMode) -> &'static str {
    match mode {
        JobMode::Pack => "packed",
        JobMode::Unpack => "unpacked",
    }
}

async fn print_info(file: PathBuf) -> anyhow::Result<()> {
    let container = read_container(&file)
        .await
        .with_context(|| format!("Could not read {}", file.display()))?;
    println!("{}", serde_json::to_string_pretty(&container_info(&file, &container))?);
    Ok(())
}

fn container_info(file: &Path, container: &Container) -> serde_json::Value {
    let metadata = &container.metadata;
    serde_json::json!({
        "file": file,
        "metadata": metadata,
        "slices": container.slices.len(),
        "compressed_size": container.compressed_size(),
        "uncompressed_size": metadata.volume_size_bytes(),
        "voxel_size": metadata.source_header.as_ref().map(|h| h.voxel_size()),
    })
}

#[cfg(test)]
mod tests {
    use crate::App;
    use clap::{CommandFactory, Parser};

    #[test]
    fn verify_cli() {
        App::command().debug_assert();
    }

    #[test]
    fn parse_pack_defaults() {
        let app = App::try_parse_from(["jpgstack", "pack", "tomo.mrc"]).unwrap();
        match app.command {
            super::Command::Pack(args) => {
                assert_eq!(args.quality, 80);
                assert_eq!(args.axis, 0);
                assert!(args.cores.is_none());
                assert!(!args.verbose);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn info_reports_sizes_and_voxel_size() {
        use jpgstack::codec::pack_with_header;
        use jpgstack::mrc::VolumeHeader;
        use jpgstack::{CodecConfig, Volume};
        use ndarray::Array3;
        use std::path::Path;

        let volume = Volume::from(Array3::<f32>::from_shape_fn((2, 8, 8), |(z, y, x)| {
            (z * 64 + y * 8 + x) as f32
        }));
        let mut header = VolumeHeader::for_shape([2, 8, 8]);
        header.cell_lengths = [16.0, 16.0, 4.0];
        let container =
            pack_with_header(&volume, Some(header), &CodecConfig::new().with_cores(1)).unwrap();

        let info = super::container_info(Path::new("vol_JPG80.jpgs"), &container);
        assert_eq!(info["slices"], 2);
        assert_eq!(info["uncompressed_size"], 2 * 8 * 8 * 4);
        assert_eq!(info["voxel_size"], serde_json::json!([2.0, 2.0, 2.0]));
    }

    #[test]
    fn reject_bad_quality() {
        assert!(App::try_parse_from(["jpgstack", "pack", "tomo.mrc", "-q", "0"]).is_err());
        assert!(App::try_parse_from(["jpgstack", "pack", "tomo.mrc", "-q", "101"]).is_err());
    }
}
