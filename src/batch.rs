//! Job dispatch for single files and whole directories

use crate::codec::{pack_file, unpack_file, JobReport};
use crate::config::CodecConfig;
use crate::container::CONTAINER_EXTENSION;
use crate::error::{CodecError, Result};
use crate::io::{FileSystemIOManager, IOManager};
use crate::slice_codec::Quality;
use crate::utils::size_reduction_percent;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Direction of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    /// MRC volume to container
    Pack,
    /// Container to MRC volume
    Unpack,
}

impl JobMode {
    /// File extensions accepted as input, lowercase
    pub fn input_extensions(&self) -> &'static [&'static str] {
        match self {
            JobMode::Pack => &["mrc", "rec"],
            JobMode::Unpack => &[CONTAINER_EXTENSION],
        }
    }

    /// Whether `path` has one of this mode's input extensions
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.input_extensions().contains(&ext.as_str())
            })
            .unwrap_or(false)
    }
}

/// One pack or unpack operation
#[derive(Debug, Clone)]
pub struct Job {
    pub mode: JobMode,
    pub input: PathBuf,
    pub output: PathBuf,
    pub config: CodecConfig,
}

impl Job {
    pub fn new(mode: JobMode, input: PathBuf, output: PathBuf, config: CodecConfig) -> Self {
        Self {
            mode,
            input,
            output,
            config,
        }
    }

    /// Run the job to completion
    pub async fn run(&self) -> Result<JobReport> {
        match self.mode {
            JobMode::Pack => pack_file(&self.input, &self.output, &self.config).await,
            JobMode::Unpack => unpack_file(&self.input, &self.output, &self.config).await,
        }
    }
}

/// Result of one job in a batch
#[derive(Debug)]
pub struct JobOutcome {
    pub input: PathBuf,
    pub result: Result<JobReport>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// One line for the user: the report on success, path and error kind on failure
    pub fn describe(&self) -> String {
        match &self.result {
            Ok(report) => report.summary(),
            Err(e) => format!("{}: {} ({})", self.input.display(), e.kind(), e),
        }
    }
}

/// Totals over a batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub input_size: u64,
    pub output_size: u64,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[JobOutcome]) -> Self {
        outcomes
            .iter()
            .fold(Self::default(), |mut summary, outcome| {
                match &outcome.result {
                    Ok(report) => {
                        summary.succeeded += 1;
                        summary.input_size += report.input_size;
                        summary.output_size += report.output_size;
                    }
                    Err(_) => summary.failed += 1,
                }
                summary
            })
    }

    /// Size reduction over the successful jobs
    pub fn size_reduction(&self) -> f64 {
        size_reduction_percent(self.input_size, self.output_size)
    }
}

/// Input files in `dir` for the given mode, sorted by name
pub async fn discover_inputs(dir: &Path, mode: JobMode) -> Result<Vec<PathBuf>> {
    let io = FileSystemIOManager::new();
    let files: Vec<PathBuf> = io
        .list(dir)
        .await?
        .into_iter()
        .map(|name| dir.join(name))
        .filter(|path| mode.accepts(path))
        .collect();

    if files.is_empty() {
        return Err(CodecError::NotFound(format!(
            "no .{} files found in {}",
            mode.input_extensions().join(" or ."),
            dir.display()
        )));
    }
    debug!("found {} input files in {}", files.len(), dir.display());
    Ok(files)
}

/// Stem of an unpacked file: a trailing `_JPG<n>` becomes `_fromJPG<n>`
fn unpacked_stem(stem: &str) -> String {
    if let Some(pos) = stem.rfind("_JPG") {
        let digits = &stem[pos + 4..];
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return format!("{}_fromJPG{}", &stem[..pos], digits);
        }
    }
    stem.to_string()
}

/// Default output file name for `input`
pub fn default_output_name(input: &Path, mode: JobMode, quality: Quality) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output".to_string());
    match mode {
        JobMode::Pack => format!("{}_JPG{}.{}", stem, quality, CONTAINER_EXTENSION),
        JobMode::Unpack => format!("{}.mrc", unpacked_stem(&stem)),
    }
}

/// Resolve where a job writes its result.
///
/// An existing directory receives the default file name; any other given
/// path is used as-is; without one the output lands beside the input.
pub fn resolve_output_path(
    input: &Path,
    output: Option<&Path>,
    mode: JobMode,
    quality: Quality,
) -> PathBuf {
    let name = default_output_name(input, mode, quality);
    match output {
        Some(dir) if dir.is_dir() => dir.join(name),
        Some(path) => path.to_path_buf(),
        None => input.with_file_name(name),
    }
}

/// Jobs for every input, writing into `output_dir` or beside each input
pub fn plan_jobs(
    inputs: Vec<PathBuf>,
    output_dir: Option<&Path>,
    mode: JobMode,
    config: &CodecConfig,
) -> Vec<Job> {
    inputs
        .into_iter()
        .map(|input| {
            let name = default_output_name(&input, mode, config.quality);
            let output = match output_dir {
                Some(dir) => dir.join(name),
                None => input.with_file_name(name),
            };
            Job::new(mode, input, output, config.clone())
        })
        .collect()
}

/// Run jobs with at most `concurrency` in flight; outcomes come back in job order
pub async fn run_batch(jobs: Vec<Job>, concurrency: usize) -> Vec<JobOutcome> {
    run_batch_with_progress(jobs, concurrency, |_| {}).await
}

/// [`run_batch`], calling `progress` as each job finishes
pub async fn run_batch_with_progress<F>(
    jobs: Vec<Job>,
    concurrency: usize,
    progress: F,
) -> Vec<JobOutcome>
where
    F: Fn(&JobOutcome),
{
    let mut outcomes: Vec<(usize, JobOutcome)> = stream::iter(jobs.into_iter().enumerate())
        .map(|(index, job)| async move {
            let result = job.run().await;
            if let Err(e) = &result {
                debug!("{}: {}", job.input.display(), e);
            }
            (
                index,
                JobOutcome {
                    input: job.input,
                    result,
                },
            )
        })
        .buffer_unordered(concurrency.max(1))
        .inspect(|(_, outcome)| progress(outcome))
        .collect()
        .await;

    outcomes.sort_unstable_by_key(|(index, _)| *index);
    outcomes.into_iter().map(|(_, outcome)| outcome).collect()
}

/// Open `paths` in an external program without waiting for it.
///
/// Returns whether the program started; failures are only logged.
pub fn launch_viewer(program: &str, paths: &[PathBuf]) -> bool {
    match Command::new(program).args(paths).spawn() {
        Ok(child) => {
            info!(
                "opening {} file(s) with {} (pid {})",
                paths.len(),
                program,
                child.id()
            );
            true
        }
        Err(e) => {
            warn!("could not start viewer {}: {}", program, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mrc::encode_mrc;
    use crate::volume::Volume;
    use ndarray::Array3;
    use tempfile::TempDir;

    fn write_volume(path: &Path, offset: f32) {
        let volume = Volume::from(Array3::from_shape_fn((3, 16, 16), |(z, y, x)| {
            offset + (z * 16 + y + x) as f32
        }));
        std::fs::write(path, encode_mrc(&volume, None).unwrap()).unwrap();
    }

    #[test]
    fn test_mode_accepts() {
        assert!(JobMode::Pack.accepts(Path::new("a/tomo.mrc")));
        assert!(JobMode::Pack.accepts(Path::new("tomo.REC")));
        assert!(!JobMode::Pack.accepts(Path::new("tomo.jpgs")));
        assert!(JobMode::Unpack.accepts(Path::new("tomo_JPG80.jpgs")));
        assert!(!JobMode::Unpack.accepts(Path::new("jpgs")));
    }

    #[test]
    fn test_default_output_names() {
        let q = Quality::default();
        assert_eq!(
            default_output_name(Path::new("/d/tomo.mrc"), JobMode::Pack, q),
            "tomo_JPG80.jpgs"
        );
        assert_eq!(
            default_output_name(Path::new("/d/tomo_JPG80.jpgs"), JobMode::Unpack, q),
            "tomo_fromJPG80.mrc"
        );
        assert_eq!(
            default_output_name(Path::new("/d/tomo_JPG.jpgs"), JobMode::Unpack, q),
            "tomo_JPG.mrc"
        );
        assert_eq!(
            default_output_name(Path::new("/d/plain.jpgs"), JobMode::Unpack, q),
            "plain.mrc"
        );
    }

    #[test]
    fn test_resolve_output_path() {
        let temp_dir = TempDir::new().unwrap();
        let q = Quality::new(60).unwrap();
        let input = Path::new("/data/tomo.rec");

        assert_eq!(
            resolve_output_path(input, None, JobMode::Pack, q),
            PathBuf::from("/data/tomo_JPG60.jpgs")
        );
        assert_eq!(
            resolve_output_path(input, Some(temp_dir.path()), JobMode::Pack, q),
            temp_dir.path().join("tomo_JPG60.jpgs")
        );
        assert_eq!(
            resolve_output_path(input, Some(Path::new("/out/custom.jpgs")), JobMode::Pack, q),
            PathBuf::from("/out/custom.jpgs")
        );
    }

    #[tokio::test]
    async fn test_discover_inputs() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["b.mrc", "a.rec", "notes.txt", "c_JPG80.jpgs"] {
            std::fs::write(temp_dir.path().join(name), b"").unwrap();
        }

        let packs = discover_inputs(temp_dir.path(), JobMode::Pack).await.unwrap();
        assert_eq!(
            packs,
            vec![temp_dir.path().join("a.rec"), temp_dir.path().join("b.mrc")]
        );

        let unpacks = discover_inputs(temp_dir.path(), JobMode::Unpack).await.unwrap();
        assert_eq!(unpacks, vec![temp_dir.path().join("c_JPG80.jpgs")]);

        let empty = TempDir::new().unwrap();
        assert!(matches!(
            discover_inputs(empty.path(), JobMode::Pack).await,
            Err(CodecError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_resilience() {
        let temp_dir = TempDir::new().unwrap();
        write_volume(&temp_dir.path().join("one.mrc"), 0.0);
        std::fs::write(temp_dir.path().join("two.mrc"), b"this is not an MRC file").unwrap();
        write_volume(&temp_dir.path().join("three.mrc"), -50.0);

        let out_dir = temp_dir.path().join("out");
        std::fs::create_dir(&out_dir).unwrap();

        let config = CodecConfig::new().with_cores(1);
        let inputs = discover_inputs(temp_dir.path(), JobMode::Pack).await.unwrap();
        let jobs = plan_jobs(inputs, Some(&out_dir), JobMode::Pack, &config);
        let outcomes = run_batch(jobs, 3).await;

        assert_eq!(outcomes.len(), 3);
        let summary = BatchSummary::from_outcomes(&outcomes);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);

        // Outcomes follow job order: one, three, two
        assert!(outcomes[0].is_success());
        assert!(outcomes[1].is_success());
        assert!(!outcomes[2].is_success());
        assert!(outcomes[2].describe().contains("two.mrc"));
        assert!(outcomes[2].describe().contains("FormatError"));

        // Successful jobs report their output and size reduction
        let described = outcomes[0].describe();
        assert!(described.contains("one_JPG80.jpgs"));
        assert!(described.contains("size reduction"));

        let mut written: Vec<_> = std::fs::read_dir(&out_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        written.sort();
        assert_eq!(written, vec!["one_JPG80.jpgs", "three_JPG80.jpgs"]);
    }

    #[tokio::test]
    async fn test_batch_unpack_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        write_volume(&temp_dir.path().join("vol.mrc"), 5.0);
        let config = CodecConfig::new().with_cores(2);

        let packs = plan_jobs(
            vec![temp_dir.path().join("vol.mrc")],
            None,
            JobMode::Pack,
            &config,
        );
        let seen = std::sync::atomic::AtomicUsize::new(0);
        let outcomes = run_batch_with_progress(packs, 1, |_| {
            seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        })
        .await;
        assert!(outcomes[0].is_success());
        assert_eq!(seen.into_inner(), 1);

        let inputs = discover_inputs(temp_dir.path(), JobMode::Unpack).await.unwrap();
        let unpacks = plan_jobs(inputs, None, JobMode::Unpack, &config);
        let outcomes = run_batch(unpacks, 2).await;
        assert!(outcomes[0].is_success());
        assert!(temp_dir.path().join("vol_fromJPG80.mrc").exists());
        let described = outcomes[0].describe();
        assert!(described.contains("vol_fromJPG80.mrc"));
        assert!(described.contains("size reduction"));
    }

    #[test]
    fn test_launch_missing_viewer() {
        assert!(!launch_viewer(
            "/nonexistent/viewer-program",
            &[PathBuf::from("x.mrc")]
        ));
    }

    #[test]
    fn test_summary_reduction() {
        let summary = BatchSummary {
            succeeded: 2,
            failed: 0,
            input_size: 2000,
            output_size: 200,
        };
        assert_eq!(summary.size_reduction(), 90.0);
    }
}
