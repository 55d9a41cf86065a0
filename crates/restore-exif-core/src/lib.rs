pub mod cancel;
pub mod date;
pub mod error;
pub mod exiftool;
pub mod media;
pub mod notify;
pub mod outcome;
pub mod repair;
pub mod scan;
pub mod schedule;
pub mod writer;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use cancel::CancellationToken;
pub use date::tz::TimezoneChoice;
pub use error::{RestoreError, ToolError};
pub use notify::{NotifierConfig, NotifyReport, RefreshNotifier};
pub use outcome::{Outcome, Tally};
pub use schedule::ProgressCallback;

use exiftool::{CorruptionClassifier, ExifTool, MetadataTool};
use repair::{FfmpegRepair, Repairer};
use writer::{DryRunLog, Pipeline};

fn default_dry_run_log() -> PathBuf {
    PathBuf::from(writer::DRY_RUN_LOG)
}

/// Settings for one run, fixed once validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOptions {
    pub root: PathBuf,
    #[serde(default)]
    pub recursive: bool,
    /// Rewrite dates even when a date tag already exists
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_dry_run_log")]
    pub dry_run_log: PathBuf,
    /// None means [`schedule::default_workers`]
    #[serde(default)]
    pub workers: Option<usize>,
    /// Also set filesystem times on modified files
    #[serde(default)]
    pub set_file_times: bool,
    #[serde(default)]
    pub timezone: TimezoneChoice,
}

impl RunOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            recursive: false,
            force: false,
            dry_run: false,
            dry_run_log: default_dry_run_log(),
            workers: None,
            set_file_times: false,
            timezone: TimezoneChoice::default(),
        }
    }

    pub fn worker_count(&self) -> Result<usize, RestoreError> {
        match self.workers {
            Some(0) => Err(RestoreError::InvalidWorkerCount),
            Some(n) => Ok(n),
            None => Ok(schedule::default_workers()),
        }
    }

    /// Fatal checks, run before anything on disk is touched.
    pub fn validate(&self) -> Result<(), RestoreError> {
        self.worker_count()?;
        if !self.root.exists() {
            return Err(RestoreError::PathNotFound(self.root.clone()));
        }
        if !self.root.is_dir() {
            return Err(RestoreError::PathNotADirectory(self.root.clone()));
        }
        Ok(())
    }
}

/// What a run did.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub discovered: u64,
    pub tally: Tally,
    /// Files whose metadata was written (or would be, in a dry run)
    pub modified: Vec<PathBuf>,
    pub cancelled: bool,
    /// None when the refresh phase did not run
    pub refresh: Option<NotifyReport>,
}

/// Control options for process execution.
#[derive(Debug, Clone, Default)]
pub struct ProcessControl {
    pub cancel_token: Option<CancellationToken>,
}

impl ProcessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }
}

/// Build the per-file pipeline for `options` on top of the given tools.
/// Truncates the dry-run log when dry-run is on, once the options are valid.
pub fn build_pipeline(
    options: &RunOptions,
    tool: Arc<dyn MetadataTool>,
    repairer: Arc<dyn Repairer>,
) -> anyhow::Result<Pipeline> {
    options.validate()?;
    let mut pipeline = Pipeline::new(tool, repairer)
        .with_force(options.force)
        .with_file_times(options.set_file_times)
        .with_timezone(options.timezone.policy());
    if options.dry_run {
        let log = DryRunLog::create(&options.dry_run_log).map_err(|e| {
            anyhow::anyhow!("cannot create dry-run log {}: {}", options.dry_run_log.display(), e)
        })?;
        pipeline = pipeline.with_dry_run(log);
    }
    Ok(pipeline)
}

/// Run with exiftool and ffmpeg.
pub fn process(
    options: &RunOptions,
    notifier: Option<&RefreshNotifier>,
    control: &ProcessControl,
    progress: &ProgressCallback,
) -> anyhow::Result<RunReport> {
    let classifier = CorruptionClassifier::default();
    let tool = ExifTool::new(classifier.clone());
    if !tool.is_available() {
        log::warn!("exiftool did not answer `-ver`; every file will fail inspection");
    }
    let pipeline = build_pipeline(options, Arc::new(tool), Arc::new(FfmpegRepair::default()))?
        .with_classifier(classifier);
    process_with(options, &pipeline, notifier, control, progress)
}

/// Run the full pipeline: validate, discover, process, then notify.
pub fn process_with(
    options: &RunOptions,
    pipeline: &Pipeline,
    notifier: Option<&RefreshNotifier>,
    control: &ProcessControl,
    progress: &ProgressCallback,
) -> anyhow::Result<RunReport> {
    let token = control.cancel_token.clone().unwrap_or_default();

    log::info!("Validating arguments");
    let workers = options.worker_count()?;
    let files = scan::discover(&options.root, options.recursive)?;
    let root = std::path::absolute(&options.root)?;
    log::info!("Total files: {}", files.len());

    let mut report = RunReport {
        discovered: files.len() as u64,
        ..RunReport::default()
    };

    let (supported, unsupported) = scan::filter_supported(files);
    log::info!("Valid files: {}", supported.len());
    for f in &unsupported {
        log::debug!("{}: unsupported extension", f.filename);
    }
    report
        .tally
        .add(Outcome::UnsupportedExtension, unsupported.len() as u64);

    if options.dry_run {
        log::info!("Dry run: no file will be changed");
    }
    log::info!("Begin processing files with {} workers", workers);
    let scheduled = schedule::schedule(&supported, workers, &token, progress, |f| {
        pipeline.process_file(f)
    })?;

    for file_report in scheduled.results {
        report.tally.record(file_report.outcome);
        if let Some(path) = file_report.refresh_target {
            report.modified.push(path);
        }
    }
    report.modified.sort();
    report.cancelled = scheduled.cancelled || token.is_cancelled();

    if report.cancelled {
        log::warn!("Cancelled, skipping server refresh");
    } else if options.dry_run {
        log::info!("Dry run, skipping server refresh");
    } else if let Some(notifier) = notifier {
        if notifier.should_run(report.modified.len()) {
            report.refresh = Some(notifier.run(&root, &report.modified, &token));
        } else {
            log::info!(
                "{} modified files, below the refresh threshold",
                report.modified.len()
            );
        }
    }

    log::info!("Processing summary:");
    for (outcome, count) in report.tally.iter() {
        log::info!("{}: {}", outcome, count);
    }
    log::info!("Finished processing files");
    Ok(report)
}
