use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::date::guess::FilenameParser;
use crate::date::tz::{CentralEuropean, TimezonePolicy};
use crate::error::{RestoreError, ToolError};
use crate::exiftool::{CorruptionClassifier, Diagnosis, Inspection, MetadataTool, WriteRequest};
use crate::media::{resolve_kind, MediaFile, MediaKind};
use crate::outcome::Outcome;
use crate::repair::Repairer;

/// Default location of the dry-run side log.
pub const DRY_RUN_LOG: &str = "dry_run.log";

/// Side record of the files a dry run would have modified, one path per line.
#[derive(Debug)]
pub struct DryRunLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl DryRunLog {
    /// Create or truncate the log.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, media: &Path) -> io::Result<()> {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(file, "{}", media.display())?;
        file.flush()
    }
}

/// Result of processing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub outcome: Outcome,
    /// Set when the file was modified and should be refreshed remotely
    pub refresh_target: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum FileError {
    #[error("cannot read metadata: {0}")]
    Inspect(#[source] ToolError),
    #[error("cannot write metadata: {0}")]
    Write(#[source] ToolError),
    #[error("file is corrupted: {0}")]
    Corrupted(String),
    #[error("container repair failed")]
    RepairFailed,
    #[error("still corrupted after repair: {0}")]
    StillCorrupted(String),
    #[error("cannot record dry-run entry: {0}")]
    DryRunLog(#[source] io::Error),
}

enum Step {
    Modified,
    Skipped(String),
    Unrecognized(RestoreError),
}

/// Per-file inspect, repair and write logic, shared by all workers.
pub struct Pipeline {
    parser: FilenameParser,
    tool: Arc<dyn MetadataTool>,
    repairer: Arc<dyn Repairer>,
    classifier: CorruptionClassifier,
    timezone: Box<dyn TimezonePolicy>,
    force: bool,
    set_file_times: bool,
    dry_run: Option<DryRunLog>,
}

impl Pipeline {
    pub fn new(tool: Arc<dyn MetadataTool>, repairer: Arc<dyn Repairer>) -> Self {
        Self {
            parser: FilenameParser::default(),
            tool,
            repairer,
            classifier: CorruptionClassifier::default(),
            timezone: Box::new(CentralEuropean),
            force: false,
            set_file_times: false,
            dry_run: None,
        }
    }

    pub fn with_parser(mut self, parser: FilenameParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_classifier(mut self, classifier: CorruptionClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_timezone(mut self, policy: Box<dyn TimezonePolicy>) -> Self {
        self.timezone = policy;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_file_times(mut self, set_file_times: bool) -> Self {
        self.set_file_times = set_file_times;
        self
    }

    pub fn with_dry_run(mut self, log: DryRunLog) -> Self {
        self.dry_run = Some(log);
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run.is_some()
    }

    /// Process one file. Never fails: every error becomes an outcome.
    pub fn process_file(&self, file: &MediaFile) -> FileReport {
        let Some(kind) = file.kind else {
            log::info!("{}: unsupported extension", file.filename);
            return FileReport {
                outcome: Outcome::UnsupportedExtension,
                refresh_target: None,
            };
        };

        match self.restore(file, kind) {
            Ok(Step::Modified) => FileReport {
                outcome: Outcome::modified(kind),
                refresh_target: Some(file.path.clone()),
            },
            Ok(Step::Skipped(reason)) => {
                log::info!("{}: {}, skipping", file.filename, reason);
                FileReport {
                    outcome: Outcome::skipped(kind),
                    refresh_target: None,
                }
            }
            Ok(Step::Unrecognized(e)) => {
                log::warn!("{}: {}, skipping", file.path.display(), e);
                FileReport {
                    outcome: Outcome::skipped(kind),
                    refresh_target: None,
                }
            }
            Err(e) => {
                log::warn!("{}: {}", file.path.display(), e);
                FileReport {
                    outcome: Outcome::error(kind),
                    refresh_target: None,
                }
            }
        }
    }

    fn restore(&self, file: &MediaFile, kind: MediaKind) -> Result<Step, FileError> {
        let capture = match self.parser.parse(&file.filename) {
            Ok(c) => c,
            Err(e) => return Ok(Step::Unrecognized(e)),
        };

        let mut repaired = false;
        let inspection = self.inspect(file, kind, &mut repaired)?;
        if inspection.has_date && !self.force {
            return Ok(Step::Skipped("date already present".to_string()));
        }

        let effective = resolve_kind(kind, inspection.file_type.as_deref());
        let capture = if kind == MediaKind::Photo && !effective.is_video() && !inspection.has_timezone {
            capture.with_offset_from(self.timezone.as_ref())
        } else {
            capture
        };
        let request = WriteRequest {
            kind: effective,
            datetime: capture.exif_string(),
            offset: capture.offset.clone(),
            rebuild_exif: false,
        };

        if let Some(log) = &self.dry_run {
            log.record(&file.path).map_err(FileError::DryRunLog)?;
            log::info!("{}: would set {} ({})", file.filename, request.datetime, capture.source);
            return Ok(Step::Modified);
        }

        self.write(file, kind, &request, &mut repaired)?;
        // Metadata is written at this point; the file stays modified.
        if self.set_file_times {
            if let Err(e) = set_file_times(&file.path, capture.datetime) {
                log::warn!("{}: cannot set file times: {}", file.path.display(), e);
            }
        }
        log::debug!("{}: set {} ({})", file.filename, request.datetime, capture.source);
        Ok(Step::Modified)
    }

    fn inspect(
        &self,
        file: &MediaFile,
        kind: MediaKind,
        repaired: &mut bool,
    ) -> Result<Inspection, FileError> {
        let inspection = self.tool.inspect(&file.path).map_err(FileError::Inspect)?;
        if !inspection.is_corrupted() {
            return Ok(inspection);
        }
        if self.dry_run.is_some() && kind == MediaKind::Video {
            log::info!("{}: corrupted, would attempt repair", file.filename);
            return Ok(inspection);
        }
        self.repair_once(file, kind, repaired, &inspection.diagnostic)?;
        self.confirm_repair(file)
    }

    fn write(
        &self,
        file: &MediaFile,
        kind: MediaKind,
        request: &WriteRequest,
        repaired: &mut bool,
    ) -> Result<(), FileError> {
        match self.tool.write(&file.path, request) {
            Ok(()) => Ok(()),
            Err(e) => match self.classifier.classify(e.diagnostic()) {
                Diagnosis::Corrupted => {
                    self.repair_once(file, kind, repaired, e.diagnostic())?;
                    self.confirm_repair(file)?;
                    self.tool.write(&file.path, request).map_err(FileError::Write)
                }
                Diagnosis::Malformed if !request.rebuild_exif => {
                    log::warn!(
                        "{}: invalid metadata ({}), overwriting with a new block",
                        file.filename,
                        e.diagnostic()
                    );
                    let rebuilt = WriteRequest {
                        rebuild_exif: true,
                        ..request.clone()
                    };
                    self.tool.write(&file.path, &rebuilt).map_err(FileError::Write)
                }
                _ => Err(FileError::Write(e)),
            },
        }
    }

    /// One repair per file per run, videos only.
    fn repair_once(
        &self,
        file: &MediaFile,
        kind: MediaKind,
        repaired: &mut bool,
        diagnostic: &str,
    ) -> Result<(), FileError> {
        if kind != MediaKind::Video {
            return Err(FileError::Corrupted(diagnostic.to_string()));
        }
        if *repaired {
            return Err(FileError::StillCorrupted(diagnostic.to_string()));
        }
        *repaired = true;
        log::info!("{}: corrupted ({}), attempting repair", file.filename, diagnostic);
        if self.repairer.repair(&file.path) {
            Ok(())
        } else {
            Err(FileError::RepairFailed)
        }
    }

    fn confirm_repair(&self, file: &MediaFile) -> Result<Inspection, FileError> {
        let again = self.tool.inspect(&file.path).map_err(FileError::Inspect)?;
        if again.is_corrupted() {
            return Err(FileError::StillCorrupted(again.diagnostic));
        }
        Ok(again)
    }
}

/// Set access and modification time to `dt` read as local time.
fn set_file_times(path: &Path, dt: NaiveDateTime) -> io::Result<()> {
    let local = dt
        .and_local_timezone(chrono::Local)
        .earliest()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "nonexistent local time"))?;
    let ft = filetime::FileTime::from_unix_time(local.timestamp(), 0);
    filetime::set_file_times(path, ft, ft)
}
