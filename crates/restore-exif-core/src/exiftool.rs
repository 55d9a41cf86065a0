//! Reading and writing date tags through the `exiftool` command-line tool.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::{Map, Value};

use crate::date::exif::is_meaningful_date;
use crate::error::ToolError;
use crate::media::EffectiveKind;

const TOOL: &str = "exiftool";

/// Tags that count as an existing creation date.
pub const DATE_TAGS: &[&str] = &["DateTimeOriginal", "MediaCreateDate", "CreateDate"];

/// Tags that count as an existing timezone.
pub const OFFSET_TAGS: &[&str] = &["OffsetTime", "OffsetTimeOriginal", "OffsetTimeDigitized"];

/// Diagnostic substrings that mean the container is damaged.
pub const DEFAULT_CORRUPTION_SIGNATURES: &[&str] = &["truncated", "invalid atom size"];

/// Diagnostic substrings that mean the EXIF block itself is unreadable.
pub const DEFAULT_MALFORMED_SIGNATURES: &[&str] =
    &["bad format", "[minor]", "error reading", "invalid exif"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnosis {
    Clean,
    /// Damaged container, a candidate for repair
    Corrupted,
    /// Invalid metadata block, recoverable by rewriting it
    Malformed,
    Other,
}

/// Maps tool diagnostics to a [`Diagnosis`] by substring match.
#[derive(Debug, Clone)]
pub struct CorruptionClassifier {
    signatures: Vec<String>,
    malformed: Vec<String>,
}

impl Default for CorruptionClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_CORRUPTION_SIGNATURES.iter().copied())
            .with_malformed_signatures(DEFAULT_MALFORMED_SIGNATURES.iter().copied())
    }
}

impl CorruptionClassifier {
    pub fn new<'a>(signatures: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            signatures: signatures.into_iter().map(|s| s.to_lowercase()).collect(),
            malformed: Vec::new(),
        }
    }

    pub fn with_signature(mut self, signature: &str) -> Self {
        self.signatures.push(signature.to_lowercase());
        self
    }

    pub fn with_malformed_signatures<'a>(
        mut self,
        signatures: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        self.malformed
            .extend(signatures.into_iter().map(|s| s.to_lowercase()));
        self
    }

    /// Container signatures win over metadata-block ones.
    pub fn classify(&self, diagnostic: &str) -> Diagnosis {
        let text = diagnostic.trim().to_lowercase();
        let hit = |list: &[String]| list.iter().any(|s| text.contains(s.as_str()));
        if text.is_empty() {
            Diagnosis::Clean
        } else if hit(&self.signatures) {
            Diagnosis::Corrupted
        } else if hit(&self.malformed) {
            Diagnosis::Malformed
        } else {
            Diagnosis::Other
        }
    }
}

/// What the metadata tool reported about a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inspection {
    pub has_date: bool,
    pub has_timezone: bool,
    /// Container type probed from the content, e.g. `JPEG` or `MP4`
    pub file_type: Option<String>,
    pub diagnosis: Diagnosis,
    pub diagnostic: String,
}

impl Inspection {
    pub fn is_corrupted(&self) -> bool {
        self.diagnosis == Diagnosis::Corrupted
    }
}

/// Date (and optional offset) to store in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub kind: EffectiveKind,
    /// `YYYY:MM:DD HH:MM:SS`
    pub datetime: String,
    /// `+HH:MM`, only for photos
    pub offset: Option<String>,
    /// Ignore minor errors and replace the EXIF block instead of editing it
    pub rebuild_exif: bool,
}

/// The external tool that reads and writes metadata tags.
pub trait MetadataTool: Send + Sync {
    fn inspect(&self, path: &Path) -> Result<Inspection, ToolError>;
    fn write(&self, path: &Path, request: &WriteRequest) -> Result<(), ToolError>;
}

/// [`MetadataTool`] backed by the `exiftool` binary.
#[derive(Debug, Clone)]
pub struct ExifTool {
    program: PathBuf,
    classifier: CorruptionClassifier,
}

impl Default for ExifTool {
    fn default() -> Self {
        Self::new(CorruptionClassifier::default())
    }
}

impl ExifTool {
    pub fn new(classifier: CorruptionClassifier) -> Self {
        Self {
            program: PathBuf::from(TOOL),
            classifier,
        }
    }

    /// Use a specific exiftool binary instead of the one on `PATH`.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Check that the binary can be launched.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-ver")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

impl MetadataTool for ExifTool {
    fn inspect(&self, path: &Path) -> Result<Inspection, ToolError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-json").arg("-FileType");
        for tag in DATE_TAGS.iter().chain(OFFSET_TAGS) {
            cmd.arg(format!("-{}", tag));
        }
        cmd.arg(path);
        log::debug!("{:?}", cmd);

        let output = cmd.output().map_err(|source| ToolError::Spawn { tool: TOOL, source })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let inspection = parse_inspection(&stdout, &stderr, &self.classifier);
        match inspection {
            Ok(i) if i.is_corrupted() || output.status.success() => Ok(i),
            Ok(i) => Err(ToolError::Failed {
                tool: TOOL,
                status: output.status.to_string(),
                diagnostic: i.diagnostic,
            }),
            Err(message) if output.status.success() => Err(ToolError::Output { tool: TOOL, message }),
            Err(_) => {
                let diagnostic = stderr.trim().to_string();
                if self.classifier.classify(&diagnostic) == Diagnosis::Corrupted {
                    Ok(Inspection {
                        has_date: false,
                        has_timezone: false,
                        file_type: None,
                        diagnosis: Diagnosis::Corrupted,
                        diagnostic,
                    })
                } else {
                    Err(ToolError::Failed {
                        tool: TOOL,
                        status: output.status.to_string(),
                        diagnostic,
                    })
                }
            }
        }
    }

    fn write(&self, path: &Path, request: &WriteRequest) -> Result<(), ToolError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-overwrite_original").args(write_args(request)).arg(path);
        log::debug!("{:?}", cmd);

        let output = cmd.output().map_err(|source| ToolError::Spawn { tool: TOOL, source })?;
        if output.status.success() {
            return Ok(());
        }
        let mut diagnostic = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if diagnostic.is_empty() {
            diagnostic = String::from_utf8_lossy(&output.stdout).trim().to_string();
        }
        Err(ToolError::Failed {
            tool: TOOL,
            status: output.status.to_string(),
            diagnostic,
        })
    }
}

/// Tag assignments for a write, chosen by the effective kind.
pub fn write_args(request: &WriteRequest) -> Vec<String> {
    let dt = &request.datetime;
    let mut args = Vec::new();
    if request.rebuild_exif {
        args.push("-m".to_string());
    }
    let tags = match request.kind {
        EffectiveKind::Video => vec![
            format!("-QuickTime:DateTimeOriginal={}", dt),
            format!("-QuickTime:CreateDate={}", dt),
            format!("-QuickTime:ModifyDate={}", dt),
        ],
        // GIF has no EXIF block, XMP carries the offset inline.
        EffectiveKind::Gif => {
            let value = match &request.offset {
                Some(off) => format!("{}{}", dt, off),
                None => dt.clone(),
            };
            vec![
                format!("-XMP:DateTimeOriginal={}", value),
                format!("-XMP:CreateDate={}", value),
                format!("-XMP:ModifyDate={}", value),
            ]
        }
        EffectiveKind::Jpeg | EffectiveKind::Png | EffectiveKind::Webp | EffectiveKind::Unknown => {
            if request.rebuild_exif {
                // Deletions apply before assignments within one command.
                args.push("-EXIF:all=".to_string());
            }
            let mut tags = vec![
                format!("-EXIF:ModifyDate={}", dt),
                format!("-EXIF:DateTimeOriginal={}", dt),
                format!("-EXIF:CreateDate={}", dt),
            ];
            if let Some(off) = &request.offset {
                for tag in OFFSET_TAGS {
                    tags.push(format!("-EXIF:{}={}", tag, off));
                }
            }
            tags
        }
    };
    args.extend(tags);
    args
}

/// Interpret `exiftool -json` output. Warnings and errors reported inside the
/// JSON are merged with stderr before classification.
pub fn parse_inspection(
    stdout: &str,
    stderr: &str,
    classifier: &CorruptionClassifier,
) -> Result<Inspection, String> {
    let records: Vec<Map<String, Value>> =
        serde_json::from_str(stdout.trim()).map_err(|e| e.to_string())?;
    let record = records
        .into_iter()
        .next()
        .ok_or_else(|| "empty result".to_string())?;

    let text = |key: &str| -> Option<String> {
        match record.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    };

    let has_date = DATE_TAGS
        .iter()
        .filter_map(|t| text(*t))
        .any(|v| is_meaningful_date(&v));
    let has_timezone = OFFSET_TAGS
        .iter()
        .filter_map(|t| text(*t))
        .any(|v| !v.trim().is_empty());

    let mut notes: Vec<String> = Vec::new();
    if !stderr.trim().is_empty() {
        notes.push(stderr.trim().to_string());
    }
    notes.extend(text("Warning"));
    notes.extend(text("Error"));
    let diagnostic = notes.join("; ");

    Ok(Inspection {
        has_date,
        has_timezone,
        file_type: text("FileType").filter(|t| !t.is_empty()),
        diagnosis: classifier.classify(&diagnostic),
        diagnostic,
    })
}
