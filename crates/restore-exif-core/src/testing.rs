//! In-memory stand-ins for the external tools and the remote service.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::ToolError;
use crate::exiftool::{Diagnosis, Inspection, MetadataTool, WriteRequest};
use crate::notify::{AssetService, NotifyError};
use crate::repair::Repairer;

#[derive(Default)]
pub(crate) struct FakeTool {
    has_date: bool,
    has_timezone: bool,
    file_type: Option<String>,
    /// Filenames that already carry a date, on top of `has_date`
    dated: HashSet<String>,
    corrupted: Arc<AtomicBool>,
    read_error: Option<String>,
    write_error: Option<String>,
    /// Rejects writes that do not rebuild the EXIF block
    malformed_exif: Option<String>,
    corrupt_write_once: AtomicBool,
    pub inspections: AtomicUsize,
    writes: Mutex<Vec<(PathBuf, WriteRequest)>>,
}

impl FakeTool {
    pub fn with_date(mut self) -> Self {
        self.has_date = true;
        self
    }

    pub fn with_dated(mut self, filenames: &[&str]) -> Self {
        self.dated = filenames.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_timezone(mut self) -> Self {
        self.has_timezone = true;
        self
    }

    pub fn with_file_type(mut self, file_type: &str) -> Self {
        self.file_type = Some(file_type.to_string());
        self
    }

    pub fn corrupted(self) -> Self {
        self.corrupted.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_read_error(mut self, diagnostic: &str) -> Self {
        self.read_error = Some(diagnostic.to_string());
        self
    }

    pub fn with_write_error(mut self, diagnostic: &str) -> Self {
        self.write_error = Some(diagnostic.to_string());
        self
    }

    pub fn with_malformed_exif(mut self, diagnostic: &str) -> Self {
        self.malformed_exif = Some(diagnostic.to_string());
        self
    }

    pub fn with_corrupt_write_once(self) -> Self {
        self.corrupt_write_once.store(true, Ordering::SeqCst);
        self
    }

    pub fn writes(&self) -> Vec<(PathBuf, WriteRequest)> {
        self.writes.lock().unwrap().clone()
    }
}

impl MetadataTool for FakeTool {
    fn inspect(&self, path: &Path) -> Result<Inspection, ToolError> {
        self.inspections.fetch_add(1, Ordering::SeqCst);
        if let Some(diagnostic) = &self.read_error {
            return Err(ToolError::Failed {
                tool: "fake",
                status: "exit status: 1".to_string(),
                diagnostic: diagnostic.clone(),
            });
        }
        let corrupted = self.corrupted.load(Ordering::SeqCst);
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Inspection {
            has_date: self.has_date || self.dated.contains(&filename),
            has_timezone: self.has_timezone,
            file_type: self.file_type.clone(),
            diagnosis: if corrupted { Diagnosis::Corrupted } else { Diagnosis::Clean },
            diagnostic: if corrupted {
                "Warning: Truncated 'mdat' data".to_string()
            } else {
                String::new()
            },
        })
    }

    fn write(&self, path: &Path, request: &WriteRequest) -> Result<(), ToolError> {
        self.writes
            .lock()
            .unwrap()
            .push((path.to_path_buf(), request.clone()));
        if self.corrupt_write_once.swap(false, Ordering::SeqCst) {
            return Err(ToolError::Failed {
                tool: "fake",
                status: "exit status: 1".to_string(),
                diagnostic: "Error: Invalid atom size".to_string(),
            });
        }
        let rejected = self
            .write_error
            .as_ref()
            .or(self.malformed_exif.as_ref().filter(|_| !request.rebuild_exif));
        if let Some(diagnostic) = rejected {
            return Err(ToolError::Failed {
                tool: "fake",
                status: "exit status: 1".to_string(),
                diagnostic: diagnostic.clone(),
            });
        }
        Ok(())
    }
}

pub(crate) struct FakeRepairer {
    succeed: bool,
    fixes: Option<Arc<AtomicBool>>,
    pub calls: AtomicUsize,
}

impl FakeRepairer {
    pub fn failing() -> Self {
        Self {
            succeed: false,
            fixes: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Reports success without changing what the tool sees.
    pub fn succeeding() -> Self {
        Self {
            succeed: true,
            ..Self::failing()
        }
    }

    /// Reports success and clears the tool's corruption.
    pub fn fixing(tool: &FakeTool) -> Self {
        Self {
            succeed: true,
            fixes: Some(tool.corrupted.clone()),
            calls: AtomicUsize::new(0),
        }
    }
}

impl Repairer for FakeRepairer {
    fn repair(&self, _path: &Path) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(flag) = &self.fixes {
            flag.store(false, Ordering::SeqCst);
        }
        self.succeed
    }
}

/// Remote service keyed by (api key, filename).
#[derive(Default)]
pub(crate) struct FakeAssets {
    assets: HashMap<(String, String), String>,
    rejected: HashSet<String>,
    pub refreshed: Mutex<Vec<String>>,
    pub lookups: AtomicUsize,
}

impl FakeAssets {
    pub fn with_asset(mut self, api_key: &str, filename: &str, id: &str) -> Self {
        self.assets
            .insert((api_key.to_string(), filename.to_string()), id.to_string());
        self
    }

    pub fn rejecting(mut self, id: &str) -> Self {
        self.rejected.insert(id.to_string());
        self
    }
}

impl AssetService for FakeAssets {
    fn find_asset(&self, api_key: &str, filename: &str) -> Result<Option<String>, NotifyError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .assets
            .get(&(api_key.to_string(), filename.to_string()))
            .cloned())
    }

    fn refresh(&self, _api_key: &str, asset_id: &str) -> Result<(), NotifyError> {
        if self.rejected.contains(asset_id) {
            return Err(NotifyError::Rejected {
                asset_id: asset_id.to_string(),
                status: 400,
            });
        }
        self.refreshed.lock().unwrap().push(asset_id.to_string());
        Ok(())
    }
}
