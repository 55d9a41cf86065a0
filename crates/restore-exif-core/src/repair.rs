//! Container repair for truncated or malformed videos.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Rewrites a damaged container in place. Returns whether the original was
/// replaced by a repaired copy; on `false` the original is untouched.
pub trait Repairer: Send + Sync {
    fn repair(&self, path: &Path) -> bool;
}

/// Lossless remux through `ffmpeg -c copy`.
#[derive(Debug, Clone)]
pub struct FfmpegRepair {
    program: PathBuf,
}

impl Default for FfmpegRepair {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
        }
    }
}

impl FfmpegRepair {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn remux(&self, src: &Path, dst: &Path) -> Result<(), String> {
        let output = Command::new(&self.program)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-err_detect", "ignore_err", "-i"])
            .arg(src)
            .args(["-map", "0", "-c", "copy"])
            .arg(dst)
            .output()
            .map_err(|e| format!("failed to launch ffmpeg: {}", e))?;
        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        match fs::metadata(dst) {
            Ok(m) if m.len() > 0 => Ok(()),
            _ => Err("ffmpeg produced no output".to_string()),
        }
    }
}

impl Repairer for FfmpegRepair {
    fn repair(&self, path: &Path) -> bool {
        let temp = temp_path_for(path);
        let result = self
            .remux(path, &temp)
            .and_then(|_| replace_with(&temp, path));
        match result {
            Ok(()) => {
                log::info!("Repaired container: {}", path.display());
                true
            }
            Err(e) => {
                let _ = fs::remove_file(&temp);
                log::warn!("Repair failed for {}: {}", path.display(), e);
                false
            }
        }
    }
}

/// Sibling temp path keeping the extension so the muxer is chosen from it:
/// `clip.mp4` -> `clip.repair-tmp.mp4`.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{}.repair-tmp.{}", stem, ext.to_string_lossy()),
        None => format!("{}.repair-tmp", stem),
    };
    path.with_file_name(name)
}

/// Rename `temp` over `destination`; same directory, so the swap is atomic.
pub fn replace_with(temp: &Path, destination: &Path) -> Result<(), String> {
    fs::rename(temp, destination).map_err(|e| {
        let _ = fs::remove_file(temp);
        format!("failed to replace {}: {}", destination.display(), e)
    })
}
