use std::path::Path;

use walkdir::WalkDir;

use crate::error::RestoreError;
use crate::media::MediaFile;

/// List regular files under `root`, sorted by path.
///
/// Without `recursive` only direct children are returned. Symlinks are not
/// followed, so a directory cycle cannot make a file appear twice.
pub fn discover(root: &Path, recursive: bool) -> anyhow::Result<Vec<MediaFile>> {
    if !root.exists() {
        return Err(RestoreError::PathNotFound(root.to_path_buf()).into());
    }
    if !root.is_dir() {
        return Err(RestoreError::PathNotADirectory(root.to_path_buf()).into());
    }
    let root = std::path::absolute(root)?;

    let walker = WalkDir::new(&root)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .follow_links(false)
        .sort_by_file_name();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::warn!("Cannot read directory entry: {}", e);
                continue;
            }
        };
        if entry.file_type().is_file() {
            files.push(MediaFile::new(entry.into_path()));
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Split files into (supported, unsupported) by extension.
pub fn filter_supported(files: Vec<MediaFile>) -> (Vec<MediaFile>, Vec<MediaFile>) {
    files.into_iter().partition(|f| f.kind.is_some())
}
