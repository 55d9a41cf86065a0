use std::path::{Path, PathBuf};

/// Photo extensions handled by the writer (lowercase, with leading dot).
pub const PHOTO_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// Video extensions handled by the writer (lowercase, with leading dot).
pub const VIDEO_EXTENSIONS: &[&str] = &[
    ".mp4", ".3gp", ".mov", ".avi", ".mkv", ".flv", ".wmv", ".webm",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    /// Kind implied by a normalized extension such as `.jpg`.
    pub fn from_extension(ext: &str) -> Option<Self> {
        if PHOTO_EXTENSIONS.contains(&ext) {
            Some(MediaKind::Photo)
        } else if VIDEO_EXTENSIONS.contains(&ext) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

/// A file found under the media root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    /// Absolute path, the identity of the file within a run
    pub path: PathBuf,
    /// Directory containing the file
    pub dir: PathBuf,
    /// Just the filename
    pub filename: String,
    /// Lowercase extension including the leading dot, empty if none
    pub extension: String,
    /// Kind inferred from the extension, None if unsupported
    pub kind: Option<MediaKind>,
}

impl MediaFile {
    pub fn new(path: PathBuf) -> Self {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = normalize_extension(&path);
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let kind = MediaKind::from_extension(&extension);
        Self {
            path,
            dir,
            filename,
            extension,
            kind,
        }
    }
}

/// Lowercase the extension and prefix it with a dot: `IMG.JPG` -> `.jpg`.
pub fn normalize_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

/// Container type as the metadata tool sees it, which decides the tag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveKind {
    Jpeg,
    Png,
    Webp,
    Gif,
    Video,
    Unknown,
}

impl EffectiveKind {
    pub fn is_video(self) -> bool {
        self == EffectiveKind::Video
    }
}

/// Resolve the effective kind from the probed file type, trusting the
/// extension only when probing reported nothing.
///
/// WhatsApp and some messengers save PNG or WebP payloads under `.jpg`, and
/// exiftool refuses to write JPEG-specific segments into them, so the probed
/// type wins whenever it is known.
pub fn resolve_kind(declared: MediaKind, file_type: Option<&str>) -> EffectiveKind {
    let probed = file_type.map(|t| t.trim().to_ascii_uppercase());
    match probed.as_deref() {
        Some("JPEG") | Some("JPG") => EffectiveKind::Jpeg,
        Some("PNG") => EffectiveKind::Png,
        Some("WEBP") => EffectiveKind::Webp,
        Some("GIF") => EffectiveKind::Gif,
        Some("MP4") | Some("MOV") | Some("M4V") | Some("3GP") | Some("3GP2") | Some("AVI")
        | Some("MKV") | Some("FLV") | Some("WMV") | Some("ASF") | Some("WEBM") => {
            EffectiveKind::Video
        }
        Some(other) if !other.is_empty() => EffectiveKind::Unknown,
        _ => match declared {
            MediaKind::Photo => EffectiveKind::Jpeg,
            MediaKind::Video => EffectiveKind::Video,
        },
    }
}
