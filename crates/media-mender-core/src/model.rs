use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "heic", "heiv"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "flv", "wmv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Unsupported,
}

impl MediaKind {
    /// Classify by extension, case-insensitively.
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            MediaKind::Image
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            MediaKind::Video
        } else {
            MediaKind::Unsupported
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which media kinds a run should pick up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeFilter {
    Images,
    Videos,
    #[default]
    Both,
}

impl TypeFilter {
    pub fn accepts(&self, kind: MediaKind) -> bool {
        matches!(
            (self, kind),
            (TypeFilter::Images, MediaKind::Image)
                | (TypeFilter::Videos, MediaKind::Video)
                | (TypeFilter::Both, MediaKind::Image)
                | (TypeFilter::Both, MediaKind::Video)
        )
    }
}

impl FromStr for TypeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "images" | "image" => Ok(TypeFilter::Images),
            "videos" | "video" => Ok(TypeFilter::Videos),
            "both" | "all" => Ok(TypeFilter::Both),
            other => Err(format!("unknown file type filter '{}'", other)),
        }
    }
}

/// A candidate file discovered by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub extension: String,
    pub media_kind: MediaKind,
}

impl FileEntry {
    /// Build an entry from a path. Returns `None` when the path has no extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_string_lossy().to_ascii_lowercase();
        let media_kind = MediaKind::from_extension(&extension);
        Some(FileEntry {
            path: path.to_path_buf(),
            extension,
            media_kind,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepairStatus {
    Valid,
    Repaired,
    Corrupt,
    Skipped,
}

impl RepairStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairStatus::Valid => "valid",
            RepairStatus::Repaired => "repaired",
            RepairStatus::Corrupt => "corrupt",
            RepairStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for RepairStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepairStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "valid" => Ok(RepairStatus::Valid),
            "repaired" => Ok(RepairStatus::Repaired),
            "corrupt" => Ok(RepairStatus::Corrupt),
            "skipped" => Ok(RepairStatus::Skipped),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

/// Terminal classification of one file after one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairOutcome {
    pub path: PathBuf,
    pub media_kind: MediaKind,
    pub status: RepairStatus,
    pub checksum: Option<String>,
    pub error_message: Option<String>,
    pub file_size: Option<u64>,
    pub timestamp: String,
}

impl RepairOutcome {
    pub fn new(entry: &FileEntry, status: RepairStatus) -> Self {
        RepairOutcome {
            path: entry.path.clone(),
            media_kind: entry.media_kind,
            status,
            checksum: None,
            error_message: None,
            file_size: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Human-readable message for log lines.
    pub fn message(&self) -> String {
        match (&self.status, &self.error_message) {
            (_, Some(err)) => err.clone(),
            (RepairStatus::Valid, None) => "already valid".to_string(),
            (RepairStatus::Repaired, None) => "repaired in place".to_string(),
            (RepairStatus::Corrupt, None) => "corrupt".to_string(),
            (RepairStatus::Skipped, None) => "skipped".to_string(),
        }
    }
}
