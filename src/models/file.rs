use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which managed library a file belongs to.
///
/// Each kind has its own directory, storage key and file-name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryKind {
    Uploads,
    Images,
    Pdfs,
}

impl LibraryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploads => "uploads",
            Self::Images => "images",
            Self::Pdfs => "pdfs",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "uploads" => Some(Self::Uploads),
            "images" => Some(Self::Images),
            "pdfs" => Some(Self::Pdfs),
            _ => None,
        }
    }

    /// Key under which the library's record list is persisted.
    pub fn storage_key(&self) -> &'static str {
        match self {
            Self::Uploads => "@uploaded_files",
            Self::Images => "@uploaded_images",
            Self::Pdfs => "@uploaded_pdfs",
        }
    }

    /// Directory name under the data directory.
    pub fn dir_name(&self) -> &'static str {
        self.as_str()
    }

    pub fn file_prefix(&self) -> &'static str {
        match self {
            Self::Uploads => "upload",
            Self::Images => "img",
            Self::Pdfs => "pdf",
        }
    }

    /// Extension used when the original name has none.
    pub fn default_extension(&self) -> &'static str {
        match self {
            Self::Uploads => "file",
            Self::Images => "jpg",
            Self::Pdfs => "pdf",
        }
    }

    pub fn wants_thumbnail(&self, mime_type: Option<&str>) -> bool {
        match self {
            Self::Uploads => mime_type.is_some_and(|m| m.starts_with("image/")),
            Self::Images => true,
            Self::Pdfs => false,
        }
    }
}

/// A file copied into a managed library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub id: String,
    pub file_name: String,
    pub original_path: String,
    pub stored_path: String,
    pub file_size: u64,
    pub mime_type: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub thumbnail: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Input for importing a file into a library.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportFileInput {
    /// Path of the picked file to copy.
    pub source_path: String,
    /// Name the file had when picked; only its extension is kept.
    pub file_name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryInfo {
    pub exists: bool,
    pub path: String,
    pub file_count: usize,
}
