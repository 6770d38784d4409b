//! Managed file libraries.
//!
//! A library is a directory the application owns plus a persisted list of
//! the files copied into it, newest first. Uploads, images and PDFs each get
//! their own library (see [`LibraryKind`]).

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;

use crate::models::{DirectoryInfo, ImportFileInput, LibraryKind, StoredFile};
use crate::ports::{FileSystem, KeyValueStore, StorageError};
use crate::retry::RetryPolicy;

const SIZE_UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

#[derive(Debug, Error)]
pub enum FileLibraryError {
    #[error("source file not found: {0}")]
    SourceMissing(String),

    #[error("file operation failed on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to save file list: {0}")]
    Persist(#[source] StorageError),

    #[error("failed to encode file list: {0}")]
    Encode(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> FileLibraryError + '_ {
    move |source| FileLibraryError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Human-readable size, e.g. `0 Bytes`, `500 Bytes`, `1.5 KB`, `3.2 MB`.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, SIZE_UNITS[unit])
}

/// Extension after the last `.` of `name`, or `default` when there is none.
fn extension_of<'a>(name: &'a str, default: &'a str) -> &'a str {
    name.rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or(default)
}

pub struct FileLibrary<S, F> {
    kind: LibraryKind,
    dir: PathBuf,
    storage: S,
    fs: F,
    retry: RetryPolicy,
    files: Vec<StoredFile>,
}

impl<S: KeyValueStore, F: FileSystem> FileLibrary<S, F> {
    /// Open the `kind` library rooted at `data_dir/<kind>`.
    pub fn open(kind: LibraryKind, data_dir: &Path, storage: S, fs: F, retry: RetryPolicy) -> Self {
        let mut library = Self {
            kind,
            dir: data_dir.join(kind.dir_name()),
            storage,
            fs,
            retry,
            files: Vec::new(),
        };
        library.load();
        library
    }

    /// Reload the record list; unreadable state loads as empty.
    pub fn load(&mut self) -> &[StoredFile] {
        let key = self.kind.storage_key();
        self.files = match self.storage.get(key) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("Discarding unparsable {} list: {}", self.kind.as_str(), e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("Failed to read {} list, starting empty: {}", self.kind.as_str(), e);
                Vec::new()
            }
        };
        &self.files
    }

    pub fn kind(&self) -> LibraryKind {
        self.kind
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the managed directory if needed.
    pub fn initialize(&self) -> Result<(), FileLibraryError> {
        self.fs.create_dir_all(&self.dir).map_err(io_error(&self.dir))
    }

    /// Records, newest first.
    pub fn files(&self) -> &[StoredFile] {
        &self.files
    }

    pub fn get(&self, id: &str) -> Option<&StoredFile> {
        self.files.iter().find(|file| file.id == id)
    }

    pub fn count(&self) -> usize {
        self.files.len()
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|file| file.file_size).sum()
    }

    pub fn directory_info(&self) -> DirectoryInfo {
        DirectoryInfo {
            exists: self.fs.exists(&self.dir),
            path: self.dir.display().to_string(),
            file_count: self.files.len(),
        }
    }

    /// Copy a picked file into the library and record it.
    pub fn import(&mut self, input: ImportFileInput) -> Result<StoredFile, FileLibraryError> {
        let source = PathBuf::from(&input.source_path);
        if !self.fs.exists(&source) {
            return Err(FileLibraryError::SourceMissing(input.source_path));
        }
        self.initialize()?;

        let prefix = self.kind.file_prefix();
        let ext = extension_of(&input.file_name, self.kind.default_extension()).to_string();

        let mut stamp = Utc::now().timestamp_millis();
        let (id, file_name, stored_path, thumb_path) = loop {
            let id = format!("{}_{}", prefix, stamp);
            let file_name = format!("{}.{}", id, ext);
            let stored_path = self.dir.join(&file_name);
            let thumb_path = self.dir.join(format!("thumb_{}.{}", stamp, ext));
            let taken = self.get(&id).is_some()
                || self.fs.exists(&stored_path)
                || self.fs.exists(&thumb_path);
            if !taken {
                break (id, file_name, stored_path, thumb_path);
            }
            stamp += 1;
        };

        let file_size = self
            .fs
            .copy(&source, &stored_path)
            .map_err(io_error(&stored_path))?;

        let thumbnail = if self.kind.wants_thumbnail(input.mime_type.as_deref()) {
            if let Err(e) = self.fs.copy(&source, &thumb_path) {
                self.discard(&[stored_path.as_path()]);
                return Err(io_error(&thumb_path)(e));
            }
            Some(thumb_path.display().to_string())
        } else {
            None
        };

        let record = StoredFile {
            id,
            file_name,
            original_path: input.source_path,
            stored_path: stored_path.display().to_string(),
            file_size,
            mime_type: input.mime_type,
            uploaded_at: Utc::now(),
            thumbnail,
            width: input.width,
            height: input.height,
        };

        let mut next = Vec::with_capacity(self.files.len() + 1);
        next.push(record.clone());
        next.extend(self.files.iter().cloned());
        if let Err(e) = self.commit(next) {
            self.discard(&[stored_path.as_path(), thumb_path.as_path()]);
            return Err(e);
        }

        tracing::info!(
            "Imported {} into {} as {}",
            record.original_path,
            self.kind.as_str(),
            record.id
        );
        Ok(record)
    }

    /// Remove a file and its thumbnail. Returns whether the id was known.
    pub fn delete(&mut self, id: &str) -> Result<bool, FileLibraryError> {
        let Some(file) = self.get(id).cloned() else {
            return Ok(false);
        };

        self.remove_managed(&file)?;
        let next = self.files.iter().filter(|f| f.id != id).cloned().collect();
        self.commit(next)?;

        tracing::info!("Deleted {} from {}", id, self.kind.as_str());
        Ok(true)
    }

    /// Remove every managed file. Returns how many records were dropped.
    pub fn clear(&mut self) -> Result<usize, FileLibraryError> {
        for file in &self.files {
            self.remove_managed(file)?;
        }
        let count = self.files.len();
        self.commit(Vec::new())?;

        tracing::info!("Cleared {} files from {}", count, self.kind.as_str());
        Ok(count)
    }

    fn remove_managed(&self, file: &StoredFile) -> Result<(), FileLibraryError> {
        let paths = std::iter::once(&file.stored_path).chain(file.thumbnail.as_ref());
        for path in paths.map(Path::new) {
            if self.fs.exists(path) {
                self.fs.remove_file(path).map_err(io_error(path))?;
            }
        }
        Ok(())
    }

    /// Best-effort cleanup of copies that will not be recorded.
    fn discard(&self, paths: &[&Path]) {
        for path in paths {
            if let Err(e) = self.fs.remove_file(path) {
                tracing::warn!("Failed to remove orphaned copy {}: {}", path.display(), e);
            }
        }
    }

    fn commit(&mut self, next: Vec<StoredFile>) -> Result<(), FileLibraryError> {
        let blob = serde_json::to_string(&next)?;
        let key = self.kind.storage_key();
        self.retry
            .run(
                "save file list",
                || self.storage.set(key, &blob),
                |_| true,
            )
            .map_err(FileLibraryError::Persist)?;
        self.files = next;
        Ok(())
    }
}

/// The uploads, images and PDF libraries of one data directory.
pub struct FileLibraries<S, F> {
    uploads: FileLibrary<S, F>,
    images: FileLibrary<S, F>,
    pdfs: FileLibrary<S, F>,
}

impl<S: KeyValueStore + Clone, F: FileSystem + Clone> FileLibraries<S, F> {
    pub fn open(data_dir: &Path, storage: S, fs: F, retry: RetryPolicy) -> Self {
        let open = |kind| FileLibrary::open(kind, data_dir, storage.clone(), fs.clone(), retry);
        Self {
            uploads: open(LibraryKind::Uploads),
            images: open(LibraryKind::Images),
            pdfs: open(LibraryKind::Pdfs),
        }
    }
}

impl<S, F> FileLibraries<S, F> {
    pub fn library(&self, kind: LibraryKind) -> &FileLibrary<S, F> {
        match kind {
            LibraryKind::Uploads => &self.uploads,
            LibraryKind::Images => &self.images,
            LibraryKind::Pdfs => &self.pdfs,
        }
    }

    pub fn library_mut(&mut self, kind: LibraryKind) -> &mut FileLibrary<S, F> {
        match kind {
            LibraryKind::Uploads => &mut self.uploads,
            LibraryKind::Images => &mut self.images,
            LibraryKind::Pdfs => &mut self.pdfs,
        }
    }
}
