use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::SystemTime;

use futures::future::join_all;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::DeleteOutcome;
use crate::utils::unique_filename;

/// The two type partitions of the media store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Images,
    Videos,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Images => "images",
            MediaKind::Videos => "videos",
        }
    }

    /// Parse the `type` query parameter.
    pub fn from_type_param(value: &str) -> Result<Self, AppError> {
        match value {
            "images" => Ok(MediaKind::Images),
            "videos" => Ok(MediaKind::Videos),
            _ => Err(AppError::Validation(
                "type must be \"images\" or \"videos\"".to_string(),
            )),
        }
    }

    /// Classify an upload by its MIME prefix. Anything that is neither
    /// an image nor a video is not storable.
    pub fn from_mime(mime: &str) -> Option<Self> {
        if mime.starts_with("image/") {
            Some(MediaKind::Images)
        } else if mime.starts_with("video/") {
            Some(MediaKind::Videos)
        } else {
            None
        }
    }
}

/// Stored filenames are single path components; separators and dot
/// segments would escape the type partition.
fn validate_filename(filename: &str) -> Result<(), AppError> {
    if filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains('/')
        || filename.contains('\\')
    {
        return Err(AppError::Validation("Invalid filename".to_string()));
    }
    Ok(())
}

/// A file persisted by the store, addressed by generated filename.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub filename: String,
    pub path: PathBuf,
    pub url: String,
}

/// Local filesystem store for uploaded media, partitioned into
/// `<base>/images` and `<base>/videos`.
#[derive(Clone)]
pub struct MediaStore {
    base_dir: PathBuf,
}

impl MediaStore {
    /// Creates the store and ensures both partition directories exist.
    pub async fn new(base_dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let base_dir = base_dir.into();
        fs::create_dir_all(base_dir.join(MediaKind::Images.as_str())).await?;
        fs::create_dir_all(base_dir.join(MediaKind::Videos.as_str())).await?;
        Ok(Self { base_dir })
    }

    fn dir(&self, kind: MediaKind) -> PathBuf {
        self.base_dir.join(kind.as_str())
    }

    /// Full filesystem path of a stored file. Filenames come from URL
    /// segments and review columns as well as our own generator, so
    /// anything that could leave the partition directory is rejected here.
    pub fn path_of(&self, kind: MediaKind, filename: &str) -> Result<PathBuf, AppError> {
        validate_filename(filename)?;
        Ok(self.dir(kind).join(filename))
    }

    /// Public URL of a stored file, mirroring the on-disk layout.
    pub fn url_of(&self, kind: MediaKind, filename: &str) -> String {
        format!("/uploads/{}/{}", kind.as_str(), filename)
    }

    /// Write `data` into the partition for `kind` under a freshly generated
    /// unique filename. Callers validate MIME type and size first, so a
    /// rejected upload never reaches the disk.
    pub async fn put(
        &self,
        kind: MediaKind,
        field: &str,
        original_name: &str,
        data: &[u8],
    ) -> Result<StoredFile, AppError> {
        let dir = self.dir(kind);
        fs::create_dir_all(&dir).await?;

        let filename = unique_filename(field, original_name);
        let path = dir.join(&filename);

        let mut file = fs::File::create(&path).await?;
        file.write_all(data).await?;

        info!("Saved {} file at {:?}", kind.as_str(), path);

        Ok(StoredFile {
            url: self.url_of(kind, &filename),
            filename,
            path,
        })
    }

    /// Delete a single stored file; missing files are a NotFound error.
    pub async fn delete(&self, kind: MediaKind, filename: &str) -> Result<(), AppError> {
        let path = self.path_of(kind, filename)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted {} file {}", kind.as_str(), filename);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(AppError::NotFound("File does not exist".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort bulk delete: every entry is attempted, already-missing
    /// files count as deleted, and failures are recorded per file without
    /// aborting the batch.
    pub async fn delete_many(&self, kind: MediaKind, filenames: &[String]) -> Vec<DeleteOutcome> {
        let attempts = filenames.iter().map(|filename| async move {
            let path = match self.path_of(kind, filename) {
                Ok(path) => path,
                Err(e) => {
                    warn!("Skipping delete of {} {}: {}", kind.as_str(), filename, e);
                    return DeleteOutcome {
                        filename: filename.clone(),
                        ok: false,
                        error: Some(e.to_string()),
                    };
                }
            };
            match fs::remove_file(path).await {
                Ok(()) => DeleteOutcome {
                    filename: filename.clone(),
                    ok: true,
                    error: None,
                },
                Err(e) if e.kind() == ErrorKind::NotFound => DeleteOutcome {
                    filename: filename.clone(),
                    ok: true,
                    error: None,
                },
                Err(e) => {
                    warn!("Could not delete {} {}: {}", kind.as_str(), filename, e);
                    DeleteOutcome {
                        filename: filename.clone(),
                        ok: false,
                        error: Some(e.to_string()),
                    }
                }
            }
        });

        join_all(attempts).await
    }

    /// List a partition as `(filename, modified)` pairs for reconciliation.
    /// A missing partition directory reads as empty.
    pub async fn list(&self, kind: MediaKind) -> Result<Vec<(String, SystemTime)>, AppError> {
        let mut entries = match fs::read_dir(self.dir(kind)).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified()?;
            files.push((entry.file_name().to_string_lossy().into_owned(), modified));
        }

        Ok(files)
    }
}
