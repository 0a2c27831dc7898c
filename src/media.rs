use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use tokio::fs;
use tracing::warn;

use crate::config::Config;
use crate::error::AppError;
use crate::extractor::FrameExtractor;
use crate::models::{DeleteOutcome, FileListEntry, FileMetadata, ReviewMediaRefs, VideoRef};
use crate::storage::{MediaKind, MediaStore, StoredFile};
use crate::utils::unique_filename;

/// The reconciliation listing returns at most this many images...
const IMAGE_LIST_LIMIT: usize = 10;
/// ...and this many videos.
const VIDEO_LIST_LIMIT: usize = 6;

/// Upload limits and frame-extraction settings for the media service.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub max_file_size: u64,
    pub max_files: usize,
    pub extract_frames: bool,
    pub default_frame_timestamp: String,
}

impl From<&Config> for MediaConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_file_size: config.max_file_size,
            max_files: config.max_files as usize,
            extract_frames: config.extract_frames,
            default_frame_timestamp: config.default_frame_timestamp.clone(),
        }
    }
}

/// One file lifted out of a multipart request.
#[derive(Debug, Clone)]
pub struct UploadPart {
    /// Multipart field name; becomes the stored filename prefix.
    pub field: String,
    pub original_name: String,
    pub mimetype: String,
    pub data: Bytes,
}

/// Media references to delete, either as the raw JSON column text or as an
/// already-parsed list. Repositories can hand over the stored column value
/// without knowing its encoding.
#[derive(Debug)]
pub enum FileRefs {
    Encoded(String),
    Names(Vec<String>),
    Videos(Vec<VideoRef>),
}

impl FileRefs {
    /// Resolve to the filenames to delete. Video entries contribute their
    /// `filename` only; the derived `frame` stays in the image store.
    fn into_filenames(self, kind: MediaKind) -> Vec<String> {
        match self {
            FileRefs::Names(names) => names,
            FileRefs::Videos(refs) => refs.into_iter().map(|r| r.filename).collect(),
            FileRefs::Encoded(raw) => match kind {
                MediaKind::Images => serde_json::from_str::<Vec<String>>(&raw)
                    .unwrap_or_else(|e| {
                        warn!("Could not parse images column {:?}: {}", raw, e);
                        Vec::new()
                    }),
                MediaKind::Videos => serde_json::from_str::<Vec<VideoRef>>(&raw)
                    .map(|refs| refs.into_iter().map(|r| r.filename).collect())
                    .unwrap_or_else(|e| {
                        warn!("Could not parse videos column {:?}: {}", raw, e);
                        Vec::new()
                    }),
            },
        }
    }
}

/// Orchestrates upload validation, storage, optional video frame
/// extraction, reconciliation listing and bulk cleanup.
#[derive(Clone)]
pub struct MediaService {
    store: MediaStore,
    extractor: Arc<dyn FrameExtractor>,
    config: MediaConfig,
}

impl MediaService {
    pub fn new(store: MediaStore, extractor: Arc<dyn FrameExtractor>, config: MediaConfig) -> Self {
        Self {
            store,
            extractor,
            config,
        }
    }

    /// MIME and size checks, run before anything touches the disk.
    fn validate(&self, part: &UploadPart) -> Result<MediaKind, AppError> {
        let kind = MediaKind::from_mime(&part.mimetype).ok_or_else(|| {
            AppError::Validation("Only image and video uploads are allowed".to_string())
        })?;

        if part.data.len() as u64 > self.config.max_file_size {
            return Err(AppError::Validation(format!(
                "File {} exceeds the maximum size of {} bytes",
                part.original_name, self.config.max_file_size
            )));
        }

        Ok(kind)
    }

    /// Validate and store a single upload. No frame extraction here; the
    /// single-file endpoint only persists.
    pub async fn upload_single(&self, part: UploadPart) -> Result<FileMetadata, AppError> {
        let kind = self.validate(&part)?;
        let stored = self
            .store
            .put(kind, &part.field, &part.original_name, &part.data)
            .await?;
        Ok(self.metadata_for(part, stored))
    }

    /// Store up to `max_files` uploads, extracting a thumbnail frame for
    /// each video at `timestamp` (default `00:00:01`). Files are processed
    /// concurrently; a failed extraction is recorded on that file's
    /// metadata and never fails the batch. Returns the metadata and how
    /// many video frames were produced.
    pub async fn upload_multiple(
        &self,
        parts: Vec<UploadPart>,
        timestamp: Option<String>,
    ) -> Result<(Vec<FileMetadata>, usize), AppError> {
        if parts.is_empty() {
            return Err(AppError::Validation(
                "Please choose files to upload".to_string(),
            ));
        }
        if parts.len() > self.config.max_files {
            return Err(AppError::Validation(format!(
                "At most {} files per upload",
                self.config.max_files
            )));
        }

        let timestamp =
            timestamp.unwrap_or_else(|| self.config.default_frame_timestamp.clone());

        let uploads = parts
            .into_iter()
            .map(|part| self.store_and_extract(part, &timestamp));
        let files: Vec<FileMetadata> = join_all(uploads)
            .await
            .into_iter()
            .collect::<Result<_, _>>()?;

        let frames_extracted = files.iter().filter(|f| f.frame.is_some()).count();
        Ok((files, frames_extracted))
    }

    async fn store_and_extract(
        &self,
        part: UploadPart,
        timestamp: &str,
    ) -> Result<FileMetadata, AppError> {
        let kind = self.validate(&part)?;
        let stored = self
            .store
            .put(kind, &part.field, &part.original_name, &part.data)
            .await?;
        let mut metadata = self.metadata_for(part, stored);

        if kind == MediaKind::Videos && self.config.extract_frames {
            match self.extract_frame(&metadata.filename, timestamp).await {
                Ok(frame) => metadata.frame = Some(frame.filename),
                Err(e) => {
                    warn!("Frame extraction for {} failed: {}", metadata.filename, e);
                    metadata.frame_extraction_error = Some(e.to_string());
                }
            }
        }

        Ok(metadata)
    }

    fn metadata_for(&self, part: UploadPart, stored: StoredFile) -> FileMetadata {
        FileMetadata {
            filename: stored.filename,
            originalname: part.original_name,
            mimetype: part.mimetype,
            size: part.data.len() as u64,
            url: stored.url,
            path: stored.path.to_string_lossy().into_owned(),
            frame: None,
            frame_extraction_error: None,
        }
    }

    /// Capture one still frame of a stored video into the image store.
    pub async fn extract_frame(
        &self,
        video_filename: &str,
        timestamp: &str,
    ) -> Result<StoredFile, AppError> {
        let video_path = self.store.path_of(MediaKind::Videos, video_filename)?;
        if !fs::try_exists(&video_path).await? {
            return Err(AppError::NotFound("Video file not found".to_string()));
        }

        let frame_name = unique_filename("frame", "frame.jpg");
        let output_path = self.store.path_of(MediaKind::Images, &frame_name)?;

        self.extractor
            .extract_frame(&video_path, &output_path, timestamp)
            .await?;

        // The tool exiting cleanly does not guarantee an output file.
        if !fs::try_exists(&output_path).await? {
            return Err(AppError::ExtractionFailed(
                "could not produce frame file".to_string(),
            ));
        }

        Ok(StoredFile {
            url: self.store.url_of(MediaKind::Images, &frame_name),
            filename: frame_name,
            path: output_path,
        })
    }

    /// Delete one stored file; absent files are NotFound.
    pub async fn delete_file(&self, kind: MediaKind, filename: &str) -> Result<(), AppError> {
        self.store.delete(kind, filename).await
    }

    /// Reconciliation listing: directory contents sorted by modification
    /// time (newest first), capped per partition, annotated with the
    /// owning review resolved from the JSON media columns.
    ///
    /// Orphaned images are listed with a null review id, while orphaned
    /// videos are dropped entirely. Product has been asked to confirm the
    /// asymmetry; until then it is preserved as shipped.
    pub async fn list_files(
        &self,
        kind: Option<MediaKind>,
        reviews: &[ReviewMediaRefs],
    ) -> Result<Vec<FileListEntry>, AppError> {
        let mut files = Vec::new();

        if kind.is_none() || kind == Some(MediaKind::Images) {
            let mut listed = self.store.list(MediaKind::Images).await?;
            listed.sort_by(|a, b| b.1.cmp(&a.1));
            listed.truncate(IMAGE_LIST_LIMIT);

            for (filename, _) in listed {
                let review_id = reviews
                    .iter()
                    .find(|r| {
                        r.images
                            .as_ref()
                            .is_some_and(|imgs| imgs.0.iter().any(|f| f == &filename))
                    })
                    .map(|r| r.id);
                files.push(FileListEntry {
                    filename,
                    review_id,
                    frame: None,
                });
            }
        }

        if kind.is_none() || kind == Some(MediaKind::Videos) {
            let mut listed = self.store.list(MediaKind::Videos).await?;
            listed.sort_by(|a, b| b.1.cmp(&a.1));
            listed.truncate(VIDEO_LIST_LIMIT);

            for (filename, _) in listed {
                let owner = reviews.iter().find_map(|r| {
                    r.videos.as_ref().and_then(|vids| {
                        vids.0
                            .iter()
                            .find(|v| v.filename == filename)
                            .map(|v| (r.id, v.frame.clone()))
                    })
                });
                let Some((review_id, frame)) = owner else {
                    continue;
                };
                files.push(FileListEntry {
                    filename,
                    review_id: Some(review_id),
                    frame,
                });
            }
        }

        Ok(files)
    }

    /// Best-effort cleanup of a review's media references. Accepts the raw
    /// JSON column text or a parsed list, never fails, and reports the
    /// per-file outcomes for logging.
    pub async fn delete_files(
        &self,
        refs: Option<FileRefs>,
        kind: MediaKind,
    ) -> Vec<DeleteOutcome> {
        let Some(refs) = refs else {
            return Vec::new();
        };

        let filenames = refs.into_filenames(kind);
        if filenames.is_empty() {
            return Vec::new();
        }

        self.store.delete_many(kind, &filenames).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sqlx::types::Json as SqlJson;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    /// Scripted stand-in for ffmpeg.
    enum FakeBehavior {
        /// Write the output file and succeed.
        Produce,
        /// Fail outright.
        Fail,
        /// Report success without writing any output.
        SucceedSilently,
    }

    struct FakeExtractor(FakeBehavior);

    #[async_trait]
    impl FrameExtractor for FakeExtractor {
        async fn extract_frame(
            &self,
            _video: &Path,
            output: &Path,
            _timestamp: &str,
        ) -> Result<(), AppError> {
            match self.0 {
                FakeBehavior::Produce => {
                    tokio::fs::write(output, b"frame").await.unwrap();
                    Ok(())
                }
                FakeBehavior::Fail => {
                    Err(AppError::ExtractionFailed("scripted failure".to_string()))
                }
                FakeBehavior::SucceedSilently => Ok(()),
            }
        }
    }

    fn test_config() -> MediaConfig {
        MediaConfig {
            max_file_size: 20 * 1024 * 1024,
            max_files: 10,
            extract_frames: true,
            default_frame_timestamp: "00:00:01".to_string(),
        }
    }

    async fn service(dir: &TempDir, behavior: FakeBehavior) -> MediaService {
        let store = MediaStore::new(dir.path()).await.unwrap();
        MediaService::new(store, Arc::new(FakeExtractor(behavior)), test_config())
    }

    fn part(field: &str, name: &str, mime: &str, data: &[u8]) -> UploadPart {
        UploadPart {
            field: field.to_string(),
            original_name: name.to_string(),
            mimetype: mime.to_string(),
            data: Bytes::copy_from_slice(data),
        }
    }

    fn dir_entries(dir: &TempDir, kind: &str) -> usize {
        std::fs::read_dir(dir.path().join(kind)).unwrap().count()
    }

    #[tokio::test]
    async fn rejects_non_media_mime_before_writing() {
        let dir = tempdir().unwrap();
        let svc = service(&dir, FakeBehavior::Produce).await;

        let err = svc
            .upload_single(part("file", "doc.pdf", "application/pdf", b"%PDF"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(dir_entries(&dir, "images"), 0);
        assert_eq!(dir_entries(&dir, "videos"), 0);
    }

    #[tokio::test]
    async fn rejects_oversized_upload_before_writing() {
        let dir = tempdir().unwrap();
        let store = MediaStore::new(dir.path()).await.unwrap();
        let config = MediaConfig {
            max_file_size: 8,
            ..test_config()
        };
        let svc = MediaService::new(store, Arc::new(FakeExtractor(FakeBehavior::Produce)), config);

        let err = svc
            .upload_single(part("file", "big.jpg", "image/jpeg", b"123456789"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(dir_entries(&dir, "images"), 0);
    }

    #[tokio::test]
    async fn upload_single_stores_an_image() {
        let dir = tempdir().unwrap();
        let svc = service(&dir, FakeBehavior::Produce).await;

        let meta = svc
            .upload_single(part("file", "cat.jpg", "image/jpeg", b"jpeg"))
            .await
            .unwrap();

        assert_eq!(meta.originalname, "cat.jpg");
        assert_eq!(meta.mimetype, "image/jpeg");
        assert_eq!(meta.size, 4);
        assert_eq!(meta.url, format!("/uploads/images/{}", meta.filename));
        assert!(meta.frame.is_none());
        assert!(Path::new(&meta.path).exists());
    }

    #[tokio::test]
    async fn upload_multiple_extracts_frames_for_videos() {
        let dir = tempdir().unwrap();
        let svc = service(&dir, FakeBehavior::Produce).await;

        let (files, frames) = svc
            .upload_multiple(
                vec![
                    part("files", "pic.png", "image/png", b"png"),
                    part("files", "clip.mp4", "video/mp4", b"vid"),
                ],
                None,
            )
            .await
            .unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(frames, 1);

        let video = files.iter().find(|f| f.mimetype == "video/mp4").unwrap();
        let frame = video.frame.as_ref().unwrap();
        assert!(dir.path().join("images").join(frame).exists());
        assert!(video.frame_extraction_error.is_none());

        // The frame is an image-store file: its URL resolves under the
        // image prefix.
        let extracted = svc
            .extract_frame(&video.filename, "00:00:01")
            .await
            .unwrap();
        assert_eq!(
            extracted.url,
            format!("/uploads/images/{}", extracted.filename)
        );
        assert!(dir.path().join("images").join(&extracted.filename).exists());
    }

    #[tokio::test]
    async fn extraction_failure_is_recorded_per_file() {
        let dir = tempdir().unwrap();
        let svc = service(&dir, FakeBehavior::Fail).await;

        let (files, frames) = svc
            .upload_multiple(
                vec![
                    part("files", "pic.png", "image/png", b"png"),
                    part("files", "clip.mp4", "video/mp4", b"vid"),
                ],
                Some("00:00:02".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(frames, 0);
        let video = files.iter().find(|f| f.mimetype == "video/mp4").unwrap();
        assert!(video.frame.is_none());
        let recorded = video.frame_extraction_error.as_ref().unwrap();
        assert!(recorded.contains("scripted failure"));

        // The image in the same batch is unaffected.
        let image = files.iter().find(|f| f.mimetype == "image/png").unwrap();
        assert!(image.frame_extraction_error.is_none());
        assert!(dir.path().join("videos").join(&video.filename).exists());
    }

    #[tokio::test]
    async fn silent_extractor_counts_as_failure() {
        let dir = tempdir().unwrap();
        let svc = service(&dir, FakeBehavior::SucceedSilently).await;

        let (files, frames) = svc
            .upload_multiple(vec![part("files", "clip.mp4", "video/mp4", b"vid")], None)
            .await
            .unwrap();

        assert_eq!(frames, 0);
        let recorded = files[0].frame_extraction_error.as_ref().unwrap();
        assert!(recorded.contains("could not produce frame file"));
    }

    #[tokio::test]
    async fn upload_multiple_caps_the_file_count() {
        let dir = tempdir().unwrap();
        let svc = service(&dir, FakeBehavior::Produce).await;

        let parts = (0..11)
            .map(|i| part("files", &format!("p{i}.png"), "image/png", b"x"))
            .collect();
        let err = svc.upload_multiple(parts, None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn extract_frame_for_missing_video_is_not_found() {
        let dir = tempdir().unwrap();
        let svc = service(&dir, FakeBehavior::Produce).await;

        let err = svc
            .extract_frame("never-uploaded.mp4", "00:00:01")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    fn refs(
        id: i32,
        images: Option<Vec<&str>>,
        videos: Option<Vec<VideoRef>>,
    ) -> ReviewMediaRefs {
        ReviewMediaRefs {
            id,
            images: images.map(|v| SqlJson(v.into_iter().map(String::from).collect())),
            videos: videos.map(SqlJson),
        }
    }

    #[tokio::test]
    async fn list_files_caps_each_partition() {
        let dir = tempdir().unwrap();
        let svc = service(&dir, FakeBehavior::Produce).await;
        let store = MediaStore::new(dir.path()).await.unwrap();

        for i in 0..12 {
            store
                .put(MediaKind::Images, "files", &format!("img{i}.jpg"), b"x")
                .await
                .unwrap();
        }

        let images = svc.list_files(Some(MediaKind::Images), &[]).await.unwrap();
        assert_eq!(images.len(), 10, "image listing is capped at 10");
        assert!(images.iter().all(|e| e.review_id.is_none()));
    }

    #[tokio::test]
    async fn list_files_annotates_ownership_and_drops_orphaned_videos() {
        let dir = tempdir().unwrap();
        let svc = service(&dir, FakeBehavior::Produce).await;
        let store = MediaStore::new(dir.path()).await.unwrap();

        let owned_image = store
            .put(MediaKind::Images, "files", "owned.jpg", b"x")
            .await
            .unwrap();
        let orphan_image = store
            .put(MediaKind::Images, "files", "orphan.jpg", b"x")
            .await
            .unwrap();
        let owned_video = store
            .put(MediaKind::Videos, "files", "owned.mp4", b"v")
            .await
            .unwrap();
        let orphan_video = store
            .put(MediaKind::Videos, "files", "orphan.mp4", b"v")
            .await
            .unwrap();

        let reviews = vec![
            refs(1, Some(vec![owned_image.filename.as_str()]), None),
            refs(
                2,
                None,
                Some(vec![VideoRef {
                    filename: owned_video.filename.clone(),
                    frame: Some("frame-1-1.jpg".to_string()),
                }]),
            ),
        ];

        let images = svc
            .list_files(Some(MediaKind::Images), &reviews)
            .await
            .unwrap();
        let owned = images
            .iter()
            .find(|e| e.filename == owned_image.filename)
            .unwrap();
        assert_eq!(owned.review_id, Some(1));
        let orphan = images
            .iter()
            .find(|e| e.filename == orphan_image.filename)
            .unwrap();
        assert_eq!(orphan.review_id, None, "orphaned images stay listed");

        let videos = svc
            .list_files(Some(MediaKind::Videos), &reviews)
            .await
            .unwrap();
        assert_eq!(
            videos,
            vec![FileListEntry {
                filename: owned_video.filename.clone(),
                review_id: Some(2),
                frame: Some("frame-1-1.jpg".to_string()),
            }],
            "orphaned videos are excluded"
        );
        assert!(!videos.iter().any(|e| e.filename == orphan_video.filename));
    }

    #[tokio::test]
    async fn delete_files_removes_video_filenames_but_not_frames() {
        let dir = tempdir().unwrap();
        let svc = service(&dir, FakeBehavior::Produce).await;
        let store = MediaStore::new(dir.path()).await.unwrap();

        let video = store
            .put(MediaKind::Videos, "files", "c.mp4", b"v")
            .await
            .unwrap();
        let frame = store
            .put(MediaKind::Images, "frame", "d.jpg", b"f")
            .await
            .unwrap();

        let outcomes = svc
            .delete_files(
                Some(FileRefs::Videos(vec![
                    VideoRef {
                        filename: video.filename.clone(),
                        frame: Some(frame.filename.clone()),
                    },
                    VideoRef {
                        filename: "already-gone.mp4".to_string(),
                        frame: None,
                    },
                ])),
                MediaKind::Videos,
            )
            .await;

        assert!(outcomes.iter().all(|o| o.ok));
        assert!(!video.path.exists());
        assert!(frame.path.exists(), "frame files are not cascade-deleted");
    }

    #[tokio::test]
    async fn delete_files_accepts_the_raw_column_text() {
        let dir = tempdir().unwrap();
        let svc = service(&dir, FakeBehavior::Produce).await;
        let store = MediaStore::new(dir.path()).await.unwrap();

        let stored = store
            .put(MediaKind::Images, "files", "a.jpg", b"a")
            .await
            .unwrap();
        let encoded = format!(r#"["{}","b.jpg"]"#, stored.filename);

        let outcomes = svc
            .delete_files(Some(FileRefs::Encoded(encoded)), MediaKind::Images)
            .await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.ok), "missing files are tolerated");
        assert!(!stored.path.exists());
    }

    #[tokio::test]
    async fn delete_files_swallows_malformed_column_text() {
        let dir = tempdir().unwrap();
        let svc = service(&dir, FakeBehavior::Produce).await;

        let outcomes = svc
            .delete_files(
                Some(FileRefs::Encoded("not json".to_string())),
                MediaKind::Images,
            )
            .await;
        assert!(outcomes.is_empty());
    }
}
