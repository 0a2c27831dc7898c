use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use sqlx::types::Json as SqlJson;

use crate::error::AppError;

/// A stored reference to an uploaded video and its derived thumbnail frame.
///
/// The `frame` is absent when extraction failed or was disabled for the
/// upload that produced the video.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoRef {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<String>,
}

/// A product review row, including the JSON-encoded media reference columns.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Review {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub rate: i32,
    pub verified_purchase: bool,
    pub would_recommend: bool,
    pub images: Option<SqlJson<Vec<String>>>,
    pub videos: Option<SqlJson<Vec<VideoRef>>>,
    pub user: String,
    pub likes: i32,
    #[serde(rename = "orderSort")]
    pub order_sort: Option<i32>,
    pub outstanding: bool,
    pub created: Option<DateTime<Utc>>,
}

/// Fields accepted when creating a review. Everything is optional at the
/// serde level so missing required fields produce a 400 with a precise
/// message instead of a deserialization rejection.
#[derive(Debug, Default, Deserialize)]
pub struct CreateReview {
    pub title: Option<String>,
    pub description: Option<String>,
    pub rate: Option<i32>,
    pub verified_purchase: Option<bool>,
    pub would_recommend: Option<bool>,
    pub images: Option<Vec<String>>,
    pub videos: Option<Vec<VideoRef>>,
    pub user: Option<String>,
    pub likes: Option<i32>,
    #[serde(rename = "orderSort")]
    pub order_sort: Option<i32>,
    pub outstanding: Option<bool>,
}

/// Partial update for a review: absent fields keep their stored value
/// (COALESCE semantics in the repository).
#[derive(Debug, Default, Deserialize)]
pub struct UpdateReview {
    pub title: Option<String>,
    pub description: Option<String>,
    pub rate: Option<i32>,
    pub verified_purchase: Option<bool>,
    pub would_recommend: Option<bool>,
    pub images: Option<Vec<String>>,
    pub videos: Option<Vec<VideoRef>>,
    pub likes: Option<i32>,
    #[serde(rename = "orderSort")]
    pub order_sort: Option<i32>,
    pub outstanding: Option<bool>,
}

/// The media columns of every review, loaded in one query for
/// filesystem-vs-database reconciliation in `MediaService::list_files`.
#[derive(Debug, FromRow)]
pub struct ReviewMediaRefs {
    pub id: i32,
    pub images: Option<SqlJson<Vec<String>>>,
    pub videos: Option<SqlJson<Vec<VideoRef>>>,
}

/// Metadata returned for one stored upload.
#[derive(Debug, Serialize)]
pub struct FileMetadata {
    pub filename: String,
    pub originalname: String,
    pub mimetype: String,
    pub size: u64,
    pub url: String,
    pub path: String,
    /// Thumbnail filename, present when a video frame was extracted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<String>,
    /// Set when this file is a video and frame extraction failed; the
    /// upload itself still succeeded.
    #[serde(rename = "frameExtractionError", skip_serializing_if = "Option::is_none")]
    pub frame_extraction_error: Option<String>,
}

/// One entry of the reconciliation listing (`GET /api/media/files`).
#[derive(Debug, Serialize, PartialEq)]
pub struct FileListEntry {
    pub filename: String,
    #[serde(rename = "reviewId")]
    pub review_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<String>,
}

/// Per-file result of a best-effort bulk delete. Failures are recorded
/// here and logged, never raised to the caller.
#[derive(Debug, Serialize)]
pub struct DeleteOutcome {
    pub filename: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Standard JSON envelope for every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub message: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: message.into(),
        }
    }
}

impl ApiResponse<()> {
    /// Success envelope without a data payload.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: message.into(),
        }
    }
}

/// Zero-based pagination query parameters.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    pub page_index: Option<i64>,
    pub page_size: Option<i64>,
}

/// Upper bound keeping `page_index * page_size` (the SQL offset) inside
/// i64 for any valid page size.
const MAX_PAGE_INDEX: i64 = i64::MAX / 100;

impl PageParams {
    /// Validate and resolve pagination parameters.
    ///
    /// `page_index` must be >= 0 and `page_size` in 1..=100; defaults are
    /// page 0 with 10 rows.
    pub fn resolve(&self) -> Result<(i64, i64), AppError> {
        let page_index = self.page_index.unwrap_or(0);
        let page_size = self.page_size.unwrap_or(10);

        if page_index < 0 || page_size < 1 || page_size > 100 {
            return Err(AppError::Validation(
                "pageIndex must be >= 0 and pageSize between 1 and 100".to_string(),
            ));
        }
        if page_index > MAX_PAGE_INDEX {
            return Err(AppError::Validation("pageIndex is too large".to_string()));
        }

        Ok((page_index, page_size))
    }
}

/// Pagination metadata echoed alongside every review listing.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page_index: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub total_items: i64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl Pagination {
    pub fn new(page_index: i64, page_size: i64, total_items: i64) -> Self {
        let total_pages = (total_items + page_size - 1) / page_size;
        Self {
            page_index,
            page_size,
            total_pages,
            total_items,
            has_next_page: page_index < total_pages - 1,
            has_prev_page: page_index > 0,
        }
    }
}

/// A page of reviews plus its pagination metadata.
#[derive(Debug, Serialize)]
pub struct ReviewPage {
    pub reviews: Vec<Review>,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_params_defaults() {
        let params = PageParams::default();
        assert_eq!(params.resolve().unwrap(), (0, 10));
    }

    #[test]
    fn page_params_rejects_negative_index() {
        let params = PageParams {
            page_index: Some(-1),
            page_size: Some(10),
        };
        assert!(matches!(params.resolve(), Err(AppError::Validation(_))));
    }

    #[test]
    fn page_params_rejects_oversized_page() {
        let params = PageParams {
            page_index: Some(0),
            page_size: Some(101),
        };
        assert!(matches!(params.resolve(), Err(AppError::Validation(_))));
    }

    #[test]
    fn page_params_rejects_overflowing_index() {
        let params = PageParams {
            page_index: Some(i64::MAX),
            page_size: Some(100),
        };
        assert!(matches!(params.resolve(), Err(AppError::Validation(_))));

        // The largest accepted index still multiplies safely.
        let params = PageParams {
            page_index: Some(MAX_PAGE_INDEX),
            page_size: Some(100),
        };
        let (page_index, page_size) = params.resolve().unwrap();
        assert!(page_index.checked_mul(page_size).is_some());
    }

    #[test]
    fn page_params_accepts_limits() {
        let params = PageParams {
            page_index: Some(0),
            page_size: Some(100),
        };
        assert_eq!(params.resolve().unwrap(), (0, 100));
    }

    #[test]
    fn pagination_of_empty_result() {
        let page = Pagination::new(0, 100, 0);
        assert_eq!(page.total_pages, 0);
        assert!(!page.has_next_page);
        assert!(!page.has_prev_page);
    }

    #[test]
    fn pagination_rounds_total_pages_up() {
        let page = Pagination::new(0, 10, 25);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next_page);
    }

    #[test]
    fn video_ref_roundtrips_without_frame() {
        let parsed: VideoRef = serde_json::from_str(r#"{"filename":"a.mp4"}"#).unwrap();
        assert_eq!(parsed.filename, "a.mp4");
        assert!(parsed.frame.is_none());
    }
}
