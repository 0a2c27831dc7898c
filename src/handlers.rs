use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{
    error::AppError,
    media::UploadPart,
    models::{
        ApiResponse, CreateReview, FileListEntry, FileMetadata, PageParams, Pagination, Review,
        ReviewPage, UpdateReview,
    },
    reviews::SearchFilters,
    state::AppState,
    storage::MediaKind,
};

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    error!("Error parsing multipart: {}", e);
    AppError::Multipart(format!("Failed to parse multipart form: {}", e))
}

/// Upload one file (multipart field `file`).
pub async fn upload_single(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<FileMetadata>>, AppError> {
    let mut part: Option<UploadPart> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        if name != "file" {
            continue;
        }

        let original_name = field.file_name().unwrap_or("upload").to_string();
        let mimetype = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field.bytes().await.map_err(multipart_error)?;

        part = Some(UploadPart {
            field: name,
            original_name,
            mimetype,
            data,
        });
    }

    let part =
        part.ok_or_else(|| AppError::Validation("Please choose a file to upload".to_string()))?;
    let metadata = state.media.upload_single(part).await?;

    Ok(Json(ApiResponse::ok(metadata, "File uploaded successfully")))
}

/// Upload a batch of files (multipart field `files`, optional `timestamp`
/// text field controlling where video thumbnails are captured).
pub async fn upload_multiple(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<Vec<FileMetadata>>>, AppError> {
    let mut parts = Vec::new();
    let mut timestamp: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "files" => {
                let original_name = field.file_name().unwrap_or("upload").to_string();
                let mimetype = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                parts.push(UploadPart {
                    field: name,
                    original_name,
                    mimetype,
                    data,
                });
            }
            "timestamp" => {
                if let Ok(value) = field.text().await {
                    if !value.is_empty() {
                        timestamp = Some(value);
                    }
                }
            }
            _ => {}
        }
    }

    let (files, frames_extracted) = state.media.upload_multiple(parts, timestamp).await?;
    let message = format!(
        "Uploaded {} files ({} video frames extracted)",
        files.len(),
        frames_extracted
    );

    Ok(Json(ApiResponse::ok(files, message)))
}

#[derive(Debug, Deserialize)]
pub struct TypeQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Delete one stored file; the `type` query parameter picks the partition.
pub async fn delete_media_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Query(query): Query<TypeQuery>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let kind = MediaKind::from_type_param(query.kind.as_deref().unwrap_or(""))?;
    state.media.delete_file(kind, &filename).await?;

    Ok(Json(ApiResponse::message("File deleted successfully")))
}

/// Reconciliation listing of stored files against review ownership.
pub async fn get_files(
    State(state): State<AppState>,
    Query(query): Query<TypeQuery>,
) -> Result<Json<ApiResponse<Vec<FileListEntry>>>, AppError> {
    let kind = query
        .kind
        .as_deref()
        .map(MediaKind::from_type_param)
        .transpose()?;

    let refs = state.reviews.media_refs().await?;
    let files = state.media.list_files(kind, &refs).await?;

    Ok(Json(ApiResponse::ok(files, "Files listed successfully")))
}

/// Paginated review listing in display order.
pub async fn get_reviews(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<Json<ApiResponse<ReviewPage>>, AppError> {
    let (page_index, page_size) = params.resolve()?;
    let (reviews, total) = state.reviews.list(page_index, page_size).await?;

    let page = ReviewPage {
        reviews,
        pagination: Pagination::new(page_index, page_size, total),
    };
    Ok(Json(ApiResponse::ok(page, "Reviews listed successfully")))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub rate: Option<i32>,
    pub verified_purchase: Option<bool>,
    pub would_recommend: Option<bool>,
    #[serde(rename = "pageIndex")]
    pub page_index: Option<i64>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SearchPage {
    pub reviews: Vec<Review>,
    pub pagination: Pagination,
    pub filters: SearchFilters,
}

pub async fn search_reviews(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiResponse<SearchPage>>, AppError> {
    let (page_index, page_size) = PageParams {
        page_index: query.page_index,
        page_size: query.page_size,
    }
    .resolve()?;

    let filters = SearchFilters {
        q: query.q,
        rate: query.rate,
        verified_purchase: query.verified_purchase,
        would_recommend: query.would_recommend,
    };
    let (reviews, total) = state.reviews.search(&filters, page_index, page_size).await?;

    let page = SearchPage {
        reviews,
        pagination: Pagination::new(page_index, page_size, total),
        filters,
    };
    Ok(Json(ApiResponse::ok(page, "Search completed successfully")))
}

/// Reviews flagged as outstanding.
pub async fn outstanding_reviews(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<Json<ApiResponse<ReviewPage>>, AppError> {
    let (page_index, page_size) = params.resolve()?;
    let (reviews, total) = state.reviews.outstanding(page_index, page_size).await?;

    let page = ReviewPage {
        reviews,
        pagination: Pagination::new(page_index, page_size, total),
    };
    Ok(Json(ApiResponse::ok(
        page,
        "Outstanding reviews listed successfully",
    )))
}

#[derive(Debug, Serialize)]
pub struct UserPage {
    pub reviews: Vec<Review>,
    pub pagination: Pagination,
    pub user: String,
}

pub async fn reviews_by_user(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Json<ApiResponse<UserPage>>, AppError> {
    let (page_index, page_size) = params.resolve()?;
    let (reviews, total) = state.reviews.by_user(&user, page_index, page_size).await?;

    let page = UserPage {
        reviews,
        pagination: Pagination::new(page_index, page_size, total),
        user,
    };
    Ok(Json(ApiResponse::ok(page, "User reviews listed successfully")))
}

pub async fn get_review(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<Review>>, AppError> {
    let review = state.reviews.get(id).await?;
    Ok(Json(ApiResponse::ok(review, "Review fetched successfully")))
}

pub async fn create_review(
    State(state): State<AppState>,
    Json(fields): Json<CreateReview>,
) -> Result<(StatusCode, Json<ApiResponse<Review>>), AppError> {
    let review = state.reviews.create(fields).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(review, "Review created successfully")),
    ))
}

pub async fn update_review(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(fields): Json<UpdateReview>,
) -> Result<Json<ApiResponse<Review>>, AppError> {
    let review = state.reviews.update(id, fields).await?;
    Ok(Json(ApiResponse::ok(review, "Review updated successfully")))
}

/// Delete a review and best-effort clean up its referenced media files.
pub async fn delete_review(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    state.reviews.delete(id, &state.media).await?;
    Ok(Json(ApiResponse::message("Review deleted successfully")))
}

#[derive(Debug, Deserialize)]
pub struct LikeBody {
    pub action: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Likes {
    pub likes: i32,
}

/// Increment or decrement a review's like count (clamped at zero).
pub async fn like_review(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(body): Json<LikeBody>,
) -> Result<Json<ApiResponse<Likes>>, AppError> {
    let delta = match body.action.as_deref() {
        Some("increment") => 1,
        Some("decrement") => -1,
        _ => {
            return Err(AppError::Validation(
                "action must be 'increment' or 'decrement'".to_string(),
            ));
        }
    };

    let likes = state.reviews.adjust_likes(id, delta).await?;
    Ok(Json(ApiResponse::ok(
        Likes { likes },
        "Likes updated successfully",
    )))
}

/// Liveness probe.
pub async fn health_check() -> Json<ApiResponse<()>> {
    Json(ApiResponse::message("Connection successful"))
}
