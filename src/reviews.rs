use sqlx::types::Json as SqlJson;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{info, warn};

use crate::error::AppError;
use crate::media::{FileRefs, MediaService};
use crate::models::{CreateReview, Review, ReviewMediaRefs, UpdateReview};
use crate::storage::MediaKind;

const REVIEW_ORDER: &str = " ORDER BY order_sort ASC NULLS LAST, created DESC";

/// Search filters for the review listing.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct SearchFilters {
    pub q: Option<String>,
    pub rate: Option<i32>,
    pub verified_purchase: Option<bool>,
    pub would_recommend: Option<bool>,
}

/// CRUD and query layer over the `reviews` table.
#[derive(Clone)]
pub struct ReviewRepository {
    pool: PgPool,
}

fn validate_bounds(rate: Option<i32>, order_sort: Option<i32>) -> Result<(), AppError> {
    if let Some(rate) = rate {
        if !(1..=5).contains(&rate) {
            return Err(AppError::Validation(
                "rate must be between 1 and 5".to_string(),
            ));
        }
    }
    if let Some(order_sort) = order_sort {
        if order_sort < 0 {
            return Err(AppError::Validation(
                "orderSort must be >= 0".to_string(),
            ));
        }
    }
    Ok(())
}

impl ReviewRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Reviews ordered by manual sort position (nulls last), newest first
    /// within a position, plus the total row count.
    pub async fn list(
        &self,
        page_index: i64,
        page_size: i64,
    ) -> Result<(Vec<Review>, i64), AppError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews")
            .fetch_one(&self.pool)
            .await?;

        let sql = format!("SELECT * FROM reviews{REVIEW_ORDER} LIMIT $1 OFFSET $2");
        let reviews = sqlx::query_as::<_, Review>(&sql)
            .bind(page_size)
            .bind(page_index * page_size)
            .fetch_all(&self.pool)
            .await?;

        Ok((reviews, total))
    }

    pub async fn get(&self, id: i32) -> Result<Review, AppError> {
        sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Review not found".to_string()))
    }

    pub async fn create(&self, fields: CreateReview) -> Result<Review, AppError> {
        let title = fields
            .title
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AppError::Validation("title and user are required".to_string()))?;
        let user = fields
            .user
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| AppError::Validation("title and user are required".to_string()))?;
        validate_bounds(fields.rate, fields.order_sort)?;

        let review = sqlx::query_as::<_, Review>(
            r#"
            INSERT INTO reviews
                (title, description, rate, verified_purchase, would_recommend,
                 images, videos, "user", likes, order_sort, outstanding)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(&title)
        .bind(fields.description)
        .bind(fields.rate.unwrap_or(1))
        .bind(fields.verified_purchase.unwrap_or(false))
        .bind(fields.would_recommend.unwrap_or(false))
        .bind(fields.images.map(SqlJson))
        .bind(fields.videos.map(SqlJson))
        .bind(&user)
        .bind(fields.likes.unwrap_or(0).max(0))
        .bind(fields.order_sort)
        .bind(fields.outstanding.unwrap_or(false))
        .fetch_one(&self.pool)
        .await?;

        info!("Created review {} by {}", review.id, review.user);
        Ok(review)
    }

    /// Partial update: each supplied field replaces the stored value,
    /// absent fields keep it (COALESCE).
    pub async fn update(&self, id: i32, fields: UpdateReview) -> Result<Review, AppError> {
        validate_bounds(fields.rate, fields.order_sort)?;

        sqlx::query_as::<_, Review>(
            r#"
            UPDATE reviews SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                rate = COALESCE($4, rate),
                likes = COALESCE($5, likes),
                verified_purchase = COALESCE($6, verified_purchase),
                would_recommend = COALESCE($7, would_recommend),
                images = COALESCE($8, images),
                videos = COALESCE($9, videos),
                order_sort = COALESCE($10, order_sort),
                outstanding = COALESCE($11, outstanding)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(fields.title)
        .bind(fields.description)
        .bind(fields.rate)
        .bind(fields.likes)
        .bind(fields.verified_purchase)
        .bind(fields.would_recommend)
        .bind(fields.images.map(SqlJson))
        .bind(fields.videos.map(SqlJson))
        .bind(fields.order_sort)
        .bind(fields.outstanding)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Review not found".to_string()))
    }

    /// Delete a review, first cleaning up the files its media columns
    /// reference. Cleanup is best-effort; failures are logged and the row
    /// is removed regardless.
    pub async fn delete(&self, id: i32, media: &MediaService) -> Result<(), AppError> {
        let review = self.get(id).await?;

        let image_refs = review.images.map(|j| FileRefs::Names(j.0));
        let video_refs = review.videos.map(|j| FileRefs::Videos(j.0));

        for outcome in media.delete_files(image_refs, MediaKind::Images).await {
            if !outcome.ok {
                warn!("Review {}: image {} not cleaned up", id, outcome.filename);
            }
        }
        for outcome in media.delete_files(video_refs, MediaKind::Videos).await {
            if !outcome.ok {
                warn!("Review {}: video {} not cleaned up", id, outcome.filename);
            }
        }

        sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        info!("Deleted review {}", id);
        Ok(())
    }

    /// Filtered listing: title/description substring match plus equality
    /// filters, same ordering and pagination as `list`.
    pub async fn search(
        &self,
        filters: &SearchFilters,
        page_index: i64,
        page_size: i64,
    ) -> Result<(Vec<Review>, i64), AppError> {
        fn push_filters<'a>(qb: &mut QueryBuilder<'a, Postgres>, filters: &'a SearchFilters) {
            if let Some(q) = &filters.q {
                qb.push(" AND (title ILIKE ")
                    .push_bind(format!("%{q}%"))
                    .push(" OR description ILIKE ")
                    .push_bind(format!("%{q}%"))
                    .push(")");
            }
            if let Some(rate) = filters.rate {
                qb.push(" AND rate = ").push_bind(rate);
            }
            if let Some(verified) = filters.verified_purchase {
                qb.push(" AND verified_purchase = ").push_bind(verified);
            }
            if let Some(recommend) = filters.would_recommend {
                qb.push(" AND would_recommend = ").push_bind(recommend);
            }
        }

        let mut count_query = QueryBuilder::new("SELECT COUNT(*) FROM reviews WHERE 1=1");
        push_filters(&mut count_query, filters);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut query = QueryBuilder::new("SELECT * FROM reviews WHERE 1=1");
        push_filters(&mut query, filters);
        query
            .push(REVIEW_ORDER)
            .push(" LIMIT ")
            .push_bind(page_size)
            .push(" OFFSET ")
            .push_bind(page_index * page_size);
        let reviews = query
            .build_query_as::<Review>()
            .fetch_all(&self.pool)
            .await?;

        Ok((reviews, total))
    }

    /// A user's reviews, newest first.
    pub async fn by_user(
        &self,
        user: &str,
        page_index: i64,
        page_size: i64,
    ) -> Result<(Vec<Review>, i64), AppError> {
        let total: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM reviews WHERE "user" = $1"#)
            .bind(user)
            .fetch_one(&self.pool)
            .await?;

        let reviews = sqlx::query_as::<_, Review>(
            r#"SELECT * FROM reviews WHERE "user" = $1
               ORDER BY created DESC, order_sort ASC LIMIT $2 OFFSET $3"#,
        )
        .bind(user)
        .bind(page_size)
        .bind(page_index * page_size)
        .fetch_all(&self.pool)
        .await?;

        Ok((reviews, total))
    }

    /// Reviews flagged as outstanding, in display order.
    pub async fn outstanding(
        &self,
        page_index: i64,
        page_size: i64,
    ) -> Result<(Vec<Review>, i64), AppError> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE outstanding = TRUE")
                .fetch_one(&self.pool)
                .await?;

        let sql = format!(
            "SELECT * FROM reviews WHERE outstanding = TRUE{REVIEW_ORDER} LIMIT $1 OFFSET $2"
        );
        let reviews = sqlx::query_as::<_, Review>(&sql)
            .bind(page_size)
            .bind(page_index * page_size)
            .fetch_all(&self.pool)
            .await?;

        Ok((reviews, total))
    }

    /// Apply a like delta, clamped so the count never goes negative.
    /// Returns the new count.
    pub async fn adjust_likes(&self, id: i32, delta: i32) -> Result<i32, AppError> {
        let likes: i32 = sqlx::query_scalar("SELECT likes FROM reviews WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Review not found".to_string()))?;

        let new_likes = (likes + delta).max(0);
        sqlx::query("UPDATE reviews SET likes = $2 WHERE id = $1")
            .bind(id)
            .bind(new_likes)
            .execute(&self.pool)
            .await?;

        Ok(new_likes)
    }

    /// Every review's media columns, for filesystem reconciliation.
    pub async fn media_refs(&self) -> Result<Vec<ReviewMediaRefs>, AppError> {
        Ok(
            sqlx::query_as::<_, ReviewMediaRefs>("SELECT id, images, videos FROM reviews")
                .fetch_all(&self.pool)
                .await?,
        )
    }
}
