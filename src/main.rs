mod config;
mod database;
mod error;
mod extractor;
mod handlers;
mod media;
mod models;
mod reviews;
mod state;
mod storage;
mod utils;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;

use crate::{
    config::Config,
    database::init_db,
    extractor::FfmpegExtractor,
    handlers::{
        create_review, delete_media_file, delete_review, get_files, get_review, get_reviews,
        health_check, like_review, outstanding_reviews, reviews_by_user, search_reviews,
        update_review, upload_multiple, upload_single,
    },
    media::{MediaConfig, MediaService},
    reviews::ReviewRepository,
    state::AppState,
    storage::MediaStore,
};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env().expect("Failed to load configuration");

    let pool = init_db(&config.database_url)
        .await
        .expect("Failed to connect to db");

    let store = MediaStore::new(&config.upload_dir)
        .await
        .expect("Failed to create upload directories");
    let extractor = Arc::new(FfmpegExtractor::new(&config.ffmpeg_path));
    let media = MediaService::new(store, extractor, MediaConfig::from(&config));
    let reviews = ReviewRepository::new(pool);

    // The whole multipart body for a batch upload has to fit under the limit.
    let body_limit = (config.max_file_size * config.max_files) as usize + 1024 * 1024;

    let app_state = AppState { media, reviews };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let media_routes = Router::new()
        .route("/upload/single", post(upload_single))
        .route("/upload/multiple", post(upload_multiple))
        .route("/files", get(get_files))
        .route("/files/{filename}", delete(delete_media_file));

    let review_routes = Router::new()
        .route("/", get(get_reviews).post(create_review))
        .route("/search", get(search_reviews))
        .route("/outstanding", get(outstanding_reviews))
        .route("/user/{user}", get(reviews_by_user))
        .route("/{id}", get(get_review))
        .route("/{id}", put(update_review))
        .route("/{id}", delete(delete_review))
        .route("/{id}/like", post(like_review));

    let app = Router::new()
        .route("/", get(health_check))
        .nest("/api/media", media_routes)
        .nest("/api/reviews", review_routes)
        .nest_service("/uploads", ServeDir::new(&config.upload_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
