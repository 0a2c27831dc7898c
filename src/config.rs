use std::env;

use dotenvy::dotenv;
use validator::Validate;

/// 20 MiB, the per-file upload ceiling.
const DEFAULT_MAX_FILE_SIZE: u64 = 20 * 1024 * 1024;

#[derive(Debug, Clone, Validate)]
pub struct Config {
    pub database_url: String,
    /// Base directory for stored uploads (`<upload_dir>/images`,
    /// `<upload_dir>/videos`), also served statically under `/uploads`.
    pub upload_dir: String,
    #[validate(range(min = 1, max = 104857600))] // Max 100MB
    pub max_file_size: u64,
    #[validate(range(min = 1, max = 50))]
    pub max_files: u64,
    /// When false, video uploads are stored without deriving a thumbnail.
    pub extract_frames: bool,
    pub ffmpeg_path: String,
    pub default_frame_timestamp: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, env::VarError> {
        // Load environment variables from `.env` file (if it exists)
        dotenv().ok();

        let config = Config {
            database_url: env::var("DATABASE_URL")?,
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string()),
            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_FILE_SIZE),
            max_files: env::var("MAX_FILES_PER_UPLOAD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            extract_frames: env::var("EXTRACT_FRAMES")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            default_frame_timestamp: env::var("FRAME_TIMESTAMP")
                .unwrap_or_else(|_| "00:00:01".to_string()),
        };

        // Validate configuration values (e.g. file size range)
        config.validate().expect("Invalid Configuration");
        Ok(config)
    }
}
