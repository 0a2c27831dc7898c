use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::AppError;

/// Seam for the external single-frame capture tool, so orchestration code
/// can be exercised against a scripted fake.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Capture one still frame of `video` at `timestamp` (HH:MM:SS) and
    /// write it to `output`.
    async fn extract_frame(
        &self,
        video: &Path,
        output: &Path,
        timestamp: &str,
    ) -> Result<(), AppError>;
}

/// Frame extraction via the ffmpeg binary.
pub struct FfmpegExtractor {
    program: String,
}

impl FfmpegExtractor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl FrameExtractor for FfmpegExtractor {
    async fn extract_frame(
        &self,
        video: &Path,
        output: &Path,
        timestamp: &str,
    ) -> Result<(), AppError> {
        debug!("Extracting frame at {} from {:?}", timestamp, video);

        let result = Command::new(&self.program)
            .arg("-y")
            .arg("-i")
            .arg(video)
            .arg("-ss")
            .arg(timestamp)
            .arg("-vframes")
            .arg("1")
            .arg("-loglevel")
            .arg("error")
            .arg(output)
            .output()
            .await;

        let run = match result {
            Ok(out) => out,
            // Spawn failure with NotFound means the binary itself is absent,
            // which callers surface as an actionable configuration problem.
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AppError::ToolUnavailable(format!(
                    "could not run {:?}: {}",
                    self.program, e
                )));
            }
            Err(e) => return Err(AppError::ExtractionFailed(e.to_string())),
        };

        if !run.status.success() {
            let stderr = String::from_utf8_lossy(&run.stderr);
            return Err(AppError::ExtractionFailed(stderr.trim().to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_reports_tool_unavailable() {
        let extractor = FfmpegExtractor::new("definitely-not-an-installed-binary");
        let err = extractor
            .extract_frame(
                Path::new("in.mp4"),
                Path::new("out.jpg"),
                "00:00:01",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ToolUnavailable(_)));
    }
}
