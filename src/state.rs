use crate::media::MediaService;
use crate::reviews::ReviewRepository;

/// Central application state shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Media upload/extraction orchestration over the filesystem store.
    pub media: MediaService,

    /// CRUD and query layer over the `reviews` table.
    pub reviews: ReviewRepository,
}
