use std::sync::Arc;

use crate::services::tracker::TrackingService;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<TrackingService>,
}

impl AppState {
    pub fn new(tracker: TrackingService) -> Self {
        Self {
            tracker: Arc::new(tracker),
        }
    }
}
