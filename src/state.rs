use std::sync::Arc;

use crate::media::MediaStorage;
use crate::store::TheatreStore;

/// Shared by every handler through an `Extension` layer.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TheatreStore>,
    pub media: MediaStorage,
}

impl AppState {
    pub fn new(store: Arc<dyn TheatreStore>, media: MediaStorage) -> Self {
        AppState { store, media }
    }
}
