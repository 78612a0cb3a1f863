use facerec_core::EuclideanMatcher;
use facerec_store::FaceStore;

use crate::engine::EngineHandle;

/// Shared application state, handed to every handler by axum.
#[derive(Clone)]
pub struct AppState {
    /// Embedding extraction engine.
    pub engine: EngineHandle,
    /// Face database; handlers open one session per request.
    pub store: FaceStore,
    pub matcher: EuclideanMatcher,
}

impl AppState {
    pub fn new(engine: EngineHandle, store: FaceStore, matcher: EuclideanMatcher) -> Self {
        Self {
            engine,
            store,
            matcher,
        }
    }
}
