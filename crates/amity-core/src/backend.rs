//! Provider port for the generative coaching backend.

use std::pin::Pin;

use futures_util::Stream;

use amity_types::backend::BackendRequest;
use amity_types::error::{DispatchError, TransportError};

/// Raw chunks off the wire. Chunk boundaries carry no meaning; the
/// [`crate::stream::StreamReconstructor`] re-frames them into event lines.
pub type ChunkStream =
    Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send + 'static>>;

/// A backend's answer to one dispatched prompt.
pub enum BackendResponse {
    /// The whole reply in one blob.
    Complete(String),
    /// An incremental event-line stream.
    Streaming(ChunkStream),
}

impl std::fmt::Debug for BackendResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendResponse::Complete(text) => {
                f.debug_tuple("Complete").field(&text.len()).finish()
            }
            BackendResponse::Streaming(_) => f.debug_tuple("Streaming").field(&"<stream>").finish(),
        }
    }
}

/// Remote generative-language service.
///
/// Implementations live in `amity-infra` (`HttpCoachBackend`); tests use
/// scripted fakes. Uses native async fn in traits (RPITIT).
pub trait CoachBackend: Send + Sync {
    fn dispatch(
        &self,
        request: &BackendRequest,
    ) -> impl Future<Output = Result<BackendResponse, DispatchError>> + Send;
}
