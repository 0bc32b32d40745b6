//! Content loading: fetch one tile's payload and decode it.
//!
//! A load is a single concurrency unit. It honours a cooperative
//! [`CancellationToken`] at three points: before the fetch starts, while the
//! fetch is in progress, and before decoding starts. A cancelled load never
//! yields partial content.
//!
//! # Example
//!
//! ```ignore
//! use lodstream::loader::{ContentLoader, ContentRequest, DefaultFetcher, GeometryLoader};
//! use tokio_util::sync::CancellationToken;
//!
//! let loader = GeometryLoader::new(Arc::new(DefaultFetcher::new()?));
//! let content = loader.load(&request, CancellationToken::new()).await?;
//! println!("{} vertices", content.vertex_count());
//! ```

mod decode;
mod error;
mod fetch;

pub use decode::{decode_geometry, encode_geometry, DecodedContent};
pub use error::{DecodeError, FetchError, LoadError, LoadErrorKind};
pub use fetch::{
    BoxFuture, DefaultFetcher, Fetcher, FileFetcher, HttpFetcher, MemoryFetcher, MemoryResponse,
};

use crate::tileset::NodeId;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Everything needed to load one tile's content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentRequest {
    pub node_id: NodeId,
    pub url: String,
    pub token: Option<String>,
}

/// Loads and decodes tile content.
///
/// Implementations must be safe to call concurrently; the scheduler runs up
/// to `max_concurrent_loads` loads at once.
pub trait ContentLoader: Send + Sync + 'static {
    fn load<'a>(
        &'a self,
        request: &'a ContentRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<DecodedContent, LoadError>>;
}

/// The standard loader: fetch through a [`Fetcher`], decode the I3S geometry
/// layout on the blocking thread pool.
pub struct GeometryLoader<F: ?Sized> {
    fetcher: Arc<F>,
}

impl<F: Fetcher + ?Sized + 'static> GeometryLoader<F> {
    pub fn new(fetcher: Arc<F>) -> Self {
        Self { fetcher }
    }
}

impl<F: Fetcher + ?Sized + 'static> ContentLoader for GeometryLoader<F> {
    fn load<'a>(
        &'a self,
        request: &'a ContentRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<DecodedContent, LoadError>> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(LoadError::Cancelled);
            }

            let bytes = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LoadError::Cancelled),
                result = self.fetcher.fetch(&request.url, request.token.as_deref()) => result?,
            };

            if cancel.is_cancelled() {
                return Err(LoadError::Cancelled);
            }

            trace!(node = %request.node_id, bytes = bytes.len(), "Decoding tile payload");
            let decoded = tokio::task::spawn_blocking(move || decode_geometry(&bytes))
                .await
                .map_err(|e| LoadError::Parse(DecodeError::TaskFailed(e.to_string())))??;
            Ok(decoded)
        })
    }
}
