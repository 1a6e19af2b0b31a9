//! Model provider abstraction.
//!
//! The [`ModelProvider`] trait decouples task driving from the actual model
//! backend (currently Ollama). Tests use scripted providers that replay
//! predetermined fragments without network access.

use anyhow::Result;
use futures::stream::BoxStream;

/// Ordered, finite, non-restartable sequence of response fragments.
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Parameters for one model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    pub model: String,
    pub prompt: String,
    pub system: Option<String>,
    /// Extra attempts allowed when the call fails before any fragment arrives.
    pub max_retries: u32,
}

/// Abstraction over streaming model backends.
pub trait ModelProvider {
    /// Start a call. Transport failures surface as `Err` items of the stream.
    fn stream(&self, request: &ModelRequest) -> FragmentStream;
}
