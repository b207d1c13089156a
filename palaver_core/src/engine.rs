//! The seam between the session engine and whatever produces text.

use futures_util::stream::BoxStream;

use crate::GenerationParams;

/// Lazy, finite, non-restartable sequence of generated text fragments.
///
/// The end of the stream is the end-of-generation signal. An `Err` item
/// aborts the generation; nothing after it is read.
pub type FragmentStream = BoxStream<'static, anyhow::Result<String>>;

/// A rendered prompt plus the parameters in force when it was rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub params: GenerationParams,
}

/// A text-generation backend.
///
/// Implementations are assumed to be non-reentrant: callers serialize
/// `generate` calls and only start the next one after the previous stream
/// has been dropped.
pub trait InferenceEngine: Send + Sync {
    /// Begin generating a continuation of `request.prompt`.
    fn generate(&self, request: GenerationRequest) -> FragmentStream;

    /// Human-readable backend name for logs.
    fn name(&self) -> &str;
}
