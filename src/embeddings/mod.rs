// Embeddings module
// Text encoders producing fixed-dimension vectors: Ollama models and a local hashing fallback

pub mod hashing;
pub mod ollama;

use async_trait::async_trait;
use thiserror::Error;

pub use hashing::HashingEncoder;
pub use ollama::{LoadedModel, OllamaClient, OllamaEncoder};

#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("Encoder unavailable: {0}")]
    Unavailable(String),

    #[error("Encoding failed: {0}")]
    Failed(String),

    #[error("Encoder returned {actual} vectors for {expected} texts")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Vector {position} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        position: usize,
        expected: usize,
        actual: usize,
    },
}

/// Maps texts to dense vectors.
///
/// Output has one vector per input text, in input order, all of the same
/// dimension. The same model and input always give the same output.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Name of the model backing this encoder, as shown in reports
    fn model_name(&self) -> &str;

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError>;
}

/// Check an encoder batch and return its shared dimension.
///
/// With `expected_dimension` unset, the first vector fixes the dimension.
#[inline]
pub fn validate_batch(
    expected_count: usize,
    expected_dimension: Option<usize>,
    vectors: &[Vec<f32>],
) -> Result<Option<usize>, EncoderError> {
    if vectors.len() != expected_count {
        return Err(EncoderError::CountMismatch {
            expected: expected_count,
            actual: vectors.len(),
        });
    }

    let Some(dimension) = expected_dimension.or_else(|| vectors.first().map(Vec::len)) else {
        return Ok(None);
    };

    if let Some((position, vector)) = vectors
        .iter()
        .enumerate()
        .find(|(_, vector)| vector.len() != dimension)
    {
        return Err(EncoderError::DimensionMismatch {
            position,
            expected: dimension,
            actual: vector.len(),
        });
    }

    Ok(Some(dimension))
}
