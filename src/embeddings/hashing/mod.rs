// Hashing encoder
// Offline, model-free embeddings via signed feature hashing of word tokens


use async_trait::async_trait;

use super::{Encoder, EncoderError};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Deterministic bag-of-words encoder.
///
/// Each lower-cased alphanumeric token is hashed with FNV-1a into one of
/// `dimension` buckets; the top hash bit picks the sign. Vectors are
/// L2-normalized. Text without tokens maps to the zero vector.
#[derive(Debug, Clone)]
pub struct HashingEncoder {
    dimension: usize,
    name: String,
}

impl HashingEncoder {
    #[inline]
    pub fn new(dimension: usize) -> Result<Self, EncoderError> {
        if dimension == 0 {
            return Err(EncoderError::Unavailable(
                "hashing encoder dimension must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            dimension,
            name: format!("feature-hashing-{dimension}"),
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let hash = fnv1a(token.to_lowercase().as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }

        vector
    }
}

#[async_trait]
impl Encoder for HashingEncoder {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}
