// Text generation
// Optional language-model collaborator used for summaries, cleaned data and synthetic rows

pub mod prompts;


use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::embeddings::OllamaClient;

pub use prompts::PromptTemplate;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("Text generation unavailable: {0}")]
    Unavailable(String),
}

/// A completed generation: the full reply plus its first fenced code block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub data: Option<String>,
}

impl Generation {
    #[inline]
    pub fn from_reply(text: String) -> Self {
        let data = first_code_block(&text);
        Self { text, data }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, max_tokens: u32)
    -> Result<Generation, CollaboratorError>;
}

/// Body of the first complete ``` fenced block, without the language tag
#[inline]
pub fn first_code_block(text: &str) -> Option<String> {
    let mut parts = text.split("```");
    parts.next()?;
    let block = parts.next()?;
    // Unterminated fence
    parts.next()?;

    let body = block.split_once('\n').map_or("", |(_, body)| body).trim();
    (!body.is_empty()).then(|| body.to_string())
}

/// Generator backed by an Ollama completion model
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: OllamaClient,
}

impl OllamaGenerator {
    #[inline]
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<Generation, CollaboratorError> {
        let client = self.client.clone();
        let prompt = prompt.to_string();

        let reply =
            tokio::task::spawn_blocking(move || client.generate_completion(&prompt, max_tokens))
                .await
                .map_err(|e| CollaboratorError::Unavailable(format!("generation task failed: {e}")))?
                .map_err(|e| {
                    warn!("Text generation with {} failed: {:#}", self.client.model(), e);
                    CollaboratorError::Unavailable(format!("{e:#}"))
                })?;

        debug!("Received {} characters from {}", reply.len(), self.client.model());
        Ok(Generation::from_reply(reply))
    }
}

/// Generator used when text generation is switched off in the configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        _max_tokens: u32,
    ) -> Result<Generation, CollaboratorError> {
        Err(CollaboratorError::Unavailable(
            "text generation is disabled in the configuration".to_string(),
        ))
    }
}
