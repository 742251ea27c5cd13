use thiserror::Error;

pub type Result<T> = std::result::Result<T, DataSanityError>;

#[derive(Error, Debug)]
pub enum DataSanityError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] dataset::DatasetError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] embeddings::EncoderError),

    #[error("Index error: {0}")]
    Index(#[from] index::IndexError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] metadata::MetadataError),

    #[error("Artifact error: {0}")]
    Artifacts(#[from] artifacts::ArtifactError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod actions;
pub mod artifacts;
pub mod commands;
pub mod config;
pub mod dataset;
pub mod embeddings;
pub mod extract;
pub mod generation;
pub mod index;
pub mod metadata;
pub mod pipeline;
