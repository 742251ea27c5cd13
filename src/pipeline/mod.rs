// Embedding pipeline
// Extract, encode, index and persist a dataset, always ending in a report

mod report;


use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::artifacts::{ArtifactError, ArtifactStore};
use crate::dataset::Dataset;
use crate::embeddings::{Encoder, EncoderError};
use crate::extract::{ExtractError, extract_text_records};
use crate::generation::{CollaboratorError, Generation, PromptTemplate, TextGenerator};
use crate::index::{IndexError, VectorIndex};
use crate::metadata::{MetadataError, MetadataStore};

pub use report::{Annotation, EmbeddingSummary, FailureInfo, PipelineReport, RunStatus};

const DEFAULT_SUMMARY_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_SUMMARY_MAX_TOKENS: u32 = 512;
/// Rows shown to the collaborator when asking for a summary
const SUMMARY_SAMPLE_ROWS: usize = 5;
const SAMPLE_VECTORS: usize = 3;
const SAMPLE_COMPONENTS: usize = 5;

/// Pipeline stages, in the only order they may be entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Extracting,
    Encoding,
    Indexing,
    Persisting,
    Reported,
    Aborted,
}

impl Stage {
    /// The stage that follows this one on success
    #[inline]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::Extracting),
            Self::Extracting => Some(Self::Encoding),
            Self::Encoding => Some(Self::Indexing),
            Self::Indexing => Some(Self::Persisting),
            Self::Persisting => Some(Self::Reported),
            Self::Reported | Self::Aborted => None,
        }
    }

    /// Whether a run can fail while in this stage
    #[inline]
    pub fn can_abort(self) -> bool {
        matches!(
            self,
            Self::Extracting | Self::Encoding | Self::Indexing | Self::Persisting
        )
    }
}

impl fmt::Display for Stage {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Extracting => "extracting",
            Self::Encoding => "encoding",
            Self::Indexing => "indexing",
            Self::Persisting => "persisting",
            Self::Reported => "reported",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct StageTracker {
    stage: Stage,
}

impl StageTracker {
    fn new() -> Self {
        Self { stage: Stage::Idle }
    }

    fn advance(&mut self, next: Stage) {
        debug_assert_eq!(
            self.stage.next(),
            Some(next),
            "illegal transition {} -> {}",
            self.stage,
            next
        );
        debug!("Pipeline stage {} -> {}", self.stage, next);
        self.stage = next;
    }

    /// Move to `Aborted`, returning the stage the failure happened in
    fn abort(&mut self) -> Stage {
        let failed = self.stage;
        debug_assert!(failed.can_abort(), "cannot abort from {failed}");
        warn!("Pipeline aborted during {}", failed);
        self.stage = Stage::Aborted;
        failed
    }
}

/// Failure categories carried in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    NoTextualData,
    EncoderUnavailable,
    EncodingFailed,
    EmptyIndex,
    DimensionMismatch,
    IndexMetadataMismatch,
    SlotNotFound,
    PersistenceFailure,
    CollaboratorUnavailable,
}

impl fmt::Display for FailureKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Artifacts(#[from] ArtifactError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("Persistence task failed: {0}")]
    Task(String),
}

impl PipelineError {
    #[inline]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Extract(ExtractError::NoTextualData) => FailureKind::NoTextualData,
            Self::Encoder(e) => match e {
                EncoderError::Unavailable(_) => FailureKind::EncoderUnavailable,
                EncoderError::DimensionMismatch { .. } => FailureKind::DimensionMismatch,
                EncoderError::Failed(_) | EncoderError::CountMismatch { .. } => {
                    FailureKind::EncodingFailed
                }
            },
            Self::Index(e) => index_failure_kind(e),
            Self::Metadata(e) => metadata_failure_kind(e),
            Self::Artifacts(e) => match e {
                ArtifactError::Index(e) => index_failure_kind(e),
                ArtifactError::Metadata(e) => metadata_failure_kind(e),
                ArtifactError::CountMismatch { .. } => FailureKind::IndexMetadataMismatch,
                ArtifactError::Io { .. }
                | ArtifactError::NoArtifacts(_)
                | ArtifactError::InvalidPointer(_)
                | ArtifactError::LockTimeout(_) => FailureKind::PersistenceFailure,
            },
            Self::Collaborator(_) => FailureKind::CollaboratorUnavailable,
            Self::Task(_) => FailureKind::PersistenceFailure,
        }
    }
}

fn index_failure_kind(error: &IndexError) -> FailureKind {
    match error {
        IndexError::EmptyIndex => FailureKind::EmptyIndex,
        IndexError::DimensionMismatch { .. } | IndexError::QueryDimensionMismatch { .. } => {
            FailureKind::DimensionMismatch
        }
        IndexError::InvalidDimension | IndexError::InvalidValue { .. } => {
            FailureKind::EncodingFailed
        }
        IndexError::Persistence { .. } | IndexError::Corrupt { .. } => {
            FailureKind::PersistenceFailure
        }
    }
}

fn metadata_failure_kind(error: &MetadataError) -> FailureKind {
    match error {
        MetadataError::IndexMetadataMismatch { .. } => FailureKind::IndexMetadataMismatch,
        MetadataError::SlotNotFound { .. } => FailureKind::SlotNotFound,
        MetadataError::Persistence { .. } | MetadataError::Corrupt { .. } => {
            FailureKind::PersistenceFailure
        }
    }
}

type SummaryHandle = JoinHandle<Result<Generation, CollaboratorError>>;

/// Drives one dataset through extraction, encoding, indexing and persistence.
///
/// Artifacts are only replaced when every stage succeeds; the collaborator
/// summary never decides the outcome of a run.
pub struct EmbeddingPipeline {
    encoder: Arc<dyn Encoder>,
    generator: Arc<dyn TextGenerator>,
    store: ArtifactStore,
    summary_timeout: Duration,
    summary_max_tokens: u32,
}

impl EmbeddingPipeline {
    #[inline]
    pub fn new(
        encoder: Arc<dyn Encoder>,
        generator: Arc<dyn TextGenerator>,
        store: ArtifactStore,
    ) -> Self {
        Self {
            encoder,
            generator,
            store,
            summary_timeout: DEFAULT_SUMMARY_TIMEOUT,
            summary_max_tokens: DEFAULT_SUMMARY_MAX_TOKENS,
        }
    }

    #[inline]
    pub fn with_summary_timeout(mut self, timeout: Duration) -> Self {
        self.summary_timeout = timeout;
        self
    }

    #[inline]
    pub fn with_summary_max_tokens(mut self, max_tokens: u32) -> Self {
        self.summary_max_tokens = max_tokens;
        self
    }

    #[inline]
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Run the pipeline over `dataset`. Failures are reported, not returned.
    #[inline]
    pub async fn run(&self, dataset: &Dataset, instruction: &str) -> PipelineReport {
        info!(
            "Starting embedding pipeline over {} rows: {}",
            dataset.len(),
            instruction
        );

        let mut tracker = StageTracker::new();
        let mut report = PipelineReport::new(instruction, dataset.len(), self.encoder.model_name());
        let mut summary = None;

        match self
            .execute(dataset, instruction, &mut tracker, &mut report, &mut summary)
            .await
        {
            Ok(()) => {
                report.annotation = self.collect_summary(summary).await;
                tracker.advance(Stage::Reported);
                report.status = RunStatus::Completed;
                report.stage = Stage::Reported;
                info!(
                    "Embedding pipeline completed with {} vectors",
                    report.embedding.as_ref().map_or(0, |e| e.vectors)
                );
            }
            Err(e) => {
                if let Some(handle) = summary {
                    handle.abort();
                }
                let failed_stage = tracker.abort();
                error!("Embedding pipeline failed during {}: {}", failed_stage, e);
                report.fail(failed_stage, e.kind(), e.to_string());
            }
        }

        report
    }

    async fn execute(
        &self,
        dataset: &Dataset,
        instruction: &str,
        tracker: &mut StageTracker,
        report: &mut PipelineReport,
        summary: &mut Option<SummaryHandle>,
    ) -> Result<(), PipelineError> {
        tracker.advance(Stage::Extracting);
        let extraction = extract_text_records(dataset)?;
        report.records = extraction.records.len();
        report.skipped_rows = extraction.skipped_rows.clone();
        report.textual_columns = extraction.textual_columns.clone();

        tracker.advance(Stage::Encoding);
        let texts = extraction.texts();
        let vectors = self.encoder.encode(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(EncoderError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            }
            .into());
        }

        tracker.advance(Stage::Indexing);
        *summary = Some(self.spawn_summary(dataset, instruction));

        let samples: Vec<Vec<f32>> = vectors
            .iter()
            .take(SAMPLE_VECTORS)
            .map(|vector| vector.iter().take(SAMPLE_COMPONENTS).copied().collect())
            .collect();

        let index = VectorIndex::build(vectors)?;
        let mut metadata = MetadataStore::with_capacity(extraction.records.len());
        for (slot, record) in extraction.records.iter().enumerate() {
            let source = dataset.record_map(record.row).unwrap_or_default();
            metadata.record(slot, record.text.as_str(), source)?;
        }
        if metadata.len() != index.len() {
            return Err(MetadataError::IndexMetadataMismatch {
                expected: index.len(),
                found: metadata.len(),
            }
            .into());
        }

        let embedding = EmbeddingSummary {
            dimension: index.dimension(),
            vectors: index.len(),
            samples,
        };

        tracker.advance(Stage::Persisting);
        let store = self.store.clone();
        let locations = tokio::task::spawn_blocking(move || store.commit(&index, &metadata))
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))??;

        report.embedding = Some(embedding);
        report.artifacts = Some(locations);
        Ok(())
    }

    fn spawn_summary(&self, dataset: &Dataset, instruction: &str) -> SummaryHandle {
        let generator = Arc::clone(&self.generator);
        let max_tokens = self.summary_max_tokens;
        let sample = dataset
            .head(SUMMARY_SAMPLE_ROWS)
            .to_csv_string()
            .unwrap_or_default();
        let prompt = PromptTemplate::Embed.fill(&sample, instruction);

        tokio::spawn(async move { generator.generate(&prompt, max_tokens).await })
    }

    async fn collect_summary(&self, summary: Option<SummaryHandle>) -> Annotation {
        let Some(mut handle) = summary else {
            return Annotation::NotRequested;
        };

        match tokio::time::timeout(self.summary_timeout, &mut handle).await {
            Ok(Ok(Ok(generation))) => Annotation::Provided(generation.text),
            Ok(Ok(Err(e))) => {
                warn!("Collaborator summary unavailable: {}", e);
                Annotation::Unavailable(e.to_string())
            }
            Ok(Err(e)) => {
                warn!("Collaborator summary task failed: {}", e);
                Annotation::Unavailable(format!("summary task failed: {e}"))
            }
            Err(_) => {
                handle.abort();
                warn!(
                    "Collaborator summary timed out after {:?}",
                    self.summary_timeout
                );
                Annotation::Unavailable(format!(
                    "summary timed out after {}s",
                    self.summary_timeout.as_secs_f32()
                ))
            }
        }
    }
}
