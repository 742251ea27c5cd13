use std::fmt;

use itertools::Itertools;
use serde::Serialize;

use super::{FailureKind, Stage};
use crate::artifacts::ArtifactLocations;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// What the text-generation collaborator contributed to a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum Annotation {
    NotRequested,
    Provided(String),
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingSummary {
    pub dimension: usize,
    pub vectors: usize,
    /// Leading components of the first few vectors
    pub samples: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureInfo {
    pub stage: Stage,
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub status: RunStatus,
    pub stage: Stage,
    pub instruction: String,
    pub model: String,
    pub rows: usize,
    pub records: usize,
    pub skipped_rows: Vec<usize>,
    pub textual_columns: Vec<String>,
    pub embedding: Option<EmbeddingSummary>,
    pub artifacts: Option<ArtifactLocations>,
    pub failure: Option<FailureInfo>,
    pub annotation: Annotation,
}

impl PipelineReport {
    pub(super) fn new(instruction: &str, rows: usize, model: &str) -> Self {
        Self {
            status: RunStatus::Running,
            stage: Stage::Idle,
            instruction: instruction.to_string(),
            model: model.to_string(),
            rows,
            records: 0,
            skipped_rows: Vec::new(),
            textual_columns: Vec::new(),
            embedding: None,
            artifacts: None,
            failure: None,
            annotation: Annotation::NotRequested,
        }
    }

    pub(super) fn fail(&mut self, stage: Stage, kind: FailureKind, message: String) {
        self.status = RunStatus::Failed;
        self.stage = Stage::Aborted;
        self.embedding = None;
        self.artifacts = None;
        self.annotation = Annotation::NotRequested;
        self.failure = Some(FailureInfo {
            stage,
            kind,
            message,
        });
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Stage the run failed in, if it failed
    #[inline]
    pub fn failed_stage(&self) -> Option<Stage> {
        self.failure.as_ref().map(|failure| failure.stage)
    }

    #[inline]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(|failure| failure.kind)
    }
}

impl fmt::Display for PipelineReport {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(failure) = &self.failure {
            writeln!(
                f,
                "Data vectorization failed during {} ({}): {}",
                failure.stage, failure.kind, failure.message
            )?;
            return writeln!(f, "No artifacts were written; previous artifacts are unchanged.");
        }

        writeln!(f, "Data vectorization completed:")?;
        writeln!(
            f,
            "- Rows: {} ({} embedded, {} skipped)",
            self.rows,
            self.records,
            self.skipped_rows.len()
        )?;
        writeln!(
            f,
            "- Text columns identified: {}",
            self.textual_columns.join(", ")
        )?;
        writeln!(f, "- Embedding model: {}", self.model)?;

        if let Some(embedding) = &self.embedding {
            writeln!(f, "- Vector dimension: {}", embedding.dimension)?;
            writeln!(f, "- Index vectors: {}", embedding.vectors)?;
        }
        if let Some(artifacts) = &self.artifacts {
            writeln!(f, "- Generation: {}", artifacts.generation)?;
            writeln!(f, "- Index saved to: {}", artifacts.index_path.display())?;
            writeln!(f, "- Metadata saved to: {}", artifacts.metadata_path.display())?;
        }
        writeln!(f)?;

        match &self.annotation {
            Annotation::Provided(text) => {
                writeln!(f, "Vectorization summary:\n{}\n", text.trim_end())?;
            }
            Annotation::Unavailable(reason) => {
                writeln!(f, "Note: summary unavailable ({reason})\n")?;
            }
            Annotation::NotRequested => {}
        }

        if let Some(embedding) = &self.embedding {
            writeln!(
                f,
                "Sample embeddings (first {} rows):",
                embedding.samples.len()
            )?;
            for (i, sample) in embedding.samples.iter().enumerate() {
                writeln!(
                    f,
                    "Row {}: [{}, ...]",
                    i + 1,
                    sample.iter().map(|value| format!("{value:.2}")).join(", ")
                )?;
            }
        }

        Ok(())
    }
}
