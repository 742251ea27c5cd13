// Actions
// The operations a processing request can ask for, and how their results are assembled

pub mod clean;
pub mod enrich;
pub mod synthesize;


use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use serde::Serialize;
use tracing::{info, warn};

use crate::dataset::Dataset;
use crate::generation::{CollaboratorError, Generation, PromptTemplate, TextGenerator};
use crate::pipeline::{EmbeddingPipeline, PipelineReport};

pub use clean::{CleanSummary, clean_dataset};
pub use enrich::{EnrichedField, enrich_fields};
pub use synthesize::fallback_rows;

const CLEAN_PROMPT_ROWS: usize = 10;
const PREVIEW_ROWS: usize = 5;
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Processing operations, declared in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Clean,
    Generate,
    Embed,
    Enrich,
}

impl Action {
    fn verb(self) -> &'static str {
        match self {
            Self::Clean => "cleaning",
            Self::Generate => "generation",
            Self::Embed => "vectorization",
            Self::Enrich => "enrichment",
        }
    }
}

/// Parameters shared by every action in one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub instruction: String,
    /// Rows to generate
    pub count: usize,
    pub noisy: bool,
}

impl ActionRequest {
    #[inline]
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            count: synthesize::DEFAULT_COUNT,
            noisy: false,
        }
    }

    #[inline]
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    #[inline]
    pub fn with_noisy(mut self, noisy: bool) -> Self {
        self.noisy = noisy;
        self
    }
}

/// Result text per action, keyed the way API consumers expect
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleaned_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vectorized_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enriched_data: Option<String>,
    /// Structured embedding outcome behind `vectorized_data`
    #[serde(skip)]
    pub embedding_report: Option<PipelineReport>,
}

/// Runs selected actions against an optional dataset
pub struct ActionRunner {
    pipeline: EmbeddingPipeline,
    generator: Arc<dyn TextGenerator>,
    max_tokens: u32,
    timeout: Duration,
}

impl ActionRunner {
    #[inline]
    pub fn new(pipeline: EmbeddingPipeline, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            pipeline,
            generator,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[inline]
    pub fn with_generation_limits(mut self, max_tokens: u32, timeout: Duration) -> Self {
        self.max_tokens = max_tokens;
        self.timeout = timeout;
        self
    }

    /// Run each selected action once, in declaration order
    #[inline]
    pub async fn run(
        &self,
        actions: &[Action],
        dataset: Option<&Dataset>,
        request: &ActionRequest,
    ) -> ActionResults {
        let mut selected = actions.to_vec();
        selected.sort_unstable();
        selected.dedup();

        let mut results = ActionResults::default();
        for action in selected {
            info!("Running {:?} action", action);

            if action == Action::Generate {
                results.generated_data = Some(self.generate(dataset, request).await);
                continue;
            }

            let Some(dataset) = dataset else {
                warn!("No dataset supplied for {:?} action", action);
                let message = format!("No data provided for {}", action.verb());
                match action {
                    Action::Clean => results.cleaned_data = Some(message),
                    Action::Embed => results.vectorized_data = Some(message),
                    Action::Enrich => results.enriched_data = Some(message),
                    Action::Generate => {}
                }
                continue;
            };

            match action {
                Action::Clean => results.cleaned_data = Some(self.clean(dataset, request).await),
                Action::Embed => {
                    let report = self.pipeline.run(dataset, &request.instruction).await;
                    results.vectorized_data = Some(report.to_string());
                    results.embedding_report = Some(report);
                }
                Action::Enrich => {
                    results.enriched_data = Some(self.enrich(dataset, request).await);
                }
                Action::Generate => {}
            }
        }

        results
    }

    async fn ask(
        &self,
        template: PromptTemplate,
        dataset_csv: &str,
        instruction: &str,
    ) -> Result<Generation, CollaboratorError> {
        let prompt = template.fill(dataset_csv, instruction);
        tokio::time::timeout(
            self.timeout,
            self.generator.generate(&prompt, self.max_tokens),
        )
        .await
        .unwrap_or_else(|_| {
            Err(CollaboratorError::Unavailable(format!(
                "generation timed out after {}s",
                self.timeout.as_secs()
            )))
        })
    }

    async fn clean(&self, dataset: &Dataset, request: &ActionRequest) -> String {
        let (cleaned, summary) = clean_dataset(dataset);
        info!(
            "Cleaned dataset: {} -> {} rows",
            summary.initial_rows, summary.final_rows
        );

        let sample = cleaned
            .head(CLEAN_PROMPT_ROWS)
            .to_csv_string()
            .unwrap_or_default();
        let generation = self
            .ask(PromptTemplate::Clean, &sample, &request.instruction)
            .await;

        let mut result = String::new();
        match &generation {
            Ok(_) => result.push_str("Data cleaning completed:\n"),
            Err(_) => result.push_str(
                "Data cleaning completed (text generation unavailable, using basic cleaning):\n",
            ),
        }
        let _ = writeln!(result, "- Initial rows: {}", summary.initial_rows);
        let _ = writeln!(result, "- Removed duplicates: {}", summary.duplicates_removed);
        let _ = writeln!(
            result,
            "- Removed rows with missing values: {}",
            summary.missing_removed
        );
        let _ = writeln!(result, "- Final rows: {}", summary.final_rows);

        match generation {
            Ok(generation) => {
                let data = generation.data.unwrap_or(generation.text);
                let _ = write!(result, "\nCleaned data:\n{}", data);
            }
            Err(e) => {
                let preview = cleaned.head(PREVIEW_ROWS).to_csv_string().unwrap_or_default();
                let _ = writeln!(result, "- Note: {e}");
                let _ = write!(result, "\nCleaned data preview:\n{}", preview);
            }
        }
        result
    }

    async fn generate(&self, dataset: Option<&Dataset>, request: &ActionRequest) -> String {
        let examples = dataset
            .and_then(|dataset| dataset.head(PREVIEW_ROWS).to_csv_string().ok())
            .unwrap_or_default();
        let instruction = format!(
            "{}\nGenerate {} {} rows.",
            request.instruction,
            request.count,
            if request.noisy { "noisy" } else { "clean" }
        );
        let generation = self
            .ask(PromptTemplate::Generate, &examples, &instruction)
            .await;

        let mut result = String::new();
        match &generation {
            Ok(_) => result.push_str("Data generation completed:\n"),
            Err(_) => result.push_str(
                "Data generation completed (text generation unavailable, using basic generation):\n",
            ),
        }
        let _ = writeln!(result, "- Requested examples: {}", request.count);
        let _ = writeln!(result, "- Noise requested: {}", request.noisy);

        match generation {
            Ok(generation) => {
                let data = generation.data.unwrap_or(generation.text);
                let _ = write!(result, "\nGenerated data:\n{}", data);
            }
            Err(e) => {
                let _ = writeln!(result, "- Note: {e}");
                let kind = if request.noisy { "noisy" } else { "clean" };
                let _ = write!(
                    result,
                    "\nGenerated {kind} example data:\n{}",
                    fallback_rows(request.count, request.noisy)
                );
            }
        }
        result
    }

    async fn enrich(&self, dataset: &Dataset, request: &ActionRequest) -> String {
        let sample = dataset
            .head(enrich::ENRICH_SAMPLE_ROWS)
            .to_csv_string()
            .unwrap_or_default();
        let generation = self
            .ask(PromptTemplate::Enrich, &sample, &request.instruction)
            .await;
        let fields = enrich_fields(dataset);

        let mut result = String::from("Data enrichment completed:\n");
        let _ = writeln!(
            result,
            "- Dataset shape: ({}, {})",
            dataset.len(),
            dataset.width()
        );
        let _ = writeln!(
            result,
            "- Enriched fields: {}\n",
            dataset.columns().join(", ")
        );

        match generation {
            Ok(generation) => {
                let _ = writeln!(
                    result,
                    "Enrichment summary:\n{}\n",
                    generation.text.trim_end()
                );
            }
            Err(e) => {
                let _ = writeln!(result, "Note: {e}\n");
            }
        }

        if fields.is_empty() {
            result.push_str("No values matched the reference table.\n");
        } else {
            result.push_str("Sample enriched entries:\n");
            for field in &fields {
                let _ = writeln!(result, "{}", field.render());
            }
        }
        result
    }
}
