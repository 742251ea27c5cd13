use anyhow::{Context, Result};
use clap::ValueEnum;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::actions::{Action, ActionRequest, ActionResults, ActionRunner, clean_dataset};
use crate::artifacts::{ArtifactStore, ConsistencyReport};
use crate::config::{Config, EncoderBackend};
use crate::dataset::Dataset;
use crate::embeddings::{Encoder, HashingEncoder, OllamaClient, OllamaEncoder};
use crate::generation::{DisabledGenerator, OllamaGenerator, TextGenerator};
use crate::pipeline::EmbeddingPipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// Cleaned dataset as CSV
    Csv,
    /// Cleaned dataset as JSON with dataset info
    Json,
    /// Copy of the current vector index file
    Index,
}

/// Options for the `process` command
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub prompt: String,
    pub actions: Vec<Action>,
    pub file: Option<PathBuf>,
    pub count: usize,
    pub noisy: bool,
    pub json: bool,
}

/// One search hit resolved through the metadata store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub slot: usize,
    pub distance: f32,
    pub text: String,
    pub source: Map<String, JsonValue>,
}

/// Encoder selected by the configuration
#[inline]
pub fn build_encoder(config: &Config) -> Result<Arc<dyn Encoder>> {
    let encoder: Arc<dyn Encoder> = match config.encoder.backend {
        EncoderBackend::Ollama => {
            let client = OllamaClient::new(&config.ollama)
                .context("Failed to create Ollama client for embeddings")?;
            Arc::new(OllamaEncoder::new(client))
        }
        EncoderBackend::Hashing => Arc::new(
            HashingEncoder::new(config.encoder.hashing_dimension)
                .context("Failed to create hashing encoder")?,
        ),
    };
    Ok(encoder)
}

/// Text generator selected by the configuration
#[inline]
pub fn build_generator(config: &Config) -> Result<Arc<dyn TextGenerator>> {
    if !config.generation.enabled {
        return Ok(Arc::new(DisabledGenerator));
    }

    let client = OllamaClient::new(&config.ollama)
        .context("Failed to create Ollama client for text generation")?
        .with_model(&config.generation.model)
        .with_timeout(Duration::from_secs(config.generation.timeout_secs));
    Ok(Arc::new(OllamaGenerator::new(client)))
}

#[inline]
pub fn build_runner(config: &Config) -> Result<ActionRunner> {
    let encoder = build_encoder(config)?;
    let generator = build_generator(config)?;
    let timeout = Duration::from_secs(config.generation.timeout_secs);

    let pipeline = EmbeddingPipeline::new(
        encoder,
        Arc::clone(&generator),
        ArtifactStore::new(config.artifacts_dir()),
    )
    .with_summary_timeout(timeout)
    .with_summary_max_tokens(config.generation.max_tokens);

    Ok(ActionRunner::new(pipeline, generator)
        .with_generation_limits(config.generation.max_tokens, timeout))
}

fn spinner(message: &'static str) -> ProgressBar {
    if console::user_attended_stderr() {
        let bar = ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message);
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    } else {
        ProgressBar::hidden()
    }
}

/// Run the requested actions and print their results
#[inline]
pub async fn process(config: &Config, options: ProcessOptions) -> Result<ActionResults> {
    let dataset = options
        .file
        .as_deref()
        .map(|path| {
            Dataset::from_csv_path(path)
                .with_context(|| format!("Failed to read dataset: {}", path.display()))
        })
        .transpose()?;

    if let Some(dataset) = &dataset {
        info!(
            "Loaded dataset with {} rows and {} columns",
            dataset.len(),
            dataset.width()
        );
    }

    let runner = build_runner(config)?;
    let request = ActionRequest::new(options.prompt)
        .with_count(options.count)
        .with_noisy(options.noisy);

    let bar = spinner("Processing");
    let results = runner
        .run(&options.actions, dataset.as_ref(), &request)
        .await;
    bar.finish_and_clear();

    if options.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&results).context("Failed to serialize results")?
        );
    } else {
        print_results(&results);
    }

    Ok(results)
}

fn print_results(results: &ActionResults) {
    let sections = [
        ("Cleaned Data", &results.cleaned_data),
        ("Generated Data", &results.generated_data),
        ("Vectorized Data", &results.vectorized_data),
        ("Enriched Data", &results.enriched_data),
    ];

    for (title, body) in sections {
        let Some(body) = body else {
            continue;
        };
        println!("{}", style(title).bold().cyan());
        println!("{}", body.trim_end());
        println!();
    }

    if let Some(report) = &results.embedding_report {
        if report.is_success() {
            println!("{}", style("✓ Index updated").green());
        } else {
            println!("{}", style("✗ Index unchanged").red());
        }
    }
}

/// Encode `query` and resolve its nearest records in the current generation
#[inline]
pub async fn search_artifacts(
    encoder: &dyn Encoder,
    store: &ArtifactStore,
    query: &str,
    k: usize,
) -> crate::Result<Vec<SearchResult>> {
    let store = store.clone();
    let artifacts = tokio::task::spawn_blocking(move || store.load())
        .await
        .map_err(|e| anyhow::anyhow!("artifact load task failed: {e}"))??;

    let mut vectors = encoder.encode(&[query.to_string()]).await?;
    let query_vector = vectors.pop().ok_or(crate::embeddings::EncoderError::CountMismatch {
        expected: 1,
        actual: 0,
    })?;

    let hits = artifacts.index.search(&query_vector, k)?;
    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        let entry = artifacts.metadata.lookup(hit.slot)?;
        results.push(SearchResult {
            slot: hit.slot,
            distance: hit.distance,
            text: entry.text.clone(),
            source: entry.source.clone(),
        });
    }

    Ok(results)
}

#[inline]
pub async fn search(config: &Config, query: &str, k: usize, json: bool) -> Result<()> {
    let encoder = build_encoder(config)?;
    let store = ArtifactStore::new(config.artifacts_dir());

    let results = search_artifacts(encoder.as_ref(), &store, query, k)
        .await
        .context("Search failed")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&results).context("Failed to serialize results")?
        );
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!(
        "{}",
        style(format!("Top {} results for \"{}\"", results.len(), query))
            .bold()
            .cyan()
    );
    for (rank, result) in results.iter().enumerate() {
        println!(
            "{:>3}. {} {}",
            rank + 1,
            style(&result.text).bold(),
            style(format!("(slot {}, distance {:.4})", result.slot, result.distance)).dim()
        );
    }

    Ok(())
}

/// Check the current generation and print the consistency report
#[inline]
pub fn verify(config: &Config) -> Result<ConsistencyReport> {
    let store = ArtifactStore::new(config.artifacts_dir());
    let report = store
        .verify()
        .context("Failed to verify artifacts")?;

    println!("{}", style("Artifact Consistency").bold().cyan());
    println!("  Generation: {}", report.generation);
    println!("  Index vectors: {}", report.index_vectors);
    println!("  Metadata entries: {}", report.metadata_entries);
    println!("  Dimension: {}", report.dimension);

    if report.is_consistent {
        println!("  Status: {}", style("consistent").green());
    } else {
        println!("  Status: {}", style("INCONSISTENT").red().bold());
        if let Some(slot) = report.missing_in_metadata.first() {
            println!(
                "  {} index slots have no metadata (first: {})",
                report.missing_in_metadata.len(),
                slot
            );
        }
        if let Some(slot) = report.orphaned_in_metadata.first() {
            println!(
                "  {} metadata entries have no vector (first: {})",
                report.orphaned_in_metadata.len(),
                slot
            );
        }
    }

    Ok(report)
}

/// Write a cleaned dataset or the current index to `out`
#[inline]
pub fn export(config: &Config, format: ExportFormat, file: Option<&Path>, out: &Path) -> Result<()> {
    match format {
        ExportFormat::Index => {
            let store = ArtifactStore::new(config.artifacts_dir());
            let locations = store
                .current()?
                .context("No index has been built yet; run `process --action embed` first")?;
            std::fs::copy(&locations.index_path, out).with_context(|| {
                format!(
                    "Failed to copy {} to {}",
                    locations.index_path.display(),
                    out.display()
                )
            })?;
        }
        ExportFormat::Csv | ExportFormat::Json => {
            let file = file.context("--file is required for csv and json exports")?;
            let dataset = Dataset::from_csv_path(file)
                .with_context(|| format!("Failed to read dataset: {}", file.display()))?;
            let (cleaned, summary) = clean_dataset(&dataset);
            if summary.final_rows < summary.initial_rows {
                warn!(
                    "Dropped {} of {} rows while cleaning for export",
                    summary.initial_rows - summary.final_rows,
                    summary.initial_rows
                );
            }

            if format == ExportFormat::Csv {
                cleaned.write_csv(out)?;
            } else {
                let document = serde_json::to_string_pretty(&cleaned.to_json_export())
                    .context("Failed to serialize export")?;
                std::fs::write(out, document)
                    .with_context(|| format!("Failed to write {}", out.display()))?;
            }
        }
    }

    println!(
        "{} {}",
        style("✓ Exported to").green(),
        style(out.display()).cyan()
    );
    Ok(())
}
