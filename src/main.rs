use clap::{Parser, Subcommand};
use datasanity::Result;
use datasanity::actions::Action;
use datasanity::commands::{ExportFormat, ProcessOptions, export, process, search, verify};
use datasanity::config::{Config, get_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "datasanity")]
#[command(about = "Clean, generate, enrich and vector-index tabular data with local models")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection, encoder and text generation
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Run one or more actions over an optional CSV dataset
    Process {
        /// Free-text instruction forwarded to the text-generation model
        #[arg(long)]
        prompt: String,
        /// Action to run; repeat for several
        #[arg(long = "action", value_enum, required = true)]
        actions: Vec<Action>,
        /// CSV file with a header row
        #[arg(long)]
        file: Option<PathBuf>,
        /// Number of rows to generate
        #[arg(long, default_value_t = 10)]
        count: usize,
        /// Ask for noisy synthetic rows
        #[arg(long)]
        noisy: bool,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Find the records nearest to a query in the current index
    Search {
        query: String,
        /// Number of results
        #[arg(short, long, default_value_t = 5)]
        k: usize,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check that the current index and metadata agree
    Verify,
    /// Export a cleaned dataset or the current index file
    Export {
        #[arg(long, value_enum)]
        format: ExportFormat,
        /// CSV file to clean and export (csv and json formats)
        #[arg(long)]
        file: Option<PathBuf>,
        /// Destination path
        #[arg(long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = get_config_dir()?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Process {
            prompt,
            actions,
            file,
            count,
            noisy,
            json,
        } => {
            let config = Config::load(&config_dir)?;
            let options = ProcessOptions {
                prompt,
                actions,
                file,
                count,
                noisy,
                json,
            };
            process(&config, options).await?;
        }
        Commands::Search { query, k, json } => {
            let config = Config::load(&config_dir)?;
            search(&config, &query, k, json).await?;
        }
        Commands::Verify => {
            let config = Config::load(&config_dir)?;
            verify(&config)?;
        }
        Commands::Export { format, file, out } => {
            let config = Config::load(&config_dir)?;
            export(&config, format, file.as_deref(), &out)?;
        }
    }

    Ok(())
}
