
use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{Config, ConfigError, EncoderBackend, EncoderConfig, GenerationConfig, OllamaConfig};

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 DataSanity Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir)?;

    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Configure your local Ollama instance for embeddings and text generation.");
    eprintln!();

    configure_ollama(&mut config.ollama)?;

    eprintln!();
    eprintln!("{}", style("Encoder").bold().yellow());
    configure_encoder(&mut config.encoder)?;

    eprintln!();
    eprintln!("{}", style("Text Generation").bold().yellow());
    configure_generation(&mut config.generation)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_ollama_connection(&config.ollama) {
        eprintln!("{}", style("✓ Ollama connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Ollama").yellow()
        );
        eprintln!("You can continue, but make sure Ollama is running before processing data.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    eprintln!("  Host: {}", style(&config.ollama.host).cyan());
    eprintln!("  Port: {}", style(config.ollama.port).cyan());
    eprintln!("  Embedding Model: {}", style(&config.ollama.model).cyan());
    eprintln!("  Batch Size: {}", style(config.ollama.batch_size).cyan());
    match config.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Encoder:").bold().yellow());
    match config.encoder.backend {
        EncoderBackend::Ollama => eprintln!("  Backend: {}", style("ollama").cyan()),
        EncoderBackend::Hashing => eprintln!(
            "  Backend: {} (dimension {})",
            style("hashing").cyan(),
            config.encoder.hashing_dimension
        ),
    }

    eprintln!();
    eprintln!("{}", style("Text Generation:").bold().yellow());
    if config.generation.enabled {
        eprintln!("  Model: {}", style(&config.generation.model).cyan());
        eprintln!("  Max Tokens: {}", style(config.generation.max_tokens).cyan());
        eprintln!("  Timeout: {}s", style(config.generation.timeout_secs).cyan());
    } else {
        eprintln!("  {}", style("Disabled").dim());
    }

    eprintln!();
    eprintln!(
        "Artifacts: {}",
        style(config.artifacts_dir().display()).cyan()
    );
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No valid configuration found. Using defaults.").yellow()
            );
            Ok(Config::with_base_dir(config_dir))
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(ollama.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_model(model)?;
    ollama.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_encoder(encoder: &mut EncoderConfig) -> Result<()> {
    let backends = &["ollama", "hashing (offline)"];
    let default_index = match encoder.backend {
        EncoderBackend::Ollama => 0,
        EncoderBackend::Hashing => 1,
    };

    let backend_index = Select::new()
        .with_prompt("Embedding backend")
        .default(default_index)
        .items(backends)
        .interact()?;

    encoder.backend = if backend_index == 0 {
        EncoderBackend::Ollama
    } else {
        EncoderBackend::Hashing
    };

    if encoder.backend == EncoderBackend::Hashing {
        let dimension: usize = Input::new()
            .with_prompt("Hashing vector dimension")
            .default(encoder.hashing_dimension)
            .validate_with(|input: &usize| -> Result<(), &str> {
                if (8..=4096).contains(input) {
                    Ok(())
                } else {
                    Err("Dimension must be between 8 and 4096")
                }
            })
            .interact_text()?;
        encoder.set_hashing_dimension(dimension)?;
    }

    Ok(())
}

fn configure_generation(generation: &mut GenerationConfig) -> Result<()> {
    generation.enabled = Confirm::new()
        .with_prompt("Use an Ollama model for summaries, cleaning and synthetic data?")
        .default(generation.enabled)
        .interact()?;

    if !generation.enabled {
        return Ok(());
    }

    let model: String = Input::new()
        .with_prompt("Text generation model")
        .default(generation.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let max_tokens: u32 = Input::new()
        .with_prompt("Max tokens per reply")
        .default(generation.max_tokens)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (1..=8192).contains(input) {
                Ok(())
            } else {
                Err("Max tokens must be between 1 and 8192")
            }
        })
        .interact_text()?;

    let timeout_secs: u64 = Input::new()
        .with_prompt("Generation timeout (seconds)")
        .default(generation.timeout_secs)
        .validate_with(|input: &u64| -> Result<(), &str> {
            if (1..=300).contains(input) {
                Ok(())
            } else {
                Err("Timeout must be between 1 and 300 seconds")
            }
        })
        .interact_text()?;

    generation.set_model(model)?;
    generation.set_max_tokens(max_tokens)?;
    generation.set_timeout_secs(timeout_secs)?;

    Ok(())
}

fn test_ollama_connection(ollama: &OllamaConfig) -> bool {
    let Ok(url) = ollama.ollama_url().and_then(|base| {
        base.join("/api/version")
            .map_err(|e| ConfigError::InvalidUrl(e.to_string()))
    }) else {
        return false;
    };

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(url.as_str()).call() {
        Ok(_) => true,
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => true,
        Err(_) => false,
    }
}
