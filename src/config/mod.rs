// Configuration management module
// TOML settings under ~/.datasanity plus the interactive setup flow

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    ArtifactsConfig, Config, ConfigError, EncoderBackend, EncoderConfig, GenerationConfig,
    OllamaConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::default_config_dir()
}
