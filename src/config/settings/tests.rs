use super::*;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.ollama.protocol, "http");
    assert_eq!(config.ollama.host, "localhost");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.ollama.model, "all-minilm:latest");
    assert_eq!(config.ollama.batch_size, 16);
    assert_eq!(config.encoder.backend, EncoderBackend::Ollama);
    assert_eq!(config.encoder.hashing_dimension, 384);
    assert!(config.generation.enabled);
    assert_eq!(config.generation.max_tokens, 512);
    assert_eq!(config.generation.timeout_secs, 30);
    assert_eq!(config.artifacts.dir, None);
}

#[test]
fn config_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.ollama.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.batch_size = 1001;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.encoder.hashing_dimension = 4;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidHashingDimension(4))
    ));

    let mut invalid_config = config.clone();
    invalid_config.generation.max_tokens = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidMaxTokens(0))
    ));

    let mut invalid_config = config;
    invalid_config.generation.timeout_secs = 301;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidTimeout(301))
    ));
}

#[test]
fn ollama_url_generation() {
    let config = Config::default();
    let url = config
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn toml_serialization() {
    let mut config = Config::default();
    config.encoder.backend = EncoderBackend::Hashing;
    config.artifacts.dir = Some(PathBuf::from("/var/lib/datasanity"));

    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    assert!(toml_str.contains("backend = \"hashing\""));
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn setter_validation() {
    let mut config = OllamaConfig {
        protocol: "http".to_string(),
        host: "localhost".to_string(),
        port: 11434,
        model: "test-model".to_string(),
        batch_size: 32,
    };

    assert!(config.set_protocol("https".to_string()).is_ok());
    assert!(config.set_host("example.com".to_string()).is_ok());
    assert!(config.set_port(8080).is_ok());
    assert!(config.set_model("new-model".to_string()).is_ok());
    assert!(config.set_batch_size(128).is_ok());

    assert!(config.set_protocol("ftp".to_string()).is_err());
    assert!(config.set_port(0).is_err());
    assert!(config.set_model(String::new()).is_err());
    assert!(config.set_batch_size(0).is_err());
    assert!(config.set_batch_size(1001).is_err());
}

#[test]
fn generation_and_encoder_setters() {
    let mut generation = GenerationConfig::default();
    assert!(generation.set_model("qwen2.5:7b".to_string()).is_ok());
    assert!(generation.set_max_tokens(8192).is_ok());
    assert!(generation.set_timeout_secs(1).is_ok());
    assert!(generation.set_model("  ".to_string()).is_err());
    assert!(generation.set_max_tokens(8193).is_err());
    assert!(generation.set_timeout_secs(0).is_err());
    assert_eq!(generation.model, "qwen2.5:7b");

    let mut encoder = EncoderConfig::default();
    assert!(encoder.set_hashing_dimension(8).is_ok());
    assert!(encoder.set_hashing_dimension(4097).is_err());
    assert_eq!(encoder.hashing_dimension, 8);
}

#[test]
fn load_missing_config_uses_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let config = Config::load(temp_dir.path()).expect("missing config should load");

    assert_eq!(config.get_base_dir(), temp_dir.path());
    assert_eq!(config.ollama, OllamaConfig::default());
    assert_eq!(config.artifacts_dir(), temp_dir.path().join("artifacts"));
}

#[test]
fn save_then_load_round_trip() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_dir = temp_dir.path().join(CONFIG_DIR_NAME);

    let mut config = Config::with_base_dir(&config_dir);
    config.generation.enabled = false;
    config.ollama.port = 9999;
    config.save().expect("save should succeed");

    assert!(config_dir.join(CONFIG_FILE_NAME).exists());
    let loaded = Config::load(&config_dir).expect("load should succeed");
    assert_eq!(loaded, config);
}

#[test]
fn load_rejects_invalid_values() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join(CONFIG_FILE_NAME),
        "[ollama]\nbatch_size = 0\n",
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
fn artifacts_dir_resolution() {
    let mut config = Config::with_base_dir("/home/user/.datasanity");
    config.artifacts.dir = Some(PathBuf::from("runs"));
    assert_eq!(
        config.artifacts_dir(),
        PathBuf::from("/home/user/.datasanity/runs")
    );

    config.artifacts.dir = Some(PathBuf::from("/srv/vectors"));
    assert_eq!(config.artifacts_dir(), PathBuf::from("/srv/vectors"));
}

#[test]
fn https_url_generation() {
    let mut config = Config::default();
    config.ollama.protocol = "https".to_string();
    config.ollama.host = "secure.example.com".to_string();
    config.ollama.port = 443;

    let url = config
        .ollama_url()
        .expect("should generate https url successfully");
    assert_eq!(url.as_str(), "https://secure.example.com/");
}

#[test]
fn protocol_validation() {
    let mut config = OllamaConfig::default();

    assert!(config.set_protocol("http".to_string()).is_ok());
    assert!(config.set_protocol("https".to_string()).is_ok());

    assert!(config.set_protocol("ftp".to_string()).is_err());
    assert!(config.set_protocol("ws".to_string()).is_err());
    assert!(config.set_protocol(String::new()).is_err());
    assert!(config.set_protocol("HTTP".to_string()).is_err());
}
