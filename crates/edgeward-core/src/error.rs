use thiserror::Error;

/// Errors raised while loading `edgeward.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid duration {0:?} (expected e.g. \"500ms\", \"5s\", \"2m\")")]
    InvalidDuration(String),
}
