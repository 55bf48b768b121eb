use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("encoding default config: {0}")]
    Encode(#[from] toml::ser::Error),

    /// Override string is not of the form `key.path=value`.
    #[error("invalid override: '{0}'")]
    InvalidOverride(String),

    #[error("expected table at key '{0}'")]
    TraverseNonTableAt(String),

    #[error("missing key '{0}'")]
    MissingKey(String),
}
