//! Error types for the PerCycleGAN trainer

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A tensor does not have the shape a network or domain expects
    #[error("Shape mismatch for {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<i64>,
        actual: Vec<i64>,
    },

    /// One of the four network archives is absent for the requested label
    #[error("Missing checkpoint for {network} (label '{label}'): {}", path.display())]
    MissingCheckpoint {
        network: String,
        label: String,
        path: PathBuf,
    },

    /// A network archive lacks one of the network's parameters
    #[error("Checkpoint {} has no parameter '{name}'", path.display())]
    MissingParameter { path: PathBuf, name: String },

    /// Dataset directory is missing or holds no images
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// `optimize_parameters` or `test` was called before `set_input`
    #[error("No input batch has been set")]
    NoInput,

    /// libtorch error
    #[error("Torch error: {0}")]
    Torch(#[from] tch::TchError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML write error
    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    /// Build a shape mismatch error from two tensor sizes
    pub fn shape(context: impl Into<String>, expected: &[i64], actual: &[i64]) -> Self {
        Error::ShapeMismatch {
            context: context.into(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
