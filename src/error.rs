//! Error types and handling for imgderive

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for imgderive operations
pub type Result<T> = std::result::Result<T, DerivativeError>;

/// Main error type for imgderive operations
#[derive(Debug, Error)]
pub enum DerivativeError {
    /// A path could not be split into a file name and extension
    #[error("Invalid path: {path:?}")]
    InvalidPath { path: PathBuf },

    /// The source argument does not resolve to anything on disk
    #[error("Cannot stat source {path:?}: {source}")]
    SourceStat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A source image could not be read into memory
    #[error("Cannot read source {path:?}: {source}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An output directory could not be listed or emptied
    #[error("Output directory {path:?} unavailable: {message}")]
    DirectoryAccess { path: PathBuf, message: String },

    /// Decoding, resizing, encoding or writing a derivative failed
    #[error("Render failed for {path:?}: {message}")]
    Render { path: PathBuf, message: String },

    /// Invalid caller-supplied parameters
    #[error("Invalid parameters: {message}")]
    InvalidParameters { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    SerdeError(String),

    /// One or more files or sizes of a batch failed
    #[error("{profile} batch failed: {} of {} outputs failed", .failures.len(), .failures.len() + .rendered)]
    BatchFailed {
        profile: String,
        rendered: usize,
        failures: Vec<TaskFailure>,
    },

    /// Runtime errors (task join failures)
    #[error("System error: {message}")]
    System { message: String },
}

/// A single failed unit of work inside a batch.
///
/// `output` is `None` when the failure happened before any output was
/// planned for the file (name split, source read, width query).
#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskFailure {
    pub input: String,
    pub output: Option<PathBuf>,
    pub message: String,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.output {
            Some(output) => write!(f, "{} -> {}: {}", self.input, output.display(), self.message),
            None => write!(f, "{}: {}", self.input, self.message),
        }
    }
}

impl DerivativeError {
    /// Create a new invalid path error
    pub fn invalid_path<P: Into<PathBuf>>(path: P) -> Self {
        Self::InvalidPath { path: path.into() }
    }

    /// Create a new source stat error
    pub fn source_stat<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::SourceStat {
            path: path.into(),
            source,
        }
    }

    /// Create a new source read error
    pub fn source_read<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::SourceRead {
            path: path.into(),
            source,
        }
    }

    /// Create a new directory access error
    pub fn directory_access<P: Into<PathBuf>, S: Into<String>>(path: P, message: S) -> Self {
        Self::DirectoryAccess {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new render error
    pub fn render<P: Into<PathBuf>, S: Into<String>>(path: P, message: S) -> Self {
        Self::Render {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new invalid parameters error
    pub fn invalid_parameters<S: Into<String>>(message: S) -> Self {
        Self::InvalidParameters {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new system error
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    /// Whether this error aborts a batch before any rendering starts
    pub fn is_batch_fatal(&self) -> bool {
        match self {
            Self::DirectoryAccess { .. }
            | Self::SourceStat { .. }
            | Self::ConfigError { .. }
            | Self::InvalidParameters { .. }
            | Self::SerdeError(_)
            | Self::System { .. } => true,

            // Scoped to one file or one size; siblings keep going
            Self::InvalidPath { .. }
            | Self::SourceRead { .. }
            | Self::Render { .. } => false,

            // Reported after every sibling completed
            Self::BatchFailed { .. } => false,
        }
    }

    /// Get the associated file path if available
    pub fn file_path(&self) -> Option<&PathBuf> {
        match self {
            Self::InvalidPath { path }
            | Self::SourceStat { path, .. }
            | Self::SourceRead { path, .. }
            | Self::DirectoryAccess { path, .. }
            | Self::Render { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::SourceStat { path, .. } => {
                format!("Source {} does not exist under the source root", path.display())
            }
            Self::DirectoryAccess { path, message } => format!(
                "Output directory {} is not usable ({}). Output directories must exist before a run.",
                path.display(),
                message
            ),
            Self::BatchFailed {
                profile,
                rendered,
                failures,
            } => {
                let mut msg = format!(
                    "{} batch finished with {} failure(s); {} output(s) were written and left in place",
                    profile,
                    failures.len(),
                    rendered
                );
                for failure in failures {
                    msg.push_str("\n  ");
                    msg.push_str(&failure.to_string());
                }
                msg
            }
            other => other.to_string(),
        }
    }
}

impl From<toml::de::Error> for DerivativeError {
    fn from(err: toml::de::Error) -> Self {
        Self::SerdeError(format!("TOML parsing error: {}", err))
    }
}

impl From<serde_yaml::Error> for DerivativeError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::SerdeError(format!("YAML parsing error: {}", err))
    }
}
