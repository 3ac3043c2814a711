use std::path::PathBuf;

use thiserror::Error;

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, LangIdError>;

/// Errors raised by the training pipeline and the runtime classifier
#[derive(Error, Debug)]
pub enum LangIdError {
    /// Missing or malformed inputs, empty corpora, incompatible options,
    /// unknown labels
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O failure on a known path
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O failure without a path attached
    #[error("I/O error: {0}")]
    RawIo(#[from] std::io::Error),

    /// Truncated or inconsistent intermediate files
    #[error("corrupt intermediate data: {0}")]
    Corrupt(String),

    /// The model blob could not be decoded
    #[error("invalid model: {0}")]
    ModelFormat(String),

    /// A pool task failed; the pass it belonged to is aborted
    #[error("worker failed on {task}: {source}")]
    Worker {
        task: String,
        #[source]
        source: Box<LangIdError>,
    },

    #[error("record codec error: {0}")]
    Record(#[from] bincode::Error),

    #[error("CBOR error: {0}")]
    Cbor(#[from] serde_cbor::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl LangIdError {
    pub fn config(msg: impl Into<String>) -> Self {
        LangIdError::Config(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        LangIdError::Corrupt(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        LangIdError::ModelFormat(msg.into())
    }

    /// Attach a path to an `io::Error`
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LangIdError::Io { path: path.into(), source }
    }

    /// Wrap an error raised inside a pool task
    pub fn worker(task: impl Into<String>, source: LangIdError) -> Self {
        LangIdError::Worker { task: task.into(), source: Box::new(source) }
    }

    /// Configuration errors are never retried and map to exit code 2 in the binary
    pub fn is_config(&self) -> bool {
        match self {
            LangIdError::Config(_) => true,
            LangIdError::Worker { source, .. } => source.is_config(),
            _ => false,
        }
    }
}

/// Attach a path to io results, `fs::read(p).at(p)?`
pub(crate) trait IoResultExt<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| LangIdError::io(path, e))
    }
}
