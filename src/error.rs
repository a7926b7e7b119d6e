use std::fmt;
use std::path::PathBuf;

/// Result type for qforge operations
pub type Result<T> = std::result::Result<T, QforgeError>;

/// Main error type for the qforge library
#[derive(Debug)]
pub enum QforgeError {
    /// Structurally invalid layer specification at build time
    IncoherentBuildModel(String),

    /// Requested backend identifier is not registered
    UnsupportedLibrary(String),

    /// Expected checkpoint file is absent
    MissingCheckpoint(PathBuf),

    /// Invalid parameter value at construction
    InvalidParameter {
        name: String,
        reason: String,
    },

    /// Every action in the action set was excluded from selection
    AllActionsExcluded,

    /// Restored weights do not fit the rebuilt graph
    DimensionMismatch {
        expected: String,
        actual: String,
    },

    /// IO errors (file operations)
    Io(String),

    /// Serialization/deserialization errors
    Serialization(String),

    /// Numerical computation errors
    Numerical(String),
}

impl fmt::Display for QforgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QforgeError::IncoherentBuildModel(msg) => {
                write!(f, "Incoherent build model: {}", msg)
            }
            QforgeError::UnsupportedLibrary(lib) => {
                write!(f, "Unsupported backend library '{}'", lib)
            }
            QforgeError::MissingCheckpoint(path) => {
                write!(f, "Checkpoint file {} was not found", path.display())
            }
            QforgeError::InvalidParameter { name, reason } => {
                write!(f, "Invalid parameter '{}': {}", name, reason)
            }
            QforgeError::AllActionsExcluded => {
                write!(f, "Every action in the action set is excluded")
            }
            QforgeError::DimensionMismatch { expected, actual } => {
                write!(f, "Dimension mismatch: expected {}, got {}", expected, actual)
            }
            QforgeError::Io(msg) => write!(f, "IO error: {}", msg),
            QforgeError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            QforgeError::Numerical(msg) => write!(f, "Numerical error: {}", msg),
        }
    }
}

impl std::error::Error for QforgeError {}

impl From<std::io::Error> for QforgeError {
    fn from(err: std::io::Error) -> Self {
        QforgeError::Io(err.to_string())
    }
}

impl From<bincode::Error> for QforgeError {
    fn from(err: bincode::Error) -> Self {
        QforgeError::Serialization(err.to_string())
    }
}

impl QforgeError {
    pub fn invalid_parameter<S: Into<String>>(name: S, reason: S) -> Self {
        QforgeError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn dimension_mismatch<S: Into<String>>(expected: S, actual: S) -> Self {
        QforgeError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
