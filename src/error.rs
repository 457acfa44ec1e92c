// Engine error taxonomy
// Every fallible engine operation reports exactly one of these variants

use thiserror::Error;

use crate::types::DataType;

/// Execution mode an algorithm is registered under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Mode {
    /// Single-shot, caller-managed buffers
    Batch,
    /// Connected dataflow graph driven by the scheduler
    Streaming,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Batch => write!(f, "batch"),
            Mode::Streaming => write!(f, "streaming"),
        }
    }
}

/// Errors raised by registration, construction, binding and execution
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{mode} algorithm '{name}' is already registered")]
    DuplicateName { mode: Mode, name: String },

    #[error("unknown {mode} algorithm '{name}'")]
    UnknownAlgorithm { mode: Mode, name: String },

    #[error("invalid parameter '{parameter}' for '{algorithm}': {reason}")]
    InvalidParameter {
        algorithm: String,
        parameter: String,
        reason: String,
    },

    #[error("'{algorithm}' has no port named '{port}'")]
    UnknownPort { algorithm: String, port: String },

    #[error("type mismatch on port '{port}': expected {expected}, found {found}")]
    TypeMismatch {
        port: String,
        expected: DataType,
        found: DataType,
    },

    #[error("{algorithm}: {message}")]
    Computation { algorithm: String, message: String },

    #[error("scheduling error: {0}")]
    Scheduling(String),

    #[error("streaming run was cancelled")]
    Cancelled,

    #[error("engine is not initialized")]
    NotInitialized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Shorthand for a computation failure inside a named algorithm
    pub fn computation(algorithm: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Computation {
            algorithm: algorithm.into(),
            message: message.into(),
        }
    }

    pub fn invalid_parameter(
        algorithm: impl Into<String>,
        parameter: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        EngineError::InvalidParameter {
            algorithm: algorithm.into(),
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    pub fn unknown_port(algorithm: impl Into<String>, port: impl Into<String>) -> Self {
        EngineError::UnknownPort {
            algorithm: algorithm.into(),
            port: port.into(),
        }
    }

    /// Whether a caller may retry the failing operation with corrected input
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            EngineError::DuplicateName { .. }
                | EngineError::Scheduling(_)
                | EngineError::Cancelled
                | EngineError::NotInitialized
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
