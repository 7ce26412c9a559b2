//! Error types for sceneflow-eval.

use thiserror::Error;

/// Domain errors raised by the evaluation driver.
///
/// Everything else travels as `anyhow::Error`; the binary downcasts to this
/// type to decide how the process should end.
#[derive(Error, Debug)]
pub enum EvalError {
    /// No model is registered under the requested name.
    #[error("unknown model '{name}' (available: {})", available.join(", "))]
    UnknownModel {
        /// Requested name.
        name: String,
        /// Registered names.
        available: Vec<&'static str>,
    },

    /// The configuration parsed but is not usable.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// What is wrong with it.
        message: String,
    },

    /// A batch or sample is missing a required entry.
    #[error("missing '{key}' in {context}")]
    MissingKey {
        /// The missing key.
        key: String,
        /// Where it was looked up.
        context: String,
    },

    /// Tensor shape mismatch.
    #[error("tensor shape mismatch for {name}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Tensor being checked.
        name: String,
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape.
        got: Vec<usize>,
    },

    /// The renderer was not compiled in.
    #[error("visualization support is not compiled in")]
    VisualizationUnavailable,

    /// The user asked the run to stop.
    #[error("evaluation interrupted")]
    Interrupted,
}

impl EvalError {
    /// Shorthand for [`EvalError::InvalidConfig`].
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Whether the process should end quietly with success status.
    pub fn is_quiet_exit(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}
