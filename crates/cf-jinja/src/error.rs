//! Error types for cf-jinja

use thiserror::Error;

/// Templating errors
#[derive(Error, Debug)]
pub enum JinjaError {
    /// Template render error (J001)
    #[error("[J001] Jinja render error: {0}")]
    RenderError(String),

    /// Unknown variable (J002)
    #[error("[J002] Undefined variable '{name}'. Define it in vars: section of cdmflow.yml")]
    UnknownVariable { name: String },

    /// No statement template registered under this name (J003)
    #[error("[J003] Unknown statement template '{name}' for dialect '{dialect}'")]
    UnknownTemplate { name: String, dialect: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for JinjaError
pub type JinjaResult<T> = Result<T, JinjaError>;

impl From<minijinja::Error> for JinjaError {
    fn from(err: minijinja::Error) -> Self {
        // `{:#}` includes the template source location in the message
        JinjaError::RenderError(format!("{:#}", err))
    }
}
