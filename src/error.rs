//! Error taxonomy shared by the engine, the worker boundary and the client
//!
//! Every variant is serializable so an engine-side failure can cross the
//! worker boundary and be re-raised on the client with its kind intact.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used by the engine and client APIs
pub type OcrResult<T> = std::result::Result<T, OcrError>;

/// Errors surfaced by engine, worker and client operations
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum OcrError {
    /// Bad variable name or value
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Trained-model payload was rejected
    #[error("failed to load model: {0}")]
    ModelLoad(String),
    /// Pixel buffer was rejected
    #[error("failed to load image: {0}")]
    ImageLoad(String),
    /// Operation ran in the wrong engine state
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    /// Recognizer failed while analyzing an already loaded page
    #[error("recognition failed: {0}")]
    Recognition(String),
    /// Worker boundary is unreachable or crashed
    #[error("transport error: {0}")]
    Transport(String),
    /// Operation attempted after teardown
    #[error("engine has been destroyed")]
    Destroyed,
}

/// Unmet engine state requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreconditionError {
    #[error("no model is loaded")]
    ModelNotLoaded,
    #[error("no image is loaded")]
    ImageNotLoaded,
}

impl OcrError {
    /// True for `Precondition(ModelNotLoaded)`
    pub fn is_model_not_loaded(&self) -> bool {
        matches!(self, OcrError::Precondition(PreconditionError::ModelNotLoaded))
    }

    /// True for `Precondition(ImageNotLoaded)`
    pub fn is_image_not_loaded(&self) -> bool {
        matches!(self, OcrError::Precondition(PreconditionError::ImageNotLoaded))
    }

    /// Build a transport error from anything printable
    pub fn transport(message: impl std::fmt::Display) -> Self {
        OcrError::Transport(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_display() {
        let err: OcrError = PreconditionError::ModelNotLoaded.into();
        assert_eq!(err.to_string(), "no model is loaded");
        assert!(err.is_model_not_loaded());
        assert!(!err.is_image_not_loaded());
    }

    #[test]
    fn test_error_survives_serialization() {
        let errors = vec![
            OcrError::ModelLoad("bad magic".to_string()),
            OcrError::Precondition(PreconditionError::ImageNotLoaded),
            OcrError::Destroyed,
        ];

        for err in errors {
            let json = serde_json::to_string(&err).unwrap();
            let parsed: OcrError = serde_json::from_str(&json).unwrap();
            assert_eq!(err, parsed);
        }
    }

    #[test]
    fn test_error_wire_shape() {
        let json = serde_json::to_value(OcrError::Configuration("x".to_string())).unwrap();
        assert_eq!(json["kind"], "configuration");
        assert_eq!(json["message"], "x");
    }
}
