//! # Error Handling
//!
//! Error types for the transcription-translation pipeline.
//!
//! ## Propagation policy:
//! No pipeline error terminates a connection. Recognition failures surface
//! as an error event to the call, translation failures degrade to a
//! placeholder string, cleanup failures are retried and then abandoned with
//! a log entry. Only a transport-level disconnect removes a participant.

use std::fmt;

/// Failure of the speech-recognition collaborator.
///
/// Surfaced to the call as an error event with code `STT_ERROR`; the
/// pipeline does not retry the snapshot and future snapshots are unaffected.
#[derive(Debug)]
pub enum RecognitionError {
    /// Audio artifact could not be read back
    BadArtifact(String),
    /// Model inference failed
    Inference(String),
}

impl fmt::Display for RecognitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognitionError::BadArtifact(msg) => write!(f, "Bad audio artifact: {}", msg),
            RecognitionError::Inference(msg) => write!(f, "Recognition failed: {}", msg),
        }
    }
}

impl std::error::Error for RecognitionError {}

/// Failure of the translation collaborator.
///
/// Never aborts an event: the coordinator substitutes the matching
/// placeholder string and still emits the transcription with the source
/// text populated.
#[derive(Debug)]
pub enum TranslationError {
    /// No model could be loaded for the requested language pair
    ModelUnavailable(String),
    /// Model inference failed
    Inference(String),
}

impl TranslationError {
    /// Placeholder shown in place of the translated text.
    pub fn placeholder(&self) -> &'static str {
        match self {
            TranslationError::ModelUnavailable(_) => "[Translation Model Unavailable]",
            TranslationError::Inference(_) => "[Translation Failed]",
        }
    }
}

impl fmt::Display for TranslationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslationError::ModelUnavailable(pair) => {
                write!(f, "Translation model unavailable for {}", pair)
            }
            TranslationError::Inference(msg) => write!(f, "Translation failed: {}", msg),
        }
    }
}

impl std::error::Error for TranslationError {}

/// Pipeline-level failure for one snapshot.
///
/// Determines which error event (if any) the coordinator broadcasts.
#[derive(Debug)]
pub enum PipelineError {
    /// Recognition collaborator failed (broadcast as `STT_ERROR`)
    Recognition(RecognitionError),
    /// Anything else that escaped a pipeline step (broadcast as `PROCESSING_ERROR`)
    Internal(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Recognition(err) => write!(f, "{}", err),
            PipelineError::Internal(msg) => write!(f, "Internal processing error: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<RecognitionError> for PipelineError {
    fn from(err: RecognitionError) -> Self {
        PipelineError::Recognition(err)
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        PipelineError::Internal(format!("Worker task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translation_placeholders() {
        let err = TranslationError::ModelUnavailable("en-xx".to_string());
        assert_eq!(err.placeholder(), "[Translation Model Unavailable]");

        let err = TranslationError::Inference("tensor shape".to_string());
        assert_eq!(err.placeholder(), "[Translation Failed]");
    }

    #[test]
    fn test_pipeline_error_display() {
        let err = PipelineError::from(RecognitionError::Inference("decode".to_string()));
        assert_eq!(err.to_string(), "Recognition failed: decode");

        let err = PipelineError::Internal("oops".to_string());
        assert!(err.to_string().contains("Internal processing error"));
    }
}
