//! # Speech Recognition
//!
//! The recognition collaborator boundary: the pipeline hands over the path
//! of a self-describing audio artifact plus a language hint and decoding
//! parameters, and gets text back. The production implementation runs a
//! Whisper model through Candle-rs; tests substitute fixed-output fakes.

pub mod model;

pub use model::WhisperRecognizer;

use crate::config::RecognitionConfig;
use crate::error::RecognitionError;
use std::path::Path;

/// Decoding parameters forwarded to the recognition engine.
#[derive(Debug, Clone)]
pub struct RecognitionParams {
    /// Decoding beam width; bounds the decode fallback budget
    pub beam_width: usize,
    /// Probability above which a chunk is treated as containing no speech
    pub no_speech_threshold: f32,
    /// Silence runs longer than this are collapsed before decoding
    pub min_silence_ms: u64,
}

impl From<&RecognitionConfig> for RecognitionParams {
    fn from(config: &RecognitionConfig) -> Self {
        Self {
            beam_width: config.beam_size,
            no_speech_threshold: config.no_speech_threshold,
            min_silence_ms: config.min_silence_duration_ms,
        }
    }
}

/// Speech-to-text collaborator.
///
/// Calls are CPU-bound and synchronous; the pipeline always invokes them
/// on the blocking worker pool, never on a connection's scheduling path.
pub trait Recognizer: Send + Sync {
    /// Transcribe the audio artifact at `audio_path`.
    ///
    /// An empty string is a valid result (nothing recognizable was said);
    /// errors are reserved for the engine itself failing.
    fn recognize(
        &self,
        audio_path: &Path,
        language_hint: &str,
        params: &RecognitionParams,
    ) -> Result<String, RecognitionError>;
}
