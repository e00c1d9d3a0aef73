//! # Translation
//!
//! The translation collaborator boundary. The production implementation
//! runs MarianMT language-pair models through Candle-rs with a per-pair
//! cache; tests substitute dictionary fakes.

pub mod engine;

pub use engine::MarianTranslator;

use crate::error::TranslationError;

/// Text-to-text translation collaborator.
///
/// ## Contract:
/// `translate` MUST return the input unchanged when `source_lang ==
/// target_lang` or when the text is empty — no model is consulted in
/// either case. Calls are CPU-bound and run on the blocking worker pool.
pub trait Translator: Send + Sync {
    fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, TranslationError>;
}
