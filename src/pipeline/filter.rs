//! # Transcript Filtering
//!
//! Two defenses between the recognition model and the call: a fixed-list
//! hallucination filter for text the model emits over silence or music,
//! and a per-call duplicate cache that suppresses a transcript repeated
//! within a short window.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Phrases the recognition model is known to emit without corresponding
/// speech. Compared against normalized text, exact match only.
const FILLER_PHRASES: &[&str] = &[
    // Common video/caption artifacts
    "thank you",
    "thanks for watching",
    "subscribing",
    "subscribe",
    "please like and subscribe",
    "like and subscribe",
    // Subtitle credits the model memorized
    "subtitle",
    "subtitles",
    "amara.org",
    "www.mooji.org",
    // Single words emitted over near-silence
    "you",
    "th",
    "the",
    // Music/sound markers
    "music",
    "[music]",
    "(music)",
    "♪",
    "♫",
    // Bare interjections
    "um",
    "uh",
    "hmm",
    "mm",
    "ah",
    "oh",
    "eh",
];

/// Normalize a transcript for filtering and duplicate comparison:
/// lowercase, with surrounding whitespace and sentence punctuation removed.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .trim_matches(|c: char| matches!(c, ' ' | '.' | '?' | '!'))
        .to_string()
}

/// True if the text is likely a hallucination rather than speech.
///
/// Rejects empty or near-empty output and exact matches against the
/// filler-phrase list.
pub fn is_hallucination(text: &str) -> bool {
    let clean = normalize(text);

    if clean.is_empty() || clean.chars().count() < 2 {
        return true;
    }

    if FILLER_PHRASES.contains(&clean.as_str()) {
        debug!("Filtered hallucination: '{}'", text);
        return true;
    }

    false
}

/// Per-call cache of recently accepted transcripts.
///
/// ## Concurrency:
/// Multiple pipelines for the same call can run at once; the whole map sits
/// behind one Mutex and each lookup holds it only for the prune-and-check.
///
/// ## Expiry:
/// Entries are pruned lazily at lookup time. An entry older than the window
/// is never consulted even if it has not been purged yet.
pub struct DuplicateCache {
    window: Duration,
    /// call_id -> (normalized transcript -> time of last acceptance)
    entries: Mutex<HashMap<String, HashMap<String, Instant>>>,
}

impl DuplicateCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Check a normalized transcript against the call's recent history.
    ///
    /// Returns true (suppress) if the same text was accepted within the
    /// window; the stored timestamp is NOT refreshed in that case, so a
    /// phrase repeated every few seconds re-emerges once per window rather
    /// than being silenced forever. Otherwise records the text as accepted
    /// now and returns false.
    pub fn check_and_record(&self, call_id: &str, text: &str) -> bool {
        self.check_and_record_at(call_id, text, Instant::now())
    }

    fn check_and_record_at(&self, call_id: &str, text: &str, now: Instant) -> bool {
        let mut entries = self.entries.lock().unwrap();

        if let Some(call_entries) = entries.get_mut(call_id) {
            call_entries.retain(|_, accepted| now.saturating_duration_since(*accepted) < self.window);

            if call_entries.contains_key(text) {
                debug!("Duplicate transcript suppressed: '{}'", text);
                return true;
            }
        }

        entries
            .entry(call_id.to_string())
            .or_default()
            .insert(text.to_string(), now);

        false
    }
}
