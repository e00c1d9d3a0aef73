//! # Audio Module
//!
//! Inbound audio handling between the WebSocket and the transcription
//! pipeline: per-connection accumulation, immutable snapshots, and
//! voice-activity gating.
//!
//! ## Audio Format:
//! - **Sample Rate**: configurable, 16kHz by default
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers

pub mod accumulator; // Threshold-based per-connection buffering
pub mod snapshot; // Immutable captured audio windows
pub mod vad; // Adaptive speech/silence gate

pub use accumulator::AudioAccumulator;
pub use snapshot::AudioSnapshot;
pub use vad::VoiceActivityGate;
