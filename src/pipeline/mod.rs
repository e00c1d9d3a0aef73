//! # Transcription Pipeline
//!
//! Everything between a captured audio snapshot and the events a call
//! receives: the per-snapshot coordinator, the hallucination/duplicate
//! filters, and the result broadcaster.

pub mod broadcaster; // Event fan-out through the session registry
pub mod coordinator; // Per-snapshot orchestration
pub mod filter; // Hallucination and duplicate suppression

pub use broadcaster::ResultBroadcaster;
pub use coordinator::{CallRoute, PipelineCoordinator};
