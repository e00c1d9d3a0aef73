//! # Audio Accumulator
//!
//! Per-connection buffer that collects inbound PCM until a configured
//! byte threshold is crossed, then releases the collected bytes as one
//! immutable snapshot for the transcription pipeline.

use crate::audio::snapshot::AudioSnapshot;
use crate::config::AudioConfig;

/// Threshold-based accumulation buffer for one connection.
///
/// ## Atomicity:
/// `append` is called only from the owning connection's receive loop, so
/// the take-and-clear on threshold crossing is a single logical step from
/// that loop's point of view: no byte can land in two snapshots or fall
/// between them.
pub struct AudioAccumulator {
    buffer: Vec<u8>,
    threshold_bytes: usize,
    sample_rate: u32,
    channels: u16,
    sample_width: u16,
}

impl AudioAccumulator {
    pub fn new(config: &AudioConfig) -> Self {
        let threshold_bytes = config.buffer_threshold_bytes();
        Self {
            buffer: Vec::with_capacity(threshold_bytes),
            threshold_bytes,
            sample_rate: config.sample_rate,
            channels: config.channels,
            sample_width: config.sample_width,
        }
    }

    /// Append inbound bytes; returns a snapshot when the threshold is crossed.
    ///
    /// The snapshot takes ownership of everything buffered so far (length is
    /// therefore >= the threshold) and the live buffer restarts empty, so
    /// bytes arriving after the crossing land in the next window.
    pub fn append(&mut self, data: &[u8]) -> Option<AudioSnapshot> {
        self.buffer.extend_from_slice(data);

        if self.buffer.len() < self.threshold_bytes {
            return None;
        }

        let captured = std::mem::take(&mut self.buffer);
        Some(AudioSnapshot::new(
            captured,
            self.sample_rate,
            self.channels,
            self.sample_width,
        ))
    }

    /// Bytes currently buffered (below the threshold).
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub fn threshold_bytes(&self) -> usize {
        self.threshold_bytes
    }
}
