//! # Audio Snapshots
//!
//! An immutable byte capture of one accumulation window, tagged with the
//! stream format so downstream stages can interpret it without consulting
//! configuration again.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// One captured window of raw little-endian 16-bit PCM.
///
/// ## Ownership:
/// The snapshot owns its bytes outright. The accumulator that produced it
/// swapped its live buffer away rather than aliasing it, so a snapshot can
/// cross task boundaries freely while the connection keeps buffering.
#[derive(Debug, Clone)]
pub struct AudioSnapshot {
    data: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Sample width in bytes (2 = 16-bit)
    pub sample_width: u16,
}

impl AudioSnapshot {
    pub fn new(data: Vec<u8>, sample_rate: u32, channels: u16, sample_width: u16) -> Self {
        Self {
            data,
            sample_rate,
            channels,
            sample_width,
        }
    }

    /// Raw PCM bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Duration of the captured audio in seconds.
    pub fn duration_seconds(&self) -> f64 {
        let sample_count = self.data.len() / self.sample_width as usize;
        sample_count as f64 / self.sample_rate as f64
    }

    /// Decode the bytes as 16-bit signed samples (little-endian).
    ///
    /// A trailing odd byte, if a client ever sends one, is ignored.
    pub fn samples(&self) -> Vec<i16> {
        let mut cursor = Cursor::new(self.data.as_slice());
        let mut samples = Vec::with_capacity(self.data.len() / 2);

        while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
            samples.push(sample);
        }

        samples
    }

    /// Decode and normalize samples to [-1.0, 1.0].
    pub fn normalized_samples(&self) -> Vec<f32> {
        self.samples()
            .iter()
            .map(|&sample| sample as f32 / 32768.0)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_from_samples(samples: &[i16]) -> AudioSnapshot {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            data.extend_from_slice(&sample.to_le_bytes());
        }
        AudioSnapshot::new(data, 16000, 1, 2)
    }

    #[test]
    fn test_sample_decoding() {
        let snapshot = snapshot_from_samples(&[0, 16384, -16384, i16::MAX, i16::MIN]);
        assert_eq!(snapshot.samples(), vec![0, 16384, -16384, i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_normalization_range() {
        let snapshot = snapshot_from_samples(&[0, i16::MAX, i16::MIN]);
        let normalized = snapshot.normalized_samples();
        assert_eq!(normalized[0], 0.0);
        assert!((normalized[1] - 0.99997).abs() < 1e-4);
        assert_eq!(normalized[2], -1.0);
    }

    #[test]
    fn test_duration() {
        // 16000 samples at 16kHz = 1 second
        let snapshot = snapshot_from_samples(&vec![0i16; 16000]);
        assert!((snapshot.duration_seconds() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_odd_byte_ignored() {
        let snapshot = AudioSnapshot::new(vec![0, 0, 7], 16000, 1, 2);
        assert_eq!(snapshot.samples(), vec![0]);
    }
}
