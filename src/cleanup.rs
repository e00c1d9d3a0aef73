//! # Temp Artifact Lifecycle
//!
//! Every snapshot that reaches the pipeline is materialized as a uniquely
//! named WAV file so the recognition model can read a self-describing
//! container. This module owns that directory: artifact creation, delayed
//! retried deletion, and a startup sweep for anything a previous run left
//! behind.

use crate::audio::snapshot::AudioSnapshot;
use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Scoped manager for transient audio artifacts.
pub struct TempStore {
    dir: PathBuf,
}

impl TempStore {
    /// Open (creating if needed) the artifact directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create temp directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Write a snapshot as a WAV artifact and return its path.
    ///
    /// The filename embeds the call and language for log traceability plus
    /// a UUID so concurrent pipelines never collide.
    pub fn write_artifact(
        &self,
        snapshot: &AudioSnapshot,
        call_id: &str,
        source_lang: &str,
    ) -> Result<PathBuf> {
        let filename = format!(
            "stt_{}_{}_{}.wav",
            call_id,
            source_lang,
            Uuid::new_v4().simple()
        );
        let path = self.dir.join(filename);

        let spec = hound::WavSpec {
            channels: snapshot.channels,
            sample_rate: snapshot.sample_rate,
            bits_per_sample: snapshot.sample_width * 8,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("Failed to create artifact {}", path.display()))?;
        for sample in snapshot.samples() {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;

        debug!("Saved audio to {} ({} bytes)", path.display(), snapshot.len());
        Ok(path)
    }

    /// Schedule deletion of an artifact as its own deferred task.
    ///
    /// Waits `delay`, then attempts deletion with up to `max_retries`
    /// attempts spaced by the same delay. An already-absent file counts as
    /// success. Exhausted retries are logged and abandoned; nothing
    /// propagates back to the pipeline that scheduled the cleanup.
    pub fn schedule(&self, path: PathBuf, delay: Duration, max_retries: u32) {
        tokio::spawn(async move {
            Self::remove_with_retry(&path, delay, max_retries).await;
        });
    }

    /// Delayed, retried deletion; returns whether the file is gone.
    pub async fn remove_with_retry(path: &Path, delay: Duration, max_retries: u32) -> bool {
        tokio::time::sleep(delay).await;

        for attempt in 1..=max_retries {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    debug!("Deleted artifact {}", path.display());
                    return true;
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!("Artifact already deleted: {}", path.display());
                    return true;
                }
                Err(err) if attempt < max_retries => {
                    warn!(
                        "Cleanup attempt {} failed for {}: {}. Retrying...",
                        attempt,
                        path.display(),
                        err
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    error!(
                        "Failed to delete {} after {} attempts: {}",
                        path.display(),
                        max_retries,
                        err
                    );
                }
            }
        }

        false
    }

    /// Delete artifacts older than `max_age`; returns how many went.
    ///
    /// Run at startup so files orphaned by a crash do not accumulate.
    pub fn sweep_stale(&self, max_age: Duration) -> usize {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("Could not scan temp directory {}: {}", self.dir.display(), err);
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let age = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .ok()
                .and_then(|modified| modified.elapsed().ok());

            if let Some(age) = age {
                if age > max_age && std::fs::remove_file(&path).is_ok() {
                    removed += 1;
                    debug!("Swept stale artifact {} (age {:?})", path.display(), age);
                }
            }
        }

        if removed > 0 {
            info!("Swept {} stale artifacts from {}", removed, self.dir.display());
        }

        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> AudioSnapshot {
        let samples: Vec<i16> = (0..1600).map(|i| (i % 128) as i16 * 100).collect();
        let mut data = Vec::with_capacity(samples.len() * 2);
        for sample in &samples {
            data.extend_from_slice(&sample.to_le_bytes());
        }
        AudioSnapshot::new(data, 16000, 1, 2)
    }

    #[test]
    fn test_artifact_is_valid_wav() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempStore::new(dir.path()).unwrap();

        let path = store.write_artifact(&snapshot(), "abc", "en").unwrap();
        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("stt_abc_en_"));
        assert!(name.ends_with(".wav"));

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), 1600);
    }

    #[test]
    fn test_unique_artifact_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempStore::new(dir.path()).unwrap();

        let a = store.write_artifact(&snapshot(), "abc", "en").unwrap();
        let b = store.write_artifact(&snapshot(), "abc", "en").unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_delayed_removal() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempStore::new(dir.path()).unwrap();
        let path = store.write_artifact(&snapshot(), "abc", "en").unwrap();

        assert!(TempStore::remove_with_retry(&path, Duration::from_millis(1), 3).await);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_absent_file_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not_there.wav");

        assert!(TempStore::remove_with_retry(&missing, Duration::from_millis(1), 3).await);
    }

    #[test]
    fn test_stale_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempStore::new(dir.path()).unwrap();
        let path = store.write_artifact(&snapshot(), "abc", "en").unwrap();

        // Zero max-age: everything already written counts as stale
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.sweep_stale(Duration::ZERO), 1);
        assert!(!path.exists());
    }
}
