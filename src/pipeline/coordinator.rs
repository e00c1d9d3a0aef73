//! # Transcription Pipeline Coordinator
//!
//! Orchestrates one snapshot's journey: temp artifact, voice-activity
//! gate, recognition, hallucination and duplicate filtering, translation,
//! and result broadcast. Each snapshot runs as its own spawned task so a
//! slow model never blocks a connection's receive loop, and the temp
//! artifact is reclaimed no matter how the pipeline ends.

use crate::audio::{AudioSnapshot, VoiceActivityGate};
use crate::cleanup::TempStore;
use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::pipeline::broadcaster::ResultBroadcaster;
use crate::pipeline::filter::{self, DuplicateCache};
use crate::recognition::{RecognitionParams, Recognizer};
use crate::session::SessionRegistry;
use crate::state::SharedMetrics;
use crate::translation::Translator;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Addressing of one connection's audio within a call.
#[derive(Debug, Clone)]
pub struct CallRoute {
    pub call_id: String,
    pub source_lang: String,
    pub target_lang: String,
}

/// Orchestrator for per-snapshot transcription-translation runs.
///
/// One coordinator exists per process; it owns the process-wide gate
/// statistics and duplicate cache, and holds the collaborators behind
/// trait objects so tests can substitute fakes.
pub struct PipelineCoordinator {
    broadcaster: ResultBroadcaster,
    recognizer: Arc<dyn Recognizer>,
    translator: Arc<dyn Translator>,
    gate: VoiceActivityGate,
    duplicates: DuplicateCache,
    temp: Arc<TempStore>,
    metrics: SharedMetrics,
    min_chunk_bytes: usize,
    params: RecognitionParams,
    cleanup_delay: Duration,
    cleanup_retries: u32,
}

impl PipelineCoordinator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        recognizer: Arc<dyn Recognizer>,
        translator: Arc<dyn Translator>,
        temp: Arc<TempStore>,
        config: &AppConfig,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            broadcaster: ResultBroadcaster::new(registry),
            recognizer,
            translator,
            gate: VoiceActivityGate::new(&config.vad),
            duplicates: DuplicateCache::new(Duration::from_secs(
                config.vad.duplicate_window_seconds,
            )),
            temp,
            metrics,
            min_chunk_bytes: config.audio.min_chunk_size_bytes(),
            params: RecognitionParams::from(&config.recognition),
            cleanup_delay: Duration::from_secs(config.cleanup.delay_seconds),
            cleanup_retries: config.cleanup.max_retries,
        }
    }

    /// Launch the pipeline for one snapshot as an independent task.
    ///
    /// The snapshot moves into the task; the caller keeps no reference to
    /// it. A participant disconnecting later does not cancel the run.
    pub fn spawn(self: &Arc<Self>, snapshot: AudioSnapshot, route: CallRoute) {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            coordinator.run(snapshot, route).await;
        });
    }

    /// Run the pipeline for one snapshot to completion.
    pub async fn run(&self, snapshot: AudioSnapshot, route: CallRoute) {
        debug!(
            "Received audio chunk: {} bytes for call {}",
            snapshot.len(),
            route.call_id
        );

        // Under-size snapshots are dropped before any artifact exists
        if snapshot.len() < self.min_chunk_bytes {
            debug!(
                "Skipping chunk: too small ({} bytes, minimum: {})",
                snapshot.len(),
                self.min_chunk_bytes
            );
            return;
        }

        self.metrics.write().unwrap().pipelines_started += 1;

        let artifact =
            match self
                .temp
                .write_artifact(&snapshot, &route.call_id, &route.source_lang)
            {
                Ok(path) => path,
                Err(err) => {
                    error!("Failed to save audio chunk: {:#}", err);
                    return;
                }
            };

        let outcome = self.process(&artifact, &snapshot, &route).await;

        if let Err(err) = outcome {
            error!("Pipeline error for call {}: {}", route.call_id, err);
            self.metrics.write().unwrap().pipelines_failed += 1;

            let (message, code) = match &err {
                PipelineError::Recognition(cause) => {
                    (format!("Transcription failed: {}", cause), "STT_ERROR")
                }
                PipelineError::Internal(_) => {
                    ("Internal processing error".to_string(), "PROCESSING_ERROR")
                }
            };
            self.broadcaster
                .broadcast_error(&route.call_id, &message, Some(code));
        }

        // Reclaim the artifact on every path, including failures above
        self.temp
            .schedule(artifact, self.cleanup_delay, self.cleanup_retries);
    }

    async fn process(
        &self,
        artifact: &Path,
        snapshot: &AudioSnapshot,
        route: &CallRoute,
    ) -> Result<(), PipelineError> {
        if !self.gate.is_speech(snapshot) {
            debug!("Audio is silent, skipping transcription");
            self.metrics.write().unwrap().chunks_suppressed += 1;
            return Ok(());
        }

        let text = {
            let recognizer = Arc::clone(&self.recognizer);
            let path = artifact.to_path_buf();
            let language = route.source_lang.clone();
            let params = self.params.clone();

            tokio::task::spawn_blocking(move || recognizer.recognize(&path, &language, &params))
                .await??
        };

        if filter::is_hallucination(&text) {
            debug!("Transcription filtered as hallucination or empty");
            self.metrics.write().unwrap().chunks_suppressed += 1;
            return Ok(());
        }

        let normalized = filter::normalize(&text);
        if self.duplicates.check_and_record(&route.call_id, &normalized) {
            self.metrics.write().unwrap().chunks_suppressed += 1;
            return Ok(());
        }

        let translated = {
            let translator = Arc::clone(&self.translator);
            let source_text = text.clone();
            let source_lang = route.source_lang.clone();
            let target_lang = route.target_lang.clone();

            tokio::task::spawn_blocking(move || {
                translator.translate(&source_text, &source_lang, &target_lang)
            })
            .await?
        };

        // Translation failure degrades to a placeholder; the transcription
        // event still goes out with the source text populated
        let translated = match translated {
            Ok(translated) => translated,
            Err(err) => {
                error!("{}", err);
                err.placeholder().to_string()
            }
        };

        info!(
            "[{}] {}: {} -> {}: {}",
            route.call_id, route.source_lang, text, route.target_lang, translated
        );

        self.broadcaster
            .broadcast_transcription(&route.call_id, &text, &translated, &route.source_lang);
        self.metrics.write().unwrap().transcriptions_broadcast += 1;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RecognitionError, TranslationError};
    use crate::events::{OutboundFrame, ServerEvent};
    use crate::state::CallMetrics;
    use crate::testutil::FrameSink;
    use std::sync::RwLock;

    struct FixedRecognizer(&'static str);

    impl Recognizer for FixedRecognizer {
        fn recognize(
            &self,
            _audio_path: &Path,
            _language_hint: &str,
            _params: &RecognitionParams,
        ) -> Result<String, RecognitionError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingRecognizer;

    impl Recognizer for FailingRecognizer {
        fn recognize(
            &self,
            _audio_path: &Path,
            _language_hint: &str,
            _params: &RecognitionParams,
        ) -> Result<String, RecognitionError> {
            Err(RecognitionError::Inference("decode collapsed".to_string()))
        }
    }

    struct DictionaryTranslator;

    impl Translator for DictionaryTranslator {
        fn translate(
            &self,
            text: &str,
            source_lang: &str,
            target_lang: &str,
        ) -> Result<String, TranslationError> {
            if source_lang == target_lang || text.is_empty() {
                return Ok(text.to_string());
            }
            match (text, target_lang) {
                ("hello", "mr") => Ok("नमस्ते".to_string()),
                _ => Ok(format!("[{}] {}", target_lang, text)),
            }
        }
    }

    struct FailingTranslator;

    impl Translator for FailingTranslator {
        fn translate(
            &self,
            _text: &str,
            _source_lang: &str,
            _target_lang: &str,
        ) -> Result<String, TranslationError> {
            Err(TranslationError::Inference("tensor shape".to_string()))
        }
    }

    fn loud_snapshot(duration_secs: f32) -> AudioSnapshot {
        let count = (16000.0 * duration_secs) as usize;
        let samples: Vec<i16> = (0..count)
            .map(|i| if i % 2 == 0 { i16::MAX } else { i16::MIN })
            .collect();
        let mut data = Vec::with_capacity(samples.len() * 2);
        for sample in &samples {
            data.extend_from_slice(&sample.to_le_bytes());
        }
        AudioSnapshot::new(data, 16000, 1, 2)
    }

    fn silent_snapshot(duration_secs: f32) -> AudioSnapshot {
        let count = (16000.0 * duration_secs) as usize * 2;
        AudioSnapshot::new(vec![0u8; count], 16000, 1, 2)
    }

    fn route() -> CallRoute {
        CallRoute {
            call_id: "abc".to_string(),
            source_lang: "en".to_string(),
            target_lang: "mr".to_string(),
        }
    }

    struct Harness {
        registry: Arc<SessionRegistry>,
        coordinator: Arc<PipelineCoordinator>,
        metrics: SharedMetrics,
        _tempdir: tempfile::TempDir,
        temp_path: std::path::PathBuf,
    }

    fn harness(recognizer: Arc<dyn Recognizer>, translator: Arc<dyn Translator>) -> Harness {
        let tempdir = tempfile::tempdir().unwrap();
        let temp_path = tempdir.path().to_path_buf();

        let mut config = AppConfig::default();
        config.cleanup.delay_seconds = 0;

        let registry = Arc::new(SessionRegistry::new());
        let metrics: SharedMetrics = Arc::new(RwLock::new(CallMetrics::default()));
        let temp = Arc::new(TempStore::new(&temp_path).unwrap());

        let coordinator = Arc::new(PipelineCoordinator::new(
            registry.clone(),
            recognizer,
            translator,
            temp,
            &config,
            metrics.clone(),
        ));

        Harness {
            registry,
            coordinator,
            metrics,
            _tempdir: tempdir,
            temp_path,
        }
    }

    fn artifact_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    async fn wait_for_cleanup(dir: &Path) {
        for _ in 0..50 {
            if artifact_count(dir) == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[actix_web::test]
    async fn test_end_to_end_transcription_reaches_both_participants() {
        let h = harness(
            Arc::new(FixedRecognizer("hello")),
            Arc::new(DictionaryTranslator),
        );

        let (a, a_frames) = FrameSink::start();
        let (b, b_frames) = FrameSink::start();
        h.registry.join("abc", "en", a);
        h.registry.join("abc", "mr", b);
        FrameSink::settle().await;
        a_frames.lock().unwrap().clear();
        b_frames.lock().unwrap().clear();

        h.coordinator.run(loud_snapshot(0.5), route()).await;
        FrameSink::settle().await;

        let expected = OutboundFrame::Event(ServerEvent::Transcription {
            source: "hello".to_string(),
            translated: "नमस्ते".to_string(),
            sender: "en".to_string(),
        });
        assert_eq!(a_frames.lock().unwrap().as_slice(), &[expected.clone()]);
        assert_eq!(b_frames.lock().unwrap().as_slice(), &[expected]);

        wait_for_cleanup(&h.temp_path).await;
        assert_eq!(artifact_count(&h.temp_path), 0);

        let metrics = h.metrics.read().unwrap();
        assert_eq!(metrics.pipelines_started, 1);
        assert_eq!(metrics.transcriptions_broadcast, 1);
        assert_eq!(metrics.pipelines_failed, 0);
    }

    #[actix_web::test]
    async fn test_disconnect_mid_pipeline_still_completes() {
        let h = harness(
            Arc::new(FixedRecognizer("hello")),
            Arc::new(DictionaryTranslator),
        );

        let (a, a_frames) = FrameSink::start();
        let (b, b_frames) = FrameSink::start();
        h.registry.join("abc", "en", a);
        h.registry.join("abc", "mr", b);
        FrameSink::settle().await;
        a_frames.lock().unwrap().clear();
        b_frames.lock().unwrap().clear();

        // The speaker disconnects after the snapshot was captured
        h.registry.leave("abc", "en");
        h.coordinator.run(loud_snapshot(0.5), route()).await;
        FrameSink::settle().await;

        assert!(a_frames.lock().unwrap().is_empty());
        let b_frames = b_frames.lock().unwrap();
        assert_eq!(b_frames.len(), 1);
        match &b_frames[0] {
            OutboundFrame::Event(ServerEvent::Transcription { source, .. }) => {
                assert_eq!(source, "hello")
            }
            other => panic!("Unexpected frame: {:?}", other),
        }

        wait_for_cleanup(&h.temp_path).await;
        assert_eq!(artifact_count(&h.temp_path), 0);
    }

    #[actix_web::test]
    async fn test_undersize_snapshot_dropped_silently() {
        let h = harness(
            Arc::new(FixedRecognizer("hello")),
            Arc::new(DictionaryTranslator),
        );

        let (a, a_frames) = FrameSink::start();
        h.registry.join("abc", "en", a);
        FrameSink::settle().await;
        a_frames.lock().unwrap().clear();

        // 0.1s is below the 300ms minimum chunk duration
        h.coordinator.run(loud_snapshot(0.1), route()).await;
        FrameSink::settle().await;

        assert!(a_frames.lock().unwrap().is_empty());
        assert_eq!(artifact_count(&h.temp_path), 0);
        assert_eq!(h.metrics.read().unwrap().pipelines_started, 0);
    }

    #[actix_web::test]
    async fn test_silent_snapshot_emits_nothing_but_cleans_up() {
        let h = harness(
            Arc::new(FixedRecognizer("hello")),
            Arc::new(DictionaryTranslator),
        );

        let (a, a_frames) = FrameSink::start();
        h.registry.join("abc", "en", a);
        FrameSink::settle().await;
        a_frames.lock().unwrap().clear();

        h.coordinator.run(silent_snapshot(0.5), route()).await;
        FrameSink::settle().await;

        assert!(a_frames.lock().unwrap().is_empty());
        assert_eq!(h.metrics.read().unwrap().chunks_suppressed, 1);
        wait_for_cleanup(&h.temp_path).await;
        assert_eq!(artifact_count(&h.temp_path), 0);
    }

    #[actix_web::test]
    async fn test_recognition_failure_broadcasts_error_event() {
        let h = harness(Arc::new(FailingRecognizer), Arc::new(DictionaryTranslator));

        let (a, a_frames) = FrameSink::start();
        h.registry.join("abc", "en", a);
        FrameSink::settle().await;
        a_frames.lock().unwrap().clear();

        h.coordinator.run(loud_snapshot(0.5), route()).await;
        FrameSink::settle().await;

        let frames = a_frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            OutboundFrame::Event(ServerEvent::Error { message, code }) => {
                assert!(message.starts_with("Transcription failed"));
                assert_eq!(code.as_deref(), Some("STT_ERROR"));
            }
            other => panic!("Unexpected frame: {:?}", other),
        }
        drop(frames);

        assert_eq!(h.metrics.read().unwrap().pipelines_failed, 1);
        wait_for_cleanup(&h.temp_path).await;
        assert_eq!(artifact_count(&h.temp_path), 0);
    }

    #[actix_web::test]
    async fn test_translation_failure_degrades_to_placeholder() {
        let h = harness(Arc::new(FixedRecognizer("hello")), Arc::new(FailingTranslator));

        let (a, a_frames) = FrameSink::start();
        h.registry.join("abc", "en", a);
        FrameSink::settle().await;
        a_frames.lock().unwrap().clear();

        h.coordinator.run(loud_snapshot(0.5), route()).await;
        FrameSink::settle().await;

        let frames = a_frames.lock().unwrap();
        match &frames[0] {
            OutboundFrame::Event(ServerEvent::Transcription {
                source, translated, ..
            }) => {
                assert_eq!(source, "hello");
                assert_eq!(translated, "[Translation Failed]");
            }
            other => panic!("Unexpected frame: {:?}", other),
        }
    }

    #[actix_web::test]
    async fn test_repeated_transcript_suppressed() {
        let h = harness(
            Arc::new(FixedRecognizer("hello")),
            Arc::new(DictionaryTranslator),
        );

        let (a, a_frames) = FrameSink::start();
        h.registry.join("abc", "en", a);
        FrameSink::settle().await;
        a_frames.lock().unwrap().clear();

        h.coordinator.run(loud_snapshot(0.5), route()).await;
        h.coordinator.run(loud_snapshot(0.5), route()).await;
        FrameSink::settle().await;

        // Second identical transcript within the window yields no event
        assert_eq!(a_frames.lock().unwrap().len(), 1);
        assert_eq!(h.metrics.read().unwrap().chunks_suppressed, 1);
    }

    #[actix_web::test]
    async fn test_hallucination_suppressed() {
        let h = harness(
            Arc::new(FixedRecognizer("Thank you.")),
            Arc::new(DictionaryTranslator),
        );

        let (a, a_frames) = FrameSink::start();
        h.registry.join("abc", "en", a);
        FrameSink::settle().await;
        a_frames.lock().unwrap().clear();

        h.coordinator.run(loud_snapshot(0.5), route()).await;
        FrameSink::settle().await;

        assert!(a_frames.lock().unwrap().is_empty());
        assert_eq!(h.metrics.read().unwrap().chunks_suppressed, 1);
    }
}
