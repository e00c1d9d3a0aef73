//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_AUDIO_SAMPLE_RATE, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub vad: VadConfig,
    pub recognition: RecognitionConfig,
    pub translation: TranslationConfig,
    pub cleanup: CleanupConfig,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory for transient per-chunk audio artifacts
    pub temp_dir: String,
}

/// Audio stream format and buffering configuration.
///
/// ## Stream Format:
/// Inbound WebSocket frames carry raw little-endian 16-bit PCM at
/// `sample_rate` Hz. All byte thresholds below are derived from this format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Sample width in bytes (2 = 16-bit)
    pub sample_width: u16,
    /// Snapshots below this duration are dropped before recognition
    pub min_chunk_duration_ms: u64,
    /// Accumulated audio is dispatched to the pipeline once it spans this duration
    pub buffer_threshold_duration_ms: u64,
}

impl AudioConfig {
    /// Minimum snapshot size in bytes, derived from the minimum duration.
    pub fn min_chunk_size_bytes(&self) -> usize {
        self.bytes_for_duration_ms(self.min_chunk_duration_ms)
    }

    /// Accumulator dispatch threshold in bytes:
    /// `duration_ms / 1000 * sample_rate * sample_width`.
    pub fn buffer_threshold_bytes(&self) -> usize {
        self.bytes_for_duration_ms(self.buffer_threshold_duration_ms)
    }

    fn bytes_for_duration_ms(&self, duration_ms: u64) -> usize {
        (duration_ms as usize * self.sample_rate as usize * self.sample_width as usize) / 1000
    }
}

/// Voice activity detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    /// Base energy threshold; the adaptive threshold never exceeds this
    pub base_threshold: f32,
    /// Snapshots shorter than this are classified silent without analysis
    pub min_duration_seconds: f32,
    /// Window within which a repeated transcript is suppressed
    pub duplicate_window_seconds: u64,
}

/// Speech recognition model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Whisper model size (tiny, base, small, medium, large)
    pub model_size: String,
    /// Inference device (cpu, cuda)
    pub device: String,
    /// Decoding beam width; bounds the decode fallback budget
    pub beam_size: usize,
    /// Probability above which a chunk is treated as containing no speech
    pub no_speech_threshold: f32,
    /// Silence runs longer than this are collapsed before decoding
    pub min_silence_duration_ms: u64,
}

/// Translation model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    /// HuggingFace repository prefix; the language pair is appended
    pub model_prefix: String,
    /// Keep loaded language-pair models resident between requests
    pub cache_models: bool,
}

/// Temp artifact cleanup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Delay before the first deletion attempt (and between retries)
    pub delay_seconds: u64,
    pub max_retries: u32,
    /// Artifacts older than this are swept at startup
    pub stale_max_age_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                temp_dir: "temp_audio".to_string(),
            },
            audio: AudioConfig {
                sample_rate: 16000,
                channels: 1,
                sample_width: 2,
                min_chunk_duration_ms: 300,
                buffer_threshold_duration_ms: 2500,
            },
            vad: VadConfig {
                base_threshold: 0.003,
                min_duration_seconds: 0.3,
                duplicate_window_seconds: 10,
            },
            recognition: RecognitionConfig {
                model_size: "small".to_string(),
                device: "cpu".to_string(),
                beam_size: 5,
                no_speech_threshold: 0.6,
                min_silence_duration_ms: 500,
            },
            translation: TranslationConfig {
                model_prefix: "Helsinki-NLP/opus-mt".to_string(),
                cache_models: true,
            },
            cleanup: CleanupConfig {
                delay_seconds: 1,
                max_retries: 3,
                stale_max_age_seconds: 3600,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config.toml, and environment variables.
    ///
    /// `HOST` and `PORT` are honored without the APP_ prefix because
    /// deployment platforms commonly set them directly.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Catching bad values here gives a clear startup error instead of a
    /// confusing failure mid-call.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("Audio sample rate must be greater than 0"));
        }

        if self.audio.channels != 1 {
            return Err(anyhow::anyhow!(
                "Only mono audio is supported (channels = {})",
                self.audio.channels
            ));
        }

        if self.audio.sample_width != 2 {
            return Err(anyhow::anyhow!(
                "Only 16-bit PCM is supported (sample_width = {})",
                self.audio.sample_width
            ));
        }

        if self.audio.buffer_threshold_duration_ms < self.audio.min_chunk_duration_ms {
            return Err(anyhow::anyhow!(
                "Buffer threshold ({}ms) must not be below the minimum chunk duration ({}ms)",
                self.audio.buffer_threshold_duration_ms,
                self.audio.min_chunk_duration_ms
            ));
        }

        if self.vad.base_threshold <= 0.0 {
            return Err(anyhow::anyhow!("VAD base threshold must be positive"));
        }

        if self.recognition.beam_size == 0 {
            return Err(anyhow::anyhow!("Recognition beam size must be greater than 0"));
        }

        if self.cleanup.max_retries == 0 {
            return Err(anyhow::anyhow!("Cleanup max retries must be greater than 0"));
        }

        Ok(())
    }
}
