//! # Whisper Recognition Engine
//!
//! Candle-rs implementation of the recognition collaborator. Loads one
//! Whisper model at startup (weights and tokenizer fetched from
//! HuggingFace and cached locally) and transcribes WAV artifacts on
//! demand. Decoding is greedy with a temperature fallback ladder; a
//! no-speech probability check lets the engine bail out of chunks the
//! outer gate let through.

use crate::error::RecognitionError;
use crate::recognition::{RecognitionParams, Recognizer};
use anyhow::{anyhow, Result};
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use std::path::Path;
use std::sync::Mutex;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

// Special token ids of the multilingual Whisper vocabulary
const SOT_TOKEN: u32 = 50258;
const EOT_TOKEN: u32 = 50257;
const TRANSCRIBE_TOKEN: u32 = 50359;
const NO_TIMESTAMPS_TOKEN: u32 = 50363;
const NO_SPEECH_TOKEN: u32 = 50362;

/// Maximum tokens decoded per chunk.
const MAX_DECODE_TOKENS: usize = 200;

/// Temperature fallback ladder; a repetitive decode retries one rung up.
const TEMPERATURES: &[f32] = &[0.0, 0.2, 0.4, 0.6, 0.8, 1.0];

/// Normalized amplitude below which a sample counts as silence when
/// collapsing long gaps.
const SILENCE_AMPLITUDE: f32 = 0.002;

/// Available Whisper model sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    /// HuggingFace repository holding this model's weights.
    pub fn repo_name(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "openai/whisper-tiny",
            ModelSize::Base => "openai/whisper-base",
            ModelSize::Small => "openai/whisper-small",
            ModelSize::Medium => "openai/whisper-medium",
            ModelSize::Large => "openai/whisper-large-v2",
        }
    }
}

impl std::str::FromStr for ModelSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            _ => Err(anyhow!("Unknown model size: {}", s)),
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        };
        write!(f, "{}", name)
    }
}

/// Pick the inference device from configuration, falling back to CPU.
fn select_device(preference: &str) -> Device {
    match preference.to_lowercase().as_str() {
        "cuda" | "gpu" => match Device::new_cuda(0) {
            Ok(device) => device,
            Err(err) => {
                warn!("CUDA unavailable ({}), falling back to CPU", err);
                Device::Cpu
            }
        },
        _ => Device::Cpu,
    }
}

/// Whisper language token for a language code, if the code is known.
fn language_token(code: &str) -> Option<u32> {
    match code.to_lowercase().as_str() {
        "en" => Some(50259),
        "zh" => Some(50260),
        "de" => Some(50261),
        "es" => Some(50262),
        "ru" => Some(50263),
        "ko" => Some(50264),
        "fr" => Some(50265),
        "ja" => Some(50266),
        "pt" => Some(50267),
        "it" => Some(50274),
        "hi" => Some(50276),
        "mr" => Some(50320),
        _ => None,
    }
}

/// Loaded Whisper model behind the `Recognizer` boundary.
///
/// ## Concurrency:
/// Decoding mutates the model's KV cache, so inference takes an exclusive
/// lock; concurrent pipelines queue on it. The lock is only ever taken on
/// the blocking worker pool.
pub struct WhisperRecognizer {
    model: Mutex<m::model::Whisper>,
    config: Config,
    device: Device,
    tokenizer: Tokenizer,
    mel_filters: Vec<f32>,
}

impl WhisperRecognizer {
    /// Download (or reuse the cached copy of) a model and load it.
    pub async fn load(model_size: &str, device_preference: &str) -> Result<Self> {
        let size: ModelSize = model_size.parse()?;
        let device = select_device(device_preference);

        info!("Loading Whisper {} model...", size);
        let start = std::time::Instant::now();

        let api = hf_hub::api::tokio::Api::new()?;
        let repo = api.model(size.repo_name().to_string());

        let config_file = repo
            .get("config.json")
            .await
            .map_err(|e| anyhow!("Failed to download config.json from {}: {}", size.repo_name(), e))?;
        let tokenizer_file = repo
            .get("tokenizer.json")
            .await
            .map_err(|e| anyhow!("Failed to download tokenizer.json from {}: {}", size.repo_name(), e))?;
        let weights_file = repo
            .get("model.safetensors")
            .await
            .map_err(|e| anyhow!("Failed to download weights from {}: {}", size.repo_name(), e))?;

        let config: Config = serde_json::from_reader(std::fs::File::open(config_file)?)?;
        let tokenizer = Tokenizer::from_file(tokenizer_file)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        let mel_filters = build_mel_filter_bank(config.num_mel_bins as usize);

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_file], m::DTYPE, &device)? };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        info!(
            "Whisper {} model loaded in {:.2}s",
            size,
            start.elapsed().as_secs_f64()
        );

        Ok(Self {
            model: Mutex::new(model),
            config,
            device,
            tokenizer,
            mel_filters,
        })
    }

    fn decode(&self, samples: &[f32], language_hint: &str, params: &RecognitionParams) -> Result<String> {
        let mel = m::audio::pcm_to_mel(&self.config, samples, &self.mel_filters);
        let mel_len = mel.len();
        let n_mels = self.config.num_mel_bins as usize;
        let mel = Tensor::from_vec(mel, (1, n_mels, mel_len / n_mels), &self.device)?;

        let mut model = self.model.lock().unwrap();
        let audio_features = model.encoder.forward(&mel, true)?;

        let mut prefix = vec![SOT_TOKEN];
        if let Some(token) = language_token(language_hint) {
            prefix.push(token);
        }
        prefix.push(TRANSCRIBE_TOKEN);
        prefix.push(NO_TIMESTAMPS_TOKEN);

        // Each rung of the ladder restarts the decode at a higher
        // temperature if the previous one degenerated into repetition.
        let attempts = params.beam_width.clamp(1, TEMPERATURES.len());
        let mut output_tokens: Vec<u32> = Vec::new();

        for &temperature in TEMPERATURES.iter().take(attempts) {
            let mut tokens = prefix.clone();
            output_tokens.clear();
            let mut degenerated = false;

            for step in 0..MAX_DECODE_TOKENS {
                let tokens_t = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
                let ys = model.decoder.forward(&tokens_t, &audio_features, step == 0)?;

                if step == 0 {
                    let logits = model.decoder.final_linear(&ys.i(..1)?)?.i(0)?.i(0)?;
                    let no_speech_prob = candle_nn::ops::softmax_last_dim(&logits)?
                        .i(NO_SPEECH_TOKEN as usize)?
                        .to_scalar::<f32>()?;

                    if no_speech_prob > params.no_speech_threshold {
                        debug!("No-speech probability {:.2}, skipping chunk", no_speech_prob);
                        return Ok(String::new());
                    }
                }

                let (_, seq_len, _) = ys.dims3()?;
                let logits = model
                    .decoder
                    .final_linear(&ys.i((..1, seq_len - 1..))?)?
                    .i(0)?
                    .i(0)?;

                let logits = if temperature > 0.0 {
                    (logits / temperature as f64)?
                } else {
                    logits
                };
                let next_token = logits.argmax(0)?.to_scalar::<u32>()?;

                if next_token == EOT_TOKEN {
                    break;
                }

                if is_repetitive(&output_tokens, next_token) {
                    degenerated = true;
                    break;
                }

                tokens.push(next_token);
                output_tokens.push(next_token);
            }

            if !degenerated {
                break;
            }
            debug!("Repetitive decode at temperature {:.1}, retrying", temperature);
        }

        let text = self
            .tokenizer
            .decode(&output_tokens, true)
            .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;

        Ok(text.trim().to_string())
    }
}

impl Recognizer for WhisperRecognizer {
    fn recognize(
        &self,
        audio_path: &Path,
        language_hint: &str,
        params: &RecognitionParams,
    ) -> Result<String, RecognitionError> {
        let (samples, sample_rate) =
            read_wav(audio_path).map_err(|e| RecognitionError::BadArtifact(e.to_string()))?;

        let samples = collapse_long_silence(&samples, sample_rate, params.min_silence_ms);
        if samples.is_empty() {
            return Ok(String::new());
        }

        let text = self
            .decode(&samples, language_hint, params)
            .map_err(|e| RecognitionError::Inference(e.to_string()))?;

        debug!("Transcribed: '{}'", text);
        Ok(text)
    }
}

/// Read a 16-bit WAV artifact into normalized samples.
fn read_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<i16>, _>>()?
        .into_iter()
        .map(|s| s as f32 / 32768.0)
        .collect();

    Ok((samples, spec.sample_rate))
}

/// Collapse silence runs longer than `min_silence_ms` down to that length.
///
/// The model attends to the whole 30s window; long dead air in the middle
/// of a chunk costs accuracy without carrying information.
fn collapse_long_silence(samples: &[f32], sample_rate: u32, min_silence_ms: u64) -> Vec<f32> {
    let max_run = (sample_rate as u64 * min_silence_ms / 1000) as usize;
    if max_run == 0 {
        return samples.to_vec();
    }

    let mut out = Vec::with_capacity(samples.len());
    let mut silence_run = 0usize;

    for &sample in samples {
        if sample.abs() < SILENCE_AMPLITUDE {
            silence_run += 1;
            if silence_run > max_run {
                continue;
            }
        } else {
            silence_run = 0;
        }
        out.push(sample);
    }

    out
}

/// Detect degenerate repetition in the decoded token stream.
fn is_repetitive(tokens: &[u32], new_token: u32) -> bool {
    if tokens.len() >= 2 {
        let n = tokens.len();
        if tokens[n - 1] == new_token && tokens[n - 2] == new_token {
            return true;
        }
    }

    if tokens.len() >= 6 {
        let n = tokens.len();
        if tokens[n - 3..] == tokens[n - 6..n - 3] {
            return true;
        }
    }

    false
}

/// Triangular mel filter bank for the spectrogram frontend.
///
/// 201 frequency bins per filter, matching Whisper's 400-sample FFT.
fn build_mel_filter_bank(n_mels: usize) -> Vec<f32> {
    const N_FREQS: usize = 201;
    let mut filters = vec![0.0f32; n_mels * N_FREQS];

    for mel in 0..n_mels {
        let center = (mel + 1) * N_FREQS / (n_mels + 1);
        let width = (N_FREQS / (n_mels + 1)).max(1);

        for freq in center.saturating_sub(width)..(center + width).min(N_FREQS) {
            let distance = (freq as i32 - center as i32).abs() as f32;
            filters[mel * N_FREQS + freq] = (1.0 - distance / width as f32).max(0.0);
        }
    }

    filters
}
