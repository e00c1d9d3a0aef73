//! # MarianMT Translation Engine
//!
//! Candle-rs implementation of the translation collaborator. Each language
//! pair maps to its own Helsinki-NLP opus-mt model, loaded lazily the
//! first time the pair is requested and kept resident when caching is
//! enabled. A pair whose model cannot be fetched or loaded reports
//! unavailability; the pipeline degrades to a placeholder string rather
//! than failing the transcription event.

use crate::config::TranslationConfig;
use crate::error::TranslationError;
use crate::translation::Translator;
use anyhow::{anyhow, Result};
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::marian;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;
use tracing::{debug, error, info};

/// Hard cap on decoded tokens per utterance.
const MAX_OUTPUT_TOKENS: usize = 512;

/// One loaded language-pair model.
///
/// Expects repositories that ship `tokenizer.json` alongside the
/// safetensors weights; the same tokenizer serves both sides of the pair.
struct LoadedPair {
    model: marian::MTModel,
    config: marian::Config,
    tokenizer: Tokenizer,
    device: Device,
}

impl LoadedPair {
    /// Fetch and load a pair model from HuggingFace (sync API: this runs
    /// on the blocking worker pool, never on the async scheduler).
    fn load(model_name: &str, device: &Device) -> Result<Self> {
        info!("Loading translation model: {}", model_name);
        let start = std::time::Instant::now();

        let api = hf_hub::api::sync::Api::new()?;
        let repo = api.model(model_name.to_string());

        let config: marian::Config =
            serde_json::from_reader(std::fs::File::open(repo.get("config.json")?)?)?;
        let tokenizer = Tokenizer::from_file(repo.get("tokenizer.json")?)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;
        let weights = repo.get("model.safetensors")?;

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, device)? };
        let model = marian::MTModel::new(&config, vb)?;

        info!(
            "Translation model {} loaded in {:.2}s",
            model_name,
            start.elapsed().as_secs_f64()
        );

        Ok(Self {
            model,
            config,
            tokenizer,
            device: device.clone(),
        })
    }

    /// Greedy encoder-decoder translation of one utterance.
    fn run(&mut self, text: &str) -> Result<String> {
        let mut tokens: Vec<u32> = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("Tokenizer encode error: {}", e))?
            .get_ids()
            .to_vec();
        tokens.push(self.config.eos_token_id);

        let tokens_t = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
        self.model.reset_kv_cache();
        let encoder_xs = self.model.encoder().forward(&tokens_t, 0)?;

        let mut token_ids = vec![self.config.decoder_start_token_id];
        let budget = MAX_OUTPUT_TOKENS.min(self.config.max_position_embeddings);

        for index in 0..budget {
            // With the KV cache warm only the newest token is fed back in
            let context_size = if index >= 1 { 1 } else { token_ids.len() };
            let start_pos = token_ids.len().saturating_sub(context_size);

            let input_ids = Tensor::new(&token_ids[start_pos..], &self.device)?.unsqueeze(0)?;
            let logits = self.model.decode(&input_ids, &encoder_xs, start_pos)?;

            let logits = logits.squeeze(0)?;
            let logits = logits.i(logits.dim(0)? - 1)?;
            let token = logits.argmax(0)?.to_scalar::<u32>()?;

            if token == self.config.eos_token_id {
                break;
            }
            token_ids.push(token);
        }

        let translated = self
            .tokenizer
            .decode(&token_ids[1..], true)
            .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;

        Ok(translated.trim().to_string())
    }
}

/// Lazy-loading, pair-caching translation engine.
pub struct MarianTranslator {
    model_prefix: String,
    cache_models: bool,
    device: Device,
    cache: Mutex<HashMap<String, Arc<Mutex<LoadedPair>>>>,
}

impl MarianTranslator {
    pub fn new(config: &TranslationConfig) -> Self {
        Self {
            model_prefix: config.model_prefix.clone(),
            cache_models: config.cache_models,
            device: Device::Cpu,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Language pairs currently held in the cache.
    pub fn cached_pairs(&self) -> Vec<String> {
        self.cache.lock().unwrap().keys().cloned().collect()
    }

    fn pair_model(
        &self,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<Arc<Mutex<LoadedPair>>, TranslationError> {
        let pair_key = format!("{}-{}", source_lang, target_lang);

        if let Some(loaded) = self.cache.lock().unwrap().get(&pair_key) {
            return Ok(loaded.clone());
        }

        let model_name = format!("{}-{}", self.model_prefix, pair_key);
        let loaded = LoadedPair::load(&model_name, &self.device).map_err(|err| {
            error!("Failed to load translation model {}: {:#}", model_name, err);
            TranslationError::ModelUnavailable(pair_key.clone())
        })?;

        let loaded = Arc::new(Mutex::new(loaded));
        if self.cache_models {
            self.cache
                .lock()
                .unwrap()
                .insert(pair_key.clone(), loaded.clone());
            info!("Cached translation model: {}", pair_key);
        }

        Ok(loaded)
    }
}

impl Translator for MarianTranslator {
    fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, TranslationError> {
        // No model consulted for same-language routes or empty text
        if text.is_empty() || source_lang == target_lang {
            return Ok(text.to_string());
        }

        let pair = self.pair_model(source_lang, target_lang)?;
        let mut pair = pair.lock().unwrap();

        let translated = pair
            .run(text)
            .map_err(|e| TranslationError::Inference(e.to_string()))?;

        debug!(
            "Translated '{}' -> '{}' ({}-{})",
            text, translated, source_lang, target_lang
        );
        Ok(translated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> MarianTranslator {
        MarianTranslator::new(&TranslationConfig {
            model_prefix: "Helsinki-NLP/opus-mt".to_string(),
            cache_models: true,
        })
    }

    #[test]
    fn test_same_language_is_noop() {
        let t = translator();
        assert_eq!(t.translate("hello", "en", "en").unwrap(), "hello");
    }

    #[test]
    fn test_empty_text_is_noop() {
        let t = translator();
        assert_eq!(t.translate("", "en", "mr").unwrap(), "");
        assert!(t.cached_pairs().is_empty());
    }
}
