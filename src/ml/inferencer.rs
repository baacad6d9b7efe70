// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Serves a fine-tuned model through rust-bert's generators.
//
// The HF tokenizer saved next to the weights does the encoding
// and decoding, so tokens added for fine-tuning (<|sep|>) are
// understood; rust-bert only sees ids:
//
//   text ─▶ prompt ─▶ ids ─▶ generate_from_ids_and_past ─▶ ids
//        ─▶ (causal: drop the echoed prompt) ─▶ decode ─▶ clean
//
// Causal (GPT-2):  "Expand: <summary> <|sep|> " → max_new_tokens,
//                  sampling with temperature / top-k / top-p
// Seq2seq (T5):    "summarize: <text>" → beam search, max_length
//
// libtorch modules are not Sync, so the generator sits behind a
// mutex and requests take turns.

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use rust_bert::gpt2::GPT2Generator;
use rust_bert::pipelines::common::{ModelResource, ModelType};
use rust_bert::pipelines::generation_utils::{GenerateConfig, GenerateOptions, LanguageGenerator};
use rust_bert::resources::{LocalResource, ResourceProvider};
use rust_bert::t5::T5Generator;
use std::path::Path;
use tch::{Device, Tensor};
use tokenizers::Tokenizer;

use crate::config::{Config, ModelConfig};
use crate::data::preprocessor::encode_prompt;
use crate::domain::task::{clean_output, PromptFormat, Task};
use crate::domain::traits::{GenerationOutput, GenerationParams, ModelRegistry, TextGenerator};
use crate::infra::checkpoint::{
    model_files, CONFIG_FILE, GPT2_MERGES_FILE, GPT2_VOCAB_FILE, T5_SPIECE_FILE, WEIGHTS_FILE,
};
use crate::infra::hub::resolve_model_dir;
use crate::infra::tokenizer_store::{decode, special_tokens, TokenizerStore};

enum Generator {
    Gpt2(GPT2Generator),
    T5(T5Generator),
}

impl Generator {
    fn generate(&self, input_ids: Tensor, options: GenerateOptions) -> Result<Vec<i64>> {
        let outputs = match self {
            Generator::Gpt2(g) => g.generate_from_ids_and_past(input_ids, None, Some(options))?,
            Generator::T5(g)   => g.generate_from_ids_and_past(input_ids, None, Some(options))?,
        };
        outputs
            .into_iter()
            .next()
            .map(|o| o.indices)
            .context("generator returned no sequence")
    }
}

pub struct Inferencer {
    task:      Task,
    name:      String,
    format:    PromptFormat,
    model:     ModelConfig,
    tokenizer: Tokenizer,
    device:    Device,
    generator: Mutex<Generator>,
}

impl Inferencer {
    /// Load the model named by `paths.model_dir`, which is either a
    /// local directory or a hub repo id.
    pub fn load(config: &Config, registry: &dyn ModelRegistry) -> Result<Self> {
        let task = config.task;
        let dir  = resolve_model_dir(&config.paths.model_dir, &model_files(task), registry)?;
        Self::from_dir(config, &dir)
    }

    pub fn from_dir(config: &Config, dir: &Path) -> Result<Self> {
        let task      = config.task;
        let device    = Device::cuda_if_available();
        let tokenizer = TokenizerStore::new(dir).load()?;
        let m         = &config.model;

        // A GPT-2 that never saw the separator cannot tell prompt from text
        if task.is_causal() && special_tokens(&tokenizer, task)?.sep_id.is_none() {
            bail!(
                "tokenizer in '{}' has no separator token; is this a fine-tuned model?",
                dir.display()
            );
        }

        let local = |name: &str| -> Box<dyn ResourceProvider + Send> {
            Box::new(LocalResource { local_path: dir.join(name) })
        };

        let (model_type, vocab, merges) = match task {
            Task::TextGeneration => (
                ModelType::GPT2,
                local(GPT2_VOCAB_FILE),
                Some(local(GPT2_MERGES_FILE)),
            ),
            Task::Summarization => (ModelType::T5, local(T5_SPIECE_FILE), None),
        };

        let generate_config = GenerateConfig {
            model_type,
            model_resource:       ModelResource::Torch(local(WEIGHTS_FILE)),
            config_resource:      local(CONFIG_FILE),
            vocab_resource:       vocab,
            merges_resource:      merges,
            max_length:           Some(m.max_target_length as i64),
            do_sample:            m.do_sample,
            early_stopping:       m.early_stopping,
            num_beams:            m.num_beams as i64,
            temperature:          m.temperature,
            top_k:                m.top_k as i64,
            top_p:                m.top_p,
            repetition_penalty:   m.repetition_penalty,
            no_repeat_ngram_size: m.no_repeat_ngram_size as i64,
            device,
            ..Default::default()
        };

        let generator = match task {
            Task::TextGeneration => Generator::Gpt2(
                GPT2Generator::new(generate_config)
                    .with_context(|| format!("Cannot load GPT-2 from '{}'", dir.display()))?,
            ),
            Task::Summarization => Generator::T5(
                T5Generator::new(generate_config)
                    .with_context(|| format!("Cannot load T5 from '{}'", dir.display()))?,
            ),
        };

        tracing::info!("{} model loaded from '{}' on {:?}", task.label(), dir.display(), device);

        Ok(Self {
            task,
            name: model_name(&config.paths.model_dir, dir),
            format: config.prompt_format(),
            model: config.model.clone(),
            tokenizer,
            device,
            generator: Mutex::new(generator),
        })
    }

}

/// Per-call generation options: request values win, the model
/// configuration fills the rest.
fn generate_options(task: Task, m: &ModelConfig, params: &GenerationParams) -> GenerateOptions<'static> {
    let length = params.max_length.unwrap_or(m.max_target_length) as i64;

    let mut options = GenerateOptions {
        num_beams:            Some(params.num_beams.unwrap_or(m.num_beams) as i64),
        do_sample:            Some(params.do_sample.unwrap_or(m.do_sample)),
        temperature:          Some(params.temperature.unwrap_or(m.temperature)),
        top_k:                Some(params.top_k.unwrap_or(m.top_k) as i64),
        top_p:                Some(params.top_p.unwrap_or(m.top_p)),
        repetition_penalty:   Some(params.repetition_penalty.unwrap_or(m.repetition_penalty)),
        no_repeat_ngram_size: Some(m.no_repeat_ngram_size as i64),
        early_stopping:       Some(m.early_stopping),
        ..Default::default()
    };
    if task.is_causal() {
        options.max_new_tokens = Some(length);
        options.max_length     = None;
    } else {
        options.max_length = Some(length);
    }
    options
}

impl TextGenerator for Inferencer {
    fn generate(&self, input: &str, params: &GenerationParams) -> Result<GenerationOutput> {
        let ids        = encode_prompt(&self.tokenizer, &self.format, input, self.model.max_input_length)?;
        let prompt_len = ids.len();

        let input_ids = Tensor::from_slice(&ids).unsqueeze(0).to_device(self.device);
        let options   = generate_options(self.task, &self.model, params);

        let output = {
            let generator = self.generator.lock();
            generator.generate(input_ids, options)?
        };

        // A causal model echoes the prompt before its continuation
        let generated = if self.task.is_causal() {
            output.get(prompt_len..).unwrap_or_default()
        } else {
            &output[..]
        };

        let text = clean_output(&decode(&self.tokenizer, generated)?);
        Ok(GenerationOutput::new(input, text))
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Reported name: the configured reference, or the directory name when
/// it was a path.
fn model_name(reference: &str, dir: &Path) -> String {
    if Path::new(reference).is_dir() {
        dir.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| reference.to_string())
    } else {
        reference.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_values_override_config() {
        let cfg    = Config::for_task(Task::TextGeneration);
        let params = GenerationParams {
            repetition_penalty: Some(1.1),
            do_sample:          Some(!cfg.model.do_sample),
            top_k:              Some(7),
            ..Default::default()
        };

        let o = generate_options(Task::TextGeneration, &cfg.model, &params);
        assert_eq!(o.repetition_penalty, Some(1.1));
        assert_eq!(o.do_sample, Some(!cfg.model.do_sample));
        assert_eq!(o.top_k, Some(7));
        assert_eq!(o.temperature, Some(cfg.model.temperature));
    }

    #[test]
    fn test_config_fills_missing_values() {
        let cfg = Config::for_task(Task::TextGeneration);
        let o   = generate_options(Task::TextGeneration, &cfg.model, &GenerationParams::default());
        assert_eq!(o.repetition_penalty, Some(cfg.model.repetition_penalty));
        assert_eq!(o.do_sample, Some(cfg.model.do_sample));
    }

    #[test]
    fn test_length_maps_to_new_tokens_for_causal() {
        let params = GenerationParams { max_length: Some(60), ..Default::default() };

        let gpt2 = Config::for_task(Task::TextGeneration);
        let o    = generate_options(Task::TextGeneration, &gpt2.model, &params);
        assert_eq!(o.max_new_tokens, Some(60));
        assert_eq!(o.max_length, None);

        let t5 = Config::for_task(Task::Summarization);
        let o  = generate_options(Task::Summarization, &t5.model, &params);
        assert_eq!(o.max_length, Some(60));
        assert_eq!(o.max_new_tokens, None);
    }
}
