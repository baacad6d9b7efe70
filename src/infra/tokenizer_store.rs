// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Loads and saves HuggingFace `tokenizer.json` files and knows
// which special tokens each task relies on:
//
//   T5     pad = <pad>, eos = </s>
//   GPT-2  no pad token of its own, so pad = eos = <|endoftext|>;
//          the prompt separator <|sep|> is added as a new special
//          token before fine-tuning (the model's embedding matrix
//          grows by one row to match)
//
// The same tokenizer.json is written next to the fine-tuned
// weights so inference always decodes with the training vocab.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokenizers::{AddedToken, Tokenizer};

use crate::domain::task::{Task, SEP_TOKEN};

pub const TOKENIZER_FILE: &str = "tokenizer.json";

const T5_PAD:  &str = "<pad>";
const T5_EOS:  &str = "</s>";
const GPT2_EOS: &str = "<|endoftext|>";

/// Token strings and ids the preprocessor, batcher and inferencer need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialTokens {
    pub pad_id:    u32,
    pub eos_token: String,
    pub eos_id:    u32,
    /// Only present for the causal task once configured.
    pub sep_id:    Option<u32>,
}

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(TOKENIZER_FILE)
    }

    /// Load `tokenizer.json` from the store directory.
    pub fn load(&self) -> Result<Tokenizer> {
        let path = self.path();
        Tokenizer::from_file(&path)
            .map_err(|e| anyhow::anyhow!(
                "Cannot load tokenizer from '{}': {}", path.display(), e
            ))
    }

    pub fn save(&self, tokenizer: &Tokenizer) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;
        let path = self.path();
        tokenizer
            .save(&path, false)
            .map_err(|e| anyhow::anyhow!("Cannot write '{}': {e}", path.display()))?;
        tracing::debug!("Saved tokenizer to '{}'", path.display());
        Ok(())
    }

}

/// Prepare a freshly loaded base tokenizer for fine-tuning.
/// For the causal task this adds the separator token (once).
pub fn configure_for_training(tokenizer: &mut Tokenizer, task: Task) -> Result<SpecialTokens> {
    if task.is_causal() && tokenizer.token_to_id(SEP_TOKEN).is_none() {
        let added = tokenizer.add_special_tokens(&[AddedToken::from(SEP_TOKEN, true)]);
        tracing::info!("Added {} special token(s) to tokenizer", added);
    }
    special_tokens(tokenizer, task)
}

/// Look up the task's special tokens in an already prepared tokenizer.
pub fn special_tokens(tokenizer: &Tokenizer, task: Task) -> Result<SpecialTokens> {
    let id_of = |token: &str| {
        tokenizer
            .token_to_id(token)
            .with_context(|| format!("tokenizer has no '{token}' token"))
    };

    match task {
        Task::Summarization => Ok(SpecialTokens {
            pad_id:    id_of(T5_PAD)?,
            eos_token: T5_EOS.to_string(),
            eos_id:    id_of(T5_EOS)?,
            sep_id:    None,
        }),
        Task::TextGeneration => {
            let eos_id = id_of(GPT2_EOS)?;
            Ok(SpecialTokens {
                pad_id:    eos_id,
                eos_token: GPT2_EOS.to_string(),
                eos_id,
                sep_id:    tokenizer.token_to_id(SEP_TOKEN),
            })
        }
    }
}

/// Decode ids, skipping special tokens.
pub fn decode(tokenizer: &Tokenizer, ids: &[i64]) -> Result<String> {
    let ids: Vec<u32> = ids
        .iter()
        .filter(|&&id| id >= 0)
        .map(|&id| id as u32)
        .collect();
    tokenizer
        .decode(&ids, true)
        .map_err(|e| anyhow::anyhow!("Decode error: {e}"))
}
