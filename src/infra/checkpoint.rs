// ============================================================
// Layer 6 — Model Directory / Checkpoints
// ============================================================
// Owns the on-disk layout of a fine-tuned model:
//
//   models/gpt2-finetuned/
//     config.json           ← model config (vocab_size updated if
//                             tokens were added)
//     rust_model.ot         ← final weights (libtorch format)
//     tokenizer.json        ← tokenizer incl. added tokens
//     vocab.json            ← GPT-2 BPE files, or
//     merges.txt              spiece.model for T5
//     training_args.json    ← the Config the run used
//     checkpoint-563/
//       rust_model.ot       ← weights after the epoch ending at
//       trainer_state.json    step 563, plus the epoch metrics
//     checkpoint-1126/
//       ...
//
// Tensor I/O itself is done by the ml layer; this module only
// decides where things go and reads/writes the JSON metadata.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use crate::config::Config;
use crate::domain::task::Task;
use crate::infra::tokenizer_store::TOKENIZER_FILE;

pub const CONFIG_FILE:        &str = "config.json";
pub const WEIGHTS_FILE:       &str = "rust_model.ot";
pub const TRAINING_ARGS_FILE: &str = "training_args.json";
pub const TRAINER_STATE_FILE: &str = "trainer_state.json";
pub const CHECKPOINT_PREFIX:  &str = "checkpoint-";

pub const GPT2_VOCAB_FILE:  &str = "vocab.json";
pub const GPT2_MERGES_FILE: &str = "merges.txt";
pub const T5_SPIECE_FILE:   &str = "spiece.model";

/// Tokenizer side files rust-bert's generators read for `task`.
pub fn vocab_files(task: Task) -> &'static [&'static str] {
    match task {
        Task::TextGeneration => &[GPT2_VOCAB_FILE, GPT2_MERGES_FILE],
        Task::Summarization  => &[T5_SPIECE_FILE],
    }
}

/// Every file a model directory must hold for `task` (base model or
/// fine-tuned output alike).
pub fn model_files(task: Task) -> Vec<&'static str> {
    let mut files = vec![CONFIG_FILE, WEIGHTS_FILE, TOKENIZER_FILE];
    files.extend_from_slice(vocab_files(task));
    files
}

/// Written into every checkpoint directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerState {
    pub epoch:       usize,
    pub global_step: usize,
    pub train_loss:  f64,
    pub eval_loss:   f64,
    #[serde(default)]
    pub metrics:     BTreeMap<String, f64>,
}

pub struct ModelDir {
    dir: PathBuf,
}

impl ModelDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    pub fn weights_path(&self) -> PathBuf {
        self.dir.join(WEIGHTS_FILE)
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn checkpoint_dir(&self, step: usize) -> PathBuf {
        self.dir.join(format!("{CHECKPOINT_PREFIX}{step}"))
    }

    /// Create `checkpoint-<step>/` and return it.
    pub fn create_checkpoint(&self, step: usize) -> Result<PathBuf> {
        let dir = self.checkpoint_dir(step);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", dir.display()))?;
        Ok(dir)
    }

    pub fn save_trainer_state(&self, step: usize, state: &TrainerState) -> Result<()> {
        let path = self.checkpoint_dir(step).join(TRAINER_STATE_FILE);
        write_json(&path, state)
    }

    pub fn save_training_args(&self, config: &Config) -> Result<()> {
        write_json(&self.file(TRAINING_ARGS_FILE), config)
    }

    /// Copy the base model's `config.json`, overriding `vocab_size`
    /// when the tokenizer grew.
    pub fn write_model_config(&self, base_config: &Path, vocab_size: i64) -> Result<()> {
        let mut value: serde_json::Value = read_json(base_config)?;
        if let Some(obj) = value.as_object_mut() {
            obj.insert("vocab_size".to_string(), serde_json::json!(vocab_size));
        }
        write_json(&self.config_path(), &value)
    }

    /// Copy tokenizer side files (BPE vocab, sentencepiece model) that
    /// rust-bert's generators load next to the weights.
    pub fn copy_from(&self, src_dir: &Path, files: &[&str]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        for name in files {
            let src = src_dir.join(name);
            let dst = self.file(name);
            if src == dst {
                continue;
            }
            fs::copy(&src, &dst).with_context(|| {
                format!("Cannot copy '{}' to '{}'", src.display(), dst.display())
            })?;
        }
        Ok(())
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Cannot write '{}'", path.display()))?;
    tracing::debug!("Wrote '{}'", path.display());
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid JSON in '{}'", path.display()))
}
