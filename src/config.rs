// ============================================================
// Configuration
// ============================================================
// One `Config` per task, built in three layers:
//
//   1. Task defaults          (Config::for_task)
//   2. Optional TOML file     (merged key by key over the defaults,
//                              so a file only lists what it changes)
//   3. Environment overrides  (HF_MODEL_REPO, HF_USERNAME,
//                              SUMMARIZE_AI_HOST, SUMMARIZE_AI_PORT)
//
// CLI flags are applied last by the CLI layer.
// The result is validated once and never mutated afterwards.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::domain::task::{PromptFormat, Task, SEP_TOKEN};

pub const ENV_MODEL_REPO: &str = "HF_MODEL_REPO";
pub const ENV_HF_USER:    &str = "HF_USERNAME";
pub const ENV_HOST:       &str = "SUMMARIZE_AI_HOST";
pub const ENV_PORT:       &str = "SUMMARIZE_AI_PORT";

/// Owner of the published model repos unless overridden.
const DEFAULT_HF_USER: &str = "samarthFTR";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub task:     Task,
    pub model:    ModelConfig,
    pub training: TrainingConfig,
    pub data:     DataConfig,
    pub paths:    PathConfig,
    pub server:   ServerConfig,
}

/// Pretrained checkpoint, sequence lengths and decoding defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Hub repo id (e.g. `t5-small`) or local directory of the base model.
    pub model_name:           String,
    /// Encoder input length (seq2seq) or full sequence length (causal).
    pub max_input_length:     usize,
    /// Label length (seq2seq) or default number of new tokens (causal).
    pub max_target_length:    usize,
    pub num_beams:            usize,
    pub do_sample:            bool,
    pub temperature:          f64,
    pub top_k:                usize,
    pub top_p:                f64,
    pub repetition_penalty:   f64,
    pub no_repeat_ngram_size: usize,
    pub early_stopping:       bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SaveStrategy {
    Epoch,
    No,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TrainingConfig {
    pub batch_size:                  usize,
    pub gradient_accumulation_steps: usize,
    pub num_epochs:                  usize,
    pub learning_rate:               f64,
    pub weight_decay:                f64,
    pub warmup_steps:                usize,
    pub validation_split:            f64,
    /// `None` means a fresh random split on every run.
    pub split_seed:                  Option<u64>,
    pub logging_steps:               usize,
    pub save_strategy:               SaveStrategy,
    /// Mixed precision. Only takes effect on CUDA.
    pub fp16:                        bool,
    /// Name of the epoch metric that picks the best checkpoint.
    /// `loss` is the validation loss; ROUGE keys are also accepted.
    pub metric_for_best_model:       String,
    pub greater_is_better:           bool,
    pub load_best_model_at_end:      bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    pub data_path:     PathBuf,
    pub input_column:  String,
    pub target_column: String,
    pub max_samples:   Option<usize>,
    pub prompt_prefix: String,
    /// Causal task only.
    pub separator:     Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PathConfig {
    /// Where the fine-tuned model is written, and read back from when
    /// serving. May also be a hub repo id (see `HF_MODEL_REPO`).
    pub model_dir:  String,
    pub log_dir:    PathBuf,
    /// Hub user or organisation that owns the published repos.
    pub hf_username:  String,
    /// Repo name under `hf_username` that `upload` pushes to.
    pub hf_repo_name: String,
}

impl PathConfig {
    /// `<hf_username>/<hf_repo_name>`
    pub fn hf_repo_id(&self) -> String {
        format!("{}/{}", self.hf_username, self.hf_repo_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

// ─── Task Defaults ───────────────────────────────────────────────────────────

impl Config {
    pub fn for_task(task: Task) -> Self {
        match task {
            Task::Summarization  => Self::summarization(),
            Task::TextGeneration => Self::text_generation(),
        }
    }

    fn summarization() -> Self {
        Self {
            task: Task::Summarization,
            model: ModelConfig {
                model_name:           "t5-small".to_string(),
                max_input_length:     512,
                max_target_length:    128,
                num_beams:            4,
                do_sample:            false,
                temperature:          1.0,
                top_k:                50,
                top_p:                1.0,
                repetition_penalty:   1.0,
                no_repeat_ngram_size: 0,
                early_stopping:       true,
            },
            training: TrainingConfig {
                batch_size:                  8,
                gradient_accumulation_steps: 1,
                num_epochs:                  3,
                learning_rate:               5e-5,
                weight_decay:                0.01,
                warmup_steps:                500,
                validation_split:            0.1,
                split_seed:                  None,
                logging_steps:               50,
                save_strategy:               SaveStrategy::Epoch,
                fp16:                        true,
                metric_for_best_model:       "loss".to_string(),
                greater_is_better:           false,
                load_best_model_at_end:      true,
            },
            data: DataConfig {
                data_path:     PathBuf::from("data/raw/data.csv"),
                input_column:  "Text".to_string(),
                target_column: "Summary".to_string(),
                max_samples:   Some(5000),
                prompt_prefix: "summarize: ".to_string(),
                separator:     None,
            },
            paths: PathConfig {
                model_dir:  "models/t5-small".to_string(),
                log_dir:    PathBuf::from("logs/t5-small"),
                hf_username:  DEFAULT_HF_USER.to_string(),
                hf_repo_name: "summarize-ai-t5".to_string(),
            },
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
        }
    }

    fn text_generation() -> Self {
        Self {
            task: Task::TextGeneration,
            model: ModelConfig {
                model_name:           "gpt2".to_string(),
                max_input_length:     256,
                max_target_length:    150,
                num_beams:            1,
                do_sample:            true,
                temperature:          0.7,
                top_k:                40,
                top_p:                0.90,
                repetition_penalty:   1.4,
                no_repeat_ngram_size: 3,
                early_stopping:       false,
            },
            training: TrainingConfig {
                batch_size:                  4,
                gradient_accumulation_steps: 1,
                num_epochs:                  3,
                learning_rate:               5e-5,
                weight_decay:                0.01,
                warmup_steps:                200,
                validation_split:            0.1,
                split_seed:                  Some(42),
                logging_steps:               50,
                save_strategy:               SaveStrategy::Epoch,
                fp16:                        true,
                metric_for_best_model:       "loss".to_string(),
                greater_is_better:           false,
                load_best_model_at_end:      true,
            },
            data: DataConfig {
                data_path:     PathBuf::from("data/processed/xsum_train.csv"),
                input_column:  "Summary".to_string(),
                target_column: "Text".to_string(),
                max_samples:   Some(2000),
                prompt_prefix: "Expand: ".to_string(),
                separator:     Some(format!(" {SEP_TOKEN} ")),
            },
            paths: PathConfig {
                model_dir:  "models/gpt2-finetuned".to_string(),
                log_dir:    PathBuf::from("logs/gpt2"),
                hf_username:  DEFAULT_HF_USER.to_string(),
                hf_repo_name: "summarize-ai-gpt2".to_string(),
            },
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8001,
            },
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

impl Config {
    /// Defaults for `task`, then the optional file, then the environment.
    pub fn load(task: Task, file: Option<&Path>) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(task, path)?,
            None       => Self::for_task(task),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Merge a TOML file over the task defaults. The file may set any
    /// subset of keys; unknown keys are rejected.
    pub fn from_file(task: Task, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        Self::from_toml_str(task, &content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))
    }

    pub fn from_toml_str(task: Task, content: &str) -> Result<Self> {
        let overrides: toml::Value = toml::from_str(content)?;
        let mut merged = toml::Value::try_from(Self::for_task(task))?;
        merge_toml(&mut merged, overrides);

        let config: Self = merged.try_into()?;
        if config.task != task {
            bail!(
                "config file is for task '{}' but '{}' was requested",
                config.task,
                task
            );
        }
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(repo) = std::env::var(ENV_MODEL_REPO) {
            if !repo.trim().is_empty() {
                tracing::info!("{} set, model_dir = {}", ENV_MODEL_REPO, repo);
                self.paths.model_dir = repo;
            }
        }
        if let Ok(user) = std::env::var(ENV_HF_USER) {
            if !user.trim().is_empty() {
                self.paths.hf_username = user.trim().to_string();
            }
        }
        if let Ok(host) = std::env::var(ENV_HOST) {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var(ENV_PORT) {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid {ENV_PORT} '{port}'"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let m = &self.model;
        let t = &self.training;

        if m.model_name.trim().is_empty() {
            bail!("model.model_name cannot be empty");
        }
        if m.max_input_length == 0 || m.max_target_length == 0 {
            bail!("model sequence lengths must be greater than 0");
        }
        if m.num_beams == 0 {
            bail!("model.num_beams must be at least 1");
        }
        if m.temperature <= 0.0 {
            bail!("model.temperature must be positive");
        }
        if !(m.top_p > 0.0 && m.top_p <= 1.0) {
            bail!("model.top_p must be in (0, 1]");
        }

        if t.batch_size == 0 {
            bail!("training.batch_size must be greater than 0");
        }
        if t.gradient_accumulation_steps == 0 {
            bail!("training.gradient_accumulation_steps must be greater than 0");
        }
        if t.num_epochs == 0 {
            bail!("training.num_epochs must be greater than 0");
        }
        if t.learning_rate <= 0.0 {
            bail!("training.learning_rate must be positive");
        }
        if !(t.validation_split > 0.0 && t.validation_split < 1.0) {
            bail!("training.validation_split must be in (0, 1)");
        }

        if self.task.is_causal() && self.data.separator.is_none() {
            bail!("data.separator is required for the text-generation task");
        }
        if self.data.input_column.is_empty() || self.data.target_column.is_empty() {
            bail!("data column names cannot be empty");
        }

        for (key, value) in [
            ("paths.hf_username", &self.paths.hf_username),
            ("paths.hf_repo_name", &self.paths.hf_repo_name),
        ] {
            if value.trim().is_empty() || value.contains('/') {
                bail!("{key} must be a non-empty name without '/'");
            }
        }

        if self.server.port == 0 {
            bail!("server.port cannot be 0");
        }
        Ok(())
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

impl Config {
    pub fn prompt_format(&self) -> PromptFormat {
        PromptFormat::new(self.data.prompt_prefix.clone(), self.data.separator.clone())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Create the output and log directories. Only training writes there.
    pub fn create_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.paths.model_dir)
            .with_context(|| format!("Cannot create '{}'", self.paths.model_dir))?;
        std::fs::create_dir_all(&self.paths.log_dir)
            .with_context(|| format!("Cannot create '{}'", self.paths.log_dir.display()))?;
        Ok(())
    }
}

/// Recursively overlay `overrides` onto `base`. Tables merge key by
/// key, every other value replaces.
fn merge_toml(base: &mut toml::Value, overrides: toml::Value) {
    match (base, overrides) {
        (toml::Value::Table(base), toml::Value::Table(over)) => {
            for (key, value) in over {
                match base.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
