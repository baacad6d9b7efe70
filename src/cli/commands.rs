// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the four subcommands: `train`, `predict`, `serve`
// and `upload`, and all their configurable flags.
//
// Every command starts from the task's defaults, optionally
// merged with a TOML file (--config), then the environment,
// then whatever flags were given here.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, etc.)

use anyhow::Result;
use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::Config;
use crate::domain::task::Task;
use crate::domain::traits::GenerationParams;

/// The top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fine-tune the task's pretrained model on a CSV dataset
    Train(TrainArgs),

    /// Run the fine-tuned model on one input
    Predict(PredictArgs),

    /// Serve the fine-tuned model over HTTP
    Serve(ServeArgs),

    /// Publish trained model directories to the Hugging Face Hub
    Upload(UploadArgs),
}

/// Which model a command works on.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskArg {
    /// T5: text → summary
    Summarization,
    /// GPT-2: summary → text
    TextGeneration,
}

impl From<TaskArg> for Task {
    fn from(t: TaskArg) -> Self {
        match t {
            TaskArg::Summarization  => Task::Summarization,
            TaskArg::TextGeneration => Task::TextGeneration,
        }
    }
}

/// Flags shared by every command that loads a configuration.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Which model to work on
    #[arg(long, value_enum)]
    pub task: TaskArg,

    /// TOML file merged over the task defaults
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl ConfigArgs {
    pub fn load(&self) -> Result<Config> {
        Config::load(self.task.into(), self.config.as_deref())
    }
}

// ─── train ───────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[command(flatten)]
    pub common: ConfigArgs,

    /// CSV file to train on
    #[arg(long)]
    pub data_path: Option<PathBuf>,

    /// Base model: hub repo id (e.g. t5-small) or local directory
    #[arg(long)]
    pub model_name: Option<String>,

    /// Where the fine-tuned model and checkpoints are written
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Number of full passes through the training data
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Examples per forward pass
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Peak learning rate reached after warmup
    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// Cap on the number of training rows
    #[arg(long)]
    pub max_samples: Option<usize>,
}

impl TrainArgs {
    /// Task config with the command line overrides applied.
    pub fn to_config(&self) -> Result<Config> {
        let mut cfg = self.common.load()?;
        if let Some(p) = &self.data_path     { cfg.data.data_path = p.clone(); }
        if let Some(m) = &self.model_name    { cfg.model.model_name = m.clone(); }
        if let Some(o) = &self.output_dir    { cfg.paths.model_dir = o.clone(); }
        if let Some(e) = self.epochs         { cfg.training.num_epochs = e; }
        if let Some(b) = self.batch_size     { cfg.training.batch_size = b; }
        if let Some(l) = self.learning_rate  { cfg.training.learning_rate = l; }
        if let Some(s) = self.max_samples    { cfg.data.max_samples = Some(s); }
        cfg.validate()?;
        Ok(cfg)
    }
}

// ─── predict ─────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct PredictArgs {
    #[command(flatten)]
    pub common: ConfigArgs,

    /// Text to summarize, or summary to expand
    #[arg(long)]
    pub text: String,

    /// Fine-tuned model directory or hub repo id
    #[arg(long)]
    pub model_dir: Option<String>,

    /// Summary length (summarization) or new tokens (text generation)
    #[arg(long)]
    pub max_length: Option<usize>,

    /// Beam search width
    #[arg(long)]
    pub num_beams: Option<usize>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Top-k filtering
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Nucleus sampling probability
    #[arg(long)]
    pub top_p: Option<f64>,

    /// Penalty for repeated tokens (1.0 = none)
    #[arg(long)]
    pub repetition_penalty: Option<f64>,

    /// Sample (true) or decode greedily / by beam search (false)
    #[arg(long)]
    pub do_sample: Option<bool>,
}

impl PredictArgs {
    pub fn to_config(&self) -> Result<Config> {
        let mut cfg = self.common.load()?;
        if let Some(d) = &self.model_dir {
            cfg.paths.model_dir = d.clone();
        }
        Ok(cfg)
    }
}

impl From<&PredictArgs> for GenerationParams {
    fn from(a: &PredictArgs) -> Self {
        GenerationParams {
            max_length:         a.max_length,
            num_beams:          a.num_beams,
            temperature:        a.temperature,
            top_k:              a.top_k,
            top_p:              a.top_p,
            repetition_penalty: a.repetition_penalty,
            do_sample:          a.do_sample,
        }
    }
}

// ─── serve ───────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub common: ConfigArgs,

    /// Bind host (default 0.0.0.0)
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port (default 8000 for summarization, 8001 for text generation)
    #[arg(long)]
    pub port: Option<u16>,
}

impl ServeArgs {
    pub fn to_config(&self) -> Result<Config> {
        let mut cfg = self.common.load()?;
        if let Some(h) = &self.host { cfg.server.host = h.clone(); }
        if let Some(p) = self.port  { cfg.server.port = p; }
        Ok(cfg)
    }
}

// ─── upload ──────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Only upload this task's model (default: both)
    #[arg(long, value_enum)]
    pub task: Option<TaskArg>,

    /// TOML file merged over the task defaults
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Hub user or organisation to upload under, replacing the
    /// configured owner
    #[arg(long)]
    pub namespace: Option<String>,
}

impl UploadArgs {
    pub fn to_configs(&self) -> Result<Vec<Config>> {
        let tasks: Vec<Task> = match self.task {
            Some(t) => vec![t.into()],
            None    => vec![Task::Summarization, Task::TextGeneration],
        };

        let mut out = Vec::with_capacity(tasks.len());
        for task in tasks {
            let mut cfg = Config::load(task, self.config.as_deref())?;
            if let Some(ns) = &self.namespace {
                cfg.paths.hf_username = ns.clone();
                cfg.validate()?;
            }
            out.push(cfg);
        }
        Ok(out)
    }
}
