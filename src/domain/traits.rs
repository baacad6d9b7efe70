// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The HTTP layer and the CLI only ever talk to these traits:
//
//   TextGenerator  — Inferencer (rust-bert) in production,
//                    a canned fake in the HTTP tests
//   ModelRegistry  — HubClient (Hugging Face Hub)
//
// Swapping the backing model or the registry never touches
// the handlers or the use cases.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::domain::task::word_count;

// ─── Generation Parameters ───────────────────────────────────────────────────
/// Per-request overrides. Anything left as `None` falls back to the
/// model configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationParams {
    /// Seq2seq: maximum output length. Causal: maximum new tokens.
    pub max_length:         Option<usize>,
    pub num_beams:          Option<usize>,
    pub temperature:        Option<f64>,
    pub top_k:              Option<usize>,
    pub top_p:              Option<f64>,
    pub repetition_penalty: Option<f64>,
    pub do_sample:          Option<bool>,
}

/// Generated text plus whitespace word counts of input and output.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutput {
    pub text:          String,
    pub input_length:  usize,
    pub output_length: usize,
}

impl GenerationOutput {
    pub fn new(input: &str, text: String) -> Self {
        Self {
            input_length:  word_count(input),
            output_length: word_count(&text),
            text,
        }
    }
}

// ─── TextGenerator ───────────────────────────────────────────────────────────
/// Anything that turns an input string into generated text.
///
/// Shared across HTTP worker threads, hence `Send + Sync`.
pub trait TextGenerator: Send + Sync {
    /// Generate text for `input`. The returned text is already
    /// cleaned (no special tokens, no separator, trimmed).
    fn generate(&self, input: &str, params: &GenerationParams) -> Result<GenerationOutput>;

    /// Name reported by the health endpoint.
    fn model_name(&self) -> &str;
}

// ─── ModelRegistry ───────────────────────────────────────────────────────────
/// A file to publish, relative to the folder being uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub relative: String,
    pub absolute: PathBuf,
    pub size:     u64,
}

/// A remote store of model snapshots.
pub trait ModelRegistry {
    /// Download `files` of `repo_id` and return the local directory
    /// holding them.
    fn fetch(&self, repo_id: &str, files: &[&str]) -> Result<PathBuf>;

    /// Publish `files` (all under `folder`) to `repo_id` in one commit.
    fn upload_folder(&self, folder: &Path, repo_id: &str, files: &[UploadFile]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_word_counts() {
        let out = GenerationOutput::new(
            "The quick brown fox jumps over the lazy dog.",
            "A fox jumps.".to_string(),
        );
        assert_eq!(out.input_length, 9);
        assert_eq!(out.output_length, 3);
    }
}
