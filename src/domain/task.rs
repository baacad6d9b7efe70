// ============================================================
// Layer 3 — Task and Prompt Formatting
// ============================================================
// Two models live in this repository:
//
//   Summarization   — T5, sequence-to-sequence.
//                     Encoder sees  "summarize: " + text
//                     Decoder learns the summary.
//
//   TextGeneration  — GPT-2, causal language model.
//                     One sequence holds both sides:
//                     prefix + summary + separator + text + eos
//                     Only the part after the separator is learned.
//
// The prompt strings built here are used in exactly the same
// shape by the preprocessor (training) and the inferencer
// (serving), so a model never sees a prompt format it was not
// trained on.

use serde::{Deserialize, Serialize};

/// Special token appended to the GPT-2 vocabulary to mark the
/// end of the prompt.
pub const SEP_TOKEN: &str = "<|sep|>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Task {
    Summarization,
    TextGeneration,
}

impl Task {
    /// True when the model is a decoder-only causal LM.
    pub fn is_causal(&self) -> bool {
        matches!(self, Task::TextGeneration)
    }

    /// Human readable label used in HTTP error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Task::Summarization  => "Summarization",
            Task::TextGeneration => "Text generation",
        }
    }

    /// Short slug used for file names and log lines.
    pub fn slug(&self) -> &'static str {
        match self {
            Task::Summarization  => "summarization",
            Task::TextGeneration => "text-generation",
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

// ─── Prompt Formatting ───────────────────────────────────────────────────────

/// How a raw input string becomes the text the model is fed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptFormat {
    pub prefix:    String,
    /// Only set for the causal task.
    pub separator: Option<String>,
}

impl PromptFormat {
    pub fn new(prefix: impl Into<String>, separator: Option<String>) -> Self {
        Self { prefix: prefix.into(), separator }
    }

    /// The conditioning part of the sequence.
    /// Seq2seq: `prefix + input`. Causal: `prefix + input + separator`.
    pub fn prompt(&self, input: &str) -> String {
        let mut s = String::with_capacity(self.prefix.len() + input.len() + 12);
        s.push_str(&self.prefix);
        s.push_str(input);
        if let Some(sep) = &self.separator {
            s.push_str(sep);
        }
        s
    }

    /// The full causal training string:
    /// `prefix + input + separator + target + eos`.
    pub fn causal_sample(&self, input: &str, target: &str, eos: &str) -> String {
        let mut s = self.prompt(input);
        s.push_str(target);
        s.push_str(eos);
        s
    }
}

/// Removes the separator artifact and surrounding whitespace from
/// decoded model output.
pub fn clean_output(decoded: &str) -> String {
    decoded.replace(SEP_TOKEN, "").trim().to_string()
}

/// Whitespace word count, the unit used for `input_length` and
/// `output_length` in responses.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq2seq_prompt_has_no_separator() {
        let f = PromptFormat::new("summarize: ", None);
        assert_eq!(f.prompt("Some text"), "summarize: Some text");
    }

    #[test]
    fn test_causal_sample_layout() {
        let f = PromptFormat::new("Expand: ", Some(" <|sep|> ".to_string()));
        assert_eq!(f.prompt("A cat."), "Expand: A cat. <|sep|> ");
        assert_eq!(
            f.causal_sample("A cat.", "The cat sat.", "<|endoftext|>"),
            "Expand: A cat. <|sep|> The cat sat.<|endoftext|>"
        );
    }

    #[test]
    fn test_clean_output_strips_separator() {
        assert_eq!(clean_output("  <|sep|> hello world <|sep|>"), "hello world");
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("The quick brown fox jumps over the lazy dog."), 9);
        assert_eq!(word_count("   "), 0);
    }

    #[test]
    fn test_task_labels() {
        assert!(Task::TextGeneration.is_causal());
        assert!(!Task::Summarization.is_causal());
        assert_eq!(Task::Summarization.label(), "Summarization");
    }
}
