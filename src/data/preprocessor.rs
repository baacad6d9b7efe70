// ============================================================
// Layer 4 — Preprocessor (tokenisation + label masking)
// ============================================================
// Turns `TextPair` rows into `EncodedExample`s.
//
// Causal task (GPT-2), one sequence of exactly `max_length`:
//
//   Expand: <summary> <|sep|> <text><|endoftext|><pad><pad>...
//   └──────── prompt (L tokens) ──┘
//
//   input_ids       every token, right-padded with pad_id (= eos)
//   attention_mask  1 for real tokens, 0 for padding
//   labels          copy of input_ids with positions [0, L) and
//                   every padding position set to IGNORE_INDEX
//
//   If the prompt alone fills the window (L >= max_length) every
//   label is masked and the row teaches nothing. The loader's
//   token filter exists to keep such rows out.
//
// Seq2seq task (T5), no padding here (the batcher pads per batch):
//
//   input_ids       encode("summarize: " + text)  ≤ max_input_length
//   labels          encode(summary)               ≤ max_target_length
//
// Truncation keeps the special tokens the tokenizer appends at the
// end of a sequence (T5's </s>), so a truncated input still ends
// with an end-of-sequence marker.

use anyhow::Result;
use tokenizers::{PostProcessor, Tokenizer};

use crate::config::Config;
use crate::data::dataset::EncodedExample;
use crate::domain::pair::TextPair;
use crate::domain::task::{PromptFormat, Task};
use crate::infra::tokenizer_store::SpecialTokens;

/// Label value ignored by the cross-entropy loss.
pub const IGNORE_INDEX: i64 = -100;

/// Encode `text` with the tokenizer's special tokens and cut it down to
/// `max_len` ids, keeping any special tokens at the tail.
pub fn encode_truncated(tokenizer: &Tokenizer, text: &str, max_len: usize) -> Result<Vec<i64>> {
    let enc = tokenizer
        .encode(text, true)
        .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;

    let ids: Vec<i64> = enc.get_ids().iter().map(|&id| id as i64).collect();
    if ids.len() <= max_len {
        return Ok(ids);
    }

    // Only tokens the post-processor appended are kept, never special
    // tokens that were literally part of the text
    let appended = tokenizer
        .get_post_processor()
        .map(|p| p.added_tokens(false))
        .unwrap_or(0);
    let trailing_special = enc
        .get_special_tokens_mask()
        .iter()
        .rev()
        .take_while(|&&m| m == 1)
        .count()
        .min(appended);

    if trailing_special >= max_len {
        return Ok(ids[..max_len].to_vec());
    }

    let keep_head = max_len - trailing_special;
    let mut out   = Vec::with_capacity(max_len);
    out.extend_from_slice(&ids[..keep_head]);
    out.extend_from_slice(&ids[ids.len() - trailing_special..]);
    Ok(out)
}

/// Prompt ids for generation, at most `max_len` long.
///
/// A causal prompt must end with its separator or the model keeps
/// writing the summary instead of the text, so only `prefix + input`
/// is cut and the separator ids are appended afterwards.
pub fn encode_prompt(
    tokenizer: &Tokenizer,
    format:    &PromptFormat,
    input:     &str,
    max_len:   usize,
) -> Result<Vec<i64>> {
    let Some(separator) = &format.separator else {
        return encode_truncated(tokenizer, &format.prompt(input), max_len);
    };

    let tail: Vec<i64> = tokenizer
        .encode(separator.as_str(), false)
        .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?
        .get_ids()
        .iter()
        .map(|&id| id as i64)
        .collect();

    let head_text = format!("{}{}", format.prefix, input);
    let mut ids   = encode_truncated(tokenizer, &head_text, max_len.saturating_sub(tail.len()))?;
    ids.extend(tail);
    Ok(ids)
}

/// Number of tokens `text` encodes to, without truncation.
pub fn token_count(tokenizer: &Tokenizer, text: &str) -> Result<usize> {
    let enc = tokenizer
        .encode(text, true)
        .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;
    Ok(enc.get_ids().len())
}

pub struct Preprocessor<'a> {
    tokenizer:         &'a Tokenizer,
    task:              Task,
    format:            PromptFormat,
    special:           SpecialTokens,
    max_input_length:  usize,
    max_target_length: usize,
}

impl<'a> Preprocessor<'a> {
    pub fn new(tokenizer: &'a Tokenizer, config: &Config, special: SpecialTokens) -> Self {
        Self {
            tokenizer,
            task:              config.task,
            format:            config.prompt_format(),
            special,
            max_input_length:  config.model.max_input_length,
            max_target_length: config.model.max_target_length,
        }
    }

    /// Token length of the full causal training string for `pair`.
    /// This is what the loader's length filter compares to `max_length`.
    pub fn causal_length(&self, pair: &TextPair) -> Result<usize> {
        let full = self
            .format
            .causal_sample(&pair.input, &pair.target, &self.special.eos_token);
        token_count(self.tokenizer, &full)
    }

    pub fn encode(&self, pair: &TextPair) -> Result<EncodedExample> {
        match self.task {
            Task::TextGeneration => self.encode_causal(pair),
            Task::Summarization  => self.encode_seq2seq(pair),
        }
    }

    pub fn encode_all(&self, pairs: &[TextPair]) -> Result<Vec<EncodedExample>> {
        let mut out          = Vec::with_capacity(pairs.len());
        let mut fully_masked = 0usize;

        for pair in pairs {
            let ex = self.encode(pair)?;
            if self.task.is_causal() && ex.trainable_tokens() == 0 {
                fully_masked += 1;
            }
            out.push(ex);
        }

        if fully_masked > 0 {
            tracing::warn!(
                "{} of {} examples have every label masked (prompt fills the window)",
                fully_masked,
                pairs.len()
            );
        }
        Ok(out)
    }

    fn encode_causal(&self, pair: &TextPair) -> Result<EncodedExample> {
        let max_len = self.max_input_length;
        let pad_id  = self.special.pad_id as i64;

        let full = self
            .format
            .causal_sample(&pair.input, &pair.target, &self.special.eos_token);
        let mut input_ids = encode_truncated(self.tokenizer, &full, max_len)?;

        let prompt     = self.format.prompt(&pair.input);
        let prompt_len = encode_truncated(self.tokenizer, &prompt, max_len)?.len();

        // Right-pad to the fixed window
        let real_len           = input_ids.len();
        let mut attention_mask = vec![1i64; real_len];
        input_ids.resize(max_len, pad_id);
        attention_mask.resize(max_len, 0);

        let labels = input_ids
            .iter()
            .zip(&attention_mask)
            .enumerate()
            .map(|(i, (&id, &mask))| {
                if i < prompt_len || mask == 0 { IGNORE_INDEX } else { id }
            })
            .collect();

        Ok(EncodedExample { input_ids, attention_mask, labels })
    }

    fn encode_seq2seq(&self, pair: &TextPair) -> Result<EncodedExample> {
        let input_ids = encode_truncated(
            self.tokenizer,
            &self.format.prompt(&pair.input),
            self.max_input_length,
        )?;
        let labels = encode_truncated(self.tokenizer, &pair.target, self.max_target_length)?;
        let attention_mask = vec![1i64; input_ids.len()];

        Ok(EncodedExample { input_ids, attention_mask, labels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::tokenizer_store::test_support::{causal_tokenizer, seq2seq_tokenizer};

    fn causal_config(max_len: usize) -> Config {
        let mut c = Config::for_task(Task::TextGeneration);
        c.model.max_input_length = max_len;
        c
    }

    fn seq2seq_config(max_in: usize, max_out: usize) -> Config {
        let mut c = Config::for_task(Task::Summarization);
        c.model.max_input_length  = max_in;
        c.model.max_target_length = max_out;
        c
    }

    #[test]
    fn test_causal_lengths_are_fixed() {
        let (tok, special) = causal_tokenizer();
        let cfg = causal_config(24);
        let p   = Preprocessor::new(&tok, &cfg, special);

        let ex = p.encode(&TextPair::new("a cat", "the cat sat on the mat")).unwrap();
        assert_eq!(ex.input_ids.len(), 24);
        assert_eq!(ex.attention_mask.len(), 24);
        assert_eq!(ex.labels.len(), 24);
    }

    #[test]
    fn test_causal_prompt_and_padding_are_masked() {
        let (tok, special) = causal_tokenizer();
        let pad_id = special.pad_id as i64;
        let cfg = causal_config(24);
        let p   = Preprocessor::new(&tok, &cfg, special);

        let pair = TextPair::new("a cat", "the cat sat");
        let ex   = p.encode(&pair).unwrap();

        // "Expand: a cat <|sep|>" → Expand, :, a, cat, <|sep|>
        let prompt_len = 5;
        assert!(ex.labels[..prompt_len].iter().all(|&l| l == IGNORE_INDEX));

        for i in prompt_len..ex.labels.len() {
            if ex.attention_mask[i] == 1 {
                assert_eq!(ex.labels[i], ex.input_ids[i]);
            } else {
                assert_eq!(ex.labels[i], IGNORE_INDEX);
                assert_eq!(ex.input_ids[i], pad_id);
            }
        }

        // target (3 words) + eos are the only trainable tokens
        assert_eq!(ex.trainable_tokens(), 4);
    }

    #[test]
    fn test_causal_prompt_filling_window_masks_everything() {
        let (tok, special) = causal_tokenizer();
        let cfg = causal_config(4);
        let p   = Preprocessor::new(&tok, &cfg, special);

        let ex = p.encode(&TextPair::new("a cat sat on the mat", "the end")).unwrap();
        assert_eq!(ex.input_ids.len(), 4);
        assert!(ex.labels.iter().all(|&l| l == IGNORE_INDEX));
    }

    #[test]
    fn test_causal_length_counts_full_sample() {
        let (tok, special) = causal_tokenizer();
        let cfg = causal_config(64);
        let p   = Preprocessor::new(&tok, &cfg, special);

        // Expand : a cat <|sep|> the cat sat <|endoftext|>
        let n = p.causal_length(&TextPair::new("a cat", "the cat sat")).unwrap();
        assert_eq!(n, 9);
    }

    #[test]
    fn test_seq2seq_truncation_keeps_eos() {
        let (tok, special) = seq2seq_tokenizer();
        let eos_id = special.eos_id as i64;
        let cfg = seq2seq_config(4, 3);
        let p   = Preprocessor::new(&tok, &cfg, special);

        let ex = p
            .encode(&TextPair::new("the cat sat on the mat", "a cat sat down"))
            .unwrap();

        assert_eq!(ex.input_ids.len(), 4);
        assert_eq!(*ex.input_ids.last().unwrap(), eos_id);
        assert_eq!(ex.attention_mask, vec![1; 4]);

        assert_eq!(ex.labels.len(), 3);
        assert_eq!(*ex.labels.last().unwrap(), eos_id);
        assert!(ex.labels.iter().all(|&l| l != IGNORE_INDEX));
    }

    #[test]
    fn test_long_causal_prompt_keeps_separator() {
        let (tok, special) = causal_tokenizer();
        let format  = causal_config(8).prompt_format();
        let summary = "the quick brown fox jumps over the lazy dog on the mat";

        let ids = encode_prompt(&tok, &format, summary, 8).unwrap();
        assert_eq!(ids.len(), 8);
        assert_eq!(*ids.last().unwrap(), special.sep_id.unwrap() as i64);

        // Expand : the quick brown fox jumps <|sep|>
        let expand = tok.token_to_id("Expand").unwrap() as i64;
        assert_eq!(ids[0], expand);
    }

    #[test]
    fn test_short_causal_prompt_matches_training_prompt() {
        let (tok, _) = causal_tokenizer();
        let format   = causal_config(64).prompt_format();

        let ids      = encode_prompt(&tok, &format, "a cat", 64).unwrap();
        let expected = encode_truncated(&tok, &format.prompt("a cat"), 64).unwrap();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_seq2seq_prompt_is_truncated_with_eos() {
        let (tok, special) = seq2seq_tokenizer();
        let format = seq2seq_config(4, 4).prompt_format();

        let ids = encode_prompt(&tok, &format, "the cat sat on the mat", 4).unwrap();
        assert_eq!(ids.len(), 4);
        assert_eq!(*ids.last().unwrap(), special.eos_id as i64);
    }

    #[test]
    fn test_seq2seq_short_input_untouched() {
        let (tok, special) = seq2seq_tokenizer();
        let cfg = seq2seq_config(64, 64);
        let p   = Preprocessor::new(&tok, &cfg, special);

        // summarize : the cat </s>
        let ex = p.encode(&TextPair::new("the cat", "cat")).unwrap();
        assert_eq!(ex.input_ids.len(), 5);
        assert_eq!(ex.labels.len(), 2);
    }
}
