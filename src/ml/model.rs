// ============================================================
// Layer 5 — Fine-tunable Model
// ============================================================
// Wraps the two rust-bert architectures behind one type that
// the trainer can drive without caring which one it holds:
//
//   GPT2LMHeadModel             causal LM, loss on shifted labels
//   T5ForConditionalGeneration  encoder-decoder, decoder fed with
//                               labels shifted right (batcher)
//
// Pretrained weights come from a `rust_model.ot` file. When the
// tokenizer has grown (GPT-2 + <|sep|>) the embedding and output
// matrices are bigger than the checkpoint's; the extra rows are
// initialised to the mean of the pretrained rows.
//
// Loss is token-level cross-entropy with IGNORE_INDEX positions
// excluded, computed in f32 even under autocast.

use anyhow::{bail, Context, Result};
use rust_bert::gpt2::{GPT2LMHeadModel, Gpt2Config};
use rust_bert::t5::{T5Config, T5ForConditionalGeneration};
use std::path::Path;
use tch::{nn, Device, Kind, Reduction, Tensor};

use crate::data::batcher::TensorBatch;
use crate::data::preprocessor::IGNORE_INDEX;
use crate::domain::task::Task;

enum Architecture {
    Gpt2(GPT2LMHeadModel),
    T5(T5ForConditionalGeneration),
}

/// Result of one forward pass.
pub struct StepOutput {
    pub loss:   Tensor,
    pub logits: Tensor,
}

pub struct FineTuneModel {
    vs:         nn::VarStore,
    arch:       Architecture,
    vocab_size: i64,
}

impl FineTuneModel {
    /// Build the architecture described by `config_json` with an
    /// embedding of `vocab_size` rows and load `weights` into it.
    pub fn load(
        task:        Task,
        config_json: &Path,
        weights:     &Path,
        vocab_size:  i64,
        device:      Device,
    ) -> Result<Self> {
        let text = std::fs::read_to_string(config_json)
            .with_context(|| format!("Cannot read '{}'", config_json.display()))?;

        let vs = nn::VarStore::new(device);
        let (arch, config_vocab) = match task {
            Task::TextGeneration => {
                let mut cfg: Gpt2Config = serde_json::from_str(&text)
                    .with_context(|| format!("Invalid GPT-2 config '{}'", config_json.display()))?;
                let original = cfg.vocab_size;
                cfg.vocab_size = vocab_size.max(original);
                (Architecture::Gpt2(GPT2LMHeadModel::new(vs.root(), &cfg)), cfg.vocab_size)
            }
            Task::Summarization => {
                let mut cfg: T5Config = serde_json::from_str(&text)
                    .with_context(|| format!("Invalid T5 config '{}'", config_json.display()))?;
                let original = cfg.vocab_size;
                cfg.vocab_size = vocab_size.max(original);
                (Architecture::T5(T5ForConditionalGeneration::new(vs.root(), &cfg)), cfg.vocab_size)
            }
        };

        let mut model = Self { vs, arch, vocab_size: config_vocab };
        model.load_pretrained(weights)?;

        let params: i64 = model
            .vs
            .trainable_variables()
            .iter()
            .map(|t| t.numel() as i64)
            .sum();
        tracing::info!(
            "Model ready: {} ({} parameters, vocab {}) on {:?}",
            task,
            params,
            model.vocab_size,
            device
        );
        Ok(model)
    }

    pub fn device(&self) -> Device {
        self.vs.device()
    }

    pub fn vocab_size(&self) -> i64 {
        self.vocab_size
    }

    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    /// Copy every tensor of a `.ot` file into the matching variable,
    /// growing the first dimension where the variable is larger.
    fn load_pretrained(&mut self, weights: &Path) -> Result<()> {
        let pretrained = Tensor::load_multi(weights)
            .with_context(|| format!("Cannot load weights '{}'", weights.display()))?;
        let mut vars = self.vs.variables();

        let mut loaded  = 0usize;
        let mut resized = 0usize;

        tch::no_grad(|| -> Result<()> {
            for (name, src) in &pretrained {
                let Some(dst) = vars.get_mut(name) else {
                    tracing::debug!("Unused pretrained tensor '{}'", name);
                    continue;
                };
                let src = src.to_device(dst.device()).to_kind(dst.kind());
                let (dst_size, src_size) = (dst.size(), src.size());

                if dst_size == src_size {
                    dst.copy_(&src);
                } else if dst_size.len() == src_size.len()
                    && dst_size[1..] == src_size[1..]
                    && dst_size[0] > src_size[0]
                {
                    let n     = src_size[0];
                    let extra = dst_size[0] - n;
                    dst.narrow(0, 0, n).copy_(&src);

                    let mean = src.mean_dim(Some([0i64].as_slice()), true, src.kind());
                    let mut shape = dst_size.clone();
                    shape[0] = extra;
                    dst.narrow(0, n, extra).copy_(&mean.expand(shape.as_slice(), false));
                    resized += 1;
                } else {
                    bail!("shape mismatch for '{}': model {:?}, weights {:?}", name, dst_size, src_size);
                }
                loaded += 1;
            }
            Ok(())
        })?;

        let missing: Vec<&String> = vars
            .keys()
            .filter(|k| !pretrained.iter().any(|(n, _)| n == *k))
            .collect();
        if !missing.is_empty() {
            bail!("weights '{}' are missing {} tensors (e.g. '{}')", weights.display(), missing.len(), missing[0]);
        }

        tracing::info!(
            "Loaded {} tensors from '{}' ({} resized for added tokens)",
            loaded,
            weights.display(),
            resized
        );
        Ok(())
    }

    /// Forward pass with loss.
    pub fn forward(&self, batch: &TensorBatch, train: bool) -> Result<StepOutput> {
        match &self.arch {
            Architecture::Gpt2(model) => {
                let out = model.forward_t(
                    Some(&batch.input_ids),
                    None,
                    Some(&batch.attention_mask),
                    None,
                    None,
                    None,
                    train,
                )?;
                let logits = out.lm_logits;

                // Token t predicts token t+1
                let shifted_logits = logits.slice(1, 0, -1, 1);
                let shifted_labels = batch.labels.slice(1, 1, None::<i64>, 1);
                let loss = token_cross_entropy(&shifted_logits, &shifted_labels, self.vocab_size);
                Ok(StepOutput { loss, logits })
            }
            Architecture::T5(model) => {
                let Some(decoder_input_ids) = batch.decoder_input_ids.as_ref() else {
                    bail!("seq2seq batch without decoder inputs");
                };
                let out = model.forward_t(
                    Some(&batch.input_ids),
                    Some(&batch.attention_mask),
                    None,
                    Some(decoder_input_ids),
                    None,
                    None,
                    None,
                    None,
                    train,
                );
                let logits = out.decoder_output;
                let loss   = token_cross_entropy(&logits, &batch.labels, self.vocab_size);
                Ok(StepOutput { loss, logits })
            }
        }
    }

    pub fn save_weights(&self, path: &Path) -> Result<()> {
        self.vs
            .save(path)
            .with_context(|| format!("Cannot save weights to '{}'", path.display()))
    }

    pub fn load_weights(&mut self, path: &Path) -> Result<()> {
        self.vs
            .load(path)
            .with_context(|| format!("Cannot load weights from '{}'", path.display()))
    }
}

fn token_cross_entropy(logits: &Tensor, labels: &Tensor, vocab_size: i64) -> Tensor {
    logits
        .to_kind(Kind::Float)
        .contiguous()
        .view([-1, vocab_size])
        .cross_entropy_loss::<Tensor>(
            &labels.contiguous().view([-1]),
            None,
            Reduction::Mean,
            IGNORE_INDEX,
            0.0,
        )
}

/// Greedy (argmax) token per position, one row per example.
pub fn greedy_predictions(logits: &Tensor) -> Result<Vec<Vec<i64>>> {
    let size = logits.size();
    if size.len() != 3 {
        bail!("expected [batch, seq, vocab] logits, got {:?}", size);
    }
    let seq_len = size[1].max(1) as usize;
    let flat    = logits.argmax(-1, false).flatten(0, -1).to_device(Device::Cpu);
    let ids     = Vec::<i64>::try_from(&flat)?;
    Ok(ids.chunks(seq_len).map(|c| c.to_vec()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::Batcher;
    use crate::data::dataset::EncodedExample;
    use std::path::PathBuf;

    const VOCAB: i64 = 12;

    /// Write a randomly initialised model's config and weights to `dir`.
    fn write_tiny(dir: &Path, task: Task) -> (PathBuf, PathBuf) {
        let config  = dir.join("config.json");
        let weights = dir.join("rust_model.ot");
        let vs      = nn::VarStore::new(Device::Cpu);

        let json = match task {
            Task::TextGeneration => {
                let cfg = Gpt2Config {
                    n_ctx: 16, n_positions: 16, n_embd: 8, n_head: 2, n_layer: 1,
                    vocab_size: VOCAB,
                    ..Default::default()
                };
                let _ = GPT2LMHeadModel::new(vs.root(), &cfg);
                serde_json::to_string(&cfg).unwrap()
            }
            Task::Summarization => {
                let cfg = T5Config {
                    d_model: 8, d_ff: 16, d_kv: 4, num_heads: 2, num_layers: 1,
                    vocab_size: VOCAB,
                    ..Default::default()
                };
                let _ = T5ForConditionalGeneration::new(vs.root(), &cfg);
                serde_json::to_string(&cfg).unwrap()
            }
        };
        std::fs::write(&config, json).unwrap();
        vs.save(&weights).unwrap();
        (config, weights)
    }

    fn example(ids: &[i64], labels: &[i64]) -> EncodedExample {
        EncodedExample {
            input_ids:      ids.to_vec(),
            attention_mask: vec![1; ids.len()],
            labels:         labels.to_vec(),
        }
    }

    #[test]
    fn test_causal_forward_with_added_token() {
        let tmp = tempfile::tempdir().unwrap();
        let (config, weights) = write_tiny(tmp.path(), Task::TextGeneration);

        // One added token (the separator) grows the embedding by a row
        let model = FineTuneModel::load(Task::TextGeneration, &config, &weights, VOCAB + 1, Device::Cpu)
            .unwrap();
        assert_eq!(model.vocab_size(), VOCAB + 1);

        let sep = VOCAB;
        let ex  = example(&[3, 4, sep, 5, 6, 0], &[IGNORE_INDEX, IGNORE_INDEX, IGNORE_INDEX, 5, 6, 0]);
        let batch = Batcher::causal(0).collate(&[&ex]).to_tensors(Device::Cpu);

        let out = model.forward(&batch, false).unwrap();
        assert_eq!(out.logits.size(), vec![1, 6, VOCAB + 1]);
        assert!(out.loss.double_value(&[]).is_finite());
    }

    #[test]
    fn test_seq2seq_forward_and_greedy_shape() {
        let tmp = tempfile::tempdir().unwrap();
        let (config, weights) = write_tiny(tmp.path(), Task::Summarization);
        let model = FineTuneModel::load(Task::Summarization, &config, &weights, VOCAB, Device::Cpu)
            .unwrap();

        let a = example(&[3, 4, 5, 1], &[6, 7, 1]);
        let b = example(&[3, 1], &[6, 1]);
        let batch = Batcher::seq2seq(0, 0).collate(&[&a, &b]).to_tensors(Device::Cpu);

        let out = model.forward(&batch, false).unwrap();
        assert!(out.loss.double_value(&[]).is_finite());

        let preds = greedy_predictions(&out.logits).unwrap();
        assert_eq!(preds.len(), 2);
        assert!(preds.iter().all(|row| row.len() == 3));
    }
}
