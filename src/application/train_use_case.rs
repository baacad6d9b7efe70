// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full fine-tuning pipeline in order:
//
//   Step 1: Create output dirs          (config)
//   Step 2: Resolve base model          (Layer 6 - infra::hub)
//   Step 3: Load + configure tokenizer  (Layer 6 - infra)
//   Step 4: Load CSV rows               (Layer 4 - data)
//   Step 5: Length filter / sample cap  (Layer 4 - data)
//   Step 6: Split train/validation      (Layer 4 - data)
//   Step 7: Encode datasets             (Layer 4 - data)
//   Step 8: Load pretrained weights     (Layer 5 - ml)
//   Step 9: Run training loop           (Layer 5 - ml)
//   Step 10: Persist the model dir      (Layer 6 - infra)
//
// Steps 4–7 need no libtorch and live in `prepare_datasets`.

use anyhow::Result;
use tokenizers::Tokenizer;

use crate::config::Config;
use crate::data::{
    dataset::EncodedDataset,
    loader::{filter_by_token_length, CsvLoader},
    preprocessor::Preprocessor,
    splitter::split_train_val,
};
use crate::infra::tokenizer_store::SpecialTokens;

/// Sizes of the prepared datasets, reported after training.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainSummary {
    pub train_examples: usize,
    pub eval_examples:  usize,
    pub global_step:    usize,
    pub model_dir:      String,
}

pub struct TrainUseCase {
    config: Config,
}

impl TrainUseCase {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    #[cfg(feature = "ml")]
    pub fn execute(&self) -> Result<TrainSummary> {
        use std::collections::BTreeMap;

        use crate::data::batcher::Batcher;
        use crate::infra::{
            checkpoint::{model_files, vocab_files, ModelDir, CONFIG_FILE, WEIGHTS_FILE},
            hub::{resolve_model_dir, HubClient},
            metrics::{compute_metrics, MetricsLogger},
            tokenizer_store::{configure_for_training, TokenizerStore},
        };
        use crate::ml::{model::FineTuneModel, trainer::Trainer};

        let cfg  = &self.config;
        let task = cfg.task;

        // ── Step 1: Output directories ───────────────────────────────────────
        cfg.create_dirs()?;

        // ── Step 2: Base model (local dir or hub download) ───────────────────
        let hub      = HubClient::from_env()?;
        let base_dir = resolve_model_dir(&cfg.model.model_name, &model_files(task), &hub)?;

        // ── Step 3: Tokenizer ────────────────────────────────────────────────
        // GPT-2 gets the <|sep|> token here, before lengths are measured
        let mut tokenizer = TokenizerStore::new(&base_dir).load()?;
        let special       = configure_for_training(&mut tokenizer, task)?;

        // ── Steps 4–7: Data ──────────────────────────────────────────────────
        let (train_ds, eval_ds) = prepare_datasets(cfg, &tokenizer, &special)?;

        // ── Step 8: Pretrained weights ───────────────────────────────────────
        let device    = tch::Device::cuda_if_available();
        let vocab     = tokenizer.get_vocab_size(true) as i64;
        let mut model = FineTuneModel::load(
            task,
            &base_dir.join(CONFIG_FILE),
            &base_dir.join(WEIGHTS_FILE),
            vocab,
            device,
        )?;

        // ── Step 9: Train ────────────────────────────────────────────────────
        let model_dir = ModelDir::new(&cfg.paths.model_dir);
        let pad_id    = special.pad_id as i64;
        let outcome = if task.is_causal() {
            let logger = MetricsLogger::new(&cfg.paths.log_dir, &[])?;
            Trainer::new(&mut model, &cfg.training, Batcher::causal(pad_id), &model_dir, logger)
                .train(&train_ds, &eval_ds)?
        } else {
            let logger = MetricsLogger::new(&cfg.paths.log_dir, &["rouge1", "rouge2", "rougeL"])?;
            let tok    = &tokenizer;
            let rouge  = move |p: &[Vec<i64>], l: &[Vec<i64>]| -> Result<BTreeMap<String, f64>> {
                compute_metrics(p, l, tok, pad_id)
            };
            // T5 starts decoding from the pad token
            Trainer::new(&mut model, &cfg.training, Batcher::seq2seq(pad_id, pad_id), &model_dir, logger)
                .with_metrics(Box::new(rouge))
                .train(&train_ds, &eval_ds)?
        };

        // ── Step 10: Persist ─────────────────────────────────────────────────
        model.save_weights(&model_dir.weights_path())?;
        model_dir.write_model_config(&base_dir.join(CONFIG_FILE), model.vocab_size())?;
        TokenizerStore::new(model_dir.path()).save(&tokenizer)?;
        model_dir.copy_from(&base_dir, vocab_files(task))?;
        model_dir.save_training_args(cfg)?;
        tracing::info!("Model saved to '{}'", model_dir.path().display());

        Ok(TrainSummary {
            train_examples: train_ds.len(),
            eval_examples:  eval_ds.len(),
            global_step:    outcome.global_step,
            model_dir:      cfg.paths.model_dir.clone(),
        })
    }

    #[cfg(not(feature = "ml"))]
    pub fn execute(&self) -> Result<TrainSummary> {
        anyhow::bail!("training requires the `ml` feature (rust-bert + libtorch)")
    }
}

/// Load, filter, split and encode the configured CSV.
///
/// The causal task keeps only rows whose full training string fits
/// `max_input_length` tokens; the seq2seq task truncates instead and
/// just applies the sample cap.
pub fn prepare_datasets(
    cfg:       &Config,
    tokenizer: &Tokenizer,
    special:   &SpecialTokens,
) -> Result<(EncodedDataset, EncodedDataset)> {
    let data = &cfg.data;
    let prep = Preprocessor::new(tokenizer, cfg, special.clone());

    // ── Step 4: Load rows ────────────────────────────────────────────────────
    let loader = CsvLoader::new(&data.data_path, &data.input_column, &data.target_column);
    let rows = if cfg.task.is_causal() {
        // ── Step 5: Length filter (caps itself) ──────────────────────────────
        let all = loader.load(None)?;
        filter_by_token_length(
            all,
            |pair| prep.causal_length(pair),
            cfg.model.max_input_length,
            data.max_samples,
        )?
    } else {
        loader.load(data.max_samples)?
    };
    if rows.is_empty() {
        anyhow::bail!("no usable rows in '{}'", data.data_path.display());
    }

    // ── Step 6: Split ────────────────────────────────────────────────────────
    let (train_rows, eval_rows) = split_train_val(
        rows,
        cfg.training.validation_split,
        cfg.training.split_seed,
    );

    // ── Step 7: Encode ───────────────────────────────────────────────────────
    let train = EncodedDataset::new(prep.encode_all(&train_rows)?);
    let eval  = EncodedDataset::new(prep.encode_all(&eval_rows)?);
    tracing::info!("Encoded {} training and {} validation examples", train.len(), eval.len());
    Ok((train, eval))
}
