// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Fine-tunes a `FineTuneModel` on an `EncodedDataset`.
//
// Per optimiser step:
//   forward (autocast when fp16 on CUDA) → loss / accumulation
//   → backward, repeated `gradient_accumulation_steps` times
//   → clip grad norm to 1.0 → AdamW step with the scheduled lr
//
// Learning rate schedule (linear warmup, then linear decay):
//
//   lr(step) = base * step / warmup                 step <  warmup
//   lr(step) = base * (total - step) / (total - warmup)  otherwise
//
// Per epoch:
//   evaluate (mean validation loss + optional metric function over
//   greedy predictions) → print/log → checkpoint-<step>/ →
//   remember the best checkpoint by `metric_for_best_model`
//
// At the end the best checkpoint's weights are loaded back when
// `load_best_model_at_end` is set.

use anyhow::Result;
use rand::{rngs::StdRng, SeedableRng};
use std::collections::BTreeMap;
use tch::{nn, nn::OptimizerConfig, Device};

use crate::config::{SaveStrategy, TrainingConfig};
use crate::data::{batcher::Batcher, dataset::EncodedDataset};
use crate::infra::checkpoint::{ModelDir, TrainerState, WEIGHTS_FILE};
use crate::infra::metrics::{EpochMetrics, MetricsLogger};
use crate::ml::model::{greedy_predictions, FineTuneModel};

const MAX_GRAD_NORM: f64 = 1.0;
const SHUFFLE_SEED:  u64 = 42;

/// Caller supplied evaluation metric over (predictions, labels).
pub type MetricFn<'a> =
    Box<dyn Fn(&[Vec<i64>], &[Vec<i64>]) -> Result<BTreeMap<String, f64>> + 'a>;

/// What a finished run reports back.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub global_step: usize,
    pub history:     Vec<EpochMetrics>,
    /// (step, metric value) of the best epoch, if any was evaluated.
    pub best:        Option<(usize, f64)>,
}

pub struct Trainer<'a> {
    model:           &'a mut FineTuneModel,
    args:            &'a TrainingConfig,
    batcher:         Batcher,
    model_dir:       &'a ModelDir,
    logger:          MetricsLogger,
    compute_metrics: Option<MetricFn<'a>>,
}

impl<'a> Trainer<'a> {
    pub fn new(
        model:     &'a mut FineTuneModel,
        args:      &'a TrainingConfig,
        batcher:   Batcher,
        model_dir: &'a ModelDir,
        logger:    MetricsLogger,
    ) -> Self {
        Self { model, args, batcher, model_dir, logger, compute_metrics: None }
    }

    pub fn with_metrics(mut self, f: MetricFn<'a>) -> Self {
        self.compute_metrics = Some(f);
        self
    }

    pub fn train(&mut self, train_ds: &EncodedDataset, eval_ds: &EncodedDataset) -> Result<TrainOutcome> {
        let args   = self.args;
        let device = self.model.device();
        let amp    = args.fp16 && device.is_cuda();

        let steps_per_epoch = train_ds
            .num_batches(args.batch_size)
            .div_ceil(args.gradient_accumulation_steps);
        let total_steps = steps_per_epoch * args.num_epochs;

        tracing::info!(
            "Training on {} examples ({} steps/epoch, {} total, mixed precision: {})",
            train_ds.len(),
            steps_per_epoch,
            total_steps,
            amp
        );
        if args.fp16 && !amp {
            tracing::warn!("fp16 requested but no CUDA device, training in f32");
        }

        // ── AdamW optimiser ───────────────────────────────────────────────────
        let mut opt = nn::AdamW { wd: args.weight_decay, ..Default::default() }
            .build(self.model.var_store(), args.learning_rate)?;

        let mut rng         = StdRng::seed_from_u64(SHUFFLE_SEED);
        let mut global_step = 0usize;
        let mut history     = Vec::with_capacity(args.num_epochs);
        let mut best: Option<(usize, f64)> = None;

        // ── Epoch loop ────────────────────────────────────────────────────────
        for epoch in 1..=args.num_epochs {
            let batches = train_ds.batch_indices(args.batch_size, Some(&mut rng));

            let mut epoch_loss_sum = 0.0f64;
            let mut epoch_batches  = 0usize;
            let mut window_loss    = 0.0f64;
            let mut window_batches = 0usize;

            opt.zero_grad();
            for (i, indices) in batches.iter().enumerate() {
                let batch = self
                    .batcher
                    .collate(&train_ds.select(indices))
                    .to_tensors(device);

                let model = &*self.model;
                let out   = tch::autocast(amp, || model.forward(&batch, true))?;
                let loss_val = out.loss.double_value(&[]);

                (&out.loss / args.gradient_accumulation_steps as f64).backward();

                epoch_loss_sum += loss_val;
                epoch_batches  += 1;
                window_loss    += loss_val;
                window_batches += 1;

                let boundary = (i + 1) % args.gradient_accumulation_steps == 0
                    || i + 1 == batches.len();
                if !boundary {
                    continue;
                }

                let lr = scheduled_lr(global_step, args.warmup_steps, total_steps, args.learning_rate);
                opt.set_lr(lr);
                opt.clip_grad_norm(MAX_GRAD_NORM);
                opt.step();
                opt.zero_grad();
                global_step += 1;

                if args.logging_steps > 0 && global_step % args.logging_steps == 0 {
                    tracing::info!(
                        step = global_step,
                        loss = window_loss / window_batches.max(1) as f64,
                        lr,
                        "training"
                    );
                    window_loss    = 0.0;
                    window_batches = 0;
                }
            }

            let train_loss = if epoch_batches > 0 {
                epoch_loss_sum / epoch_batches as f64
            } else { f64::NAN };

            // ── Evaluation ────────────────────────────────────────────────────
            let (eval_loss, extra) = self.evaluate(eval_ds, device)?;
            let metrics = EpochMetrics { epoch, step: global_step, train_loss, eval_loss, extra };

            let extra_text: String = metrics
                .extra
                .iter()
                .map(|(k, v)| format!(" | {k}={v:.4}"))
                .collect();
            println!(
                "Epoch {:>3}/{} | step {} | train_loss={:.4} | eval_loss={:.4}{}",
                epoch, args.num_epochs, global_step, train_loss, eval_loss, extra_text,
            );
            self.logger.log(&metrics)?;

            // ── Checkpoint ────────────────────────────────────────────────────
            if args.save_strategy == SaveStrategy::Epoch {
                let dir = self.model_dir.create_checkpoint(global_step)?;
                self.model.save_weights(&dir.join(WEIGHTS_FILE))?;
                self.model_dir.save_trainer_state(
                    global_step,
                    &TrainerState {
                        epoch,
                        global_step,
                        train_loss,
                        eval_loss,
                        metrics: metrics.extra.clone(),
                    },
                )?;
                tracing::info!("Checkpoint saved: {}", dir.display());
            }

            if metrics.is_improvement(
                &args.metric_for_best_model,
                best.map(|(_, v)| v),
                args.greater_is_better,
            ) {
                if let Some(value) = metrics.value(&args.metric_for_best_model) {
                    best = Some((global_step, value));
                }
            }
            history.push(metrics);
        }

        // ── Restore best ──────────────────────────────────────────────────────
        if args.load_best_model_at_end && args.save_strategy == SaveStrategy::Epoch {
            if let Some((step, value)) = best {
                if step != global_step {
                    let path = self.model_dir.checkpoint_dir(step).join(WEIGHTS_FILE);
                    self.model.load_weights(&path)?;
                }
                tracing::info!(
                    "Best model: step {} ({}={:.4})",
                    step,
                    args.metric_for_best_model,
                    value
                );
            }
        }

        tracing::info!("Training complete!");
        Ok(TrainOutcome { global_step, history, best })
    }

    /// Mean validation loss, plus the metric function's output when one
    /// is configured.
    fn evaluate(&self, eval_ds: &EncodedDataset, device: Device) -> Result<(f64, BTreeMap<String, f64>)> {
        if eval_ds.is_empty() {
            tracing::warn!("Empty validation set, skipping evaluation");
            return Ok((f64::NAN, BTreeMap::new()));
        }

        let mut loss_sum = 0.0f64;
        let mut batches  = 0usize;
        let mut preds    = Vec::new();
        let mut labels   = Vec::new();

        tch::no_grad(|| -> Result<()> {
            for indices in eval_ds.batch_indices(self.args.batch_size, None) {
                let collated = self.batcher.collate(&eval_ds.select(&indices));
                let batch    = collated.to_tensors(device);
                let out      = self.model.forward(&batch, false)?;

                loss_sum += out.loss.double_value(&[]);
                batches  += 1;

                if self.compute_metrics.is_some() {
                    preds.extend(greedy_predictions(&out.logits)?);
                    labels.extend(collated.label_rows());
                }
            }
            Ok(())
        })?;

        let extra = match &self.compute_metrics {
            Some(f) => f(&preds, &labels)?,
            None    => BTreeMap::new(),
        };
        Ok((loss_sum / batches.max(1) as f64, extra))
    }
}

/// Linear warmup to `base`, then linear decay to zero at `total`.
pub fn scheduled_lr(step: usize, warmup: usize, total: usize, base: f64) -> f64 {
    if step < warmup {
        return base * step as f64 / warmup.max(1) as f64;
    }
    let remaining = total.saturating_sub(step) as f64;
    let span      = total.saturating_sub(warmup).max(1) as f64;
    base * (remaining / span).max(0.0)
}
