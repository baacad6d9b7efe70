// ============================================================
// Layer 5 — ML / Model Layer (rust-bert + tch)
// ============================================================
// This layer contains ALL libtorch specific code.
// No other layer imports rust_bert or tch, apart from the
// batcher's tensor conversion, and everything here is behind
// the `ml` cargo feature so the rest of the crate builds and
// tests without libtorch.
//
// What's in this layer:
//
//   model.rs      — GPT-2 / T5 wrapped as one trainable model
//                   • pretrained weight loading
//                   • embedding growth for added tokens
//                   • masked cross-entropy loss
//
//   trainer.rs    — The training loop
//                   AdamW, warmup/decay schedule, gradient
//                   accumulation, epoch evaluation, checkpoints
//                   and best-model restore
//
//   inferencer.rs — The inference engine
//                   Loads a model directory, formats the prompt,
//                   runs rust-bert's generator, cleans the output
//
// Reference: rust-bert pipelines::generation_utils
//            tch nn::Optimizer

/// Trainable GPT-2 / T5 model
pub mod model;

/// Training loop with evaluation and checkpointing
pub mod trainer;

/// Inference engine behind the `TextGenerator` trait
pub mod inferencer;
