// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns shared by training, serving and the
// upload tool:
//
//   checkpoint.rs      — the fine-tuned model directory layout:
//                        weights, config.json, training args and
//                        per-epoch checkpoint-<step>/ folders
//
//   tokenizer_store.rs — tokenizer.json persistence and the
//                        special tokens each task depends on
//
//   metrics.rs         — ROUGE scoring and the per-epoch
//                        metrics CSV
//
//   hub.rs             — Hugging Face Hub client: snapshot
//                        download and folder upload
//
// None of these modules touch tensors, so all of them are
// testable without libtorch.

/// Model directory and checkpoint metadata
pub mod checkpoint;

/// Tokenizer loading, saving and special tokens
pub mod tokenizer_store;

/// ROUGE and the epoch metrics logger
pub mod metrics;

/// Model registry (Hugging Face Hub)
pub mod hub;
