// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types that describe what the system works with:
//
//   task.rs    — which of the two models we are dealing with,
//                and how each one formats its prompt
//   pair.rs    — one (input, target) row of training data
//   traits.rs  — the seams other layers implement
//                (text generation, model registry)
//
// Rules for this layer:
//   - NO tensor or model types
//   - NO file I/O or network calls
//   - NO clap / actix types
//
// Everything here can be unit tested without libtorch.

pub mod task;

pub mod pair;

pub mod traits;
