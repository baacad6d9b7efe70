// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// a specific goal (training, prediction, publishing).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No HTTP here (that's the api layer)
//   - Only workflow coordination
//
// Anything that needs libtorch is reached through the `ml`
// feature; without it the use cases return an error instead.

// The fine-tuning workflow
pub mod train_use_case;

// Single-input inference, plus the best-effort load for serving
pub mod predict_use_case;

// Publishing model directories to the hub
pub mod upload_use_case;
