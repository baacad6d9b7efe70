// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between the CSV on disk and the tensors the
// trainer consumes:
//
//   data.csv
//       │
//       ▼
//   CsvLoader             → select / rename columns, drop
//       │                   incomplete rows, cap, length filter
//       ▼
//   split_train_val       → seeded shuffle + validation hold-out
//       │
//       ▼
//   Preprocessor          → prompt formatting, tokenisation,
//       │                   truncation, label masking
//       ▼
//   EncodedDataset        → in-memory examples, epoch batching
//       │
//       ▼
//   Batcher               → padding, decoder inputs, tensors
//
// Each module is responsible for exactly one step.

/// CSV loading and the token-length filter
pub mod loader;

/// Tokenisation and label masking
pub mod preprocessor;

/// Encoded examples and epoch batching
pub mod dataset;

/// Batch collation and tensor conversion
pub mod batcher;

/// Train/validation split
pub mod splitter;
