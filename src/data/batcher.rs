// ============================================================
// Layer 4 — Batcher
// ============================================================
// Stacks a slice of `EncodedExample`s into one rectangular batch.
//
//   Causal task:  examples are already padded to the same length,
//                 rows are simply concatenated.
//
//   Seq2seq task: dynamic padding to the longest row in the batch
//                   input_ids       padded with pad_id
//                   attention_mask  padded with 0
//                   labels          padded with IGNORE_INDEX
//                 plus decoder_input_ids = labels shifted one step
//                 right, starting with the decoder start token and
//                 with IGNORE_INDEX replaced by pad_id.
//
// Collation is plain Vec<i64> work so it is testable without
// libtorch. `to_tensors` does the final [batch, seq] reshape on the
// training device.

use crate::data::dataset::EncodedExample;
use crate::data::preprocessor::IGNORE_INDEX;

/// Flat, row-major batch ready to be reshaped into tensors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollatedBatch {
    pub batch_size:        usize,
    pub input_len:         usize,
    pub label_len:         usize,
    pub input_ids:         Vec<i64>,
    pub attention_mask:    Vec<i64>,
    pub labels:            Vec<i64>,
    /// Seq2seq only, `[batch_size, label_len]`.
    pub decoder_input_ids: Option<Vec<i64>>,
}

impl CollatedBatch {
    /// Label rows, one per example.
    pub fn label_rows(&self) -> Vec<Vec<i64>> {
        self.labels
            .chunks(self.label_len.max(1))
            .map(|c| c.to_vec())
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Batcher {
    pad_id:             i64,
    /// `Some` for seq2seq models.
    decoder_start_id:   Option<i64>,
}

impl Batcher {
    pub fn causal(pad_id: i64) -> Self {
        Self { pad_id, decoder_start_id: None }
    }

    pub fn seq2seq(pad_id: i64, decoder_start_id: i64) -> Self {
        Self { pad_id, decoder_start_id: Some(decoder_start_id) }
    }

    pub fn collate(&self, items: &[&EncodedExample]) -> CollatedBatch {
        let batch_size = items.len();
        let input_len  = items.iter().map(|e| e.input_ids.len()).max().unwrap_or(0);
        let label_len  = items.iter().map(|e| e.labels.len()).max().unwrap_or(0);

        let mut input_ids      = Vec::with_capacity(batch_size * input_len);
        let mut attention_mask = Vec::with_capacity(batch_size * input_len);
        let mut labels         = Vec::with_capacity(batch_size * label_len);

        for ex in items {
            push_padded(&mut input_ids,      &ex.input_ids,      input_len, self.pad_id);
            push_padded(&mut attention_mask, &ex.attention_mask, input_len, 0);
            push_padded(&mut labels,         &ex.labels,         label_len, IGNORE_INDEX);
        }

        let decoder_input_ids = self.decoder_start_id.map(|start| {
            labels
                .chunks(label_len.max(1))
                .flat_map(|row| shift_right(row, start, self.pad_id))
                .collect()
        });

        CollatedBatch {
            batch_size,
            input_len,
            label_len,
            input_ids,
            attention_mask,
            labels,
            decoder_input_ids,
        }
    }
}

fn push_padded(out: &mut Vec<i64>, row: &[i64], len: usize, pad: i64) {
    out.extend_from_slice(row);
    out.extend(std::iter::repeat(pad).take(len - row.len()));
}

/// `[start, l0, l1, ..., l(n-2)]` with IGNORE_INDEX mapped to `pad_id`.
fn shift_right(row: &[i64], start: i64, pad_id: i64) -> Vec<i64> {
    let mut out = Vec::with_capacity(row.len());
    if row.is_empty() {
        return out;
    }
    out.push(start);
    out.extend(
        row[..row.len() - 1]
            .iter()
            .map(|&l| if l == IGNORE_INDEX { pad_id } else { l }),
    );
    out
}

// ─── Tensor Conversion ───────────────────────────────────────────────────────

#[cfg(feature = "ml")]
pub use tensors::TensorBatch;

#[cfg(feature = "ml")]
mod tensors {
    use super::CollatedBatch;
    use tch::{Device, Tensor};

    /// A batch on the training device. All tensors are Int64.
    #[derive(Debug)]
    pub struct TensorBatch {
        pub input_ids:         Tensor,
        pub attention_mask:    Tensor,
        pub labels:            Tensor,
        pub decoder_input_ids: Option<Tensor>,
    }

    impl CollatedBatch {
        pub fn to_tensors(&self, device: Device) -> TensorBatch {
            let b     = self.batch_size as i64;
            let shape = |len: usize| [b, len as i64];

            let make = |data: &[i64], len: usize| {
                Tensor::from_slice(data).view(shape(len)).to_device(device)
            };

            TensorBatch {
                input_ids:         make(&self.input_ids, self.input_len),
                attention_mask:    make(&self.attention_mask, self.input_len),
                labels:            make(&self.labels, self.label_len),
                decoder_input_ids: self
                    .decoder_input_ids
                    .as_ref()
                    .map(|d| make(d, self.label_len)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ex(ids: &[i64], labels: &[i64]) -> EncodedExample {
        EncodedExample {
            input_ids:      ids.to_vec(),
            attention_mask: vec![1; ids.len()],
            labels:         labels.to_vec(),
        }
    }

    #[test]
    fn test_seq2seq_dynamic_padding() {
        let a = ex(&[5, 6, 7, 1], &[8, 1]);
        let b = ex(&[5, 1], &[9, 10, 11, 1]);
        let batch = Batcher::seq2seq(0, 0).collate(&[&a, &b]);

        assert_eq!(batch.input_len, 4);
        assert_eq!(batch.label_len, 4);
        assert_eq!(batch.input_ids, vec![5, 6, 7, 1, 5, 1, 0, 0]);
        assert_eq!(batch.attention_mask, vec![1, 1, 1, 1, 1, 1, 0, 0]);
        assert_eq!(
            batch.labels,
            vec![8, 1, IGNORE_INDEX, IGNORE_INDEX, 9, 10, 11, 1]
        );
    }

    #[test]
    fn test_decoder_inputs_are_shifted_labels() {
        let a = ex(&[5, 1], &[8, 1]);
        let b = ex(&[5, 1], &[9, 10, 11, 1]);
        let batch = Batcher::seq2seq(0, 0).collate(&[&a, &b]);

        assert_eq!(
            batch.decoder_input_ids,
            Some(vec![0, 8, 1, 0, 0, 9, 10, 11])
        );
    }

    #[test]
    fn test_causal_batch_has_no_decoder_inputs() {
        let a = ex(&[1, 2, 3], &[IGNORE_INDEX, 2, 3]);
        let b = ex(&[4, 5, 6], &[IGNORE_INDEX, IGNORE_INDEX, 6]);
        let batch = Batcher::causal(50256).collate(&[&a, &b]);

        assert!(batch.decoder_input_ids.is_none());
        assert_eq!(batch.input_ids, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(batch.label_rows().len(), 2);
    }
}
