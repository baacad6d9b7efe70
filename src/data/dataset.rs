use rand::{rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use crate::data::preprocessor::IGNORE_INDEX;

/// One tokenised training example.
///
/// Causal task: all three vectors have the same fixed length.
/// Seq2seq task: `input_ids`/`attention_mask` share a length,
/// `labels` has its own; padding happens in the batcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedExample {
    pub input_ids:      Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub labels:         Vec<i64>,
}

impl EncodedExample {
    /// Label positions that contribute to the loss.
    pub fn trainable_tokens(&self) -> usize {
        self.labels.iter().filter(|&&l| l != IGNORE_INDEX).count()
    }
}

/// In-memory dataset of encoded examples.
pub struct EncodedDataset {
    examples: Vec<EncodedExample>,
}

impl EncodedDataset {
    pub fn new(examples: Vec<EncodedExample>) -> Self { Self { examples } }

    pub fn len(&self) -> usize { self.examples.len() }

    pub fn is_empty(&self) -> bool { self.examples.is_empty() }

    pub fn get(&self, index: usize) -> Option<&EncodedExample> {
        self.examples.get(index)
    }

    /// Number of batches one epoch yields (the last one may be short).
    pub fn num_batches(&self, batch_size: usize) -> usize {
        self.examples.len().div_ceil(batch_size.max(1))
    }

    /// Indices grouped into batches for one epoch. Shuffled when an
    /// rng is given, in file order otherwise (evaluation).
    pub fn batch_indices(&self, batch_size: usize, rng: Option<&mut StdRng>) -> Vec<Vec<usize>> {
        let mut order: Vec<usize> = (0..self.examples.len()).collect();
        if let Some(rng) = rng {
            order.shuffle(rng);
        }
        order
            .chunks(batch_size.max(1))
            .map(|c| c.to_vec())
            .collect()
    }

    /// Borrow the examples at `indices`.
    pub fn select(&self, indices: &[usize]) -> Vec<&EncodedExample> {
        indices.iter().filter_map(|&i| self.examples.get(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn dataset(n: usize) -> EncodedDataset {
        EncodedDataset::new(
            (0..n)
                .map(|i| EncodedExample {
                    input_ids:      vec![i as i64],
                    attention_mask: vec![1],
                    labels:         vec![i as i64],
                })
                .collect(),
        )
    }

    #[test]
    fn test_batches_cover_every_example_once() {
        let ds      = dataset(10);
        let mut rng = StdRng::seed_from_u64(1);
        let batches = ds.batch_indices(3, Some(&mut rng));

        assert_eq!(batches.len(), ds.num_batches(3));
        assert_eq!(batches.last().map(|b| b.len()), Some(1));

        let mut all: Vec<usize> = batches.into_iter().flatten().collect();
        all.sort();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_unshuffled_batches_keep_order() {
        let ds = dataset(4);
        assert_eq!(ds.batch_indices(2, None), vec![vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn test_trainable_tokens() {
        let ex = EncodedExample {
            input_ids:      vec![1, 2, 3],
            attention_mask: vec![1, 1, 0],
            labels:         vec![IGNORE_INDEX, 2, IGNORE_INDEX],
        };
        assert_eq!(ex.trainable_tokens(), 1);
    }
}
