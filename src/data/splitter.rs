// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Shuffles rows and splits them into a training set and a
// held-out validation set of `validation_fraction` of the rows.
//
// With a seed the split is reproducible across runs (the text
// generation model is trained this way). Without one a fresh
// entropy-seeded rng is used.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Shuffle `samples` and split into (train, validation).
///
/// The validation size is `round(len * validation_fraction)`,
/// clamped to the number of samples.
pub fn split_train_val<T>(
    mut samples:         Vec<T>,
    validation_fraction: f64,
    seed:                Option<u64>,
) -> (Vec<T>, Vec<T>) {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None       => StdRng::from_entropy(),
    };
    samples.shuffle(&mut rng);

    let total    = samples.len();
    let val_len  = ((total as f64) * validation_fraction).round() as usize;
    let split_at = total - val_len.min(total);

    // split_off(n) removes [n..] and returns it
    let val = samples.split_off(split_at);

    tracing::info!(
        "Dataset split: {} training, {} validation",
        samples.len(),
        val.len(),
    );

    (samples, val)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correct_split_sizes() {
        let items: Vec<usize> = (0..100).collect();
        let (train, val)      = split_train_val(items, 0.1, None);
        assert_eq!(train.len(), 90);
        assert_eq!(val.len(),   10);
    }

    #[test]
    fn test_all_items_preserved() {
        let items: Vec<usize> = (0..50).collect();
        let (train, val)      = split_train_val(items, 0.3, None);
        let mut all: Vec<usize> = train.into_iter().chain(val).collect();
        all.sort();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_seeded_split_is_reproducible() {
        let a = split_train_val((0..40).collect::<Vec<usize>>(), 0.25, Some(42));
        let b = split_train_val((0..40).collect::<Vec<usize>>(), 0.25, Some(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_dataset() {
        let items: Vec<usize> = Vec::new();
        let (train, val)      = split_train_val(items, 0.1, Some(1));
        assert!(train.is_empty());
        assert!(val.is_empty());
    }
}
