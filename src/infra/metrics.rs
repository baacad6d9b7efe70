// ============================================================
// Layer 6 — Metrics
// ============================================================
// Two things live here:
//
//   1. ROUGE scoring for the summarization model
//        rouge1  unigram overlap F-measure
//        rouge2  bigram overlap F-measure
//        rougeL  longest-common-subsequence F-measure
//      Text is lower-cased and split on anything that is not
//      [a-z0-9]. Scores are averaged over prediction/reference
//      pairs; an empty input scores 0.
//
//   2. A per-epoch CSV log:
//        epoch,step,train_loss,eval_loss[,metric...]
//        1,563,2.412000,2.087000,0.312000,...
//
// Loss should go down each epoch; if eval_loss climbs while
// train_loss keeps falling the model is overfitting.

use anyhow::Result;
use std::{
    collections::{BTreeMap, HashMap},
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use tokenizers::Tokenizer;

use crate::data::preprocessor::IGNORE_INDEX;
use crate::infra::tokenizer_store::decode;

// ─── ROUGE ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RougeScores {
    pub rouge1: f64,
    pub rouge2: f64,
    pub rouge_l: f64,
}

impl RougeScores {
    pub fn into_map(self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("rouge1".to_string(), self.rouge1),
            ("rouge2".to_string(), self.rouge2),
            ("rougeL".to_string(), self.rouge_l),
        ])
    }
}

fn rouge_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn f_measure(overlap: usize, pred_total: usize, ref_total: usize) -> f64 {
    if overlap == 0 || pred_total == 0 || ref_total == 0 {
        return 0.0;
    }
    let precision = overlap as f64 / pred_total as f64;
    let recall    = overlap as f64 / ref_total as f64;
    2.0 * precision * recall / (precision + recall)
}

fn ngram_counts(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    if tokens.len() >= n {
        for gram in tokens.windows(n) {
            *counts.entry(gram).or_insert(0) += 1;
        }
    }
    counts
}

fn rouge_n(pred: &[String], reference: &[String], n: usize) -> f64 {
    let p = ngram_counts(pred, n);
    let r = ngram_counts(reference, n);
    let overlap: usize = p
        .iter()
        .map(|(gram, &c)| c.min(r.get(gram).copied().unwrap_or(0)))
        .sum();
    f_measure(overlap, p.values().sum(), r.values().sum())
}

fn lcs_len(a: &[String], b: &[String]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            curr[j + 1] = if x == y { prev[j] + 1 } else { prev[j + 1].max(curr[j]) };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn rouge_l(pred: &[String], reference: &[String]) -> f64 {
    f_measure(lcs_len(pred, reference), pred.len(), reference.len())
}

/// Mean ROUGE-1/2/L F-measures over aligned prediction/reference pairs.
pub fn rouge(predictions: &[String], references: &[String]) -> RougeScores {
    let n = predictions.len().min(references.len());
    if n == 0 {
        return RougeScores::default();
    }

    let mut sum = RougeScores::default();
    for (p, r) in predictions.iter().zip(references) {
        let p = rouge_tokens(p);
        let r = rouge_tokens(r);
        sum.rouge1  += rouge_n(&p, &r, 1);
        sum.rouge2  += rouge_n(&p, &r, 2);
        sum.rouge_l += rouge_l(&p, &r);
    }

    RougeScores {
        rouge1:  sum.rouge1 / n as f64,
        rouge2:  sum.rouge2 / n as f64,
        rouge_l: sum.rouge_l / n as f64,
    }
}

/// Label row with every IGNORE_INDEX position put back to `pad_id`, so
/// the tokenizer can decode it.
pub fn restore_labels(row: &[i64], pad_id: i64) -> Vec<i64> {
    row.iter()
        .map(|&l| if l == IGNORE_INDEX { pad_id } else { l })
        .collect()
}

/// Seq2seq evaluation metric: decode predictions and labels (with
/// IGNORE_INDEX restored to `pad_id`), then score with ROUGE.
pub fn compute_metrics(
    predictions: &[Vec<i64>],
    labels:      &[Vec<i64>],
    tokenizer:   &Tokenizer,
    pad_id:      i64,
) -> Result<BTreeMap<String, f64>> {
    let decoded_preds = predictions
        .iter()
        .map(|p| decode(tokenizer, p))
        .collect::<Result<Vec<_>>>()?;

    let decoded_labels = labels
        .iter()
        .map(|row| decode(tokenizer, &restore_labels(row, pad_id)))
        .collect::<Result<Vec<_>>>()?;

    Ok(rouge(&decoded_preds, &decoded_labels).into_map())
}

// ─── Epoch Metrics ───────────────────────────────────────────────────────────

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, PartialEq)]
pub struct EpochMetrics {
    pub epoch:      usize,
    /// Global optimiser step at the end of the epoch
    pub step:       usize,
    pub train_loss: f64,
    pub eval_loss:  f64,
    /// Extra evaluation metrics (e.g. ROUGE), keyed by name
    pub extra:      BTreeMap<String, f64>,
}

impl EpochMetrics {
    /// Look up a metric by name. `loss` and `eval_loss` both mean the
    /// validation loss.
    pub fn value(&self, name: &str) -> Option<f64> {
        match name {
            "loss" | "eval_loss" => Some(self.eval_loss),
            "train_loss"         => Some(self.train_loss),
            other => self
                .extra
                .get(other)
                .or_else(|| other.strip_prefix("eval_").and_then(|k| self.extra.get(k)))
                .copied(),
        }
    }

    /// True if `metric` beats `best` in the configured direction.
    pub fn is_improvement(&self, metric: &str, best: Option<f64>, greater_is_better: bool) -> bool {
        let Some(value) = self.value(metric) else { return false };
        if value.is_nan() {
            return false;
        }
        match best {
            None => true,
            Some(best) if greater_is_better => value > best,
            Some(best) => value < best,
        }
    }
}

/// Appends epoch metrics to `<dir>/metrics.csv`.
pub struct MetricsLogger {
    csv_path: PathBuf,
    columns:  Vec<String>,
}

impl MetricsLogger {
    /// Create the logger. The header row is written only if the file
    /// does not exist yet, so runs append to the same log.
    pub fn new(dir: impl AsRef<Path>, extra_columns: &[&str]) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join("metrics.csv");
        let columns: Vec<String> = extra_columns.iter().map(|c| c.to_string()).collect();

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            let mut header = String::from("epoch,step,train_loss,eval_loss");
            for c in &columns {
                header.push(',');
                header.push_str(c);
            }
            writeln!(f, "{header}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path, columns })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;

        let mut row = format!("{},{},{:.6},{:.6}", m.epoch, m.step, m.train_loss, m.eval_loss);
        for c in &self.columns {
            row.push(',');
            if let Some(v) = m.extra.get(c) {
                row.push_str(&format!("{v:.6}"));
            }
        }
        writeln!(f, "{row}")?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, eval_loss={:.4}",
            m.epoch,
            m.train_loss,
            m.eval_loss,
        );
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::tokenizer_store::test_support::seq2seq_tokenizer;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn test_identical_texts_score_one() {
        let r = rouge(&s(&["The cat sat."]), &s(&["the cat sat"]));
        assert!((r.rouge1 - 1.0).abs() < 1e-9);
        assert!((r.rouge2 - 1.0).abs() < 1e-9);
        assert!((r.rouge_l - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_disjoint_texts_score_zero() {
        let r = rouge(&s(&["dog"]), &s(&["cat"]));
        assert_eq!(r, RougeScores::default());
    }

    #[test]
    fn test_partial_overlap() {
        // pred: the cat  | ref: the cat sat on the mat
        // rouge1: overlap 2, P = 1, R = 2/6 → F = 0.5
        let r = rouge(&s(&["the cat"]), &s(&["the cat sat on the mat"]));
        assert!((r.rouge1 - 0.5).abs() < 1e-9);
        // rouge2: "the cat" matches, P = 1/1, R = 1/5 → F = 1/3
        assert!((r.rouge2 - 1.0 / 3.0).abs() < 1e-9);
        assert!((r.rouge_l - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_input_scores_zero() {
        assert_eq!(rouge(&[], &[]), RougeScores::default());
        let r = rouge(&s(&[""]), &s(&["the cat"]));
        assert_eq!(r.rouge1, 0.0);
    }

    #[test]
    fn test_compute_metrics_restores_ignore_index() {
        let (tok, special) = seq2seq_tokenizer();
        let ids: Vec<i64> = tok
            .encode("the cat sat", true)
            .unwrap()
            .get_ids()
            .iter()
            .map(|&i| i as i64)
            .collect();

        let mut label = ids.clone();
        label.extend([IGNORE_INDEX, IGNORE_INDEX]);

        let m = compute_metrics(&[ids], &[label], &tok, special.pad_id as i64).unwrap();
        assert!((m["rouge1"] - 1.0).abs() < 1e-9);
        assert!((m["rougeL"] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_padded_labels_decode_back_to_targets() {
        use crate::config::Config;
        use crate::data::batcher::Batcher;
        use crate::data::preprocessor::Preprocessor;
        use crate::domain::pair::TextPair;
        use crate::domain::task::Task;

        let (tok, special) = seq2seq_tokenizer();
        let pad_id = special.pad_id as i64;
        let cfg    = Config::for_task(Task::Summarization);
        let p      = Preprocessor::new(&tok, &cfg, special);

        let targets = ["the cat sat", "a quick brown fox jumps over the lazy dog"];
        let examples: Vec<_> = targets
            .iter()
            .map(|t| p.encode(&TextPair::new("the dog sat on the mat", *t)).unwrap())
            .collect();
        let batch = Batcher::seq2seq(pad_id, pad_id).collate(&examples.iter().collect::<Vec<_>>());

        let rows = batch.label_rows();
        assert!(rows[0].contains(&IGNORE_INDEX));

        for ((row, target), ex) in rows.iter().zip(targets).zip(&examples) {
            let restored = restore_labels(row, pad_id);
            assert!(!restored.contains(&IGNORE_INDEX));

            let text = decode(&tok, &restored).unwrap();
            assert_eq!(text, target);

            let unpadded: Vec<i64> = restored.iter().copied().filter(|&id| id != pad_id).collect();
            let reencoded: Vec<i64> = tok
                .encode(text.as_str(), true)
                .unwrap()
                .get_ids()
                .iter()
                .map(|&i| i as i64)
                .collect();
            assert_eq!(reencoded, unpadded);
            assert_eq!(reencoded, ex.labels);
        }
    }

    #[test]
    fn test_is_improvement() {
        let m = EpochMetrics {
            epoch: 2, step: 10, train_loss: 2.5, eval_loss: 2.3,
            extra: BTreeMap::from([("rouge1".to_string(), 0.4)]),
        };
        assert!(m.is_improvement("loss", Some(3.0), false));
        assert!(!m.is_improvement("loss", Some(2.0), false));
        assert!(m.is_improvement("loss", None, false));
        assert!(m.is_improvement("eval_rouge1", Some(0.3), true));
        assert!(!m.is_improvement("missing", None, true));
    }

    #[test]
    fn test_logger_appends_rows() {
        let dir    = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path(), &["rouge1"]).unwrap();
        let m = EpochMetrics {
            epoch: 1, step: 4, train_loss: 1.0, eval_loss: 0.5,
            extra: BTreeMap::from([("rouge1".to_string(), 0.25)]),
        };
        logger.log(&m).unwrap();

        let text = std::fs::read_to_string(dir.path().join("metrics.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "epoch,step,train_loss,eval_loss,rouge1");
        assert_eq!(lines[1], "1,4,1.000000,0.500000,0.250000");
    }
}
