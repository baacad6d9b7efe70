// ============================================================
// Layer 4 — Dataset Loader
// ============================================================
// Reads a delimited file (CSV with a header row) and turns it
// into `TextPair` rows:
//
//   1. Select the two configured columns
//   2. Rename them to `input` / `target`
//   3. Drop rows where either field is missing or blank
//   4. Optionally cap the number of rows (head)
//
// The causal task additionally runs `filter_by_token_length`
// so that every kept row fits in the model's context window.
//
// Quoted multi-line fields (common in news-article datasets)
// are handled by the csv crate.

use std::{
    fs::File,
    path::PathBuf,
};
use thiserror::Error;

use crate::domain::pair::TextPair;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("cannot open dataset '{path}': {source}")]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("column '{column}' not found in '{path}' (available: {available})")]
    MissingColumn {
        path:      PathBuf,
        column:    String,
        available: String,
    },

    #[error("malformed record in '{path}': {source}")]
    Csv {
        path:   PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Loads (input, target) pairs from a CSV file.
pub struct CsvLoader {
    path:          PathBuf,
    input_column:  String,
    target_column: String,
}

impl CsvLoader {
    pub fn new(
        path:          impl Into<PathBuf>,
        input_column:  impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            path:          path.into(),
            input_column:  input_column.into(),
            target_column: target_column.into(),
        }
    }

    /// Load, rename, drop incomplete rows, then keep the first
    /// `max_samples` rows when a cap is given.
    pub fn load(&self, max_samples: Option<usize>) -> Result<Vec<TextPair>, DatasetError> {
        let file = File::open(&self.path).map_err(|source| DatasetError::Io {
            path: self.path.clone(),
            source,
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let headers = reader
            .headers()
            .map_err(|source| self.csv_error(source))?
            .clone();

        let input_idx  = self.column_index(&headers, &self.input_column)?;
        let target_idx = self.column_index(&headers, &self.target_column)?;

        let mut rows    = Vec::new();
        let mut dropped = 0usize;

        for record in reader.records() {
            let record = record.map_err(|source| self.csv_error(source))?;

            // A short record simply lacks the field: treat as missing
            let pair = match (record.get(input_idx), record.get(target_idx)) {
                (Some(input), Some(target)) => TextPair::new(input, target),
                _ => {
                    dropped += 1;
                    continue;
                }
            };

            if !pair.is_complete() {
                dropped += 1;
                continue;
            }
            rows.push(pair);
        }

        tracing::info!(
            "Loaded {} rows from '{}' ({} dropped as incomplete)",
            rows.len(),
            self.path.display(),
            dropped
        );

        if let Some(max) = max_samples {
            rows.truncate(max);
        }
        Ok(rows)
    }

    fn column_index(&self, headers: &csv::StringRecord, column: &str) -> Result<usize, DatasetError> {
        headers
            .iter()
            .position(|h| h.trim() == column)
            .ok_or_else(|| DatasetError::MissingColumn {
                path:      self.path.clone(),
                column:    column.to_string(),
                available: headers.iter().collect::<Vec<_>>().join(", "),
            })
    }

    fn csv_error(&self, source: csv::Error) -> DatasetError {
        DatasetError::Csv { path: self.path.clone(), source }
    }
}

// ─── Token Length Filter ─────────────────────────────────────────────────────

/// Keep rows whose formatted length (as measured by `count_tokens`)
/// is at most `max_tokens`, then cap to `max_samples`.
///
/// Scanning stops as soon as `2 × max_samples` rows have been kept.
/// Rows later in the file are therefore never considered, which
/// biases the sample towards the head of the dataset. This matches
/// how the published models were trained and is kept as is.
pub fn filter_by_token_length<F>(
    rows:         Vec<TextPair>,
    mut count_tokens: F,
    max_tokens:   usize,
    max_samples:  Option<usize>,
) -> anyhow::Result<Vec<TextPair>>
where
    F: FnMut(&TextPair) -> anyhow::Result<usize>,
{
    let total     = rows.len();
    let stop_at   = max_samples.map(|m| m.saturating_mul(2));
    let mut kept  = Vec::new();
    let mut seen  = 0usize;

    for row in rows {
        if stop_at.is_some_and(|limit| kept.len() >= limit) {
            break;
        }
        seen += 1;
        if count_tokens(&row)? <= max_tokens {
            kept.push(row);
        }
    }

    if seen < total {
        tracing::info!(
            "Token filter stopped early after {} of {} rows ({} kept)",
            seen,
            total,
            kept.len()
        );
    }

    tracing::info!(
        "Kept {} rows with at most {} tokens",
        kept.len(),
        max_tokens
    );

    if let Some(max) = max_samples {
        kept.truncate(max);
    }
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_selects_and_renames_columns() {
        let f = write_csv("id,Text,Summary\n1,long text one,short one\n2,long text two,short two\n");
        let rows = CsvLoader::new(f.path(), "Text", "Summary").load(None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], TextPair::new("long text one", "short one"));
    }

    #[test]
    fn test_reversed_columns_for_generation() {
        let f = write_csv("Text,Summary\narticle body,the gist\n");
        let rows = CsvLoader::new(f.path(), "Summary", "Text").load(None).unwrap();
        assert_eq!(rows[0].input, "the gist");
        assert_eq!(rows[0].target, "article body");
    }

    #[test]
    fn test_drops_missing_and_blank_rows() {
        let f = write_csv("Text,Summary\na,b\n,b\na,\n  ,  \nc,d\n");
        let rows = CsvLoader::new(f.path(), "Text", "Summary").load(None).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.is_complete()));
    }

    #[test]
    fn test_quoted_multiline_field() {
        let f = write_csv("Text,Summary\n\"line one\nline two\",sum\n");
        let rows = CsvLoader::new(f.path(), "Text", "Summary").load(None).unwrap();
        assert_eq!(rows[0].input, "line one\nline two");
    }

    #[test]
    fn test_sample_cap() {
        let f = write_csv("Text,Summary\na,1\nb,2\nc,3\n");
        let rows = CsvLoader::new(f.path(), "Text", "Summary").load(Some(2)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].input, "b");
    }

    #[test]
    fn test_missing_column_error() {
        let f = write_csv("Text,Other\na,b\n");
        let err = CsvLoader::new(f.path(), "Text", "Summary").load(None).unwrap_err();
        assert!(matches!(err, DatasetError::MissingColumn { ref column, .. } if column == "Summary"));
    }

    #[test]
    fn test_missing_file_error() {
        let err = CsvLoader::new("/definitely/not/here.csv", "Text", "Summary")
            .load(None)
            .unwrap_err();
        assert!(matches!(err, DatasetError::Io { .. }));
    }

    fn word_len(row: &TextPair) -> anyhow::Result<usize> {
        Ok(row.input.split_whitespace().count() + row.target.split_whitespace().count())
    }

    #[test]
    fn test_filter_keeps_only_short_rows() {
        let rows = vec![
            TextPair::new("a b", "c"),
            TextPair::new("a b c d e", "f g h"),
            TextPair::new("a", "b"),
        ];
        let kept = filter_by_token_length(rows, word_len, 3, None).unwrap();
        assert_eq!(kept.len(), 2);
        for row in &kept {
            assert!(word_len(row).unwrap() <= 3);
        }
    }

    #[test]
    fn test_filter_stops_after_twice_max_samples() {
        // 10 short rows followed by 10 more; with max_samples = 2 the
        // scan stops once 4 are kept, so at most 4 rows are ever looked at.
        let rows: Vec<TextPair> = (0..20).map(|i| TextPair::new(format!("r{i}"), "t")).collect();
        let mut looked_at = 0usize;
        let kept = filter_by_token_length(
            rows,
            |r| {
                looked_at += 1;
                word_len(r)
            },
            10,
            Some(2),
        )
        .unwrap();
        assert_eq!(looked_at, 4);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].input, "r0");
    }
}
