use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::config::SplitConfig;
use crate::errors::StoreError;
use crate::input::SourceRow;
use crate::types::{Label, RowIdx};

/// Logical dataset partitions.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, bitcode::Encode, bitcode::Decode,
)]
#[serde(rename_all = "lowercase")]
pub enum SplitLabel {
    /// Training split.
    Train,
    /// Validation split.
    #[serde(rename = "val")]
    Validation,
    /// Test split.
    Test,
}

/// All split labels in canonical order.
pub const ALL_SPLITS: [SplitLabel; 3] = [SplitLabel::Train, SplitLabel::Validation, SplitLabel::Test];

impl SplitLabel {
    /// Parse the short name used in file names and manifests.
    pub fn parse(name: &str) -> Option<Self> {
        ALL_SPLITS.into_iter().find(|split| split.as_str() == name)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            SplitLabel::Train => "train",
            SplitLabel::Validation => "val",
            SplitLabel::Test => "test",
        }
    }
}

impl fmt::Display for SplitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label-stratified train/validation/test partitions.
///
/// Rows in each partition are renumbered so `idx` is the row position within it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DatasetSplits {
    pub train: Vec<SourceRow>,
    pub validation: Vec<SourceRow>,
    pub test: Vec<SourceRow>,
}

impl DatasetSplits {
    /// Rows of one partition.
    pub fn get(&self, label: SplitLabel) -> &[SourceRow] {
        match label {
            SplitLabel::Train => &self.train,
            SplitLabel::Validation => &self.validation,
            SplitLabel::Test => &self.test,
        }
    }

    /// Total rows across partitions.
    pub fn len(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cut texts longer than `max_len` whitespace tokens into `max_len`-token
/// windows. A trailing window with `threshold` tokens or fewer is dropped;
/// texts within `max_len` pass through unchanged. Output rows are renumbered.
pub fn slice_long_texts(rows: &[SourceRow], max_len: usize, threshold: usize) -> Vec<SourceRow> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let tokens: Vec<&str> = row.text.split_whitespace().collect();
        if tokens.len() <= max_len {
            out.push(row.clone());
            continue;
        }
        let mut pieces = 0;
        for window in tokens.chunks(max_len.max(1)) {
            if window.len() <= threshold {
                continue;
            }
            out.push(SourceRow {
                text: window.join(" "),
                ..row.clone()
            });
            pieces += 1;
        }
        debug!(idx = row.idx, tokens = tokens.len(), pieces, "sliced long text");
    }
    renumber(&mut out);
    out
}

/// Shuffle each class with a seeded RNG, then give `train_ratio` of it to train,
/// `val_ratio` of the remainder to validation, and the rest to test.
pub fn stratified_split(rows: &[SourceRow], config: &SplitConfig) -> Result<DatasetSplits, StoreError> {
    config.validate()?;
    if let Some(bad) = rows.iter().find(|row| row.label > 1) {
        return Err(StoreError::Input(format!(
            "row {} has label {} (expected 0 or 1)",
            bad.idx, bad.label
        )));
    }
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut splits = DatasetSplits::default();

    // Target class first, matching how partitions are concatenated downstream.
    for label in [1 as Label, 0] {
        let mut class: Vec<SourceRow> = rows.iter().filter(|row| row.label == label).cloned().collect();
        class.shuffle(&mut rng);
        let train_len = fraction(class.len(), config.train_ratio);
        let rest = class.split_off(train_len);
        let val_len = fraction(rest.len(), config.val_ratio);
        let (validation, test) = rest.split_at(val_len);
        splits.train.extend(class);
        splits.validation.extend_from_slice(validation);
        splits.test.extend_from_slice(test);
    }

    renumber(&mut splits.train);
    renumber(&mut splits.validation);
    renumber(&mut splits.test);
    debug!(
        train = splits.train.len(),
        validation = splits.validation.len(),
        test = splits.test.len(),
        seed = config.seed,
        "built stratified splits"
    );
    Ok(splits)
}

fn fraction(len: usize, ratio: f32) -> usize {
    ((len as f64) * f64::from(ratio)).floor() as usize
}

fn renumber(rows: &mut [SourceRow]) {
    for (pos, row) in rows.iter_mut().enumerate() {
        row.idx = pos as RowIdx;
    }
}
