//! Model-ready tensors assembled from feature stores.

use crate::errors::StoreError;
use crate::padding::{PadPosition, valid_span};
use crate::schema::{Column, FeatureMode};
use crate::store::{ColumnMap, ColumnValues, FeatureStoreReader};
use crate::types::{Label, RowIdx, SeqLen};

/// Whole store as a `rows x width` matrix plus labels, for classical classifiers.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassicalDataset {
    /// Row-major `rows x width` values.
    pub features: Vec<f32>,
    /// Flattened feature width.
    pub width: usize,
    pub labels: Vec<Label>,
    pub idx: Vec<RowIdx>,
}

impl ClassicalDataset {
    /// Load every row of `reader` after checking column consistency.
    pub fn load(reader: &FeatureStoreReader) -> Result<Self, StoreError> {
        reader.assert_consistent_lengths()?;
        let mut columns = reader.read_all(None, None)?;
        let width = reader.schema().row_width();
        let features = take(&mut columns, reader, Column::Features)?
            .into_features()?
            .into_flat();
        let labels = to_labels(take(&mut columns, reader, Column::Label)?.into_ints()?)?;
        let idx = to_idx(take(&mut columns, reader, Column::Idx)?.into_ints()?)?;
        Ok(Self {
            features,
            width,
            labels,
            idx,
        })
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.labels.len()
    }

    pub fn row(&self, i: usize) -> Option<&[f32]> {
        self.features.get(i * self.width..(i + 1) * self.width)
    }
}

/// One window of a word-embedding store.
#[derive(Clone, Debug, PartialEq)]
pub struct SequenceBatch {
    /// Row-major `rows x max_len x dim` values.
    pub data: Vec<f32>,
    pub max_len: usize,
    pub dim: usize,
    /// Pre-padding lengths.
    pub lengths: Vec<SeqLen>,
    /// Inclusive first/last real timestep per row (`None` for empty rows).
    pub spans: Vec<Option<(usize, usize)>>,
    pub labels: Vec<Label>,
    pub idx: Vec<RowIdx>,
}

impl SequenceBatch {
    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.labels.len()
    }
}

/// Streams a word-embedding store in fixed windows so only one window is in memory.
#[derive(Debug)]
pub struct SequenceWindows<'a> {
    reader: &'a FeatureStoreReader,
    window: u64,
    next: u64,
    total: u64,
    max_len: usize,
    dim: usize,
    pad_position: PadPosition,
}

impl<'a> SequenceWindows<'a> {
    /// Iterate `reader` in windows of `window` rows.
    pub fn new(reader: &'a FeatureStoreReader, window: usize) -> Result<Self, StoreError> {
        if window == 0 {
            return Err(StoreError::Configuration("window must be > 0".into()));
        }
        let FeatureMode::WordEmbedding {
            max_len,
            dim,
            pad_position,
        } = reader.schema().mode
        else {
            return Err(StoreError::SchemaMismatch {
                expected: "a word-embedding store".into(),
                found: reader.schema().to_string(),
            });
        };
        let total = reader.assert_consistent_lengths()?;
        Ok(Self {
            reader,
            window: window as u64,
            next: 0,
            total,
            max_len: max_len as usize,
            dim: dim as usize,
            pad_position,
        })
    }

    fn load_window(&self, start: u64) -> Result<SequenceBatch, StoreError> {
        let mut columns = self.reader.read_all(Some(start), Some(self.window))?;
        let data = take(&mut columns, self.reader, Column::Features)?
            .into_features()?
            .into_flat();
        let lengths = take(&mut columns, self.reader, Column::Length)?
            .into_ints()?
            .into_iter()
            .map(|length| {
                SeqLen::try_from(length)
                    .map_err(|_| StoreError::Corrupt(format!("length {length} out of range")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let spans = lengths
            .iter()
            .map(|length| valid_span(*length as usize, self.max_len, self.pad_position))
            .collect();
        let labels = to_labels(take(&mut columns, self.reader, Column::Label)?.into_ints()?)?;
        let idx = to_idx(take(&mut columns, self.reader, Column::Idx)?.into_ints()?)?;
        Ok(SequenceBatch {
            data,
            max_len: self.max_len,
            dim: self.dim,
            lengths,
            spans,
            labels,
            idx,
        })
    }
}

impl Iterator for SequenceWindows<'_> {
    type Item = Result<SequenceBatch, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }
        let start = self.next;
        self.next = start.saturating_add(self.window);
        Some(self.load_window(start))
    }
}

/// Inverse-frequency weights `[total / negatives, total / positives]`.
pub fn class_weights(labels: &[Label]) -> Result<[f32; 2], StoreError> {
    let positives = labels.iter().filter(|label| **label == 1).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(StoreError::Input(format!(
            "class weights need both classes (negatives: {negatives}, positives: {positives})"
        )));
    }
    let total = labels.len() as f32;
    Ok([total / negatives as f32, total / positives as f32])
}

fn take(
    columns: &mut ColumnMap,
    reader: &FeatureStoreReader,
    column: Column,
) -> Result<ColumnValues, StoreError> {
    let name = reader.schema().column_name(column);
    columns
        .take(name)
        .ok_or_else(|| StoreError::InvalidColumn(name.to_string()))
}

fn to_labels(values: Vec<i64>) -> Result<Vec<Label>, StoreError> {
    values
        .into_iter()
        .map(|value| {
            Label::try_from(value)
                .map_err(|_| StoreError::Corrupt(format!("label {value} out of range")))
        })
        .collect()
}

fn to_idx(values: Vec<i64>) -> Result<Vec<RowIdx>, StoreError> {
    values
        .into_iter()
        .map(|value| {
            RowIdx::try_from(value).map_err(|_| StoreError::Corrupt(format!("idx {value} out of range")))
        })
        .collect()
}
