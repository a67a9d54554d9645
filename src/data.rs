use serde::{Deserialize, Serialize};
use std::slice::ChunksExact;

use crate::errors::StoreError;

pub use crate::types::{DateText, Label, RowIdx, SeqLen, SourceName};

/// Features generated for one source row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RowFeatures {
    /// Flattened feature array (row-major).
    pub values: Vec<f32>,
    /// Pre-padding length for sequence features.
    pub length: Option<SeqLen>,
}

impl RowFeatures {
    /// Padded sequence features with their pre-padding length.
    pub fn sequence(values: Vec<f32>, length: SeqLen) -> Self {
        Self {
            values,
            length: Some(length),
        }
    }

    /// Plain fixed-length vector features.
    pub fn vector(values: Vec<f32>) -> Self {
        Self {
            values,
            length: None,
        }
    }
}

/// Contiguous rows of a fixed-shape `f32` feature column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureBlock {
    row_shape: Vec<usize>,
    data: Vec<f32>,
}

impl FeatureBlock {
    /// An empty block whose rows have `row_shape`.
    pub fn empty(row_shape: Vec<usize>) -> Self {
        Self {
            row_shape,
            data: Vec::new(),
        }
    }

    /// Wrap flattened `data` as rows of `row_shape`.
    pub fn new(row_shape: Vec<usize>, data: Vec<f32>) -> Result<Self, StoreError> {
        let width: usize = row_shape.iter().product();
        if width == 0 || data.len() % width != 0 {
            return Err(StoreError::SchemaMismatch {
                expected: format!("a multiple of {width} values for rows of shape {row_shape:?}"),
                found: format!("{} values", data.len()),
            });
        }
        Ok(Self { row_shape, data })
    }

    /// Non-leading shape shared by every row.
    pub fn row_shape(&self) -> &[usize] {
        &self.row_shape
    }

    /// Number of values per row.
    pub fn row_width(&self) -> usize {
        self.row_shape.iter().product()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        match self.row_width() {
            0 => 0,
            width => self.data.len() / width,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow row `i`.
    pub fn row(&self, i: usize) -> Option<&[f32]> {
        let width = self.row_width();
        self.data.get(i * width..(i + 1) * width)
    }

    /// Iterate rows as slices.
    pub fn rows(&self) -> ChunksExact<'_, f32> {
        self.data.chunks_exact(self.row_width().max(1))
    }

    /// Flattened row-major values.
    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }

    /// Consume into `(rows x flattened-width)` row-major values.
    pub fn into_flat(self) -> Vec<f32> {
        self.data
    }

    /// Append one row, checking its width.
    pub fn push_row(&mut self, values: &[f32]) -> Result<(), StoreError> {
        if values.len() != self.row_width() {
            return Err(StoreError::SchemaMismatch {
                expected: format!("rows of shape {:?}", self.row_shape),
                found: format!("row with {} values", values.len()),
            });
        }
        self.data.extend_from_slice(values);
        Ok(())
    }

    /// Append every row of `other`, which must share this block's shape.
    pub fn extend(&mut self, other: &FeatureBlock) -> Result<(), StoreError> {
        if other.row_shape != self.row_shape {
            return Err(StoreError::SchemaMismatch {
                expected: format!("rows of shape {:?}", self.row_shape),
                found: format!("rows of shape {:?}", other.row_shape),
            });
        }
        self.data.extend_from_slice(&other.data);
        Ok(())
    }
}

/// Column-oriented group of rows written to a store together.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureBatch {
    /// Original row positions.
    pub idx: Vec<RowIdx>,
    /// Date text per row (empty = no date).
    pub date: Vec<DateText>,
    /// Source/author per row.
    pub name: Vec<SourceName>,
    /// Class label per row.
    pub label: Vec<Label>,
    /// Pre-padding lengths (word-embedding batches only).
    pub length: Option<Vec<SeqLen>>,
    /// Feature arrays.
    pub features: FeatureBlock,
}

impl FeatureBatch {
    /// An empty batch for rows of `row_shape`, with or without a length column.
    pub fn new(row_shape: Vec<usize>, with_length: bool) -> Self {
        Self {
            idx: Vec::new(),
            date: Vec::new(),
            name: Vec::new(),
            label: Vec::new(),
            length: with_length.then(Vec::new),
            features: FeatureBlock::empty(row_shape),
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idx.is_empty()
    }

    /// Append one row.
    pub fn push(
        &mut self,
        idx: RowIdx,
        date: DateText,
        name: SourceName,
        label: Label,
        features: RowFeatures,
    ) -> Result<(), StoreError> {
        match (&mut self.length, features.length) {
            (Some(lengths), Some(length)) => {
                self.features.push_row(&features.values)?;
                lengths.push(length);
            }
            (None, None) => self.features.push_row(&features.values)?,
            (Some(_), None) => {
                return Err(StoreError::SchemaMismatch {
                    expected: "row with a pre-padding length".into(),
                    found: format!("row {idx} without length"),
                });
            }
            (None, Some(_)) => {
                return Err(StoreError::SchemaMismatch {
                    expected: "row without a length".into(),
                    found: format!("row {idx} with length"),
                });
            }
        }
        self.idx.push(idx);
        self.date.push(date);
        self.name.push(name);
        self.label.push(label);
        Ok(())
    }

    /// Verify every column holds the same number of rows.
    pub fn check_row_counts(&self) -> Result<(), StoreError> {
        let rows = self.idx.len();
        let mut counts = vec![
            ("date", self.date.len()),
            ("name", self.name.len()),
            ("label", self.label.len()),
            ("features", self.features.len()),
        ];
        if let Some(lengths) = &self.length {
            counts.push(("length", lengths.len()));
        }
        match counts.iter().find(|(_, count)| *count != rows) {
            Some((column, count)) => Err(StoreError::InconsistentLengths {
                details: format!("batch has {rows} idx rows but {count} {column} rows"),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_block_rows() {
        let block = FeatureBlock::new(vec![2, 2], (0..12).map(|v| v as f32).collect()).unwrap();
        assert_eq!(block.len(), 3);
        assert_eq!(block.row(1).unwrap(), &[4.0, 5.0, 6.0, 7.0]);
        assert!(block.row(3).is_none());
        assert_eq!(block.rows().nth(2).unwrap(), &[8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn feature_block_rejects_ragged_data() {
        assert!(FeatureBlock::new(vec![3], vec![1.0; 4]).is_err());
        let mut block = FeatureBlock::empty(vec![3]);
        assert!(block.push_row(&[1.0, 2.0]).is_err());
        let other = FeatureBlock::new(vec![2], vec![0.0; 2]).unwrap();
        assert!(block.extend(&other).is_err());
    }

    #[test]
    fn batch_push_enforces_length_presence() {
        let mut batch = FeatureBatch::new(vec![1], false);
        batch
            .push(3, String::new(), "n".into(), 1, RowFeatures::vector(vec![1.0]))
            .unwrap();
        let err = batch
            .push(4, String::new(), "n".into(), 0, RowFeatures::sequence(vec![1.0], 1))
            .unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch { .. }));
        assert_eq!(batch.len(), 1);
        batch.check_row_counts().unwrap();
    }

    #[test]
    fn row_count_check_reports_column() {
        let mut batch = FeatureBatch::new(vec![1], false);
        batch
            .push(0, String::new(), "n".into(), 0, RowFeatures::vector(vec![1.0]))
            .unwrap();
        batch.name.push("extra".into());
        assert!(matches!(
            batch.check_row_counts(),
            Err(StoreError::InconsistentLengths { details }) if details.contains("name")
        ));
    }
}
