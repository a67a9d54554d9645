use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::columns::{DATE, EMBEDDING, IDX, LABEL, LENGTH, LIWC_VECTOR, NAME};
use crate::data::FeatureBatch;
use crate::errors::StoreError;
use crate::padding::PadPosition;

/// A named column of a feature store.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    bitcode::Encode,
    bitcode::Decode,
)]
pub enum Column {
    /// Original row position in the source table.
    Idx,
    /// Date text (empty = no date).
    Date,
    /// Source/author identifier.
    Name,
    /// Class label.
    Label,
    /// Pre-padding sequence length (word-embedding stores only).
    Length,
    /// The `f32` feature array column.
    Features,
}

/// Which kind of per-row feature array a store holds.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode,
)]
pub enum FeatureMode {
    /// `(max_len, dim)` padded token-embedding matrices with a `length` column.
    WordEmbedding {
        max_len: u32,
        dim: u32,
        pad_position: PadPosition,
    },
    /// `(dim,)` psycholinguistic score vectors.
    Liwc { dim: u32 },
}

/// Explicit column layout of a store, fixed at creation and checked on every append.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode,
)]
pub struct StoreSchema {
    /// Feature representation held by this store.
    pub mode: FeatureMode,
}

impl StoreSchema {
    /// Schema for padded word-embedding rows.
    pub fn word_embedding(
        max_len: usize,
        dim: usize,
        pad_position: PadPosition,
    ) -> Result<Self, StoreError> {
        if max_len == 0 || dim == 0 {
            return Err(StoreError::Configuration(
                "word-embedding schema needs non-zero max_len and dim".into(),
            ));
        }
        Ok(Self {
            mode: FeatureMode::WordEmbedding {
                max_len: to_u32(max_len)?,
                dim: to_u32(dim)?,
                pad_position,
            },
        })
    }

    /// Schema for fixed-length LIWC score vectors.
    pub fn liwc(dim: usize) -> Result<Self, StoreError> {
        if dim == 0 {
            return Err(StoreError::Configuration(
                "liwc schema needs a non-zero dim".into(),
            ));
        }
        Ok(Self {
            mode: FeatureMode::Liwc { dim: to_u32(dim)? },
        })
    }

    /// Derive a schema from the shape of a first batch.
    ///
    /// Two-dimensional rows with a `length` column become word-embedding
    /// stores padded at `pad_position`; one-dimensional rows without one
    /// become LIWC stores.
    pub fn infer(batch: &FeatureBatch, pad_position: PadPosition) -> Result<Self, StoreError> {
        match (batch.features.row_shape(), batch.length.is_some()) {
            ([max_len, dim], true) => Self::word_embedding(*max_len, *dim, pad_position),
            ([dim], false) => Self::liwc(*dim),
            (shape, has_length) => Err(StoreError::SchemaMismatch {
                expected: "(max_len, dim) rows with lengths or (dim,) rows without".into(),
                found: format!("{shape:?} rows, length column present: {has_length}"),
            }),
        }
    }

    /// Ordered list of columns stored.
    pub fn columns(&self) -> Vec<Column> {
        let mut columns = vec![
            Column::Idx,
            Column::Date,
            Column::Features,
            Column::Name,
            Column::Label,
        ];
        if self.has_length() {
            columns.push(Column::Length);
        }
        columns
    }

    /// True for word-embedding stores, which track pre-padding lengths.
    pub fn has_length(&self) -> bool {
        matches!(self.mode, FeatureMode::WordEmbedding { .. })
    }

    /// Non-leading shape of the feature column.
    pub fn row_shape(&self) -> Vec<usize> {
        match self.mode {
            FeatureMode::WordEmbedding { max_len, dim, .. } => vec![max_len as usize, dim as usize],
            FeatureMode::Liwc { dim } => vec![dim as usize],
        }
    }

    /// Number of `f32` values per row.
    pub fn row_width(&self) -> usize {
        self.row_shape().iter().product()
    }

    /// Padding placement for word-embedding stores.
    pub fn pad_position(&self) -> Option<PadPosition> {
        match self.mode {
            FeatureMode::WordEmbedding { pad_position, .. } => Some(pad_position),
            FeatureMode::Liwc { .. } => None,
        }
    }

    /// Name of the feature column for this store kind.
    pub fn feature_column_name(&self) -> &'static str {
        match self.mode {
            FeatureMode::WordEmbedding { .. } => EMBEDDING,
            FeatureMode::Liwc { .. } => LIWC_VECTOR,
        }
    }

    /// Stored name of `column`.
    pub fn column_name(&self, column: Column) -> &'static str {
        match column {
            Column::Idx => IDX,
            Column::Date => DATE,
            Column::Name => NAME,
            Column::Label => LABEL,
            Column::Length => LENGTH,
            Column::Features => self.feature_column_name(),
        }
    }

    /// Resolve a column by name, rejecting names this store does not hold.
    pub fn parse_column(&self, name: &str) -> Result<Column, StoreError> {
        self.columns()
            .into_iter()
            .find(|column| self.column_name(*column) == name)
            .ok_or_else(|| StoreError::InvalidColumn(name.to_string()))
    }

    /// Check that `batch` matches this schema.
    pub fn validate(&self, batch: &FeatureBatch) -> Result<(), StoreError> {
        batch.check_row_counts()?;

        let expected_shape = self.row_shape();
        if batch.features.row_shape() != expected_shape.as_slice() {
            return Err(StoreError::SchemaMismatch {
                expected: format!("{} rows of shape {:?}", self.feature_column_name(), expected_shape),
                found: format!("rows of shape {:?}", batch.features.row_shape()),
            });
        }

        match (self.mode, batch.length.as_deref()) {
            (FeatureMode::WordEmbedding { max_len, .. }, Some(lengths)) => {
                if let Some(bad) = lengths.iter().find(|length| **length > max_len) {
                    return Err(StoreError::SchemaMismatch {
                        expected: format!("lengths <= {max_len}"),
                        found: format!("length {bad}"),
                    });
                }
            }
            (FeatureMode::WordEmbedding { .. }, None) => {
                return Err(StoreError::SchemaMismatch {
                    expected: "a length column".into(),
                    found: "batch without lengths".into(),
                });
            }
            (FeatureMode::Liwc { .. }, Some(_)) => {
                return Err(StoreError::SchemaMismatch {
                    expected: "no length column".into(),
                    found: "batch with lengths".into(),
                });
            }
            (FeatureMode::Liwc { .. }, None) => {}
        }

        if let Some(bad) = batch.label.iter().find(|label| **label > 1) {
            return Err(StoreError::Input(format!("label {bad} is not 0 or 1")));
        }
        Ok(())
    }
}

impl fmt::Display for StoreSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            FeatureMode::WordEmbedding {
                max_len,
                dim,
                pad_position,
            } => write!(f, "embedding[{max_len}x{dim}, pad={pad_position}]"),
            FeatureMode::Liwc { dim } => write!(f, "liwc_vector[{dim}]"),
        }
    }
}

fn to_u32(value: usize) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::Configuration(format!("dimension {value} does not fit in u32")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{FeatureBatch, RowFeatures};

    fn embedding_batch(max_len: usize, dim: usize, lengths: &[u32]) -> FeatureBatch {
        let mut batch = FeatureBatch::new(vec![max_len, dim], true);
        for (i, length) in lengths.iter().enumerate() {
            batch
                .push(
                    i as u64,
                    String::new(),
                    format!("author_{i}"),
                    (i % 2) as u8,
                    RowFeatures::sequence(vec![0.5; max_len * dim], *length),
                )
                .unwrap();
        }
        batch
    }

    #[test]
    fn columns_follow_store_kind() {
        let emb = StoreSchema::word_embedding(4, 3, PadPosition::Tail).unwrap();
        assert_eq!(emb.columns().len(), 6);
        assert!(emb.columns().contains(&Column::Length));
        assert_eq!(emb.column_name(Column::Features), "embedding");

        let liwc = StoreSchema::liwc(93).unwrap();
        assert!(!liwc.columns().contains(&Column::Length));
        assert_eq!(liwc.column_name(Column::Features), "liwc_vector");
        assert_eq!(liwc.row_shape(), vec![93]);
    }

    #[test]
    fn parse_column_rejects_unknown_and_foreign_names() {
        let liwc = StoreSchema::liwc(8).unwrap();
        assert_eq!(liwc.parse_column("label").unwrap(), Column::Label);
        assert_eq!(liwc.parse_column("liwc_vector").unwrap(), Column::Features);
        assert!(matches!(
            liwc.parse_column("length"),
            Err(StoreError::InvalidColumn(name)) if name == "length"
        ));
        assert!(matches!(
            liwc.parse_column("emb_tensor"),
            Err(StoreError::InvalidColumn(_))
        ));
    }

    #[test]
    fn infer_uses_first_batch_shape() {
        let batch = embedding_batch(5, 2, &[3, 5]);
        let schema = StoreSchema::infer(&batch, PadPosition::Split).unwrap();
        assert_eq!(schema.row_shape(), vec![5, 2]);
        assert_eq!(schema.pad_position(), Some(PadPosition::Split));
        assert!(schema.validate(&batch).is_ok());
    }

    #[test]
    fn validate_rejects_shape_drift() {
        let schema = StoreSchema::word_embedding(5, 2, PadPosition::Tail).unwrap();
        let batch = embedding_batch(5, 3, &[2]);
        assert!(matches!(
            schema.validate(&batch),
            Err(StoreError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn validate_rejects_overlong_lengths_and_bad_labels() {
        let schema = StoreSchema::word_embedding(4, 1, PadPosition::Tail).unwrap();
        let batch = embedding_batch(4, 1, &[5]);
        assert!(matches!(
            schema.validate(&batch),
            Err(StoreError::SchemaMismatch { found, .. }) if found.contains('5')
        ));

        let mut batch = embedding_batch(4, 1, &[2]);
        batch.label[0] = 3;
        assert!(matches!(schema.validate(&batch), Err(StoreError::Input(_))));
    }

    #[test]
    fn validate_rejects_length_column_mismatch() {
        let liwc = StoreSchema::liwc(2).unwrap();
        let mut batch = FeatureBatch::new(vec![2], true);
        batch
            .push(0, String::new(), "a".into(), 0, RowFeatures::sequence(vec![1.0, 2.0], 1))
            .unwrap();
        assert!(matches!(
            liwc.validate(&batch),
            Err(StoreError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn zero_dimensions_are_configuration_errors() {
        assert!(matches!(
            StoreSchema::liwc(0),
            Err(StoreError::Configuration(_))
        ));
        assert!(StoreSchema::word_embedding(0, 3, PadPosition::Head).is_err());
    }
}
