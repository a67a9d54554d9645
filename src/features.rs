use std::sync::Arc;

use crate::data::RowFeatures;
use crate::embedding::TokenEmbedder;
use crate::errors::StoreError;
use crate::input::SourceRow;
use crate::padding::{PadPosition, pad_sequence};
use crate::schema::StoreSchema;
use crate::text::{CleaningOptions, tokenize};

/// Turns a source row into a fixed-shape feature array.
pub trait FeatureGenerator {
    /// Schema of the store this generator fills.
    fn schema(&self) -> Result<StoreSchema, StoreError>;

    /// Features for `row`, or `None` when the row has no usable content.
    fn generate(&self, row: &SourceRow) -> Result<Option<RowFeatures>, StoreError>;
}

/// Clean, tokenize, embed, and pad post text.
#[derive(Clone)]
pub struct EmbeddingFeatures {
    embedder: Arc<dyn TokenEmbedder>,
    max_len: usize,
    pad_position: PadPosition,
    cleaning: CleaningOptions,
}

impl EmbeddingFeatures {
    /// Generator producing `(max_len, embedder.dim())` rows.
    pub fn new(embedder: Arc<dyn TokenEmbedder>, max_len: usize, pad_position: PadPosition) -> Self {
        Self {
            embedder,
            max_len,
            pad_position,
            cleaning: CleaningOptions::default(),
        }
    }

    /// Override text cleaning options.
    pub fn with_cleaning(mut self, cleaning: CleaningOptions) -> Self {
        self.cleaning = cleaning;
        self
    }
}

impl FeatureGenerator for EmbeddingFeatures {
    fn schema(&self) -> Result<StoreSchema, StoreError> {
        StoreSchema::word_embedding(self.max_len, self.embedder.dim(), self.pad_position)
    }

    fn generate(&self, row: &SourceRow) -> Result<Option<RowFeatures>, StoreError> {
        let tokens = tokenize(&row.text, &self.cleaning);
        if tokens.is_empty() {
            return Ok(None);
        }
        let vectors = self.embedder.embed(&tokens);
        let padded = pad_sequence(&vectors, self.embedder.dim(), self.max_len, self.pad_position)?;
        let length = u32::try_from(padded.length).map_err(|_| {
            StoreError::Configuration(format!("sequence length {} exceeds u32", padded.length))
        })?;
        Ok(Some(RowFeatures::sequence(padded.data, length)))
    }
}

/// Pass through precomputed LIWC score columns.
#[derive(Clone, Debug)]
pub struct LiwcFeatures {
    dim: usize,
}

impl LiwcFeatures {
    /// Generator expecting exactly `dim` scores per row.
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl FeatureGenerator for LiwcFeatures {
    fn schema(&self) -> Result<StoreSchema, StoreError> {
        StoreSchema::liwc(self.dim)
    }

    fn generate(&self, row: &SourceRow) -> Result<Option<RowFeatures>, StoreError> {
        if row.scores.is_empty() || row.scores.iter().all(|score| score.is_nan()) {
            return Ok(None);
        }
        if row.scores.len() != self.dim {
            return Err(StoreError::SchemaMismatch {
                expected: format!("{} liwc scores", self.dim),
                found: format!("{} scores on row {}", row.scores.len(), row.idx),
            });
        }
        Ok(Some(RowFeatures::vector(row.scores.clone())))
    }
}
