#![doc = include_str!("../README.md")]

/// Command runners shared by the demo binaries.
pub mod apps;
/// Producer and dataset-construction configuration.
pub mod config;
/// Centralized constants for store keys, column names, and defaults.
pub mod constants;
/// Row, feature block, and batch types.
pub mod data;
/// Token-vector backends.
pub mod embedding;
/// Per-row feature generators.
pub mod features;
/// Labeled text tables read from delimited files.
pub mod input;
/// Model-ready tensors built from stores.
pub mod loader;
/// Store catalogue persisted as JSON.
pub mod manifest;
/// Binary classification metrics.
pub mod metrics;
/// Padding and truncation of embedding sequences.
pub mod padding;
/// Column schema of a store.
pub mod schema;
/// Long-text slicing and stratified splits.
pub mod splits;
/// Chunked store writer, reader, and rebuild.
pub mod store;
/// Text cleaning and tokenization.
pub mod text;
/// Shared type aliases.
pub mod types;

mod errors;

pub use config::{ProduceConfig, SplitConfig};
pub use data::{FeatureBatch, FeatureBlock, RowFeatures};
pub use embedding::{TokenEmbedder, VectorTable};
pub use errors::StoreError;
pub use features::{EmbeddingFeatures, FeatureGenerator, LiwcFeatures};
pub use input::{CsvOptions, SourceRow, read_rows_csv};
pub use loader::{ClassicalDataset, SequenceBatch, SequenceWindows, class_weights};
pub use manifest::{StoreLabels, StoreManifest, StoreQuery, StoreRecord};
pub use metrics::ClassificationMetrics;
pub use padding::{PadPosition, PaddedSequence, pad_sequence};
pub use schema::{Column, FeatureMode, StoreSchema};
pub use splits::{DatasetSplits, SplitLabel, slice_long_texts, stratified_split};
pub use store::{
    ColumnMap, ColumnValues, FeatureStoreReader, FeatureStoreWriter, ReadOutput, RebuildReport,
    StoreSummary, produce_store, rebuild_excluding,
};
pub use text::CleaningOptions;
pub use types::{CorpusId, DateText, FeatureKind, Label, RowIdx, SeqLen, SourceName, Token};
