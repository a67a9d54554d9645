use simd_r_drive::storage_engine::DataStore;
use simd_r_drive::storage_engine::traits::DataStoreWriter;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::ProduceConfig;
use crate::constants::produce::SKIP_EMPTY_MSG;
use crate::constants::store::{CHUNK_DIR_KEY, META_KEY, STORE_EXTENSION};
use crate::data::FeatureBatch;
use crate::errors::StoreError;
use crate::features::FeatureGenerator;
use crate::input::SourceRow;
use crate::manifest::StoreLabels;
use crate::schema::StoreSchema;
use crate::store::codec::{
    ChunkSpan, ColumnChunk, StoreMeta, check_consistent_lengths, column_chunk_key,
    column_len_key, encode_chunk, encode_chunk_dir, encode_meta, encode_row_count,
    ensure_parent_dir, read_meta, verify_entry_chain,
};
use crate::types::RowIdx;

/// Every record one batch append writes, applied together in a single `batch_write`.
#[derive(Clone, Debug)]
pub struct BatchAppend {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    chunks: Vec<ChunkSpan>,
    rows: u64,
}

impl BatchAppend {
    /// Build the append of `batch` after `chunks`. `meta` is written along with
    /// the first chunk of a new store.
    pub(crate) fn build(
        schema: &StoreSchema,
        chunks: &[ChunkSpan],
        batch: &FeatureBatch,
        meta: Option<&StoreMeta>,
    ) -> Result<Self, StoreError> {
        let start = chunks.last().map(ChunkSpan::end).unwrap_or(0);
        let span = ChunkSpan {
            start,
            rows: batch.len() as u64,
        };
        let chunk_no = chunks.len() as u64;
        let mut next_chunks = chunks.to_vec();
        next_chunks.push(span);

        let columns = schema.columns();
        let mut entries = Vec::with_capacity(columns.len() * 2 + 2);
        if let Some(meta) = meta {
            entries.push((META_KEY.to_vec(), encode_meta(meta)));
        }
        for column in columns {
            let name = schema.column_name(column);
            let chunk = ColumnChunk::from_batch(batch, column)?;
            entries.push((column_chunk_key(name, chunk_no), encode_chunk(&chunk)));
            entries.push((
                column_len_key(name),
                encode_row_count(span.end()).to_vec(),
            ));
        }
        entries.push((CHUNK_DIR_KEY.to_vec(), encode_chunk_dir(&next_chunks)));

        Ok(Self {
            entries,
            chunks: next_chunks,
            rows: span.end(),
        })
    }

    /// Store rows once this append is applied.
    pub fn rows_after(&self) -> u64 {
        self.rows
    }

    fn apply(&self, store: &DataStore) -> Result<u64, StoreError> {
        let entry_refs: Vec<(&[u8], &[u8])> = self
            .entries
            .iter()
            .map(|(key, value)| (key.as_slice(), value.as_slice()))
            .collect();
        Ok(store.batch_write(&entry_refs)?)
    }
}

/// Outcome of one `write_batch` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Source rows offered.
    pub input_rows: usize,
    /// Rows persisted.
    pub written: usize,
    /// `idx` of rows dropped for having no content.
    pub skipped: Vec<RowIdx>,
}

/// Final state of a sealed store.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreSummary {
    pub path: PathBuf,
    pub schema: StoreSchema,
    pub labels: StoreLabels,
    /// Rows persisted.
    pub rows: u64,
    /// Appended chunks.
    pub chunks: usize,
    /// Rows dropped for having no content across the run.
    pub skipped: usize,
    /// False when no row was ever written, in which case no file exists.
    pub created: bool,
}

/// Single-producer appender for one feature store.
///
/// The file is created by the first non-empty batch. Every later batch must
/// match the schema declared at `create`; `finish` seals the store.
pub struct FeatureStoreWriter {
    path: PathBuf,
    schema: StoreSchema,
    labels: StoreLabels,
    store: Option<DataStore>,
    chunks: Vec<ChunkSpan>,
    rows: u64,
    seen_idx: HashSet<RowIdx>,
    skipped: usize,
}

impl fmt::Debug for FeatureStoreWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureStoreWriter")
            .field("path", &self.path)
            .field("schema", &self.schema)
            .field("rows", &self.rows)
            .field("chunks", &self.chunks.len())
            .finish()
    }
}

impl FeatureStoreWriter {
    /// Reserve `path` for a new store of `schema`.
    ///
    /// Fails with `Sealed` when a finished store is already there and with
    /// `StoreExists` for any other existing file.
    pub fn create<P: Into<PathBuf>>(path: P, schema: StoreSchema) -> Result<Self, StoreError> {
        let path = path.into();
        if path.exists() {
            return Err(existing_store_error(&path));
        }
        Ok(Self {
            path,
            schema,
            labels: StoreLabels::default(),
            store: None,
            chunks: Vec::new(),
            rows: 0,
            seen_idx: HashSet::new(),
            skipped: 0,
        })
    }

    /// Descriptive labels recorded in the store metadata.
    pub fn with_labels(mut self, labels: StoreLabels) -> Self {
        self.labels = labels;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    pub fn labels(&self) -> &StoreLabels {
        &self.labels
    }

    /// Rows persisted so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Generate features for `rows` and append the survivors as one chunk.
    ///
    /// Rows the generator reports as empty are logged and left out; their
    /// `idx` values become gaps in the store.
    pub fn write_batch(
        &mut self,
        rows: &[SourceRow],
        generator: &dyn FeatureGenerator,
    ) -> Result<BatchReport, StoreError> {
        let generated = generator.schema()?;
        if generated != self.schema {
            return Err(StoreError::SchemaMismatch {
                expected: self.schema.to_string(),
                found: generated.to_string(),
            });
        }

        let mut batch = FeatureBatch::new(self.schema.row_shape(), self.schema.has_length());
        let mut skipped = Vec::new();
        for row in rows {
            match generator.generate(row)? {
                Some(features) => {
                    batch.push(row.idx, row.date.clone(), row.name.clone(), row.label, features)?
                }
                None => {
                    warn!(idx = row.idx, path = %self.path.display(), "{SKIP_EMPTY_MSG}");
                    skipped.push(row.idx);
                }
            }
        }
        self.skipped += skipped.len();
        let written = self.append(&batch)?;
        Ok(BatchReport {
            input_rows: rows.len(),
            written,
            skipped,
        })
    }

    /// Append a pre-generated batch as one chunk. Empty batches are a no-op.
    pub fn append(&mut self, batch: &FeatureBatch) -> Result<usize, StoreError> {
        if batch.is_empty() {
            return Ok(0);
        }
        self.schema.validate(batch)?;
        self.check_unique_idx(batch)?;

        let meta = self
            .store
            .is_none()
            .then(|| StoreMeta::new(self.schema, self.labels.clone()));
        let append = BatchAppend::build(&self.schema, &self.chunks, batch, meta.as_ref())?;
        let schema = self.schema;
        let rows = {
            let store = self.open_store()?;
            append.apply(store)?;
            check_consistent_lengths(store, &schema)?
        };
        if rows != append.rows_after() {
            return Err(StoreError::InconsistentLengths {
                details: format!(
                    "store reports {rows} rows after append, expected {}",
                    append.rows_after()
                ),
            });
        }

        self.seen_idx.extend(batch.idx.iter().copied());
        self.chunks = append.chunks;
        self.rows = rows;
        debug!(
            path = %self.path.display(),
            chunk = self.chunks.len() - 1,
            batch_rows = batch.len(),
            total_rows = self.rows,
            "appended feature chunk"
        );
        Ok(batch.len())
    }

    /// Seal the store so no further appends are accepted.
    pub fn finish(self) -> Result<StoreSummary, StoreError> {
        let created = match &self.store {
            Some(store) => {
                let mut meta = StoreMeta::new(self.schema, self.labels.clone());
                meta.sealed = true;
                store.write(META_KEY, &encode_meta(&meta))?;
                info!(
                    path = %self.path.display(),
                    rows = self.rows,
                    chunks = self.chunks.len(),
                    skipped = self.skipped,
                    "sealed feature store"
                );
                true
            }
            None => {
                info!(
                    path = %self.path.display(),
                    skipped = self.skipped,
                    "no rows written; feature store not created"
                );
                false
            }
        };
        Ok(StoreSummary {
            path: self.path,
            schema: self.schema,
            labels: self.labels,
            rows: self.rows,
            chunks: self.chunks.len(),
            skipped: self.skipped,
            created,
        })
    }

    fn open_store(&mut self) -> Result<&DataStore, StoreError> {
        if self.store.is_none() {
            if self.path.exists() {
                return Err(existing_store_error(&self.path));
            }
            ensure_parent_dir(&self.path)?;
            let store = DataStore::open(self.path.as_path())?;
            info!(
                path = %self.path.display(),
                schema = %self.schema,
                "created feature store"
            );
            self.store = Some(store);
        }
        self.store
            .as_ref()
            .ok_or_else(|| StoreError::Corrupt("feature store handle unavailable".into()))
    }

    fn check_unique_idx(&self, batch: &FeatureBatch) -> Result<(), StoreError> {
        let mut in_batch = HashSet::with_capacity(batch.len());
        for idx in &batch.idx {
            if self.seen_idx.contains(idx) || !in_batch.insert(*idx) {
                return Err(StoreError::Input(format!("duplicate idx {idx}")));
            }
        }
        Ok(())
    }
}

/// Feed `rows` through `generator` in `step_size` windows into a new store at `path`.
pub fn produce_store(
    rows: &[SourceRow],
    generator: &dyn FeatureGenerator,
    path: &Path,
    schema: StoreSchema,
    config: &ProduceConfig,
) -> Result<StoreSummary, StoreError> {
    config.validate()?;
    let generated = generator.schema()?;
    if generated != schema {
        return Err(StoreError::SchemaMismatch {
            expected: schema.to_string(),
            found: generated.to_string(),
        });
    }
    let mut writer = FeatureStoreWriter::create(path, schema)?.with_labels(config.labels.clone());
    for (batch_no, window) in rows.chunks(config.step_size).enumerate() {
        let report = writer.write_batch(window, generator)?;
        debug!(
            batch = batch_no,
            input_rows = report.input_rows,
            written = report.written,
            skipped = report.skipped.len(),
            "processed producer batch"
        );
    }
    writer.finish()
}

/// Only store-extension files with an intact entry chain are opened to read the
/// sealed flag; `DataStore::open` would truncate anything else.
fn existing_store_error(path: &Path) -> StoreError {
    let is_store_file = path
        .extension()
        .is_some_and(|ext| ext == STORE_EXTENSION);
    if !is_store_file {
        return StoreError::StoreExists(path.to_path_buf());
    }
    let sealed = verify_entry_chain(path)
        .ok()
        .and_then(|()| DataStore::open_existing(path).ok())
        .and_then(|store| read_meta(&store).ok())
        .is_some_and(|meta| meta.sealed);
    if sealed {
        StoreError::Sealed(path.to_path_buf())
    } else {
        StoreError::StoreExists(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RowFeatures;
    use crate::features::LiwcFeatures;
    use crate::padding::PadPosition;
    use crate::store::codec::read_chunk_dir;
    use tempfile::tempdir;

    fn liwc_batch(ids: std::ops::Range<u64>) -> FeatureBatch {
        let mut batch = FeatureBatch::new(vec![2], false);
        for idx in ids {
            batch
                .push(
                    idx,
                    String::new(),
                    format!("n{idx}"),
                    (idx % 2) as u8,
                    RowFeatures::vector(vec![idx as f32, 1.0]),
                )
                .unwrap();
        }
        batch
    }

    #[test]
    fn batch_append_carries_every_column_and_directory() {
        let schema = StoreSchema::liwc(2).unwrap();
        let meta = StoreMeta::new(schema, StoreLabels::default());
        let first = BatchAppend::build(&schema, &[], &liwc_batch(0..3), Some(&meta)).unwrap();
        // meta + (chunk + len) per column + directory
        assert_eq!(first.entries.len(), 1 + 2 * 5 + 1);
        assert_eq!(first.rows_after(), 3);

        let chunks = [ChunkSpan { start: 0, rows: 3 }];
        let second = BatchAppend::build(&schema, &chunks, &liwc_batch(3..5), None).unwrap();
        assert_eq!(second.entries.len(), 2 * 5 + 1);
        assert_eq!(second.rows_after(), 5);
        assert_eq!(second.chunks[1], ChunkSpan { start: 3, rows: 2 });
    }

    #[test]
    fn store_file_is_created_by_first_non_empty_batch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("liwc.fstore");
        let mut writer = FeatureStoreWriter::create(&path, StoreSchema::liwc(2).unwrap()).unwrap();
        assert_eq!(writer.append(&FeatureBatch::new(vec![2], false)).unwrap(), 0);
        assert!(!path.exists());
        assert_eq!(writer.append(&liwc_batch(0..4)).unwrap(), 4);
        assert!(path.exists());
        let summary = writer.finish().unwrap();
        assert!(summary.created);
        assert_eq!(summary.rows, 4);
    }

    #[test]
    fn finish_without_rows_creates_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.fstore");
        let rows = vec![SourceRow {
            idx: 0,
            date: String::new(),
            text: String::new(),
            name: "a".into(),
            label: 0,
            scores: Vec::new(),
        }];
        let mut writer = FeatureStoreWriter::create(&path, StoreSchema::liwc(2).unwrap()).unwrap();
        let report = writer.write_batch(&rows, &LiwcFeatures::new(2)).unwrap();
        assert_eq!(report.skipped, vec![0]);
        let summary = writer.finish().unwrap();
        assert!(!summary.created);
        assert_eq!(summary.skipped, 1);
        assert!(!path.exists());
    }

    #[test]
    fn mismatched_batch_leaves_store_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("liwc.fstore");
        let mut writer = FeatureStoreWriter::create(&path, StoreSchema::liwc(2).unwrap()).unwrap();
        writer.append(&liwc_batch(0..3)).unwrap();

        let mut wide = FeatureBatch::new(vec![3], false);
        wide.push(9, String::new(), "x".into(), 0, RowFeatures::vector(vec![0.0; 3]))
            .unwrap();
        assert!(matches!(
            writer.append(&wide),
            Err(StoreError::SchemaMismatch { .. })
        ));
        assert_eq!(writer.rows(), 3);
        let store = writer.store.as_ref().unwrap();
        assert_eq!(read_chunk_dir(store).unwrap().len(), 1);
        assert_eq!(check_consistent_lengths(store, writer.schema()).unwrap(), 3);
    }

    #[test]
    fn duplicate_idx_is_rejected_across_batches() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("liwc.fstore");
        let mut writer = FeatureStoreWriter::create(&path, StoreSchema::liwc(2).unwrap()).unwrap();
        writer.append(&liwc_batch(0..3)).unwrap();
        assert!(matches!(
            writer.append(&liwc_batch(2..4)),
            Err(StoreError::Input(msg)) if msg.contains("duplicate idx 2")
        ));
    }

    #[test]
    fn generator_schema_must_match_store_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("emb.fstore");
        let schema = StoreSchema::word_embedding(4, 2, PadPosition::Tail).unwrap();
        let mut writer = FeatureStoreWriter::create(&path, schema).unwrap();
        assert!(matches!(
            writer.write_batch(&[], &LiwcFeatures::new(2)),
            Err(StoreError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn produce_store_rejects_padding_other_than_the_generator_uses() {
        use crate::embedding::VectorTable;
        use crate::features::EmbeddingFeatures;
        use std::sync::Arc;

        let dir = tempdir().unwrap();
        let path = dir.path().join("emb.fstore");
        let mut table = VectorTable::new(2).unwrap();
        table.insert("angry", &[1.0, 0.5]).unwrap();
        let generator = EmbeddingFeatures::new(Arc::new(table), 4, PadPosition::Tail);
        let head = StoreSchema::word_embedding(4, 2, PadPosition::Head).unwrap();
        let rows = vec![SourceRow {
            idx: 0,
            date: String::new(),
            text: "angry".into(),
            name: "a".into(),
            label: 1,
            scores: Vec::new(),
        }];

        let err = produce_store(&rows, &generator, &path, head, &ProduceConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::SchemaMismatch { ref expected, ref found }
                if expected.contains("head") && found.contains("tail")
        ));
        assert!(!path.exists());

        let err = produce_store(&[], &generator, &path, head, &ProduceConfig::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch { .. }));
    }

    #[test]
    fn create_distinguishes_sealed_and_unsealed_stores() {
        let dir = tempdir().unwrap();
        let sealed_path = dir.path().join("sealed.fstore");
        let mut writer =
            FeatureStoreWriter::create(&sealed_path, StoreSchema::liwc(2).unwrap()).unwrap();
        writer.append(&liwc_batch(0..2)).unwrap();
        writer.finish().unwrap();
        assert!(matches!(
            FeatureStoreWriter::create(&sealed_path, StoreSchema::liwc(2).unwrap()),
            Err(StoreError::Sealed(path)) if path == sealed_path
        ));

        let open_path = dir.path().join("open.fstore");
        let mut writer =
            FeatureStoreWriter::create(&open_path, StoreSchema::liwc(2).unwrap()).unwrap();
        writer.append(&liwc_batch(0..2)).unwrap();
        drop(writer);
        assert!(matches!(
            FeatureStoreWriter::create(&open_path, StoreSchema::liwc(2).unwrap()),
            Err(StoreError::StoreExists(_))
        ));
    }
}
