use indexmap::IndexMap;
use simd_r_drive::storage_engine::DataStore;
use simd_r_drive::storage_engine::traits::DataStoreReader;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::data::FeatureBlock;
use crate::errors::StoreError;
use crate::manifest::StoreLabels;
use crate::schema::{Column, StoreSchema};
use crate::store::codec::{
    ChunkSpan, ColumnChunk, check_consistent_lengths, column_chunk_key, decode_chunk,
    read_chunk_dir, read_meta, verify_entry_chain,
};

/// Values of one column over a row range, coerced to their natural types.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnValues {
    /// `idx`, `label`, and `length`.
    Ints(Vec<i64>),
    /// `date` and `name`.
    Strings(Vec<String>),
    /// The feature column.
    Features(FeatureBlock),
}

impl ColumnValues {
    fn empty_for(column: Column, schema: &StoreSchema) -> Self {
        match column {
            Column::Idx | Column::Label | Column::Length => ColumnValues::Ints(Vec::new()),
            Column::Date | Column::Name => ColumnValues::Strings(Vec::new()),
            Column::Features => ColumnValues::Features(FeatureBlock::empty(schema.row_shape())),
        }
    }

    /// Number of rows held.
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Ints(values) => values.len(),
            ColumnValues::Strings(values) => values.len(),
            ColumnValues::Features(block) => block.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_ints(self) -> Result<Vec<i64>, StoreError> {
        match self {
            ColumnValues::Ints(values) => Ok(values),
            other => Err(other.kind_mismatch("integer")),
        }
    }

    pub fn into_strings(self) -> Result<Vec<String>, StoreError> {
        match self {
            ColumnValues::Strings(values) => Ok(values),
            other => Err(other.kind_mismatch("string")),
        }
    }

    pub fn into_features(self) -> Result<FeatureBlock, StoreError> {
        match self {
            ColumnValues::Features(block) => Ok(block),
            other => Err(other.kind_mismatch("feature")),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            ColumnValues::Ints(_) => "integer",
            ColumnValues::Strings(_) => "string",
            ColumnValues::Features(_) => "feature",
        }
    }

    fn kind_mismatch(&self, wanted: &str) -> StoreError {
        StoreError::SchemaMismatch {
            expected: format!("{wanted} column"),
            found: format!("{} column", self.kind_name()),
        }
    }

    /// Append `[from, to)` of one stored chunk.
    fn extend_from_chunk(
        &mut self,
        chunk: ColumnChunk,
        from: usize,
        to: usize,
        width: usize,
    ) -> Result<(), StoreError> {
        match (self, chunk) {
            (ColumnValues::Ints(out), ColumnChunk::U64(values)) => {
                for value in &values[from..to] {
                    out.push(i64::try_from(*value).map_err(|_| {
                        StoreError::Corrupt(format!("integer {value} out of range"))
                    })?);
                }
            }
            (ColumnValues::Ints(out), ColumnChunk::U32(values)) => {
                out.extend(values[from..to].iter().map(|value| i64::from(*value)));
            }
            (ColumnValues::Ints(out), ColumnChunk::U8(values)) => {
                out.extend(values[from..to].iter().map(|value| i64::from(*value)));
            }
            (ColumnValues::Strings(out), ColumnChunk::Text(mut values)) => {
                values.truncate(to);
                out.extend(values.drain(from..));
            }
            (ColumnValues::Features(block), ColumnChunk::F32(values)) => {
                let rows = FeatureBlock::new(
                    block.row_shape().to_vec(),
                    values[from * width..to * width].to_vec(),
                )?;
                block.extend(&rows)?;
            }
            (out, chunk) => {
                return Err(StoreError::Corrupt(format!(
                    "{} column backed by a {} chunk",
                    out.kind_name(),
                    chunk.kind_name()
                )));
            }
        }
        Ok(())
    }
}

/// Every column over one row range, in schema order.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnMap {
    columns: IndexMap<String, ColumnValues>,
}

impl ColumnMap {
    pub fn get(&self, name: &str) -> Option<&ColumnValues> {
        self.columns.get(name)
    }

    /// Remove and return one column.
    pub fn take(&mut self, name: &str) -> Option<ColumnValues> {
        self.columns.shift_remove(name)
    }

    /// Column names in schema order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Rows per column (all columns agree).
    pub fn rows(&self) -> usize {
        self.columns.values().next().map(ColumnValues::len).unwrap_or(0)
    }

    /// Columns as a positional list in schema order.
    pub fn into_list(self) -> Vec<ColumnValues> {
        self.columns.into_values().collect()
    }
}

/// Result of [`FeatureStoreReader::read`].
#[derive(Clone, Debug, PartialEq)]
pub enum ReadOutput {
    /// A single requested column.
    Column(ColumnValues),
    /// All columns.
    All(ColumnMap),
}

/// Read-only view of a feature store.
pub struct FeatureStoreReader {
    path: PathBuf,
    store: DataStore,
    schema: StoreSchema,
    labels: StoreLabels,
    sealed: bool,
    chunks: Vec<ChunkSpan>,
    rows: u64,
}

impl fmt::Debug for FeatureStoreReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureStoreReader")
            .field("path", &self.path)
            .field("schema", &self.schema)
            .field("sealed", &self.sealed)
            .field("rows", &self.rows)
            .finish()
    }
}

impl FeatureStoreReader {
    /// Open the store at `path`. Column consistency is not checked here;
    /// call [`assert_consistent_lengths`](Self::assert_consistent_lengths) before use.
    ///
    /// The file is never modified. A file whose bytes do not end a complete
    /// entry chain (a torn append, trailing garbage, a foreign file) fails with
    /// [`StoreError::Corrupt`] instead of being repaired in place.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StoreError> {
        let path = path.into();
        if !path.is_file() {
            return Err(StoreError::StoreMissing(path));
        }
        verify_entry_chain(&path)?;
        let store = DataStore::open_existing(path.as_path())?;
        let meta = read_meta(&store)?;
        let chunks = read_chunk_dir(&store)?;
        let rows = chunks.last().map(ChunkSpan::end).unwrap_or(0);
        debug!(
            path = %path.display(),
            schema = %meta.schema,
            sealed = meta.sealed,
            rows,
            chunks = chunks.len(),
            "opened feature store"
        );
        Ok(Self {
            path,
            store,
            schema: meta.schema,
            labels: meta.labels,
            sealed: meta.sealed,
            chunks,
            rows,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    /// Descriptive labels recorded by the producer.
    pub fn labels(&self) -> &StoreLabels {
        &self.labels
    }

    /// True once the producer run finished.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Rows recorded by the chunk directory.
    pub fn len(&self) -> u64 {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn chunk_spans(&self) -> &[ChunkSpan] {
        &self.chunks
    }

    /// Fail with `InconsistentLengths` unless every column holds the same
    /// number of rows as the chunk directory. Returns that row count.
    pub fn assert_consistent_lengths(&self) -> Result<u64, StoreError> {
        let rows = check_consistent_lengths(&self.store, &self.schema)?;
        if rows != self.rows {
            return Err(StoreError::InconsistentLengths {
                details: format!(
                    "store holds {rows} rows but was opened with {}",
                    self.rows
                ),
            });
        }
        Ok(rows)
    }

    /// Read one column (by name) or all columns over `[start, start + count)`.
    ///
    /// Omitted `start` is 0; omitted `count` reads to the end. Ranges are
    /// clamped to the store length.
    pub fn read(
        &self,
        column: Option<&str>,
        start: Option<u64>,
        count: Option<u64>,
    ) -> Result<ReadOutput, StoreError> {
        match column {
            Some(name) => {
                let column = self.schema.parse_column(name)?;
                Ok(ReadOutput::Column(self.read_column(column, start, count)?))
            }
            None => Ok(ReadOutput::All(self.read_all(start, count)?)),
        }
    }

    /// Read one column over a range.
    pub fn read_column(
        &self,
        column: Column,
        start: Option<u64>,
        count: Option<u64>,
    ) -> Result<ColumnValues, StoreError> {
        if !self.schema.columns().contains(&column) {
            return Err(StoreError::InvalidColumn(
                self.schema.column_name(column).to_string(),
            ));
        }
        let (start, end) = self.resolve_range(start, count);
        let mut values = self.fetch(&[column], start, end)?;
        values
            .pop()
            .ok_or_else(|| StoreError::Corrupt("column fetch returned nothing".into()))
    }

    /// Read every column over a range.
    pub fn read_all(&self, start: Option<u64>, count: Option<u64>) -> Result<ColumnMap, StoreError> {
        let (start, end) = self.resolve_range(start, count);
        let columns = self.schema.columns();
        let values = self.fetch(&columns, start, end)?;
        Ok(ColumnMap {
            columns: columns
                .into_iter()
                .map(|column| self.schema.column_name(column).to_string())
                .zip(values)
                .collect(),
        })
    }

    fn resolve_range(&self, start: Option<u64>, count: Option<u64>) -> (u64, u64) {
        let start = start.unwrap_or(0).min(self.rows);
        let end = match count {
            Some(count) => start.saturating_add(count).min(self.rows),
            None => self.rows,
        };
        (start, end)
    }

    /// Fetch `columns` over `[start, end)`, reading only overlapping chunks.
    fn fetch(&self, columns: &[Column], start: u64, end: u64) -> Result<Vec<ColumnValues>, StoreError> {
        let mut out: Vec<ColumnValues> = columns
            .iter()
            .map(|column| ColumnValues::empty_for(*column, &self.schema))
            .collect();
        if start >= end {
            return Ok(out);
        }

        let overlapping: Vec<(u64, ChunkSpan)> = self
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, span)| span.overlaps(start, end))
            .map(|(chunk_no, span)| (chunk_no as u64, *span))
            .collect();
        let keys: Vec<Vec<u8>> = overlapping
            .iter()
            .flat_map(|(chunk_no, _)| {
                columns
                    .iter()
                    .map(move |column| column_chunk_key(self.schema.column_name(*column), *chunk_no))
            })
            .collect();
        let key_refs: Vec<&[u8]> = keys.iter().map(|key| key.as_slice()).collect();
        let entries = self.store.batch_read(&key_refs)?;

        let width = self.schema.row_width();
        let mut entries = entries.into_iter();
        for (chunk_no, span) in &overlapping {
            let from = (start.max(span.start) - span.start) as usize;
            let to = (end.min(span.end()) - span.start) as usize;
            for (column, values) in columns.iter().zip(out.iter_mut()) {
                let name = self.schema.column_name(*column);
                let entry = entries.next().flatten().ok_or_else(|| {
                    StoreError::InconsistentLengths {
                        details: format!("column '{name}' is missing chunk {chunk_no}"),
                    }
                })?;
                let chunk = decode_chunk(entry.as_ref())?;
                let per_row = if *column == Column::Features { width } else { 1 };
                if chunk.value_count() != span.rows as usize * per_row {
                    return Err(StoreError::InconsistentLengths {
                        details: format!(
                            "column '{name}' chunk {chunk_no} holds {} values for {} rows",
                            chunk.value_count(),
                            span.rows
                        ),
                    });
                }
                values.extend_from_chunk(chunk, from, to, width)?;
            }
        }
        Ok(out)
    }
}
