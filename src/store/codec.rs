//! Record layout and encoding shared by the store writer and reader.

use simd_r_drive::storage_engine::constants::{METADATA_SIZE, NULL_BYTE, PAYLOAD_ALIGNMENT};
use simd_r_drive::storage_engine::traits::DataStoreReader;
use simd_r_drive::storage_engine::{DataStore, EntryMetadata};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::constants::store::{
    BITCODE_PREFIX, CHUNK_DIR_KEY, CHUNK_DIR_RECORD_VERSION, CHUNK_RECORD_VERSION,
    COLUMN_CHUNK_PREFIX, COLUMN_LEN_PREFIX, META_KEY, STORE_VERSION,
};
use crate::data::FeatureBatch;
use crate::errors::StoreError;
use crate::manifest::StoreLabels;
use crate::schema::{Column, StoreSchema};

#[derive(Clone, Debug, PartialEq, bitcode::Encode, bitcode::Decode)]
/// Versioned header stored under the metadata key.
pub(crate) struct StoreMeta {
    pub version: u8,
    pub schema: StoreSchema,
    pub labels: StoreLabels,
    pub sealed: bool,
}

impl StoreMeta {
    pub fn new(schema: StoreSchema, labels: StoreLabels) -> Self {
        Self {
            version: STORE_VERSION,
            schema,
            labels,
            sealed: false,
        }
    }
}

/// Row span covered by one appended batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, bitcode::Encode, bitcode::Decode)]
pub struct ChunkSpan {
    /// First store row of the chunk.
    pub start: u64,
    /// Rows in the chunk (never zero).
    pub rows: u64,
}

impl ChunkSpan {
    /// One past the last store row of the chunk.
    pub fn end(&self) -> u64 {
        self.start + self.rows
    }

    /// True when the chunk shares at least one row with `[start, end)`.
    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        self.start < end && self.end() > start
    }
}

/// One column's values for one chunk, in their storage types.
#[derive(Clone, Debug, PartialEq, bitcode::Encode, bitcode::Decode)]
pub(crate) enum ColumnChunk {
    U64(Vec<u64>),
    U32(Vec<u32>),
    U8(Vec<u8>),
    Text(Vec<String>),
    F32(Vec<f32>),
}

impl ColumnChunk {
    /// Copy `column` out of `batch`.
    pub fn from_batch(batch: &FeatureBatch, column: Column) -> Result<Self, StoreError> {
        Ok(match column {
            Column::Idx => ColumnChunk::U64(batch.idx.clone()),
            Column::Date => ColumnChunk::Text(batch.date.clone()),
            Column::Name => ColumnChunk::Text(batch.name.clone()),
            Column::Label => ColumnChunk::U8(batch.label.clone()),
            Column::Length => ColumnChunk::U32(batch.length.clone().ok_or_else(|| {
                StoreError::SchemaMismatch {
                    expected: "a length column".into(),
                    found: "batch without lengths".into(),
                }
            })?),
            Column::Features => ColumnChunk::F32(batch.features.as_flat().to_vec()),
        })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ColumnChunk::U64(_) => "u64",
            ColumnChunk::U32(_) => "u32",
            ColumnChunk::U8(_) => "u8",
            ColumnChunk::Text(_) => "text",
            ColumnChunk::F32(_) => "f32",
        }
    }

    /// Number of values held (rows, or rows x width for features).
    pub fn value_count(&self) -> usize {
        match self {
            ColumnChunk::U64(values) => values.len(),
            ColumnChunk::U32(values) => values.len(),
            ColumnChunk::U8(values) => values.len(),
            ColumnChunk::Text(values) => values.len(),
            ColumnChunk::F32(values) => values.len(),
        }
    }
}

pub(crate) fn encode_meta(meta: &StoreMeta) -> Vec<u8> {
    encode_bitcode_payload(&bitcode::encode(meta))
}

pub(crate) fn decode_meta(bytes: &[u8]) -> Result<StoreMeta, StoreError> {
    let raw = decode_bitcode_payload(bytes)?;
    let meta: StoreMeta = bitcode::decode(raw)
        .map_err(|err| StoreError::Corrupt(format!("failed to decode store metadata: {err}")))?;
    if meta.version != STORE_VERSION {
        return Err(StoreError::Corrupt(format!(
            "store version mismatch (expected {}, found {})",
            STORE_VERSION, meta.version
        )));
    }
    Ok(meta)
}

pub(crate) fn encode_chunk_dir(chunks: &[ChunkSpan]) -> Vec<u8> {
    versioned(CHUNK_DIR_RECORD_VERSION, &bitcode::encode(&chunks.to_vec()))
}

pub(crate) fn decode_chunk_dir(bytes: &[u8]) -> Result<Vec<ChunkSpan>, StoreError> {
    let raw = unversioned(CHUNK_DIR_RECORD_VERSION, bytes, "chunk directory")?;
    bitcode::decode(raw)
        .map_err(|err| StoreError::Corrupt(format!("corrupt chunk directory: {err}")))
}

pub(crate) fn encode_chunk(chunk: &ColumnChunk) -> Vec<u8> {
    versioned(CHUNK_RECORD_VERSION, &bitcode::encode(chunk))
}

pub(crate) fn decode_chunk(bytes: &[u8]) -> Result<ColumnChunk, StoreError> {
    let raw = unversioned(CHUNK_RECORD_VERSION, bytes, "column chunk")?;
    bitcode::decode(raw).map_err(|err| StoreError::Corrupt(format!("corrupt column chunk: {err}")))
}

pub(crate) fn encode_row_count(rows: u64) -> [u8; 8] {
    rows.to_le_bytes()
}

pub(crate) fn decode_row_count(bytes: &[u8]) -> Result<u64, StoreError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Corrupt(format!("row count record has {} bytes", bytes.len())))?;
    Ok(u64::from_le_bytes(raw))
}

/// Key of the row-count record for `name`.
pub(crate) fn column_len_key(name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(COLUMN_LEN_PREFIX.len() + name.len());
    key.extend_from_slice(COLUMN_LEN_PREFIX);
    key.extend_from_slice(name.as_bytes());
    key
}

/// Key of chunk `chunk_no` of column `name`.
pub(crate) fn column_chunk_key(name: &str, chunk_no: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(COLUMN_CHUNK_PREFIX.len() + name.len() + 9);
    key.extend_from_slice(COLUMN_CHUNK_PREFIX);
    key.extend_from_slice(name.as_bytes());
    key.push(b':');
    key.extend_from_slice(&chunk_no.to_le_bytes());
    key
}

pub(crate) fn read_bytes(store: &DataStore, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
    Ok(store.read(key)?.map(|entry| entry.as_ref().to_vec()))
}

pub(crate) fn read_meta(store: &DataStore) -> Result<StoreMeta, StoreError> {
    let bytes = read_bytes(store, META_KEY)?
        .ok_or_else(|| StoreError::Corrupt("store metadata record missing".into()))?;
    decode_meta(&bytes)
}

pub(crate) fn read_chunk_dir(store: &DataStore) -> Result<Vec<ChunkSpan>, StoreError> {
    match read_bytes(store, CHUNK_DIR_KEY)? {
        Some(bytes) => decode_chunk_dir(&bytes),
        None => Ok(Vec::new()),
    }
}

/// Compare every column's recorded row count, the chunk directory total, and
/// the presence of every column chunk. Returns the agreed row count.
pub(crate) fn check_consistent_lengths(
    store: &DataStore,
    schema: &StoreSchema,
) -> Result<u64, StoreError> {
    let chunks = read_chunk_dir(store)?;
    let mut expected_start = 0_u64;
    for (chunk_no, span) in chunks.iter().enumerate() {
        if span.start != expected_start || span.rows == 0 {
            return Err(StoreError::InconsistentLengths {
                details: format!(
                    "chunk {chunk_no} spans [{}, {}) but rows so far total {expected_start}",
                    span.start,
                    span.end()
                ),
            });
        }
        expected_start = span.end();
    }
    let total = expected_start;

    let names: Vec<&'static str> = schema
        .columns()
        .into_iter()
        .map(|column| schema.column_name(column))
        .collect();
    let keys: Vec<Vec<u8>> = names.iter().map(|name| column_len_key(name)).collect();
    let key_refs: Vec<&[u8]> = keys.iter().map(|key| key.as_slice()).collect();
    let entries = store.batch_read(&key_refs)?;
    for (name, entry) in names.iter().zip(entries) {
        let rows = match entry {
            Some(bytes) => decode_row_count(bytes.as_ref())?,
            None => 0,
        };
        if rows != total {
            return Err(StoreError::InconsistentLengths {
                details: format!("column '{name}' has {rows} rows, chunk directory has {total}"),
            });
        }
    }

    for name in &names {
        for chunk_no in 0..chunks.len() as u64 {
            if !store.exists(&column_chunk_key(name, chunk_no))? {
                return Err(StoreError::InconsistentLengths {
                    details: format!("column '{name}' is missing chunk {chunk_no}"),
                });
            }
        }
    }
    Ok(total)
}

fn versioned(version: u8, encoded: &[u8]) -> Vec<u8> {
    let payload = encode_bitcode_payload(encoded);
    let mut buf = Vec::with_capacity(1 + payload.len());
    buf.push(version);
    buf.extend_from_slice(&payload);
    buf
}

fn unversioned<'a>(version: u8, bytes: &'a [u8], what: &str) -> Result<&'a [u8], StoreError> {
    match bytes.split_first() {
        Some((found, rest)) if *found == version => decode_bitcode_payload(rest),
        Some((found, _)) => Err(StoreError::Corrupt(format!(
            "{what} record version mismatch (expected {version}, found {found})"
        ))),
        None => Err(StoreError::Corrupt(format!("empty {what} record"))),
    }
}

fn encode_bitcode_payload(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + bytes.len());
    out.push(BITCODE_PREFIX);
    out.extend_from_slice(bytes);
    out
}

fn decode_bitcode_payload(bytes: &[u8]) -> Result<&[u8], StoreError> {
    match bytes.split_first() {
        Some((&BITCODE_PREFIX, rest)) => Ok(rest),
        _ => Err(StoreError::Corrupt(
            "bitcode payload missing expected prefix".into(),
        )),
    }
}

pub(crate) fn ensure_parent_dir(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Walk the entry chain backward from the end of the file, reading only.
///
/// `DataStore::open` truncates any tail that does not end a valid chain, so
/// a store must pass this before it is opened by a reader.
pub(crate) fn verify_entry_chain(path: &Path) -> Result<(), StoreError> {
    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let broken = |offset: u64| {
        StoreError::Corrupt(format!(
            "{}: entry chain of {file_len} bytes breaks at offset {offset}",
            path.display()
        ))
    };
    let meta_size = METADATA_SIZE as u64;
    if file_len < meta_size {
        return Err(broken(file_len));
    }

    let mut raw = [0_u8; METADATA_SIZE];
    let mut cursor = file_len;
    while cursor != 0 {
        if cursor < meta_size {
            return Err(broken(cursor));
        }
        let metadata_offset = cursor - meta_size;
        file.seek(SeekFrom::Start(metadata_offset))?;
        file.read_exact(&mut raw)?;
        let prev = EntryMetadata::deserialize(&raw).prev_offset;
        if prev >= metadata_offset {
            return Err(broken(metadata_offset));
        }
        let tombstone = metadata_offset - prev == 1 && read_byte(&mut file, prev)? == NULL_BYTE[0];
        let entry_start = if tombstone {
            prev
        } else {
            prev + (PAYLOAD_ALIGNMENT - prev % PAYLOAD_ALIGNMENT) % PAYLOAD_ALIGNMENT
        };
        if entry_start >= metadata_offset {
            return Err(broken(metadata_offset));
        }
        cursor = prev;
    }
    Ok(())
}

fn read_byte(file: &mut File, offset: u64) -> Result<u8, StoreError> {
    let mut byte = [0_u8; 1];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut byte)?;
    Ok(byte[0])
}
