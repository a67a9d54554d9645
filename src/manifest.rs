//! Catalogue of feature stores, persisted as JSON next to the stores it lists.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::constants::store::STORE_EXTENSION;
use crate::errors::StoreError;
use crate::padding::PadPosition;
use crate::schema::{FeatureMode, StoreSchema};
use crate::splits::SplitLabel;
use crate::store::FeatureStoreReader;
use crate::types::{CorpusId, FeatureKind};

/// Descriptive labels a producer records in a store's metadata.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    bitcode::Encode,
    bitcode::Decode,
)]
pub struct StoreLabels {
    pub split: Option<SplitLabel>,
    pub corpus: Option<CorpusId>,
    pub feature_kind: Option<FeatureKind>,
}

/// One catalogued store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreRecord {
    pub path: PathBuf,
    pub split: Option<SplitLabel>,
    pub corpus: Option<CorpusId>,
    pub feature_kind: Option<FeatureKind>,
    /// `None` for LIWC stores.
    pub pad_position: Option<PadPosition>,
    /// `None` for LIWC stores.
    pub max_len: Option<u32>,
    pub dim: u32,
    pub rows: u64,
    pub sealed: bool,
}

impl StoreRecord {
    /// Build a record from an open store.
    pub fn from_reader(reader: &FeatureStoreReader) -> Self {
        let labels = reader.labels();
        let (max_len, dim) = schema_dims(reader.schema());
        Self {
            path: reader.path().to_path_buf(),
            split: labels.split,
            corpus: labels.corpus.clone(),
            feature_kind: labels.feature_kind.clone(),
            pad_position: reader.schema().pad_position(),
            max_len,
            dim,
            rows: reader.len(),
            sealed: reader.is_sealed(),
        }
    }
}

fn schema_dims(schema: &StoreSchema) -> (Option<u32>, u32) {
    match schema.mode {
        FeatureMode::WordEmbedding { max_len, dim, .. } => (Some(max_len), dim),
        FeatureMode::Liwc { dim } => (None, dim),
    }
}

/// Filter for [`StoreManifest::find`]; `None` fields match anything.
#[derive(Clone, Debug, Default)]
pub struct StoreQuery {
    pub split: Option<SplitLabel>,
    pub corpus: Option<CorpusId>,
    pub feature_kind: Option<FeatureKind>,
    pub pad_position: Option<PadPosition>,
    pub max_len: Option<u32>,
    /// Skip stores whose producer never finished.
    pub sealed_only: bool,
}

impl StoreQuery {
    pub fn matches(&self, record: &StoreRecord) -> bool {
        fn field<T: PartialEq>(wanted: &Option<T>, actual: &Option<T>) -> bool {
            wanted.is_none() || wanted == actual
        }
        field(&self.split, &record.split)
            && field(&self.corpus, &record.corpus)
            && field(&self.feature_kind, &record.feature_kind)
            && field(&self.pad_position, &record.pad_position)
            && field(&self.max_len, &record.max_len)
            && (!self.sealed_only || record.sealed)
    }
}

/// Explicit list of stores and what each holds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreManifest {
    pub stores: Vec<StoreRecord>,
}

impl StoreManifest {
    /// Read a manifest written by [`StoreManifest::save`].
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let raw = fs::read(path)?;
        serde_json::from_slice(&raw).map_err(|err| {
            StoreError::Corrupt(format!("failed decoding manifest {}: {err}", path.display()))
        })
    }

    /// Write the manifest as pretty JSON, replacing any previous file.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let raw = serde_json::to_vec_pretty(self).map_err(|err| {
            StoreError::Configuration(format!("failed encoding manifest {}: {err}", path.display()))
        })?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, raw)?;
        fs::rename(&tmp_path, path)?;
        debug!(path = %path.display(), stores = self.stores.len(), "saved store manifest");
        Ok(())
    }

    /// Add `record`, replacing any record with the same path.
    pub fn register(&mut self, record: StoreRecord) {
        match self.stores.iter_mut().find(|existing| existing.path == record.path) {
            Some(existing) => *existing = record,
            None => self.stores.push(record),
        }
    }

    /// Records matching `query`, in manifest order.
    pub fn find<'a>(&'a self, query: &'a StoreQuery) -> impl Iterator<Item = &'a StoreRecord> + 'a {
        self.stores.iter().filter(move |record| query.matches(record))
    }

    /// Catalogue every readable `.fstore` file under `dir`.
    ///
    /// Stores that fail to open are logged and left out.
    pub fn scan(dir: &Path) -> Result<Self, StoreError> {
        if !dir.is_dir() {
            return Err(StoreError::Configuration(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        let mut paths = Vec::new();
        for entry in WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(ext) = entry.path().extension().and_then(|v| v.to_str()) else {
                continue;
            };
            if ext.eq_ignore_ascii_case(STORE_EXTENSION) {
                paths.push(entry.path().to_path_buf());
            }
        }
        paths.sort();

        let mut manifest = Self::default();
        for path in paths {
            match FeatureStoreReader::open(&path) {
                Ok(reader) => manifest.register(StoreRecord::from_reader(&reader)),
                Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable store"),
            }
        }
        info!(dir = %dir.display(), stores = manifest.stores.len(), "scanned feature stores");
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{FeatureBatch, RowFeatures};
    use crate::store::FeatureStoreWriter;
    use tempfile::tempdir;

    fn write_liwc(path: &Path, labels: StoreLabels, rows: u64, seal: bool) {
        let mut writer = FeatureStoreWriter::create(path, StoreSchema::liwc(2).unwrap())
            .unwrap()
            .with_labels(labels);
        let mut batch = FeatureBatch::new(vec![2], false);
        for idx in 0..rows {
            batch
                .push(idx, String::new(), "a".into(), 0, RowFeatures::vector(vec![1.0, 2.0]))
                .unwrap();
        }
        writer.append(&batch).unwrap();
        if seal {
            writer.finish().unwrap();
        }
    }

    fn labels(split: SplitLabel, corpus: &str) -> StoreLabels {
        StoreLabels {
            split: Some(split),
            corpus: Some(corpus.to_string()),
            feature_kind: Some("liwc".into()),
        }
    }

    #[test]
    fn scan_reads_labels_and_filters() {
        let dir = tempdir().unwrap();
        write_liwc(&dir.path().join("a.fstore"), labels(SplitLabel::Train, "reddit"), 3, true);
        fs::create_dir(dir.path().join("nested")).unwrap();
        write_liwc(
            &dir.path().join("nested/b.fstore"),
            labels(SplitLabel::Test, "reddit"),
            2,
            false,
        );
        fs::write(dir.path().join("notes.txt"), "not a store").unwrap();

        let manifest = StoreManifest::scan(dir.path()).unwrap();
        assert_eq!(manifest.stores.len(), 2);
        let train = StoreQuery {
            split: Some(SplitLabel::Train),
            ..StoreQuery::default()
        };
        let found: Vec<&StoreRecord> = manifest.find(&train).collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rows, 3);
        assert_eq!(found[0].dim, 2);
        assert_eq!(found[0].max_len, None);
        assert!(found[0].sealed);

        let sealed = StoreQuery {
            corpus: Some("reddit".into()),
            sealed_only: true,
            ..StoreQuery::default()
        };
        assert_eq!(manifest.find(&sealed).count(), 1);
    }

    #[test]
    fn save_load_and_register_replace_by_path() {
        let dir = tempdir().unwrap();
        let record = StoreRecord {
            path: PathBuf::from("x.fstore"),
            split: Some(SplitLabel::Validation),
            corpus: None,
            feature_kind: Some("glove_50".into()),
            pad_position: Some(PadPosition::Head),
            max_len: Some(256),
            dim: 50,
            rows: 10,
            sealed: true,
        };
        let mut manifest = StoreManifest::default();
        manifest.register(record.clone());
        manifest.register(StoreRecord {
            rows: 12,
            ..record.clone()
        });
        assert_eq!(manifest.stores.len(), 1);
        assert_eq!(manifest.stores[0].rows, 12);

        let path = dir.path().join("stores.json");
        manifest.save(&path).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"split\": \"val\""));
        assert_eq!(StoreManifest::load(&path).unwrap(), manifest);
    }

    #[test]
    fn scan_rejects_non_directories() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            StoreManifest::scan(&dir.path().join("missing")),
            Err(StoreError::Configuration(_))
        ));
    }
}
