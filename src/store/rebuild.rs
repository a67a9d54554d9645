use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::data::{FeatureBatch, RowFeatures};
use crate::errors::StoreError;
use crate::schema::Column;
use crate::store::reader::FeatureStoreReader;
use crate::store::writer::FeatureStoreWriter;
use crate::types::RowIdx;

/// Outcome of [`rebuild_excluding`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RebuildReport {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Rows read from the source.
    pub rows_read: u64,
    /// Rows copied into the destination.
    pub rows_written: u64,
    /// Excluded `idx` values that were present in the source.
    pub removed: Vec<RowIdx>,
    /// Excluded `idx` values the source never held.
    pub not_found: Vec<RowIdx>,
}

/// Copy `source` into a new sealed store at `destination`, leaving out every
/// row whose `idx` is in `exclude`. The source is streamed `step_size` rows at
/// a time and must pass the column consistency check first.
pub fn rebuild_excluding(
    source: &Path,
    destination: &Path,
    exclude: &[RowIdx],
    step_size: usize,
) -> Result<RebuildReport, StoreError> {
    if step_size == 0 {
        return Err(StoreError::Configuration("step_size must be > 0".into()));
    }
    if source == destination {
        return Err(StoreError::Configuration(
            "rebuild destination must differ from its source".into(),
        ));
    }
    let reader = FeatureStoreReader::open(source)?;
    let total = reader.assert_consistent_lengths()?;
    let schema = *reader.schema();
    let mut writer =
        FeatureStoreWriter::create(destination, schema)?.with_labels(reader.labels().clone());

    let exclude: HashSet<RowIdx> = exclude.iter().copied().collect();
    let mut removed = Vec::new();
    let mut start = 0_u64;
    while start < total {
        let mut columns = reader.read_all(Some(start), Some(step_size as u64))?;
        let window = columns.rows() as u64;
        let mut take = |column: Column| {
            columns
                .take(schema.column_name(column))
                .ok_or_else(|| StoreError::Corrupt(format!("column {column:?} missing from read")))
        };
        let idx = take(Column::Idx)?.into_ints()?;
        let date = take(Column::Date)?.into_strings()?;
        let name = take(Column::Name)?.into_strings()?;
        let label = take(Column::Label)?.into_ints()?;
        let features = take(Column::Features)?.into_features()?;
        let length = if schema.has_length() {
            Some(take(Column::Length)?.into_ints()?)
        } else {
            None
        };

        let mut batch = FeatureBatch::new(schema.row_shape(), schema.has_length());
        for (pos, row) in features.rows().enumerate() {
            let row_idx = to_unsigned(idx[pos], "idx")?;
            if exclude.contains(&row_idx) {
                removed.push(row_idx);
                continue;
            }
            let row_features = RowFeatures {
                values: row.to_vec(),
                length: match &length {
                    Some(lengths) => Some(to_unsigned(lengths[pos], "length")?),
                    None => None,
                },
            };
            batch.push(
                row_idx,
                date[pos].clone(),
                name[pos].clone(),
                to_unsigned(label[pos], "label")?,
                row_features,
            )?;
        }
        writer.append(&batch)?;
        start += window.max(1);
    }

    let summary = writer.finish()?;
    let found: HashSet<RowIdx> = removed.iter().copied().collect();
    let mut not_found: Vec<RowIdx> = exclude.difference(&found).copied().collect();
    not_found.sort_unstable();
    info!(
        source = %source.display(),
        destination = %destination.display(),
        rows_read = total,
        rows_written = summary.rows,
        removed = removed.len(),
        not_found = not_found.len(),
        "rebuilt feature store"
    );
    Ok(RebuildReport {
        source: source.to_path_buf(),
        destination: destination.to_path_buf(),
        rows_read: total,
        rows_written: summary.rows,
        removed,
        not_found,
    })
}

fn to_unsigned<T: TryFrom<i64>>(value: i64, column: &str) -> Result<T, StoreError> {
    T::try_from(value)
        .map_err(|_| StoreError::Corrupt(format!("{column} value {value} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StoreSchema;
    use tempfile::tempdir;

    #[test]
    fn rebuild_rejects_in_place_and_zero_step() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.fstore");
        assert!(matches!(
            rebuild_excluding(&path, &path, &[], 10),
            Err(StoreError::Configuration(_))
        ));
        assert!(matches!(
            rebuild_excluding(&path, &dir.path().join("b.fstore"), &[], 0),
            Err(StoreError::Configuration(_))
        ));
    }

    #[test]
    fn rebuild_of_missing_source_reports_it() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            rebuild_excluding(
                &dir.path().join("missing.fstore"),
                &dir.path().join("out.fstore"),
                &[1],
                10
            ),
            Err(StoreError::StoreMissing(_))
        ));
    }

    #[test]
    fn rebuild_reports_unknown_ids() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src.fstore");
        let mut writer = FeatureStoreWriter::create(&source, StoreSchema::liwc(1).unwrap()).unwrap();
        let mut batch = FeatureBatch::new(vec![1], false);
        for idx in [2_u64, 5, 9] {
            batch
                .push(idx, String::new(), "a".into(), 0, RowFeatures::vector(vec![idx as f32]))
                .unwrap();
        }
        writer.append(&batch).unwrap();
        writer.finish().unwrap();

        let destination = dir.path().join("out.fstore");
        let report = rebuild_excluding(&source, &destination, &[5, 7, 100, 7], 2).unwrap();
        assert_eq!(report.rows_read, 3);
        assert_eq!(report.rows_written, 2);
        assert_eq!(report.removed, vec![5]);
        assert_eq!(report.not_found, vec![7, 100]);
    }
}
