use std::sync::Arc;

use tempfile::tempdir;

use chunked_features::padding::valid_span;
use chunked_features::store::FeatureStoreReader;
use chunked_features::{
    ClassicalDataset, EmbeddingFeatures, FeatureGenerator, LiwcFeatures, PadPosition,
    ProduceConfig, SequenceWindows, SourceRow, SplitLabel, StoreError, StoreLabels,
    StoreManifest, StoreQuery, VectorTable, pad_sequence, produce_store, rebuild_excluding,
};

fn ramp(len: usize) -> Vec<Vec<f32>> {
    (0..len).map(|i| vec![i as f32 + 1.0, -(i as f32) - 1.0]).collect()
}

fn is_zero(row: &[f32]) -> bool {
    row.iter().all(|value| *value == 0.0)
}

fn text_row(idx: u64, text: &str, label: u8) -> SourceRow {
    SourceRow {
        idx,
        date: String::new(),
        text: text.to_string(),
        name: "stair_twitter".into(),
        label,
        scores: Vec::new(),
    }
}

fn liwc_row(idx: u64, label: u8) -> SourceRow {
    SourceRow {
        scores: vec![idx as f32, 1.0, 0.5],
        ..text_row(idx, "", label)
    }
}

#[test]
fn padding_boundaries_for_every_position() {
    let vectors = ramp(6);
    for (position, span) in [
        (PadPosition::Head, (4, 9)),
        (PadPosition::Tail, (0, 5)),
        (PadPosition::Split, (2, 7)),
    ] {
        let padded = pad_sequence(&vectors, 2, 10, position).unwrap();
        assert_eq!(padded.length, 6);
        assert_eq!(valid_span(6, 10, position), Some(span));
        let rows: Vec<&[f32]> = padded.data.chunks(2).collect();
        for (t, row) in rows.iter().enumerate() {
            if t < span.0 || t > span.1 {
                assert!(is_zero(row), "{position}: timestep {t} should be padding");
            } else {
                assert_eq!(row.to_vec(), vectors[t - span.0], "{position}: timestep {t}");
            }
        }
    }
}

#[test]
fn odd_split_remainder_goes_to_the_tail() {
    let padded = pad_sequence(&ramp(5), 2, 10, PadPosition::Split).unwrap();
    assert_eq!(valid_span(5, 10, PadPosition::Split), Some((2, 6)));
    let rows: Vec<&[f32]> = padded.data.chunks(2).collect();
    assert!(rows[..2].iter().all(|row| is_zero(row)));
    assert!(rows[7..].iter().all(|row| is_zero(row)));
}

#[test]
fn long_sequences_keep_their_first_vectors() {
    let vectors = ramp(15);
    let padded = pad_sequence(&vectors, 2, 10, PadPosition::Head).unwrap();
    assert_eq!(padded.length, 10);
    assert_eq!(padded.data[..2], vectors[0][..]);
    assert_eq!(padded.data[18..], vectors[9][..]);

    let mut table = VectorTable::new(1).unwrap();
    let words: Vec<String> = (0..15).map(|i| format!("word{i}")).collect();
    for (i, word) in words.iter().enumerate() {
        table.insert(word.clone(), &[i as f32 + 1.0]).unwrap();
    }
    let generator = EmbeddingFeatures::new(Arc::new(table), 10, PadPosition::Tail);
    let features = generator
        .generate(&text_row(0, &words.join(" "), 1))
        .unwrap()
        .unwrap();
    assert_eq!(features.length, Some(10));
    assert_eq!(features.values, (1..=10).map(|v| v as f32).collect::<Vec<_>>());
}

#[test]
fn sequence_windows_report_real_timesteps() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("seq.fstore");
    let mut table = VectorTable::new(2).unwrap();
    for word in ["alpha", "beta", "gamma", "delta"] {
        table.insert(word, &[1.0, 1.0]).unwrap();
    }
    let generator = EmbeddingFeatures::new(Arc::new(table), 6, PadPosition::Head);
    let rows = vec![
        text_row(0, "alpha", 1),
        text_row(1, "alpha beta gamma", 0),
        text_row(2, "alpha beta gamma delta alpha beta gamma", 1),
    ];
    let config = ProduceConfig {
        step_size: 2,
        ..ProduceConfig::default()
    };
    let schema = generator.schema().unwrap();
    produce_store(&rows, &generator, &path, schema, &config).unwrap();

    let reader = FeatureStoreReader::open(&path).unwrap();
    let batches: Vec<_> = SequenceWindows::new(&reader, 2)
        .unwrap()
        .collect::<Result<_, StoreError>>()
        .unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].lengths, vec![1, 3]);
    assert_eq!(batches[0].spans, vec![Some((5, 5)), Some((3, 5))]);
    assert_eq!(batches[1].spans, vec![Some((0, 5))]);
    assert_eq!(batches[1].idx, vec![2]);
    assert_eq!(batches[0].data.len(), 2 * 6 * 2);

    assert!(matches!(
        SequenceWindows::new(&reader, 0),
        Err(StoreError::Configuration(_))
    ));
}

#[test]
fn classical_dataset_and_rebuild_drop_listed_ids() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("liwc_train.fstore");
    let rows: Vec<SourceRow> = (0..30).map(|i| liwc_row(i, (i % 3 == 0) as u8)).collect();
    let config = ProduceConfig {
        step_size: 7,
        labels: StoreLabels {
            split: Some(SplitLabel::Train),
            corpus: Some("reddit".into()),
            feature_kind: Some("liwc".into()),
        },
        ..ProduceConfig::default()
    };
    let generator = LiwcFeatures::new(3);
    produce_store(&rows, &generator, &source, generator.schema().unwrap(), &config).unwrap();

    let destination = dir.path().join("liwc_train_clean.fstore");
    let report = rebuild_excluding(&source, &destination, &[3, 4, 20, 99], 5).unwrap();
    assert_eq!(report.rows_read, 30);
    assert_eq!(report.rows_written, 27);
    assert_eq!(report.not_found, vec![99]);

    let reader = FeatureStoreReader::open(&destination).unwrap();
    assert!(reader.is_sealed());
    let dataset = ClassicalDataset::load(&reader).unwrap();
    assert_eq!(dataset.rows(), 27);
    assert_eq!(dataset.width, 3);
    let expected: Vec<u64> = (0..30).filter(|i| ![3, 4, 20].contains(i)).collect();
    assert_eq!(dataset.idx, expected);
    assert_eq!(dataset.row(2).unwrap(), &[2.0, 1.0, 0.5]);
    assert_eq!(dataset.row(3).unwrap(), &[5.0, 1.0, 0.5]);
    assert_eq!(dataset.labels[3], 0);

    let manifest = StoreManifest::scan(dir.path()).unwrap();
    assert_eq!(manifest.stores.len(), 2);
    let query = StoreQuery {
        corpus: Some("reddit".into()),
        split: Some(SplitLabel::Train),
        sealed_only: true,
        ..StoreQuery::default()
    };
    let rows: Vec<u64> = manifest.find(&query).map(|record| record.rows).collect();
    assert_eq!(rows, vec![30, 27]);
}
