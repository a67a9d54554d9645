/// Original row position in the source table (may have gaps in a store).
/// Example: `3565`
pub type RowIdx = u64;
/// Binary class label (`0` = general population, `1` = target class).
pub type Label = u8;
/// Pre-padding token count of a word-embedding row.
pub type SeqLen = u32;
/// Source or author identifier.
/// Examples: `stair_twitter`, `kimveer_gill`
pub type SourceName = String;
/// Date text as stored; empty string means "no date".
/// Examples: `2019-03-14`, ``
pub type DateText = String;
/// Corpus identifier used in the store manifest.
/// Examples: `sliced_stair_twitter`, `shooter_hold_out`
pub type CorpusId = String;
/// Name of a feature backend used in the store manifest.
/// Examples: `glove_50`, `fasttext_300`, `liwc`
pub type FeatureKind = String;
/// Single cleaned token.
pub type Token = String;
