/// Constants used by feature-store persistence and record encoding.
pub mod store {
    /// Key holding the versioned store metadata record.
    pub const META_KEY: &[u8] = b"__meta__";
    /// Key holding the chunk directory (row span of every appended batch).
    pub const CHUNK_DIR_KEY: &[u8] = b"chunks";
    /// Key prefix for per-column row-count records.
    pub const COLUMN_LEN_PREFIX: &[u8] = b"len:";
    /// Key prefix for per-column chunk payloads.
    pub const COLUMN_CHUNK_PREFIX: &[u8] = b"col:";
    /// Prefix marker for bitcode-encoded payloads.
    pub const BITCODE_PREFIX: u8 = b'B';
    /// Version tag for the store metadata record.
    pub const STORE_VERSION: u8 = 1;
    /// Version tag for column chunk records.
    pub const CHUNK_RECORD_VERSION: u8 = 1;
    /// Version tag for chunk directory records.
    pub const CHUNK_DIR_RECORD_VERSION: u8 = 1;
    /// Default file extension for feature stores.
    pub const STORE_EXTENSION: &str = "fstore";
}

/// Canonical column names.
pub mod columns {
    /// Original row position column.
    pub const IDX: &str = "idx";
    /// Date column (empty string = no date).
    pub const DATE: &str = "date";
    /// Source/author column.
    pub const NAME: &str = "name";
    /// Class label column.
    pub const LABEL: &str = "label";
    /// Pre-padding length column (word-embedding stores only).
    pub const LENGTH: &str = "length";
    /// Feature column name for word-embedding stores.
    pub const EMBEDDING: &str = "embedding";
    /// Feature column name for LIWC stores.
    pub const LIWC_VECTOR: &str = "liwc_vector";
}

/// Constants used by the producer pipeline.
pub mod produce {
    /// Default number of source rows processed per batch.
    pub const DEFAULT_STEP_SIZE: usize = 200;
    /// Default padded sequence width.
    pub const DEFAULT_MAX_LEN: usize = 256;
    /// Log message used when a row yields no features.
    pub const SKIP_EMPTY_MSG: &str = "skipping row without content";
}

/// Constants used by dataset construction.
pub mod splits {
    /// Windows at or under this many tokens are dropped when slicing long texts.
    pub const SLICE_DROP_THRESHOLD: usize = 20;
    /// Default fraction of each class assigned to train.
    pub const DEFAULT_TRAIN_RATIO: f32 = 0.8;
    /// Default fraction of the non-train remainder assigned to validation.
    pub const DEFAULT_VAL_RATIO: f32 = 0.4;
}

/// Constants used by text cleaning.
pub mod text {
    /// Replacement token used when URLs are kept as placeholders.
    pub const URL_PLACEHOLDER: &str = "URLHYPERLINK";

    /// English stop words removed before embedding lookup.
    pub const STOP_WORDS: &[&str] = &[
        "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're",
        "you've", "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him",
        "his", "himself", "she", "she's", "her", "hers", "herself", "it", "it's", "its",
        "itself", "they", "them", "their", "theirs", "themselves", "what", "which", "who",
        "whom", "this", "that", "that'll", "these", "those", "am", "is", "are", "was", "were",
        "be", "been", "being", "have", "has", "had", "having", "do", "does", "did", "doing",
        "a", "an", "the", "and", "but", "if", "or", "because", "as", "until", "while", "of",
        "at", "by", "for", "with", "about", "against", "between", "into", "through", "during",
        "before", "after", "above", "below", "to", "from", "up", "down", "in", "out", "on",
        "off", "over", "under", "again", "further", "then", "once", "here", "there", "when",
        "where", "why", "how", "all", "any", "both", "each", "few", "more", "most", "other",
        "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than", "too", "very",
        "s", "t", "can", "will", "just", "don", "don't", "should", "should've", "now", "d",
        "ll", "m", "o", "re", "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't",
        "didn", "didn't", "doesn", "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven",
        "haven't", "isn", "isn't", "ma", "mightn", "mightn't", "mustn", "mustn't", "needn",
        "needn't", "shan", "shan't", "shouldn", "shouldn't", "wasn", "wasn't", "weren",
        "weren't", "won", "won't", "wouldn", "wouldn't",
    ];
}

/// Constants used by the store manifest.
pub mod manifest {
    /// Default manifest filename placed next to a directory of stores.
    pub const DEFAULT_MANIFEST_FILENAME: &str = "stores.json";
}
