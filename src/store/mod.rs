//! Chunked feature store persistence.

mod codec;
pub mod reader;
pub mod rebuild;
pub mod writer;

pub use codec::ChunkSpan;
pub use reader::{ColumnMap, ColumnValues, FeatureStoreReader, ReadOutput};
pub use rebuild::{RebuildReport, rebuild_excluding};
pub use writer::{BatchAppend, BatchReport, FeatureStoreWriter, StoreSummary, produce_store};
