use crate::constants::produce::{DEFAULT_MAX_LEN, DEFAULT_STEP_SIZE};
use crate::constants::splits::{DEFAULT_TRAIN_RATIO, DEFAULT_VAL_RATIO, SLICE_DROP_THRESHOLD};
use crate::errors::StoreError;
use crate::manifest::StoreLabels;

/// Controls how a producer run batches rows and labels the resulting store.
///
/// Padding width, pad position and text cleaning belong to the
/// [`FeatureGenerator`](crate::features::FeatureGenerator) and the store schema.
#[derive(Clone, Debug)]
pub struct ProduceConfig {
    /// Source rows processed (and persisted) per batch.
    pub step_size: usize,
    /// Descriptive labels recorded in the store metadata.
    pub labels: StoreLabels,
}

impl Default for ProduceConfig {
    fn default() -> Self {
        Self {
            step_size: DEFAULT_STEP_SIZE,
            labels: StoreLabels::default(),
        }
    }
}

impl ProduceConfig {
    /// Reject settings that cannot produce a store.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.step_size == 0 {
            return Err(StoreError::Configuration("step_size must be > 0".into()));
        }
        Ok(())
    }
}

/// Controls dataset construction before feature generation.
#[derive(Clone, Debug)]
pub struct SplitConfig {
    /// Fraction of each class assigned to train.
    pub train_ratio: f32,
    /// Fraction of the non-train remainder assigned to validation; the rest is test.
    pub val_ratio: f32,
    /// Seed for the shuffle preceding the split.
    pub seed: u64,
    /// Whitespace-token window used by long-text slicing.
    pub slice_len: usize,
    /// Trailing windows with at most this many tokens are dropped.
    pub slice_drop_threshold: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_ratio: DEFAULT_TRAIN_RATIO,
            val_ratio: DEFAULT_VAL_RATIO,
            seed: 42,
            slice_len: DEFAULT_MAX_LEN,
            slice_drop_threshold: SLICE_DROP_THRESHOLD,
        }
    }
}

impl SplitConfig {
    /// Reject ratios outside `[0, 1]` and zero-width slicing windows.
    pub fn validate(&self) -> Result<(), StoreError> {
        for (name, value) in [("train_ratio", self.train_ratio), ("val_ratio", self.val_ratio)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(StoreError::Configuration(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.slice_len == 0 {
            return Err(StoreError::Configuration("slice_len must be > 0".into()));
        }
        Ok(())
    }
}
