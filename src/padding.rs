//! Fixed-width padding and truncation of token-embedding sequences.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::StoreError;

/// Where zero vectors are inserted to reach the padded width.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    bitcode::Encode,
    bitcode::Decode,
)]
#[serde(rename_all = "lowercase")]
pub enum PadPosition {
    /// Padding is prepended.
    Head,
    /// Padding is appended.
    #[default]
    Tail,
    /// Padding is divided between head and tail; an odd remainder goes to the tail.
    Split,
}

impl PadPosition {
    /// Lowercase name used in CLI flags and manifests.
    pub const fn as_str(&self) -> &'static str {
        match self {
            PadPosition::Head => "head",
            PadPosition::Tail => "tail",
            PadPosition::Split => "split",
        }
    }

    /// Number of zero rows placed before the real content for `padding` total rows.
    pub const fn head_padding(&self, padding: usize) -> usize {
        match self {
            PadPosition::Head => padding,
            PadPosition::Tail => 0,
            PadPosition::Split => padding / 2,
        }
    }
}

impl fmt::Display for PadPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PadPosition {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "head" => Ok(PadPosition::Head),
            "tail" => Ok(PadPosition::Tail),
            "split" => Ok(PadPosition::Split),
            other => Err(StoreError::Configuration(format!(
                "unknown pad position '{other}' (expected head, tail, or split)"
            ))),
        }
    }
}

/// A `(max_len, dim)` row-major matrix plus its pre-padding length.
#[derive(Clone, Debug, PartialEq)]
pub struct PaddedSequence {
    /// Flattened `max_len * dim` values.
    pub data: Vec<f32>,
    /// Number of real (non-padding) positions, never more than `max_len`.
    pub length: usize,
}

/// Pad or truncate `vectors` to exactly `max_len` rows of width `dim`.
///
/// Sequences longer than `max_len` keep their first `max_len` vectors and
/// report `length = max_len`.
pub fn pad_sequence(
    vectors: &[Vec<f32>],
    dim: usize,
    max_len: usize,
    position: PadPosition,
) -> Result<PaddedSequence, StoreError> {
    if let Some(bad) = vectors.iter().find(|vector| vector.len() != dim) {
        return Err(StoreError::SchemaMismatch {
            expected: format!("token vectors of width {dim}"),
            found: format!("token vector of width {}", bad.len()),
        });
    }
    let length = vectors.len().min(max_len);
    let head = position.head_padding(max_len - length);

    let mut data = vec![0.0_f32; max_len * dim];
    for (offset, vector) in vectors.iter().take(length).enumerate() {
        let row = head + offset;
        data[row * dim..(row + 1) * dim].copy_from_slice(vector);
    }
    Ok(PaddedSequence { data, length })
}

/// Inclusive `(start, end)` positions of real content inside a padded row.
///
/// Returns `None` for an empty or over-long `length`.
pub fn valid_span(length: usize, max_len: usize, position: PadPosition) -> Option<(usize, usize)> {
    if length == 0 || length > max_len {
        return None;
    }
    let start = position.head_padding(max_len - length);
    Some((start, start + length - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize, dim: usize) -> Vec<Vec<f32>> {
        (0..len)
            .map(|row| vec![(row + 1) as f32; dim])
            .collect()
    }

    fn row(padded: &PaddedSequence, dim: usize, idx: usize) -> &[f32] {
        &padded.data[idx * dim..(idx + 1) * dim]
    }

    #[test]
    fn head_padding_prefixes_zero_rows() {
        let padded = pad_sequence(&ramp(6, 3), 3, 10, PadPosition::Head).unwrap();
        assert_eq!(padded.length, 6);
        for idx in 0..4 {
            assert_eq!(row(&padded, 3, idx), &[0.0, 0.0, 0.0]);
        }
        for idx in 4..10 {
            assert_eq!(row(&padded, 3, idx), &[(idx - 3) as f32; 3]);
        }
        assert_eq!(valid_span(6, 10, PadPosition::Head), Some((4, 9)));
    }

    #[test]
    fn tail_padding_appends_zero_rows() {
        let padded = pad_sequence(&ramp(6, 2), 2, 10, PadPosition::Tail).unwrap();
        assert_eq!(row(&padded, 2, 0), &[1.0, 1.0]);
        assert_eq!(row(&padded, 2, 5), &[6.0, 6.0]);
        assert_eq!(row(&padded, 2, 6), &[0.0, 0.0]);
        assert_eq!(valid_span(6, 10, PadPosition::Tail), Some((0, 5)));
    }

    #[test]
    fn split_padding_centers_content() {
        let padded = pad_sequence(&ramp(6, 1), 1, 10, PadPosition::Split).unwrap();
        assert_eq!(
            padded.data,
            vec![0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 0.0, 0.0]
        );
        assert_eq!(valid_span(6, 10, PadPosition::Split), Some((2, 7)));
    }

    #[test]
    fn split_padding_puts_odd_remainder_at_tail() {
        let padded = pad_sequence(&ramp(7, 1), 1, 10, PadPosition::Split).unwrap();
        assert_eq!(
            padded.data,
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 0.0, 0.0]
        );
        assert_eq!(valid_span(7, 10, PadPosition::Split), Some((1, 7)));
        assert_eq!(valid_span(9, 10, PadPosition::Split), Some((0, 8)));
    }

    #[test]
    fn long_sequences_are_truncated_to_prefix() {
        let padded = pad_sequence(&ramp(15, 2), 2, 10, PadPosition::Head).unwrap();
        assert_eq!(padded.length, 10);
        assert_eq!(padded.data.len(), 20);
        assert_eq!(row(&padded, 2, 0), &[1.0, 1.0]);
        assert_eq!(row(&padded, 2, 9), &[10.0, 10.0]);
    }

    #[test]
    fn exact_width_is_unchanged() {
        let input = ramp(10, 2);
        for position in [PadPosition::Head, PadPosition::Tail, PadPosition::Split] {
            let padded = pad_sequence(&input, 2, 10, position).unwrap();
            assert_eq!(padded.length, 10);
            assert_eq!(padded.data, input.concat());
            assert_eq!(valid_span(10, 10, position), Some((0, 9)));
        }
    }

    #[test]
    fn mismatched_vector_width_is_rejected() {
        let err = pad_sequence(&[vec![1.0, 2.0], vec![1.0]], 2, 4, PadPosition::Tail).unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch { .. }));
    }

    #[test]
    fn empty_length_has_no_span() {
        assert_eq!(valid_span(0, 10, PadPosition::Tail), None);
        assert_eq!(valid_span(11, 10, PadPosition::Tail), None);
    }

    #[test]
    fn pad_position_parses_and_displays() {
        assert_eq!("HEAD".parse::<PadPosition>().unwrap(), PadPosition::Head);
        assert_eq!(" split ".parse::<PadPosition>().unwrap(), PadPosition::Split);
        assert_eq!(PadPosition::Tail.to_string(), "tail");
        assert!(matches!(
            "middle".parse::<PadPosition>(),
            Err(StoreError::Configuration(msg)) if msg.contains("middle")
        ));
    }
}
