use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use crate::errors::StoreError;
use crate::types::Token;

/// Maps cleaned tokens to fixed-width vectors.
pub trait TokenEmbedder: Send + Sync {
    /// Width of every produced vector.
    fn dim(&self) -> usize;
    /// One vector per token, in token order.
    fn embed(&self, tokens: &[Token]) -> Vec<Vec<f32>>;
}

/// Pretrained token-vector table (GloVe / fastText text format).
///
/// Unknown tokens fall back to their lower-cased form and then to a zero vector.
#[derive(Clone, Debug)]
pub struct VectorTable {
    dim: usize,
    index: HashMap<Token, usize>,
    values: Vec<f32>,
}

impl VectorTable {
    /// Create an empty table of width `dim`.
    pub fn new(dim: usize) -> Result<Self, StoreError> {
        if dim == 0 {
            return Err(StoreError::Configuration(
                "vector table dim must be non-zero".into(),
            ));
        }
        Ok(Self {
            dim,
            index: HashMap::new(),
            values: Vec::new(),
        })
    }

    /// Insert or replace the vector for `token`.
    pub fn insert(&mut self, token: impl Into<Token>, vector: &[f32]) -> Result<(), StoreError> {
        if vector.len() != self.dim {
            return Err(StoreError::SchemaMismatch {
                expected: format!("vectors of width {}", self.dim),
                found: format!("vector of width {}", vector.len()),
            });
        }
        let token = token.into();
        match self.index.get(&token) {
            Some(&slot) => {
                self.values[slot * self.dim..(slot + 1) * self.dim].copy_from_slice(vector);
            }
            None => {
                self.index.insert(token, self.index.len());
                self.values.extend_from_slice(vector);
            }
        }
        Ok(())
    }

    /// Load a whitespace-separated `token v1 .. vd` file.
    pub fn load_text(path: &Path) -> Result<Self, StoreError> {
        let file = File::open(path)?;
        let table = Self::from_reader(BufReader::new(file))?;
        debug!(
            path = %path.display(),
            tokens = table.len(),
            dim = table.dim,
            "loaded vector table"
        );
        Ok(table)
    }

    /// Parse the text format from any buffered reader.
    ///
    /// The width is taken from the first vector line; a leading fastText
    /// `count dim` header line is skipped.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, StoreError> {
        let mut table: Option<VectorTable> = None;
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let mut parts = line.split_whitespace();
            let Some(token) = parts.next() else {
                continue;
            };
            let values = parts
                .map(str::parse::<f32>)
                .collect::<Result<Vec<f32>, _>>()
                .map_err(|err| StoreError::Input(format!("vector line {}: {err}", line_no + 1)))?;
            if line_no == 0 && values.len() == 1 && token.parse::<u64>().is_ok() {
                continue;
            }
            if table.is_none() {
                table = Some(VectorTable::new(values.len())?);
            }
            if let Some(table) = table.as_mut() {
                table.insert(token, &values)?;
            }
        }
        table.ok_or_else(|| StoreError::Input("vector table contains no vectors".into()))
    }

    /// Number of known tokens.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Vector for `token`, trying its lower-cased form when the exact token is unknown.
    pub fn lookup(&self, token: &str) -> Option<&[f32]> {
        let slot = match self.index.get(token) {
            Some(slot) => *slot,
            None => *self.index.get(&token.to_lowercase())?,
        };
        Some(&self.values[slot * self.dim..(slot + 1) * self.dim])
    }
}

impl TokenEmbedder for VectorTable {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, tokens: &[Token]) -> Vec<Vec<f32>> {
        tokens
            .iter()
            .map(|token| match self.lookup(token) {
                Some(vector) => vector.to_vec(),
                None => vec![0.0; self.dim],
            })
            .collect()
    }
}
