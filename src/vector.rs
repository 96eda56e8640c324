//! The value object carried from ingestion through to a query hit.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::pointer::{self, encode_chunk_id};

/// A scalar metadata value attached to a vector. Metadata never leaves the
/// process boundary that produced it — it is not part of the chunk payload
/// written to the object store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Text(String),
    Integer(i64),
}

pub type Metadata = HashMap<String, MetadataValue>;

/// One embedding plus the identifiers that place it in the corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    pub values: Vec<f32>,
    pub document: u32,
    pub chunk: u32,
    pub offset: u32,
    pub metadata: Metadata,
}

impl Vector {
    pub fn new(
        values: Vec<f32>,
        document: u32,
        chunk: u32,
        offset: u32,
        metadata: Metadata,
    ) -> Self {
        Self {
            values,
            document,
            chunk,
            offset,
            metadata,
        }
    }

    /// Builds a vector from an already-decoded pointer, as the reader does
    /// after unpacking a chunk.
    pub fn from_pointer(id: i64, values: Vec<f32>, metadata: Metadata) -> Result<Self, AppError> {
        let (document, chunk, offset) = pointer::decode(id)?;
        Ok(Self::new(values, document, chunk, offset, metadata))
    }

    /// The packed 63-bit pointer this vector is addressed by in the index.
    pub fn id(&self) -> Result<i64, AppError> {
        pointer::encode(self.document, self.chunk, self.offset)
    }

    /// The chunk this vector's payload lives in.
    pub fn chunk_id(&self) -> u64 {
        encode_chunk_id(self.document, self.chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert(
            "source_file".to_string(),
            MetadataValue::Text("notes.txt".to_string()),
        );
        metadata.insert("text_index".to_string(), MetadataValue::Integer(3));
        metadata
    }

    #[test]
    fn id_matches_pointer_encode() {
        let v = Vector::new(vec![0.1, 0.2], 5, 2, 9, sample_metadata());
        assert_eq!(v.id().unwrap(), pointer::encode(5, 2, 9).unwrap());
    }

    #[test]
    fn chunk_id_matches_pointer_chunk_id_of() {
        let v = Vector::new(vec![0.1, 0.2], 5, 2, 9, sample_metadata());
        let id = v.id().unwrap();
        assert_eq!(v.chunk_id(), pointer::chunk_id_of(id).unwrap());
    }

    #[test]
    fn from_pointer_round_trips_fields() {
        let id = pointer::encode(5, 2, 9).unwrap();
        let v = Vector::from_pointer(id, vec![0.1], Metadata::new()).unwrap();
        assert_eq!((v.document, v.chunk, v.offset), (5, 2, 9));
    }
}
