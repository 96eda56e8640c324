//! Binary encoding for a chunk blob, as written to and read from the object
//! store. Metadata never round-trips through this format — it is rebuilt by
//! the writer from the source document and is not part of the wire payload.
//!
//! Wire layout, little-endian throughout, fixed 16-byte header:
//! `magic(4)@0, version:u8@4, reserved:u8[3]@5, count:u32@8, dim:u32@12`,
//! followed by `count * dim` float32s. A vector's row position in that
//! payload *is* its offset — there is no separate offset table.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

use crate::error::AppError;
use crate::vector::{Metadata, Vector};

const MAGIC: [u8; 4] = *b"MVCK";
const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 16;

/// A chunk's payload: every vector's embedding, in offset order.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub dimension: u32,
    pub values: Vec<f32>,
}

impl Chunk {
    /// Builds a chunk from vectors already in ascending-offset order, as the
    /// writer produces them.
    pub fn from_vectors(dimension: u32, vectors: &[Vector]) -> Self {
        let mut values = Vec::with_capacity(vectors.len() * dimension as usize);
        for v in vectors {
            values.extend_from_slice(&v.values);
        }
        Self { dimension, values }
    }

    pub fn count(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.values.len() / self.dimension as usize
        }
    }

    /// Serializes the header and payload into the wire format stored under
    /// the object store's `chunks/<chunk_id>.bin` key.
    pub fn pack(&self) -> Result<Vec<u8>, AppError> {
        if self.dimension == 0 || self.values.len() % self.dimension as usize != 0 {
            return Err(AppError::InvalidVector(format!(
                "chunk payload of {} values is not a multiple of dimension {}",
                self.values.len(),
                self.dimension
            )));
        }
        let mut buf = Vec::with_capacity(HEADER_LEN + self.values.len() * 4);
        buf.write_all(&MAGIC)?;
        buf.write_u8(FORMAT_VERSION)?;
        buf.write_all(&[0u8; 3])?; // reserved
        buf.write_u32::<LittleEndian>(self.count() as u32)?;
        buf.write_u32::<LittleEndian>(self.dimension)?;
        for value in &self.values {
            buf.write_f32::<LittleEndian>(*value)?;
        }
        Ok(buf)
    }

    /// Parses a blob previously produced by [`Chunk::pack`].
    pub fn unpack(bytes: &[u8]) -> Result<Self, AppError> {
        if bytes.len() < HEADER_LEN {
            return Err(AppError::ChunkCorrupt(0, "truncated header".to_string()));
        }
        let mut cursor = Cursor::new(bytes);

        let mut magic = [0u8; 4];
        cursor
            .read_exact(&mut magic)
            .map_err(|e| AppError::ChunkCorrupt(0, format!("truncated header: {e}")))?;
        if magic != MAGIC {
            return Err(AppError::ChunkCorrupt(0, "bad magic".to_string()));
        }

        let version = cursor
            .read_u8()
            .map_err(|e| AppError::ChunkCorrupt(0, e.to_string()))?;
        if version != FORMAT_VERSION {
            return Err(AppError::ChunkCorrupt(
                0,
                format!("unsupported format version {version}"),
            ));
        }
        let mut reserved = [0u8; 3];
        cursor
            .read_exact(&mut reserved)
            .map_err(|e| AppError::ChunkCorrupt(0, e.to_string()))?;

        let count = cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| AppError::ChunkCorrupt(0, e.to_string()))? as usize;
        let dimension = cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| AppError::ChunkCorrupt(0, e.to_string()))?;

        let mut values = Vec::with_capacity(count * dimension as usize);
        for _ in 0..count * dimension as usize {
            let value = cursor
                .read_f32::<LittleEndian>()
                .map_err(|e| AppError::ChunkCorrupt(0, format!("truncated payload: {e}")))?;
            values.push(value);
        }

        Ok(Self { dimension, values })
    }

    /// Reconstructs the vectors this chunk holds — row position is the
    /// offset — attaching empty metadata, since metadata is not part of the
    /// wire format.
    pub fn to_vectors(&self, document: u32, chunk: u32) -> Vec<Vector> {
        (0..self.count())
            .map(|offset| {
                let start = offset * self.dimension as usize;
                let end = start + self.dimension as usize;
                Vector::new(
                    self.values[start..end].to_vec(),
                    document,
                    chunk,
                    offset as u32,
                    Metadata::new(),
                )
            })
            .collect()
    }
}
