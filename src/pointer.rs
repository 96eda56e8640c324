//! 63-bit packed identifier shared by every vector in the index.
//!
//! Layout, most significant bits first:
//! `[ document: 27 bits | chunk: 20 bits | offset: 16 bits ]`

use crate::error::AppError;

pub const OFFSET_BITS: u32 = 16;
pub const CHUNK_BITS: u32 = 20;
pub const DOCUMENT_BITS: u32 = 27;

const OFFSET_MASK: u64 = (1u64 << OFFSET_BITS) - 1;
const CHUNK_MASK: u64 = (1u64 << CHUNK_BITS) - 1;
const DOCUMENT_MASK: u64 = (1u64 << DOCUMENT_BITS) - 1;

pub const MAX_OFFSET: u32 = OFFSET_MASK as u32;
pub const MAX_CHUNK: u32 = CHUNK_MASK as u32;
pub const MAX_DOCUMENT: u32 = DOCUMENT_MASK as u32;

/// Packs `(document, chunk, offset)` into a single 63-bit, non-negative `i64`.
pub fn encode(document: u32, chunk: u32, offset: u32) -> Result<i64, AppError> {
    if document > MAX_DOCUMENT {
        return Err(AppError::InvalidPointer(format!(
            "document {document} exceeds {DOCUMENT_BITS}-bit range"
        )));
    }
    if chunk > MAX_CHUNK {
        return Err(AppError::InvalidPointer(format!(
            "chunk {chunk} exceeds {CHUNK_BITS}-bit range"
        )));
    }
    if offset > MAX_OFFSET {
        return Err(AppError::InvalidPointer(format!(
            "offset {offset} exceeds {OFFSET_BITS}-bit range"
        )));
    }
    let packed = ((document as u64) << (CHUNK_BITS + OFFSET_BITS))
        | ((chunk as u64) << OFFSET_BITS)
        | (offset as u64);
    Ok(packed as i64)
}

/// Splits a packed pointer back into `(document, chunk, offset)`.
pub fn decode(id: i64) -> Result<(u32, u32, u32), AppError> {
    if id < 0 {
        return Err(AppError::InvalidPointer(format!(
            "pointer {id} is negative"
        )));
    }
    let id = id as u64;
    let offset = (id & OFFSET_MASK) as u32;
    let chunk = ((id >> OFFSET_BITS) & CHUNK_MASK) as u32;
    let document = (id >> (CHUNK_BITS + OFFSET_BITS)) as u32;
    if document > MAX_DOCUMENT {
        return Err(AppError::InvalidPointer(format!(
            "pointer {id} carries bits above the {DOCUMENT_BITS}-bit document field"
        )));
    }
    Ok((document, chunk, offset))
}

/// Derives the chunk identifier (`document << CHUNK_BITS | chunk`) a pointer
/// belongs to, without needing the offset.
pub fn chunk_id_of(id: i64) -> Result<u64, AppError> {
    let (document, chunk, _offset) = decode(id)?;
    Ok(encode_chunk_id(document, chunk))
}

/// Packs `(document, chunk)` into the 47-bit chunk identifier used as the
/// object-store and cache key.
pub fn encode_chunk_id(document: u32, chunk: u32) -> u64 {
    ((document as u64) << CHUNK_BITS) | (chunk as u64)
}

/// Splits a chunk identifier back into `(document, chunk)`.
pub fn decode_chunk_id(chunk_id: u64) -> (u32, u32) {
    let chunk = (chunk_id & CHUNK_MASK) as u32;
    let document = (chunk_id >> CHUNK_BITS) as u32;
    (document, chunk)
}
