//! Fixed-width element encoding for persisted key buffers.
//!
//! Every stored buffer holds one or more generations of a single element kind
//! laid end to end: `gen_0 | gen_1 | ... | gen_n`. The kind carries its own
//! width, so a buffer can only be sliced with the stride it was written with.

use crate::constants::KEY_SIZE;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("{kind} buffer of {len} bytes is not a multiple of {width}")]
    MisalignedBuffer {
        kind: ElementKind,
        len: usize,
        width: usize,
    },

    #[error("{kind} element must be {expected} bytes, got {actual}")]
    InvalidElementSize {
        kind: ElementKind,
        expected: usize,
        actual: usize,
    },
}

/// What a stored element encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// A secret scalar, little-endian, reduced mod the group order.
    Scalar,
    /// A compressed curve point.
    Point,
    /// A 32-byte digest of a public key.
    Hash,
}

impl ElementKind {
    pub fn width(self) -> usize {
        match self {
            ElementKind::Scalar => KEY_SIZE,
            ElementKind::Point => KEY_SIZE,
            ElementKind::Hash => KEY_SIZE,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Scalar => f.write_str("scalar"),
            ElementKind::Point => f.write_str("point"),
            ElementKind::Hash => f.write_str("hash"),
        }
    }
}

/// Slice a stored buffer into its generations.
///
/// An empty buffer yields no generations.
pub fn split_generations(kind: ElementKind, buf: &[u8]) -> Result<Vec<[u8; KEY_SIZE]>, EncodingError> {
    let width = kind.width();
    if buf.len() % width != 0 {
        return Err(EncodingError::MisalignedBuffer {
            kind,
            len: buf.len(),
            width,
        });
    }
    Ok(buf
        .chunks_exact(width)
        .map(|chunk| {
            let mut arr = [0u8; KEY_SIZE];
            arr.copy_from_slice(chunk);
            arr
        })
        .collect())
}

/// Number of generations held by a stored buffer.
pub fn generation_count(kind: ElementKind, buf: &[u8]) -> Result<usize, EncodingError> {
    let width = kind.width();
    if buf.len() % width != 0 {
        return Err(EncodingError::MisalignedBuffer {
            kind,
            len: buf.len(),
            width,
        });
    }
    Ok(buf.len() / width)
}

/// Append one element to a stored buffer, returning the new buffer.
pub fn append_generation(kind: ElementKind, buf: &[u8], element: &[u8]) -> Result<Vec<u8>, EncodingError> {
    let width = kind.width();
    if element.len() != width {
        return Err(EncodingError::InvalidElementSize {
            kind,
            expected: width,
            actual: element.len(),
        });
    }
    generation_count(kind, buf)?;
    let mut out = Vec::with_capacity(buf.len() + width);
    out.extend_from_slice(buf);
    out.extend_from_slice(element);
    Ok(out)
}
