//! Tree-structured binary cells and their bag-of-cells wire form.
//!
//! A cell holds up to [`MAX_BITS`] bits of payload and up to [`MAX_REFS`]
//! references to child cells. Cells are built with a [`CellBuilder`],
//! become immutable once [`CellBuilder::end_cell`] is called, and are read
//! back with a [`CellSlice`].
//!
//! # Bit Order Convention
//!
//! - **Within a byte**: MSB-first (bit 0 of the cell is the high bit of byte 0)
//! - **Integers**: big-endian
//! - **Trailing bits**: when the bit length is not a multiple of 8, the last
//!   byte is completed with a single `1` bit followed by zeros

mod boc;
mod builder;
mod slice;

pub use builder::CellBuilder;
pub use slice::CellSlice;

use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Payload capacity of one cell in bits.
pub const MAX_BITS: usize = 1023;

/// Maximum number of child references per cell.
pub const MAX_REFS: usize = 4;

/// Deepest cell tree the chain accepts.
pub const MAX_DEPTH: u16 = 1024;

/// Errors raised while building, reading or (de)serializing cells.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CellError {
    /// A write would exceed the cell's payload capacity.
    #[error("cell overflow: attempted to write {attempted} bits, only {available} available")]
    BitOverflow { attempted: usize, available: usize },

    /// A fifth reference was stored.
    #[error("cell overflow: a cell holds at most {MAX_REFS} references")]
    RefOverflow,

    /// Storing the reference would make the tree deeper than [`MAX_DEPTH`].
    #[error("cell overflow: tree depth {depth} exceeds {MAX_DEPTH}")]
    DepthOverflow { depth: usize },

    /// The value has bits set above the requested width.
    #[error("value {value} does not fit in {bits} bits")]
    ValueOutOfRange { value: u128, bits: usize },

    /// Bit width exceeds maximum (64 bits).
    #[error("bit width {0} exceeds maximum of 64")]
    InvalidBitWidth(usize),

    /// A read past the end of the payload.
    #[error("cell underflow: attempted to read {attempted} bits, only {available} available")]
    Underflow { attempted: usize, available: usize },

    #[error("cell underflow: no references left")]
    RefUnderflow,

    #[error("string data is not valid UTF-8")]
    InvalidUtf8,

    #[error("unsupported address tag {0:#04b}")]
    UnsupportedAddress(u8),

    #[error("malformed bag of cells: {0}")]
    MalformedBoc(&'static str),

    #[error("bag of cells checksum mismatch: expected {expected:#010x}, found {found:#010x}")]
    ChecksumMismatch { expected: u32, found: u32 },

    #[error("invalid base64: {0}")]
    Base64(String),
}

/// Result type for cell operations.
pub type CellResult<T> = Result<T, CellError>;

/// A finalized, immutable cell.
#[derive(Clone, PartialEq, Eq)]
pub struct Cell {
    /// Payload bytes; bits past `bit_len` are zero.
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<Arc<Cell>>,
    hash: [u8; 32],
    depth: u16,
}

impl Cell {
    /// Finalize raw parts into a cell. Callers guarantee the capacity limits.
    pub(crate) fn new(data: Vec<u8>, bit_len: usize, refs: Vec<Arc<Cell>>) -> Self {
        debug_assert!(bit_len <= MAX_BITS && refs.len() <= MAX_REFS);
        debug_assert_eq!(data.len(), bit_len.div_ceil(8));

        let depth = refs
            .iter()
            .map(|r| r.depth.saturating_add(1))
            .max()
            .unwrap_or(0);

        let mut cell = Self {
            data,
            bit_len,
            refs,
            hash: [0u8; 32],
            depth,
        };
        cell.hash = cell.compute_hash();
        cell
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), 0, Vec::new())
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Payload bytes with unused trailing bits zeroed.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn references(&self) -> &[Arc<Cell>] {
        &self.refs
    }

    /// Longest path to a leaf, 0 for a cell without references.
    pub fn depth(&self) -> u16 {
        self.depth
    }

    /// Representation hash (SHA-256 of descriptors, padded data, child depths
    /// and child hashes).
    pub fn hash(&self) -> [u8; 32] {
        self.hash
    }

    /// Start reading this cell from its first bit and first reference.
    pub fn parse(&self) -> CellSlice<'_> {
        CellSlice::new(self)
    }

    /// First descriptor byte: reference count (ordinary, level 0 cells only).
    pub(crate) fn refs_descriptor(&self) -> u8 {
        self.refs.len() as u8
    }

    /// Second descriptor byte: floor(bits / 8) + ceil(bits / 8).
    pub(crate) fn bits_descriptor(&self) -> u8 {
        (self.bit_len / 8 + self.bit_len.div_ceil(8)) as u8
    }

    /// Payload with the completion tag applied to a partial last byte.
    pub(crate) fn padded_data(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        let rem = self.bit_len % 8;
        if rem != 0 {
            if let Some(last) = out.last_mut() {
                *last |= 0x80 >> rem;
            }
        }
        out
    }

    fn compute_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update([self.refs_descriptor(), self.bits_descriptor()]);
        hasher.update(self.padded_data());
        for r in &self.refs {
            hasher.update(r.depth.to_be_bytes());
        }
        for r in &self.refs {
            hasher.update(r.hash);
        }
        hasher.finalize().into()
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{{{}", hex::encode_upper(&self.data))?;
        if self.bit_len % 8 != 0 {
            write!(f, "/{}", self.bit_len)?;
        }
        write!(f, "}}")?;
        if !self.refs.is_empty() {
            f.debug_list().entries(self.refs.iter()).finish()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cell_hash() {
        // Well-known representation hash of the empty ordinary cell.
        assert_eq!(
            hex::encode(Cell::empty().hash()),
            "96a296d224f285c67bee93c30f8a309157f0daa35dc5b87e410b78630a09cfc7"
        );
    }

    #[test]
    fn test_depth_follows_longest_branch() {
        let leaf = CellBuilder::new().end_cell();
        let mut mid = CellBuilder::new();
        mid.store_ref(leaf.clone()).unwrap();
        let mid = mid.end_cell();

        let mut root = CellBuilder::new();
        root.store_ref(leaf).unwrap().store_ref(mid).unwrap();
        let root = root.end_cell();

        assert_eq!(root.depth(), 2);
        assert_eq!(root.references().len(), 2);
    }

    #[test]
    fn test_padding_sets_completion_bit() {
        let mut b = CellBuilder::new();
        b.store_uint(0b101, 3).unwrap();
        let cell = b.end_cell();
        assert_eq!(cell.data(), &[0b1010_0000]);
        assert_eq!(cell.padded_data(), vec![0b1011_0000]);
        assert_eq!(cell.bits_descriptor(), 1);
    }

    #[test]
    fn test_depth_is_capped_at_store_ref() {
        let mut cell = Cell::empty();
        for _ in 0..MAX_DEPTH {
            let mut b = CellBuilder::new();
            b.store_ref(cell).unwrap();
            cell = b.end_cell();
        }
        assert_eq!(cell.depth(), MAX_DEPTH);

        let mut b = CellBuilder::new();
        assert_eq!(
            b.store_ref(cell).unwrap_err(),
            CellError::DepthOverflow {
                depth: MAX_DEPTH as usize + 1
            }
        );
        assert!(b.end_cell().references().is_empty());
    }
}
