//! Bag-of-cells serialization.
//!
//! Layout (all integers big-endian unless noted):
//!
//! ```text
//! magic        u32   0xb5ee9c72
//! flags        u8    has_idx:1 has_crc32c:1 has_cache_bits:1 flags:2 size_bytes:3
//! off_bytes    u8
//! cells        size_bytes
//! roots        size_bytes
//! absent       size_bytes
//! tot_size     off_bytes
//! root_index   size_bytes * roots
//! index        off_bytes * cells          (only if has_idx)
//! cell data    d1 d2 data ref_index*      (per cell)
//! crc32c       u32 little-endian          (only if has_crc32c)
//! ```
//!
//! Cells are ordered so that every reference points to a later index,
//! root first, children depth-first in reference order.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{Cell, CellError, CellResult, MAX_BITS, MAX_DEPTH, MAX_REFS};

const BOC_MAGIC: u32 = 0xb5ee_9c72;

const FLAG_HAS_IDX: u8 = 0x80;
const FLAG_HAS_CRC32C: u8 = 0x40;

/// CRC-32C (Castagnoli), reflected, as used for the BoC trailer.
pub(crate) fn crc32c(data: &[u8]) -> u32 {
    let mut crc = 0xffff_ffffu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0x82f6_3b78
            } else {
                crc >> 1
            };
        }
    }
    !crc
}

/// Minimal number of bytes needed to hold `n` (at least one).
fn byte_width(n: usize) -> usize {
    let bits = (usize::BITS - n.leading_zeros()) as usize;
    bits.div_ceil(8).max(1)
}

fn write_sized(out: &mut Vec<u8>, value: usize, width: usize) {
    let bytes = (value as u64).to_be_bytes();
    out.extend_from_slice(&bytes[8 - width..]);
}

/// Order unique cells so parents precede children.
fn topological_order(root: &Cell) -> Vec<&Cell> {
    fn visit<'a>(cell: &'a Cell, done: &mut HashSet<[u8; 32]>, sorted: &mut Vec<&'a Cell>) {
        if !done.insert(cell.hash()) {
            return;
        }
        for child in cell.references().iter().rev() {
            visit(child, done, sorted);
        }
        sorted.push(cell);
    }

    let mut done = HashSet::new();
    let mut sorted = Vec::new();
    visit(root, &mut done, &mut sorted);
    sorted.reverse();
    sorted
}

impl Cell {
    /// Serialize this cell tree as a single-root bag of cells with a CRC32C
    /// trailer and no index.
    pub fn to_boc(&self) -> Vec<u8> {
        let order = topological_order(self);
        let index: HashMap<[u8; 32], usize> = order
            .iter()
            .enumerate()
            .map(|(i, cell)| (cell.hash(), i))
            .collect();

        let size_bytes = byte_width(order.len());

        let mut cells = Vec::new();
        for cell in &order {
            cells.push(cell.refs_descriptor());
            cells.push(cell.bits_descriptor());
            cells.extend(cell.padded_data());
            for child in cell.references() {
                write_sized(&mut cells, index[&child.hash()], size_bytes);
            }
        }
        let off_bytes = byte_width(cells.len());

        let mut out = Vec::with_capacity(cells.len() + 32);
        out.extend_from_slice(&BOC_MAGIC.to_be_bytes());
        out.push(FLAG_HAS_CRC32C | size_bytes as u8);
        out.push(off_bytes as u8);
        write_sized(&mut out, order.len(), size_bytes);
        write_sized(&mut out, 1, size_bytes);
        write_sized(&mut out, 0, size_bytes);
        write_sized(&mut out, cells.len(), off_bytes);
        write_sized(&mut out, 0, size_bytes);
        out.extend(cells);

        let crc = crc32c(&out);
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }

    /// Canonical text form of [`to_boc`](Self::to_boc).
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_boc())
    }

    /// Parse a bag of cells and return its first root.
    pub fn from_boc(bytes: &[u8]) -> CellResult<Cell> {
        let mut reader = Reader::new(bytes);

        if reader.read_uint(4)? as u32 != BOC_MAGIC {
            return Err(CellError::MalformedBoc("unknown magic"));
        }
        let flags = reader.read_u8()?;
        let has_idx = flags & FLAG_HAS_IDX != 0;
        let has_crc = flags & FLAG_HAS_CRC32C != 0;
        let size_bytes = (flags & 0x07) as usize;
        if size_bytes == 0 || size_bytes > 4 {
            return Err(CellError::MalformedBoc("invalid reference size"));
        }
        let off_bytes = reader.read_u8()? as usize;
        if off_bytes == 0 || off_bytes > 8 {
            return Err(CellError::MalformedBoc("invalid offset size"));
        }

        let cell_count = reader.read_uint(size_bytes)? as usize;
        let root_count = reader.read_uint(size_bytes)? as usize;
        let _absent = reader.read_uint(size_bytes)?;
        let _total_size = reader.read_uint(off_bytes)?;
        if cell_count * 2 > bytes.len() {
            return Err(CellError::MalformedBoc("cell count exceeds input"));
        }
        if root_count == 0 || root_count > cell_count {
            return Err(CellError::MalformedBoc("invalid root count"));
        }

        let mut roots = Vec::with_capacity(root_count);
        for _ in 0..root_count {
            roots.push(reader.read_uint(size_bytes)? as usize);
        }
        if has_idx {
            reader.skip(cell_count * off_bytes)?;
        }

        if has_crc {
            if bytes.len() < 4 {
                return Err(CellError::MalformedBoc("truncated"));
            }
            let (body, trailer) = bytes.split_at(bytes.len() - 4);
            let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
            let found = crc32c(body);
            if expected != found {
                return Err(CellError::ChecksumMismatch { expected, found });
            }
        }

        let mut raw = Vec::with_capacity(cell_count);
        for _ in 0..cell_count {
            raw.push(RawCell::read(&mut reader, size_bytes)?);
        }

        // References always point forward, so build from the back.
        let mut built: Vec<Option<Arc<Cell>>> = vec![None; cell_count];
        for i in (0..cell_count).rev() {
            let entry = &raw[i];
            let mut refs = Vec::with_capacity(entry.refs.len());
            for &r in &entry.refs {
                if r <= i || r >= cell_count {
                    return Err(CellError::MalformedBoc("reference does not point forward"));
                }
                let child = built[r]
                    .clone()
                    .ok_or(CellError::MalformedBoc("missing referenced cell"))?;
                if child.depth() >= MAX_DEPTH {
                    return Err(CellError::MalformedBoc("cell tree too deep"));
                }
                refs.push(child);
            }
            built[i] = Some(Arc::new(Cell::new(entry.data.clone(), entry.bit_len, refs)));
        }

        let root = roots[0];
        if root >= cell_count {
            return Err(CellError::MalformedBoc("root index out of range"));
        }
        built[root]
            .take()
            .map(Arc::unwrap_or_clone)
            .ok_or(CellError::MalformedBoc("missing root"))
    }

    pub fn from_base64(text: &str) -> CellResult<Cell> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| CellError::Base64(e.to_string()))?;
        Cell::from_boc(&bytes)
    }
}

struct RawCell {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<usize>,
}

impl RawCell {
    fn read(reader: &mut Reader<'_>, size_bytes: usize) -> CellResult<Self> {
        let d1 = reader.read_u8()?;
        let d2 = reader.read_u8()?;
        let ref_count = (d1 & 0x07) as usize;
        if d1 & 0x08 != 0 {
            return Err(CellError::MalformedBoc("exotic cells are not supported"));
        }
        if ref_count > MAX_REFS {
            return Err(CellError::MalformedBoc("too many references"));
        }
        if d1 & 0x10 != 0 {
            // Stored hashes and depths for each level.
            let levels = ((d1 >> 5) & 0x07).count_ones() as usize + 1;
            reader.skip(levels * (32 + 2))?;
        }

        let data_len = (d2 as usize).div_ceil(2);
        let mut data = reader.read_bytes(data_len)?.to_vec();
        let bit_len = if d2 % 2 == 0 {
            data_len * 8
        } else {
            // Strip the completion tag: the lowest set bit of the last byte.
            let last = data.last_mut().ok_or(CellError::MalformedBoc("empty padded data"))?;
            if *last == 0 {
                return Err(CellError::MalformedBoc("missing completion tag"));
            }
            let trailing = last.trailing_zeros() as usize;
            *last &= !(1u8 << trailing);
            data_len * 8 - trailing - 1
        };
        data.truncate(bit_len.div_ceil(8));
        if bit_len > MAX_BITS {
            return Err(CellError::MalformedBoc("cell data too long"));
        }

        let mut refs = Vec::with_capacity(ref_count);
        for _ in 0..ref_count {
            refs.push(reader.read_uint(size_bytes)? as usize);
        }
        Ok(Self {
            data,
            bit_len,
            refs,
        })
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn read_bytes(&mut self, len: usize) -> CellResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or(CellError::MalformedBoc("truncated"))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn skip(&mut self, len: usize) -> CellResult<()> {
        self.read_bytes(len).map(|_| ())
    }

    fn read_u8(&mut self) -> CellResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_uint(&mut self, width: usize) -> CellResult<u64> {
        Ok(self
            .read_bytes(width)?
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellBuilder;

    #[test]
    fn test_crc32c_check_value() {
        assert_eq!(crc32c(b"123456789"), 0xe306_9283);
    }

    #[test]
    fn test_empty_cell_golden_vector() {
        assert_eq!(Cell::empty().to_base64(), "te6cckEBAQEAAgAAAEysuc0=");
        let parsed = Cell::from_base64("te6cckEBAQEAAgAAAEysuc0=").unwrap();
        assert_eq!(parsed, Cell::empty());
    }

    #[test]
    fn test_tree_roundtrip_preserves_hash() {
        let mut leaf = CellBuilder::new();
        leaf.store_uint(0x1f, 5).unwrap();
        let leaf = leaf.end_cell();

        let mut root = CellBuilder::new();
        root.store_uint(0xdead_beef, 32)
            .unwrap()
            .store_ref(leaf.clone())
            .unwrap()
            .store_ref(leaf)
            .unwrap();
        let root = root.end_cell();

        let boc = root.to_boc();
        // Identical children are stored once.
        assert_eq!(boc[6], 2);

        let back = Cell::from_boc(&boc).unwrap();
        assert_eq!(back.hash(), root.hash());
        assert_eq!(back.references()[1].parse().load_uint(5).unwrap(), 0x1f);
    }

    #[test]
    fn test_corrupted_checksum_is_rejected() {
        let mut boc = Cell::empty().to_boc();
        let last = boc.len() - 1;
        boc[last] ^= 0x01;
        assert!(matches!(
            Cell::from_boc(&boc),
            Err(CellError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            Cell::from_boc(&[0x00, 0x01, 0x02]),
            Err(CellError::MalformedBoc(_))
        ));
        assert!(matches!(
            Cell::from_base64("not base64!"),
            Err(CellError::Base64(_))
        ));
    }

    /// Hand-assemble a bag of `count` empty cells, each referencing the next.
    fn chain_boc(count: usize) -> Vec<u8> {
        let size_bytes = byte_width(count);
        let mut cells = Vec::new();
        for i in 0..count {
            let last = i + 1 == count;
            cells.push(if last { 0 } else { 1 });
            cells.push(0);
            if !last {
                write_sized(&mut cells, i + 1, size_bytes);
            }
        }
        let off_bytes = byte_width(cells.len());

        let mut out = BOC_MAGIC.to_be_bytes().to_vec();
        out.push(FLAG_HAS_CRC32C | size_bytes as u8);
        out.push(off_bytes as u8);
        write_sized(&mut out, count, size_bytes);
        write_sized(&mut out, 1, size_bytes);
        write_sized(&mut out, 0, size_bytes);
        write_sized(&mut out, cells.len(), off_bytes);
        write_sized(&mut out, 0, size_bytes);
        out.extend(cells);
        let crc = crc32c(&out);
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }

    #[test]
    fn test_chain_at_depth_limit_parses() {
        let cell = Cell::from_boc(&chain_boc(MAX_DEPTH as usize + 1)).unwrap();
        assert_eq!(cell.depth(), MAX_DEPTH);
    }

    #[test]
    fn test_overly_deep_chain_is_rejected() {
        assert_eq!(
            Cell::from_boc(&chain_boc(MAX_DEPTH as usize + 2)).unwrap_err(),
            CellError::MalformedBoc("cell tree too deep")
        );
        assert!(matches!(
            Cell::from_boc(&chain_boc(70_000)),
            Err(CellError::MalformedBoc(_))
        ));
    }
}
