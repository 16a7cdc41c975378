use std::sync::Arc;

use super::{Cell, CellError, CellResult, MAX_BITS, MAX_DEPTH, MAX_REFS};
use crate::address::Address;

/// Largest byte length of a coin amount (4-bit length header).
const MAX_COIN_BYTES: usize = 15;

/// Append-only writer for a single cell.
///
/// Every write is checked against the remaining capacity before anything is
/// appended, so a failed write leaves the builder unchanged. Consuming the
/// builder with [`end_cell`](Self::end_cell) is the only way to obtain a
/// [`Cell`], so a finalized cell can never be written to again.
#[derive(Debug, Clone, Default)]
pub struct CellBuilder {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<Arc<Cell>>,
}

impl CellBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn available_bits(&self) -> usize {
        MAX_BITS - self.bit_len
    }

    pub fn available_refs(&self) -> usize {
        MAX_REFS - self.refs.len()
    }

    fn ensure_bits(&self, bits: usize) -> CellResult<()> {
        let available = self.available_bits();
        if bits > available {
            return Err(CellError::BitOverflow {
                attempted: bits,
                available,
            });
        }
        Ok(())
    }

    fn push_bit(&mut self, bit: bool) {
        let offset = self.bit_len % 8;
        if offset == 0 {
            self.data.push(0);
        }
        if bit {
            if let Some(last) = self.data.last_mut() {
                *last |= 0x80 >> offset;
            }
        }
        self.bit_len += 1;
    }

    pub fn store_bit(&mut self, bit: bool) -> CellResult<&mut Self> {
        self.ensure_bits(1)?;
        self.push_bit(bit);
        Ok(self)
    }

    /// Write the low `bits` bits of `value`, most significant first.
    ///
    /// Fails with [`CellError::ValueOutOfRange`] if `value >= 2^bits`.
    pub fn store_uint(&mut self, value: u64, bits: usize) -> CellResult<&mut Self> {
        if bits > 64 {
            return Err(CellError::InvalidBitWidth(bits));
        }
        if bits < 64 && value >> bits != 0 {
            return Err(CellError::ValueOutOfRange {
                value: value as u128,
                bits,
            });
        }
        self.ensure_bits(bits)?;
        for i in (0..bits).rev() {
            self.push_bit((value >> i) & 1 != 0);
        }
        Ok(self)
    }

    /// Write a two's complement signed integer of `bits` width.
    pub fn store_int(&mut self, value: i64, bits: usize) -> CellResult<&mut Self> {
        if bits == 0 || bits > 64 {
            return Err(CellError::InvalidBitWidth(bits));
        }
        let min = if bits == 64 { i64::MIN } else { -(1i64 << (bits - 1)) };
        let max = if bits == 64 { i64::MAX } else { (1i64 << (bits - 1)) - 1 };
        if value < min || value > max {
            return Err(CellError::ValueOutOfRange {
                value: value.unsigned_abs() as u128,
                bits,
            });
        }
        let raw = if bits == 64 {
            value as u64
        } else {
            (value as u64) & ((1u64 << bits) - 1)
        };
        self.store_uint(raw, bits)
    }

    pub fn store_bytes(&mut self, bytes: &[u8]) -> CellResult<&mut Self> {
        self.ensure_bits(bytes.len() * 8)?;
        for &b in bytes {
            for i in (0..8).rev() {
                self.push_bit((b >> i) & 1 != 0);
            }
        }
        Ok(self)
    }

    /// Write a coin amount: a 4-bit byte-length header followed by the
    /// amount's minimal big-endian bytes. Zero is a bare `0000` header.
    pub fn store_coins(&mut self, amount: u128) -> CellResult<&mut Self> {
        let len = (128 - amount.leading_zeros() as usize).div_ceil(8);
        if len > MAX_COIN_BYTES {
            return Err(CellError::ValueOutOfRange {
                value: amount,
                bits: MAX_COIN_BYTES * 8,
            });
        }
        self.ensure_bits(4 + len * 8)?;
        let bytes = amount.to_be_bytes();
        self.store_uint(len as u64, 4)?;
        self.store_bytes(&bytes[bytes.len() - len..])
    }

    /// Write a standard address: tag `10`, no anycast, int8 workchain and
    /// the 256-bit account id.
    pub fn store_address(&mut self, address: &Address) -> CellResult<&mut Self> {
        self.ensure_bits(Address::CELL_BITS)?;
        self.store_uint(0b10, 2)?;
        self.store_bit(false)?;
        self.store_int(address.workchain as i64, 8)?;
        self.store_bytes(&address.hash)
    }

    /// Write `text` as a snake string: as many bytes as fit here, the rest in
    /// a chain of continuation cells linked through each cell's first free
    /// reference.
    pub fn store_string_tail(&mut self, text: &str) -> CellResult<&mut Self> {
        self.store_bytes_tail(text.as_bytes())
    }

    pub fn store_bytes_tail(&mut self, bytes: &[u8]) -> CellResult<&mut Self> {
        let fit = self.available_bits() / 8;
        if bytes.len() <= fit {
            return self.store_bytes(bytes);
        }
        if self.available_refs() == 0 {
            return Err(CellError::RefOverflow);
        }

        let (head, tail) = bytes.split_at(fit);
        let per_cell = MAX_BITS / 8;
        let links = tail.len().div_ceil(per_cell);
        if links > MAX_DEPTH as usize {
            return Err(CellError::DepthOverflow { depth: links });
        }

        // Build the continuation chain back to front so each cell can
        // reference the one after it.
        let chunks: Vec<&[u8]> = tail.chunks(per_cell).collect();
        let mut next: Option<Cell> = None;
        for chunk in chunks.into_iter().rev() {
            let mut link = CellBuilder::new();
            link.store_bytes(chunk)?;
            if let Some(cell) = next.take() {
                link.store_ref(cell)?;
            }
            next = Some(link.end_cell());
        }

        self.store_bytes(head)?;
        if let Some(cell) = next {
            self.store_ref(cell)?;
        }
        Ok(self)
    }

    /// Append a finished child cell.
    pub fn store_ref(&mut self, cell: impl Into<Arc<Cell>>) -> CellResult<&mut Self> {
        if self.refs.len() >= MAX_REFS {
            return Err(CellError::RefOverflow);
        }
        let cell = cell.into();
        if cell.depth() >= MAX_DEPTH {
            return Err(CellError::DepthOverflow {
                depth: cell.depth() as usize + 1,
            });
        }
        self.refs.push(cell);
        Ok(self)
    }

    /// Finalize into an immutable cell.
    pub fn end_cell(self) -> Cell {
        Cell::new(self.data, self.bit_len, self.refs)
    }
}
