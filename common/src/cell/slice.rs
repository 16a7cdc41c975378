use super::{Cell, CellError, CellResult};
use crate::address::Address;

/// Sequential reader over a cell's bits and references.
#[derive(Debug, Clone)]
pub struct CellSlice<'a> {
    cell: &'a Cell,
    bit_offset: usize,
    ref_offset: usize,
}

impl<'a> CellSlice<'a> {
    pub fn new(cell: &'a Cell) -> Self {
        Self {
            cell,
            bit_offset: 0,
            ref_offset: 0,
        }
    }

    pub fn remaining_bits(&self) -> usize {
        self.cell.bit_len() - self.bit_offset
    }

    pub fn remaining_refs(&self) -> usize {
        self.cell.references().len() - self.ref_offset
    }

    fn ensure_bits(&self, bits: usize) -> CellResult<()> {
        let available = self.remaining_bits();
        if bits > available {
            return Err(CellError::Underflow {
                attempted: bits,
                available,
            });
        }
        Ok(())
    }

    fn next_bit(&mut self) -> bool {
        let byte = self.cell.data()[self.bit_offset / 8];
        let bit = (byte >> (7 - self.bit_offset % 8)) & 1 != 0;
        self.bit_offset += 1;
        bit
    }

    pub fn load_bit(&mut self) -> CellResult<bool> {
        self.ensure_bits(1)?;
        Ok(self.next_bit())
    }

    /// Read an unsigned big-endian integer of `bits` width (at most 64).
    pub fn load_uint(&mut self, bits: usize) -> CellResult<u64> {
        if bits > 64 {
            return Err(CellError::InvalidBitWidth(bits));
        }
        self.ensure_bits(bits)?;
        let mut value = 0u64;
        for _ in 0..bits {
            value = (value << 1) | self.next_bit() as u64;
        }
        Ok(value)
    }

    /// Read a two's complement signed integer of `bits` width.
    pub fn load_int(&mut self, bits: usize) -> CellResult<i64> {
        if bits == 0 {
            return Ok(0);
        }
        let raw = self.load_uint(bits)?;
        if bits == 64 {
            return Ok(raw as i64);
        }
        let shift = 64 - bits;
        Ok(((raw << shift) as i64) >> shift)
    }

    pub fn load_bytes(&mut self, len: usize) -> CellResult<Vec<u8>> {
        self.ensure_bits(len * 8)?;
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            let mut byte = 0u8;
            for _ in 0..8 {
                byte = (byte << 1) | self.next_bit() as u8;
            }
            out.push(byte);
        }
        Ok(out)
    }

    /// Read a length-prefixed coin amount.
    pub fn load_coins(&mut self) -> CellResult<u128> {
        let len = self.load_uint(4)? as usize;
        let bytes = self.load_bytes(len)?;
        Ok(bytes.iter().fold(0u128, |acc, &b| (acc << 8) | b as u128))
    }

    /// Read an address; the empty address yields `None`.
    pub fn load_address(&mut self) -> CellResult<Option<Address>> {
        let tag = self.load_uint(2)? as u8;
        match tag {
            0b00 => Ok(None),
            0b10 => {
                if self.load_bit()? {
                    return Err(CellError::UnsupportedAddress(tag));
                }
                let workchain = self.load_int(8)? as i8;
                let bytes = self.load_bytes(32)?;
                let mut hash = [0u8; 32];
                hash.copy_from_slice(&bytes);
                Ok(Some(Address::new(workchain, hash)))
            }
            other => Err(CellError::UnsupportedAddress(other)),
        }
    }

    pub fn load_ref(&mut self) -> CellResult<&'a Cell> {
        let cell = self
            .cell
            .references()
            .get(self.ref_offset)
            .ok_or(CellError::RefUnderflow)?;
        self.ref_offset += 1;
        Ok(cell.as_ref())
    }

    /// Read the remaining whole bytes of this cell and of every continuation
    /// cell reached through the first remaining reference.
    pub fn load_bytes_tail(&mut self) -> CellResult<Vec<u8>> {
        if self.remaining_bits() % 8 != 0 {
            return Err(CellError::Underflow {
                attempted: self.remaining_bits().next_multiple_of(8),
                available: self.remaining_bits(),
            });
        }
        let mut out = self.load_bytes(self.remaining_bits() / 8)?;
        let mut next = if self.remaining_refs() > 0 {
            Some(self.load_ref()?)
        } else {
            None
        };
        while let Some(cell) = next {
            let mut slice = cell.parse();
            out.extend(slice.load_bytes(slice.remaining_bits() / 8)?);
            next = if slice.remaining_refs() > 0 {
                Some(slice.load_ref()?)
            } else {
                None
            };
        }
        Ok(out)
    }

    pub fn load_string_tail(&mut self) -> CellResult<String> {
        String::from_utf8(self.load_bytes_tail()?).map_err(|_| CellError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellBuilder;

    #[test]
    fn test_reads_past_end_fail() {
        let mut b = CellBuilder::new();
        b.store_uint(3, 4).unwrap();
        let cell = b.end_cell();
        let mut slice = cell.parse();
        assert_eq!(
            slice.load_uint(8).unwrap_err(),
            CellError::Underflow { attempted: 8, available: 4 }
        );
        assert_eq!(slice.load_uint(4).unwrap(), 3);
        assert_eq!(slice.load_ref().unwrap_err(), CellError::RefUnderflow);
    }

    #[test]
    fn test_signed_roundtrip() {
        let mut b = CellBuilder::new();
        b.store_int(-1, 8).unwrap().store_int(-300, 16).unwrap();
        let cell = b.end_cell();
        let mut slice = cell.parse();
        assert_eq!(slice.load_int(8).unwrap(), -1);
        assert_eq!(slice.load_int(16).unwrap(), -300);
    }

    #[test]
    fn test_null_address() {
        let mut b = CellBuilder::new();
        // addr_none is the bare 2-bit tag `00`.
        b.store_uint(0, 2).unwrap();
        let cell = b.end_cell();
        assert_eq!(cell.parse().load_address().unwrap(), None);
    }

    #[test]
    fn test_invalid_utf8_string() {
        let mut b = CellBuilder::new();
        b.store_bytes(&[0xff, 0xfe]).unwrap();
        let cell = b.end_cell();
        assert_eq!(cell.parse().load_string_tail().unwrap_err(), CellError::InvalidUtf8);
    }
}
