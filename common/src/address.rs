use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Tag byte of a bounceable user-friendly address.
const TAG_BOUNCEABLE: u8 = 0x11;

/// Tag byte of a non-bounceable user-friendly address.
const TAG_NON_BOUNCEABLE: u8 = 0x51;

/// Flag added to the tag byte for test-only addresses.
const TAG_TEST_ONLY: u8 = 0x80;

/// Decoded size of a user-friendly address: tag, workchain, hash, crc16.
const FRIENDLY_LEN: usize = 36;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid address: {0}")]
    Malformed(String),

    #[error("invalid address: expected {FRIENDLY_LEN} bytes, found {0}")]
    InvalidLength(usize),

    #[error("invalid address: unknown tag {0:#04x}")]
    InvalidTag(u8),

    #[error("invalid address: checksum mismatch")]
    InvalidChecksum,

    #[error("invalid address: workchain {0} out of range")]
    InvalidWorkchain(i64),
}

/// CRC-16/XMODEM, the checksum of user-friendly addresses.
fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0u16;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// A standard account address: workchain and 256-bit account id.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub workchain: i8,
    pub hash: [u8; 32],
}

/// Flags carried by the user-friendly form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FriendlyFlags {
    pub bounceable: bool,
    pub test_only: bool,
}

impl Address {
    /// Bits taken by `addr_std` without anycast in a cell.
    pub const CELL_BITS: usize = 2 + 1 + 8 + 256;

    pub fn new(workchain: i8, hash: [u8; 32]) -> Self {
        Self { workchain, hash }
    }

    /// Parse either the raw `<workchain>:<hex>` form or the 48-character
    /// user-friendly form (standard or URL-safe base64).
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let s = s.trim();
        if s.contains(':') {
            Self::parse_raw(s)
        } else {
            Self::parse_friendly(s).map(|(address, _)| address)
        }
    }

    pub fn parse_raw(s: &str) -> Result<Self, AddressError> {
        let (wc, hex_part) = s
            .split_once(':')
            .ok_or_else(|| AddressError::Malformed(s.to_string()))?;
        let workchain: i64 = wc
            .parse()
            .map_err(|_| AddressError::Malformed(s.to_string()))?;
        let workchain =
            i8::try_from(workchain).map_err(|_| AddressError::InvalidWorkchain(workchain))?;

        let mut hash = [0u8; 32];
        hex::decode_to_slice(hex_part, &mut hash)
            .map_err(|_| AddressError::Malformed(s.to_string()))?;
        Ok(Self::new(workchain, hash))
    }

    pub fn parse_friendly(s: &str) -> Result<(Self, FriendlyFlags), AddressError> {
        if s.len() != 48 {
            return Err(AddressError::Malformed(s.to_string()));
        }
        let bytes = if s.contains(['-', '_']) {
            URL_SAFE.decode(s)
        } else {
            STANDARD.decode(s)
        }
        .map_err(|_| AddressError::Malformed(s.to_string()))?;

        if bytes.len() != FRIENDLY_LEN {
            return Err(AddressError::InvalidLength(bytes.len()));
        }

        let crc = u16::from_be_bytes([bytes[34], bytes[35]]);
        if crc16(&bytes[..34]) != crc {
            return Err(AddressError::InvalidChecksum);
        }

        let mut tag = bytes[0];
        let test_only = tag & TAG_TEST_ONLY != 0;
        if test_only {
            tag ^= TAG_TEST_ONLY;
        }
        let bounceable = match tag {
            TAG_BOUNCEABLE => true,
            TAG_NON_BOUNCEABLE => false,
            _ => return Err(AddressError::InvalidTag(bytes[0])),
        };

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[2..34]);
        Ok((
            Self::new(bytes[1] as i8, hash),
            FriendlyFlags {
                bounceable,
                test_only,
            },
        ))
    }

    /// URL-safe user-friendly form.
    pub fn to_friendly(&self, flags: FriendlyFlags) -> String {
        let mut tag = if flags.bounceable {
            TAG_BOUNCEABLE
        } else {
            TAG_NON_BOUNCEABLE
        };
        if flags.test_only {
            tag |= TAG_TEST_ONLY;
        }

        let mut bytes = Vec::with_capacity(FRIENDLY_LEN);
        bytes.push(tag);
        bytes.push(self.workchain as u8);
        bytes.extend_from_slice(&self.hash);
        let crc = crc16(&bytes);
        bytes.extend_from_slice(&crc.to_be_bytes());
        URL_SAFE.encode(bytes)
    }

    pub fn to_raw(&self) -> String {
        format!("{}:{}", self.workchain, hex::encode(self.hash))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl fmt::Display for Address {
    /// Bounceable, mainnet, URL-safe.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_friendly(FriendlyFlags {
            bounceable: true,
            test_only: false,
        }))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_raw())
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellBuilder;

    const MINTER: &str = "EQBsrBcQEljeB4clOLGBHEM5UvzZZy6_Rv65obhkJV89NdA9";
    const FEE: &str = "UQAI6XfeQmLtZ8qzeoNWJRYG8wfuWQZBZHZF5-eUH7kDiZVN";

    #[test]
    fn test_crc16_check_value() {
        assert_eq!(crc16(b"123456789"), 0x31c3);
    }

    #[test]
    fn test_parse_bounceable_address() {
        let (address, flags) = Address::parse_friendly(MINTER).unwrap();
        assert_eq!(address.workchain, 0);
        assert_eq!(
            hex::encode(address.hash),
            "6cac17101258de07872538b1811c433952fcd9672ebf46feb9a1b864255f3d35"
        );
        assert!(flags.bounceable);
        assert!(!flags.test_only);
        assert_eq!(address.to_string(), MINTER);
    }

    #[test]
    fn test_parse_non_bounceable_address() {
        let (address, flags) = Address::parse_friendly(FEE).unwrap();
        assert!(!flags.bounceable);
        assert_eq!(address.to_friendly(flags), FEE);
    }

    #[test]
    fn test_raw_and_friendly_agree() {
        let friendly = Address::parse(MINTER).unwrap();
        let raw = Address::parse(&friendly.to_raw()).unwrap();
        assert_eq!(friendly, raw);
        assert_eq!(
            raw.to_raw(),
            "0:6cac17101258de07872538b1811c433952fcd9672ebf46feb9a1b864255f3d35"
        );
    }

    #[test]
    fn test_test_only_flag() {
        let address = Address::parse(MINTER).unwrap();
        let flags = FriendlyFlags {
            bounceable: false,
            test_only: true,
        };
        let text = address.to_friendly(flags);
        assert_eq!(Address::parse_friendly(&text).unwrap(), (address, flags));
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(matches!(Address::parse("hello"), Err(AddressError::Malformed(_))));
        assert!(matches!(Address::parse(""), Err(AddressError::Malformed(_))));

        // Flip one character inside the account id.
        let tampered = MINTER.replacen("sr", "sR", 1);
        assert_eq!(Address::parse(&tampered), Err(AddressError::InvalidChecksum));

        assert!(matches!(
            Address::parse("300:6cac17101258de07872538b1811c433952fcd9672ebf46feb9a1b864255f3d35"),
            Err(AddressError::InvalidWorkchain(300))
        ));
        assert!(Address::parse("0:zz").is_err());
    }

    #[test]
    fn test_address_cell_roundtrip() {
        let address = Address::parse(MINTER).unwrap();
        let mut b = CellBuilder::new();
        b.store_address(&address).unwrap();
        let cell = b.end_cell();
        assert_eq!(cell.bit_len(), Address::CELL_BITS);
        assert_eq!(cell.parse().load_address().unwrap(), Some(address));

        let masterchain = Address::new(-1, [0xab; 32]);
        let mut b = CellBuilder::new();
        b.store_address(&masterchain).unwrap();
        assert_eq!(b.end_cell().parse().load_address().unwrap(), Some(masterchain));
    }
}
