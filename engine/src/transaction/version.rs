//! The serialization/sighash ruleset a transaction follows.

use crate::errors::{EngineError, InvalidInputError};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io;

/// Which network upgrade's consensus rules a transaction's wire format and
/// sighash computation follow.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub enum TransactionVersion {
    /// Canonical Sapling transaction, ZIP-243 sighash.
    Sapling,
    /// NU5 transaction, ZIP-225/244 sighash.
    Nu5,
}

impl TransactionVersion {
    pub const fn header_bytes(self) -> u32 {
        match self {
            Self::Sapling => 0x8000_0004,
            Self::Nu5 => 0x8000_0005,
        }
    }

    pub const fn from_header_bytes(value: u32) -> Option<Self> {
        match value {
            0x8000_0004 => Some(Self::Sapling),
            0x8000_0005 => Some(Self::Nu5),
            _ => None,
        }
    }

    pub const fn latest() -> Self {
        Self::Nu5
    }

    pub fn write<W: io::Write>(&self, mut writer: W) -> Result<(), EngineError> {
        writer.write_u32::<byteorder::LittleEndian>(self.header_bytes())?;
        Ok(())
    }

    pub fn read<R: io::Read>(mut reader: R) -> Result<Self, EngineError> {
        let header = reader.read_u32::<byteorder::LittleEndian>()?;
        Self::from_header_bytes(header)
            .ok_or_else(|| EngineError::InvalidInput(InvalidInputError::UnknownTransactionVersion(header)))
    }
}

#[cfg(test)]
mod tests {
    use super::TransactionVersion::*;

    #[test]
    fn ordering() {
        assert!(Sapling < Nu5);
        assert_eq!(TransactionVersion::latest(), Nu5);
    }

    #[test]
    fn header_round_trip() {
        for version in [Sapling, Nu5] {
            let mut bytes = vec![];
            version.write(&mut bytes).unwrap();
            let read_back = TransactionVersion::read(&bytes[..]).unwrap();
            assert_eq!(version, read_back);
        }
    }

    #[test]
    fn unknown_header_is_rejected() {
        assert!(TransactionVersion::from_header_bytes(0xdead_beef).is_none());
    }
}
