//! Persistent key-value storage for the bind record, plus the record's
//! on-disk layout with its magic-number validity check.

/// Magic value marking a valid bind record.
pub const BIND_RECORD_MAGIC: u32 = 0x4C50_4F48;

/// Serialized size of a [`BindRecord`].
pub const BIND_RECORD_LEN: usize = 9;

/// Contract for the non-volatile store holding bind data.
pub trait BindStore {
    type Error: core::fmt::Debug;

    /// Write `data` at `offset` within the bind region.
    fn write_block(&mut self, offset: u16, data: &[u8]) -> Result<(), Self::Error>;
    /// Read `data.len()` bytes at `offset` within the bind region.
    fn read_block(&mut self, offset: u16, data: &mut [u8]) -> Result<(), Self::Error>;
}

/// Persisted bind data: the peer transmitter's pipe address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindRecord {
    pub address: [u8; 5],
}

impl BindRecord {
    /// Serialize as `magic (LE u32) || address`.
    pub fn encode(&self) -> [u8; BIND_RECORD_LEN] {
        let mut out = [0u8; BIND_RECORD_LEN];
        out[..4].copy_from_slice(&BIND_RECORD_MAGIC.to_le_bytes());
        out[4..].copy_from_slice(&self.address);
        out
    }

    /// Parse a stored block; a magic mismatch means "no bind data".
    pub fn decode(raw: &[u8; BIND_RECORD_LEN]) -> Option<Self> {
        let magic = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        if magic != BIND_RECORD_MAGIC {
            return None;
        }
        let mut address = [0u8; 5];
        address.copy_from_slice(&raw[4..]);
        Some(Self { address })
    }
}
