use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sa_common::{Address, WORD_SIZE};

/// Read access to the address space of the inspected process.
///
/// Reads never fail at this layer. Memory that was never mapped reads as zero, and a process that
/// was not suspended while being read may hand back stale values.
pub trait TargetMemory {
    fn read_bytes(&self, address: Address, len: usize) -> Vec<u8>;

    fn read_u64(&self, address: Address) -> u64 {
        let bytes = self.read_bytes(address, 8);
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes[..8]);
        u64::from_le_bytes(buf)
    }

    fn read_u32(&self, address: Address) -> u32 {
        let bytes = self.read_bytes(address, 4);
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&bytes[..4]);
        u32::from_le_bytes(buf)
    }

    fn read_address(&self, address: Address) -> Address {
        Address(self.read_u64(address))
    }

    fn read_f64(&self, address: Address) -> f64 {
        f64::from_bits(self.read_u64(address))
    }
}

/// Word-granular memory image, the backing store of a snapshot.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SparseMemory {
    words: BTreeMap<Address, u64>,
}

impl SparseMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u64(&mut self, address: Address, value: u64) {
        assert!(address.is_word_aligned(), "misaligned write at {}", address);
        if value == 0 {
            self.words.remove(&address);
        } else {
            self.words.insert(address, value);
        }
    }

    pub fn write_address(&mut self, address: Address, value: Address) {
        self.write_u64(address, value.0)
    }

    pub fn write_f64(&mut self, address: Address, value: f64) {
        self.write_u64(address, value.to_bits())
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    fn word(&self, aligned: Address) -> u64 {
        self.words.get(&aligned).copied().unwrap_or(0)
    }
}

impl TargetMemory for SparseMemory {
    fn read_bytes(&self, address: Address, len: usize) -> Vec<u8> {
        (0..len as i64)
            .map(|i| {
                let byte_address = address.offset(i);
                let word = self.word(byte_address.align_down());
                let shift = (byte_address.0 % WORD_SIZE) * 8;
                ((word >> shift) & 0xff) as u8
            })
            .collect()
    }

    fn read_u64(&self, address: Address) -> u64 {
        if address.is_word_aligned() {
            return self.word(address);
        }
        let bytes = self.read_bytes(address, 8);
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes.as_slice());
        u64::from_le_bytes(buf)
    }
}

#[cfg(test)]
mod tests {
    use sa_common::Address;

    use crate::memory::{SparseMemory, TargetMemory};

    #[test]
    fn unmapped_reads_as_zero() {
        let memory = SparseMemory::new();
        assert_eq!(memory.read_u64(Address(0x1000)), 0);
        assert!(memory.read_address(Address(0x1008)).is_null());
    }

    #[test]
    fn sub_word_and_cross_word_reads() {
        let mut memory = SparseMemory::new();
        memory.write_u64(Address(0x1000), 0x1122_3344_5566_7788);
        memory.write_u64(Address(0x1008), 0x99aa_bbcc_ddee_ff00);
        assert_eq!(memory.read_u32(Address(0x1000)), 0x5566_7788);
        assert_eq!(memory.read_u32(Address(0x1004)), 0x1122_3344);
        assert_eq!(memory.read_u64(Address(0x1004)), 0xddee_ff00_1122_3344);
        memory.write_f64(Address(0x1010), 2.5);
        assert_eq!(memory.read_f64(Address(0x1010)), 2.5);
    }

    #[test]
    #[should_panic]
    fn misaligned_write() {
        let mut memory = SparseMemory::new();
        memory.write_u64(Address(0x1003), 1);
    }
}
