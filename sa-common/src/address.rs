use std::fmt::{Debug, Display, Formatter, LowerHex};

use serde::{Deserialize, Serialize};

use crate::WORD_SIZE;

/// An address in the target process. Never dereferenced directly, only handed to a memory reader.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub u64);

impl Address {
    pub const NULL: Address = Address(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    pub fn non_null(self) -> Option<Address> {
        if self.is_null() {
            None
        } else {
            Some(self)
        }
    }

    pub fn offset(&self, bytes: i64) -> Address {
        Address(self.0.wrapping_add_signed(bytes))
    }

    pub fn add_words(&self, words: i64) -> Address {
        self.offset(words * WORD_SIZE as i64)
    }

    /// byte distance `self - other`
    pub fn minus(&self, other: Address) -> i64 {
        self.0.wrapping_sub(other.0) as i64
    }

    pub fn is_word_aligned(&self) -> bool {
        self.0 % WORD_SIZE == 0
    }

    pub fn align_down(&self) -> Address {
        Address(self.0 & !(WORD_SIZE - 1))
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address(0x{:x})", self.0)
    }
}

impl LowerHex for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        LowerHex::fmt(&self.0, f)
    }
}

impl From<u64> for Address {
    fn from(raw: u64) -> Self {
        Address(raw)
    }
}

#[cfg(test)]
mod tests {
    use crate::Address;

    #[test]
    fn word_arithmetic() {
        let fp = Address(0x7000_0000);
        assert_eq!(fp.add_words(-3), Address(0x7000_0000 - 24));
        assert_eq!(fp.add_words(2).minus(fp), 16);
        assert_eq!(fp.minus(fp.add_words(1)), -8);
        assert!(Address(0x1001).align_down().is_word_aligned());
        assert_eq!(format!("{}", Address(0xbeef)), "0x000000000000beef");
    }
}
