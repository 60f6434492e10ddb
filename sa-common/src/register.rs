use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumCount, EnumIter};

/// Machine registers of the inspected process that a frame's callee may have saved.
/// Numbering matches the debug info register numbers emitted by the compiler.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[derive(FromPrimitive, ToPrimitive, EnumCount, EnumIter, Display)]
#[derive(Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[repr(u16)]
pub enum Register {
    Rax = 0,
    Rcx,
    Rdx,
    Rbx,
    Rsp,
    Rbp,
    Rsi,
    Rdi,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    Xmm0,
    Xmm1,
    Xmm2,
    Xmm3,
    Xmm4,
    Xmm5,
    Xmm6,
    Xmm7,
    Xmm8,
    Xmm9,
    Xmm10,
    Xmm11,
    Xmm12,
    Xmm13,
    Xmm14,
    Xmm15,
}

impl Register {
    pub fn from_number(number: u16) -> Option<Register> {
        Register::from_u16(number)
    }

    pub fn number(&self) -> usize {
        *self as usize
    }

    pub fn is_float(&self) -> bool {
        *self >= Register::Xmm0
    }
}

#[cfg(test)]
mod tests {
    use strum::{EnumCount, IntoEnumIterator};

    use crate::Register;

    #[test]
    fn numbering_is_dense() {
        for (i, register) in Register::iter().enumerate() {
            assert_eq!(register.number(), i);
            assert_eq!(Register::from_number(i as u16), Some(register));
        }
        assert_eq!(Register::from_number(Register::COUNT as u16), None);
        assert_eq!(Register::Rbp.to_string(), "rbp");
        assert!(Register::Xmm3.is_float());
        assert!(!Register::R15.is_float());
    }
}
