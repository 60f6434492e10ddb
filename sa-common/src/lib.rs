pub mod address;
pub mod register;
pub mod tracing;

pub use address::Address;
pub use register::Register;

pub const WORD_SIZE: u64 = 8;

/// bci reported by compiled code for the implicit monitor enter of a synchronized method
pub const SYNCHRONIZATION_ENTRY_BCI: i32 = -1;

pub const INVOCATION_ENTRY_BCI: i32 = -1;

/// Whether values read for a frame can be trusted exactly.
///
/// A frame captured from a thread that was not stopped at a safepoint may have a pc that does not
/// correspond to a recorded debug point, in which case bci and scope information is a best guess.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Precision {
    Precise,
    Imprecise,
}

impl Precision {
    pub fn is_imprecise(&self) -> bool {
        matches!(self, Precision::Imprecise)
    }

    pub fn from_may_be_imprecise(may_be_imprecise: bool) -> Self {
        if may_be_imprecise {
            Precision::Imprecise
        } else {
            Precision::Precise
        }
    }
}
