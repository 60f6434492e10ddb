use sa_common::Register;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum OopMapValue {
    Oop { stack_offset: i64 },
    NarrowOop { stack_offset: i64 },
    /// `register` of the caller was saved at `stack_offset` from this frame's unextended sp
    CalleeSaved { register: Register, stack_offset: i64 },
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct OopMap {
    pub pc_offset: u64,
    #[serde(default)]
    pub values: Vec<OopMapValue>,
}

impl OopMap {
    pub fn callee_saved(&self) -> impl Iterator<Item=(Register, i64)> + '_ {
        self.values.iter().filter_map(|value| match value {
            OopMapValue::CalleeSaved { register, stack_offset } => Some((*register, *stack_offset)),
            OopMapValue::Oop { .. } | OopMapValue::NarrowOop { .. } => None,
        })
    }
}
