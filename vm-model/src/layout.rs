//! Offsets into target VM structures, already resolved for x86-64.
//!
//! Frame slot offsets are in words relative to the frame pointer.

use memoffset::offset_of;
use serde::{Deserialize, Serialize};

use sa_common::Address;

pub const RETURN_ADDR_OFFSET: i64 = 1;
pub const LINK_OFFSET: i64 = 0;
/// raw sp of the sender, relative to fp
pub const SENDER_SP_OFFSET: i64 = 2;

pub const INTERPRETER_FRAME_SENDER_SP_OFFSET: i64 = -1;
pub const INTERPRETER_FRAME_LAST_SP_OFFSET: i64 = -2;
pub const INTERPRETER_FRAME_METHOD_OFFSET: i64 = -3;
pub const INTERPRETER_FRAME_MIRROR_OFFSET: i64 = -4;
pub const INTERPRETER_FRAME_MDP_OFFSET: i64 = -5;
pub const INTERPRETER_FRAME_CACHE_OFFSET: i64 = -6;
pub const INTERPRETER_FRAME_LOCALS_OFFSET: i64 = -7;
pub const INTERPRETER_FRAME_BCP_OFFSET: i64 = -8;
pub const INTERPRETER_FRAME_INITIAL_SP_OFFSET: i64 = -9;
pub const INTERPRETER_FRAME_MONITOR_BLOCK_TOP_OFFSET: i64 = INTERPRETER_FRAME_INITIAL_SP_OFFSET;
pub const INTERPRETER_FRAME_MONITOR_BLOCK_BOTTOM_OFFSET: i64 = INTERPRETER_FRAME_INITIAL_SP_OFFSET;

pub const ENTRY_FRAME_CALL_WRAPPER_OFFSET: i64 = -6;

/// displaced header followed by the locked object
pub const BASIC_OBJECT_LOCK_SIZE_WORDS: i64 = 2;
pub const BASIC_OBJECT_LOCK_LOCK_OFFSET: i64 = 0;
pub const BASIC_OBJECT_LOCK_OBJ_OFFSET: i64 = 8;

/// largest interpreted frame the frame guesser believes in
pub const MAX_INTERPRETED_FRAME_WORDS: i64 = 4096;
/// how many links of a native fp chain the frame guesser follows looking for java code
pub const MAX_FRAME_GUESS_DEPTH: usize = 64;

#[repr(C)]
pub struct JavaFrameAnchorLayout {
    pub last_java_sp: u64,
    pub last_java_pc: u64,
    pub last_java_fp: u64,
}

#[repr(C)]
pub struct JavaCallWrapperLayout {
    pub thread: u64,
    pub handles: u64,
    pub callee_method: u64,
    pub receiver: u64,
    pub anchor: JavaFrameAnchorLayout,
    pub result: u64,
    pub result_type: u64,
}

pub fn anchor_last_java_sp_offset() -> i64 {
    offset_of!(JavaFrameAnchorLayout, last_java_sp) as i64
}

pub fn anchor_last_java_pc_offset() -> i64 {
    offset_of!(JavaFrameAnchorLayout, last_java_pc) as i64
}

pub fn anchor_last_java_fp_offset() -> i64 {
    offset_of!(JavaFrameAnchorLayout, last_java_fp) as i64
}

pub fn call_wrapper_anchor_offset() -> i64 {
    offset_of!(JavaCallWrapperLayout, anchor) as i64
}

pub fn call_wrapper_size() -> i64 {
    std::mem::size_of::<JavaCallWrapperLayout>() as i64
}

/// How compressed oops are decoded.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NarrowOopEncoding {
    pub base: Address,
    pub shift: u32,
}

impl Default for NarrowOopEncoding {
    fn default() -> Self {
        Self { base: Address::NULL, shift: 3 }
    }
}

impl NarrowOopEncoding {
    pub fn decode(&self, narrow: u32) -> Option<Address> {
        if narrow == 0 {
            return None;
        }
        Some(self.base.offset(((narrow as u64) << self.shift) as i64))
    }

    pub fn encode(&self, oop: Address) -> u32 {
        if oop.is_null() {
            return 0;
        }
        (oop.minus(self.base) as u64 >> self.shift) as u32
    }
}

#[cfg(test)]
mod tests {
    use sa_common::Address;

    use crate::layout::{anchor_last_java_fp_offset, anchor_last_java_pc_offset, call_wrapper_anchor_offset, call_wrapper_size, NarrowOopEncoding};

    #[test]
    fn wrapper_layout() {
        assert_eq!(call_wrapper_anchor_offset(), 32);
        assert_eq!(anchor_last_java_pc_offset(), 8);
        assert_eq!(anchor_last_java_fp_offset(), 16);
        assert_eq!(call_wrapper_size(), 72);
    }

    #[test]
    fn narrow_oops() {
        let encoding = NarrowOopEncoding { base: Address(0x8_0000_0000), shift: 3 };
        let oop = Address(0x8_0000_1230);
        assert_eq!(encoding.decode(encoding.encode(oop)), Some(oop));
        assert_eq!(encoding.decode(0), None);
    }
}
