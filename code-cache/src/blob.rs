use sa_common::{Address, WORD_SIZE};
use serde::{Deserialize, Serialize};

use crate::oop_map::OopMap;
use crate::scope::{PcDesc, ScopeDesc, ScopeIndex, ScopeLookup, ScopeRef};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum BlobKind {
    Nmethod,
    /// nmethod wrapping a native method
    NativeWrapper,
    RuntimeStub,
    /// i2c/c2i calling convention adapters
    Adapter,
    BufferBlob,
}

impl BlobKind {
    pub fn name(&self) -> &'static str {
        match self {
            BlobKind::Nmethod => "nmethod",
            BlobKind::NativeWrapper => "native nmethod",
            BlobKind::RuntimeStub => "runtime stub",
            BlobKind::Adapter => "adapter",
            BlobKind::BufferBlob => "buffer blob",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CodeBlob {
    pub name: String,
    pub kind: BlobKind,
    pub code_begin: Address,
    pub code_size: u64,
    /// includes the return address and saved fp slots
    pub frame_size_words: u64,
    #[serde(default)]
    pub method: Option<Address>,
    #[serde(default)]
    pub caller_must_gc_arguments: bool,
    #[serde(default)]
    pub oop_maps: Vec<OopMap>,
    #[serde(default)]
    pub pc_descs: Vec<PcDesc>,
    #[serde(default)]
    pub scopes: Vec<ScopeDesc>,
    #[serde(default)]
    pub deopt_handler_offset: Option<u64>,
    /// where the pc before deoptimization was stashed, as a byte offset from the unextended sp
    #[serde(default)]
    pub orig_pc_offset: Option<i64>,
    /// Native wrappers of synchronized methods: the byte offsets from the unextended sp of the
    /// locked object (receiver or class mirror) and of its basic lock.
    #[serde(default)]
    pub native_lock_slots: Option<NativeLockSlots>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NativeLockSlots {
    pub owner_offset: i64,
    pub basic_lock_offset: i64,
}

impl CodeBlob {
    pub fn code_end(&self) -> Address {
        self.code_begin.offset(self.code_size as i64)
    }

    pub fn contains(&self, pc: Address) -> bool {
        self.code_begin <= pc && pc < self.code_end()
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn is_nmethod(&self) -> bool {
        matches!(self.kind, BlobKind::Nmethod | BlobKind::NativeWrapper)
    }

    pub fn is_java_method(&self) -> bool {
        self.is_nmethod()
    }

    pub fn is_native_method(&self) -> bool {
        self.kind == BlobKind::NativeWrapper
    }

    pub fn is_runtime_stub(&self) -> bool {
        matches!(self.kind, BlobKind::RuntimeStub | BlobKind::Adapter | BlobKind::BufferBlob)
    }

    pub fn frame_size_bytes(&self) -> i64 {
        (self.frame_size_words * WORD_SIZE) as i64
    }

    pub fn pc_offset(&self, pc: Address) -> u64 {
        pc.minus(self.code_begin) as u64
    }

    pub fn is_deopt_handler(&self, pc: Address) -> bool {
        match self.deopt_handler_offset {
            None => false,
            Some(offset) => self.is_nmethod() && self.code_begin.offset(offset as i64) == pc,
        }
    }

    pub fn pc_desc_at(&self, pc: Address) -> Option<&PcDesc> {
        self.pc_descs.iter().find(|pc_desc| pc_desc.real_pc(self) == pc)
    }

    /// Best guess for a pc that isn't at a recorded debug point: the closest descriptor at or
    /// before `pc`, falling back to the first descriptor.
    pub fn pc_desc_near(&self, pc: Address) -> Option<&PcDesc> {
        let mut best_guess: Option<(&PcDesc, i64)> = None;
        for pc_desc in self.pc_descs.iter() {
            let distance = pc.minus(pc_desc.real_pc(self));
            match best_guess {
                None => best_guess = Some((pc_desc, distance)),
                Some((_, best_distance)) => {
                    if distance >= 0 && (best_distance < 0 || distance < best_distance) {
                        best_guess = Some((pc_desc, distance));
                    }
                }
            }
        }
        best_guess.map(|(pc_desc, _)| pc_desc)
    }

    pub fn scope_at(&self, pc: Address, lookup: ScopeLookup) -> Option<ScopeRef<'_>> {
        let pc_desc = match lookup {
            ScopeLookup::Exact => self.pc_desc_at(pc),
            ScopeLookup::Nearest => self.pc_desc_near(pc),
        }?;
        ScopeRef::new(self, pc_desc.scope?)
    }

    pub fn scope(&self, index: ScopeIndex) -> Option<ScopeRef<'_>> {
        ScopeRef::new(self, index)
    }

    /// The first scope whose sender does not precede it, or a pc descriptor pointing outside the
    /// scope arena.
    pub fn malformed_scope(&self) -> Option<ScopeIndex> {
        let bad_sender = self.scopes.iter().enumerate()
            .find(|(index, scope)| matches!(scope.sender, Some(sender) if sender.0 >= *index))
            .map(|(index, _)| ScopeIndex(index));
        bad_sender.or_else(|| self.pc_descs.iter()
            .filter_map(|pc_desc| pc_desc.scope)
            .find(|scope| scope.0 >= self.scopes.len()))
    }

    pub fn oop_map_at(&self, pc: Address) -> Option<&OopMap> {
        let pc_offset = self.pc_offset(pc);
        self.oop_maps.iter().find(|oop_map| oop_map.pc_offset == pc_offset)
    }
}
