use sa_common::Address;
use serde::{Deserialize, Serialize};

use crate::blob::CodeBlob;
use crate::location::{MonitorValue, ScopeValue};

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeIndex(pub usize);

/// One level of the inlining tree at a debug point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScopeDesc {
    pub method: Address,
    pub bci: i32,
    /// the scope this one was inlined into
    #[serde(default)]
    pub sender: Option<ScopeIndex>,
    #[serde(default)]
    pub reexecute: bool,
    #[serde(default)]
    pub locals: Vec<ScopeValue>,
    #[serde(default)]
    pub expressions: Vec<ScopeValue>,
    #[serde(default)]
    pub monitors: Vec<MonitorValue>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PcDesc {
    pub pc_offset: u64,
    /// innermost scope at this pc
    pub scope: Option<ScopeIndex>,
}

impl PcDesc {
    pub fn real_pc(&self, blob: &CodeBlob) -> Address {
        blob.code_begin.offset(self.pc_offset as i64)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScopeLookup {
    Exact,
    Nearest,
}

#[derive(Copy, Clone, Debug)]
pub struct ScopeRef<'c> {
    blob: &'c CodeBlob,
    index: ScopeIndex,
}

impl<'c> ScopeRef<'c> {
    pub fn new(blob: &'c CodeBlob, index: ScopeIndex) -> Option<Self> {
        if index.0 < blob.scopes.len() {
            Some(Self { blob, index })
        } else {
            None
        }
    }

    pub fn desc(&self) -> &'c ScopeDesc {
        &self.blob.scopes[self.index.0]
    }

    pub fn index(&self) -> ScopeIndex {
        self.index
    }

    pub fn blob(&self) -> &'c CodeBlob {
        self.blob
    }

    pub fn method(&self) -> Address {
        self.desc().method
    }

    pub fn bci(&self) -> i32 {
        self.desc().bci
    }

    /// the outermost scope of the physical frame, i.e. the method the code was compiled for
    pub fn is_top(&self) -> bool {
        self.sender().is_none()
    }

    /// Senders precede the scopes inlined into them, a sender index at or after this scope's ends
    /// the chain.
    pub fn sender(&self) -> Option<ScopeRef<'c>> {
        let sender = self.desc().sender?;
        if sender >= self.index {
            return None;
        }
        ScopeRef::new(self.blob, sender)
    }
}

impl PartialEq for ScopeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.blob, other.blob) && self.index == other.index
    }
}
