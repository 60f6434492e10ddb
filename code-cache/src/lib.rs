use std::ops::Range;

use itertools::Itertools;
use log::warn;
use rangemap::RangeMap;
use serde::{Deserialize, Serialize};

use sa_common::Address;

use crate::blob::CodeBlob;

pub mod location;
pub mod scope;
pub mod oop_map;
pub mod blob;

/// What a pc points into.
#[derive(Copy, Clone, Debug)]
pub enum CodeRegion<'c> {
    Interpreter,
    /// the stub every java call from the vm goes through
    CallStub,
    Blob(&'c CodeBlob),
    Unknown,
}

impl CodeRegion<'_> {
    pub fn is_known(&self) -> bool {
        !matches!(self, CodeRegion::Unknown)
    }
}

#[derive(Clone, Debug)]
#[derive(Serialize, Deserialize)]
#[serde(from = "CodeCacheData", into = "CodeCacheData")]
pub struct CodeCache {
    interpreter: Range<Address>,
    call_stub: Range<Address>,
    call_stub_return: Address,
    blobs: Vec<CodeBlob>,
    index: RangeMap<Address, usize>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CodeCacheData {
    pub interpreter: Range<Address>,
    pub call_stub: Range<Address>,
    pub call_stub_return: Address,
    #[serde(default)]
    pub blobs: Vec<CodeBlob>,
}

impl From<CodeCacheData> for CodeCache {
    fn from(data: CodeCacheData) -> Self {
        let CodeCacheData { interpreter, call_stub, call_stub_return, blobs } = data;
        let mut res = CodeCache::new(interpreter, call_stub, call_stub_return);
        for blob in blobs {
            res.add_blob(blob);
        }
        res
    }
}

impl From<CodeCache> for CodeCacheData {
    fn from(code_cache: CodeCache) -> Self {
        let CodeCache { interpreter, call_stub, call_stub_return, blobs, index: _ } = code_cache;
        CodeCacheData { interpreter, call_stub, call_stub_return, blobs }
    }
}

impl CodeCache {
    pub fn new(interpreter: Range<Address>, call_stub: Range<Address>, call_stub_return: Address) -> Self {
        Self {
            interpreter,
            call_stub,
            call_stub_return,
            blobs: vec![],
            index: RangeMap::new(),
        }
    }

    pub fn add_blob(&mut self, blob: CodeBlob) -> usize {
        let blob_index = self.blobs.len();
        let range = blob.code_begin..blob.code_end();
        if range.is_empty() {
            warn!("code blob {} has no code, it will never be found by pc", blob.name);
        } else {
            self.index.insert(range, blob_index);
        }
        self.blobs.push(blob);
        blob_index
    }

    pub fn interpreter(&self) -> &Range<Address> {
        &self.interpreter
    }

    pub fn call_stub(&self) -> &Range<Address> {
        &self.call_stub
    }

    /// the pc a java frame called from the call stub returns to
    pub fn call_stub_return(&self) -> Address {
        self.call_stub_return
    }

    pub fn blobs(&self) -> &[CodeBlob] {
        self.blobs.as_slice()
    }

    pub fn blob(&self, blob_index: usize) -> Option<&CodeBlob> {
        self.blobs.get(blob_index)
    }

    pub fn blob_named(&self, name: &str) -> Option<&CodeBlob> {
        self.blobs.iter().find(|blob| blob.name == name)
    }

    pub fn find_blob(&self, pc: Address) -> Option<&CodeBlob> {
        let blob_index = *self.index.get(&pc)?;
        self.blobs.get(blob_index)
    }

    pub fn is_in_interpreter(&self, pc: Address) -> bool {
        self.interpreter.contains(&pc)
    }

    pub fn is_call_stub(&self, pc: Address) -> bool {
        self.call_stub.contains(&pc)
    }

    pub fn contains(&self, pc: Address) -> bool {
        self.classify(pc).is_known()
    }

    pub fn classify(&self, pc: Address) -> CodeRegion<'_> {
        if self.is_in_interpreter(pc) {
            CodeRegion::Interpreter
        } else if self.is_call_stub(pc) {
            CodeRegion::CallStub
        } else if let Some(blob) = self.find_blob(pc) {
            CodeRegion::Blob(blob)
        } else {
            CodeRegion::Unknown
        }
    }

    pub fn describe(&self) -> String {
        self.blobs.iter()
            .map(|blob| format!("{} [{}, {}) {}", blob.kind_name(), blob.code_begin, blob.code_end(), blob.name))
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use sa_common::Address;

    use crate::blob::{BlobKind, CodeBlob};
    use crate::location::{Location, LocationType, ScopeValue};
    use crate::scope::{PcDesc, ScopeDesc, ScopeIndex, ScopeLookup};
    use crate::{CodeCache, CodeRegion};

    fn blob(name: &str, kind: BlobKind, code_begin: u64, code_size: u64) -> CodeBlob {
        CodeBlob {
            name: name.to_string(),
            kind,
            code_begin: Address(code_begin),
            code_size,
            frame_size_words: 4,
            method: None,
            caller_must_gc_arguments: false,
            oop_maps: vec![],
            pc_descs: vec![],
            scopes: vec![],
            deopt_handler_offset: None,
            orig_pc_offset: None,
            native_lock_slots: None,
        }
    }

    fn code_cache() -> CodeCache {
        let mut code_cache = CodeCache::new(Address(0x1000)..Address(0x2000), Address(0x2000)..Address(0x2100), Address(0x2080));
        code_cache.add_blob(blob("Foo.bar", BlobKind::Nmethod, 0x3000, 0x100));
        code_cache.add_blob(blob("resolve_stub", BlobKind::RuntimeStub, 0x3100, 0x40));
        code_cache.add_blob(blob("empty", BlobKind::BufferBlob, 0x3200, 0));
        code_cache
    }

    #[test]
    fn classify_regions() {
        let code_cache = code_cache();
        assert!(matches!(code_cache.classify(Address(0x1800)), CodeRegion::Interpreter));
        assert!(matches!(code_cache.classify(Address(0x2080)), CodeRegion::CallStub));
        match code_cache.classify(Address(0x30ff)) {
            CodeRegion::Blob(blob) => assert_eq!(blob.name, "Foo.bar"),
            other => panic!("unexpected {:?}", other),
        }
        match code_cache.classify(Address(0x3100)) {
            CodeRegion::Blob(blob) => assert!(blob.is_runtime_stub()),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(code_cache.classify(Address(0x3200)), CodeRegion::Unknown));
        assert!(!code_cache.contains(Address(0x9000)));
    }

    #[test]
    fn pc_desc_lookup() {
        let mut nmethod = blob("Foo.baz", BlobKind::Nmethod, 0x4000, 0x100);
        nmethod.scopes = vec![
            ScopeDesc {
                method: Address(0xaa00),
                bci: 7,
                sender: None,
                reexecute: false,
                locals: vec![ScopeValue::Location(Location::on_stack(8, LocationType::Normal))],
                expressions: vec![],
                monitors: vec![],
            },
            ScopeDesc {
                method: Address(0xbb00),
                bci: 3,
                sender: Some(ScopeIndex(0)),
                reexecute: false,
                locals: vec![],
                expressions: vec![],
                monitors: vec![],
            },
        ];
        nmethod.pc_descs = vec![
            PcDesc { pc_offset: 0x20, scope: Some(ScopeIndex(0)) },
            PcDesc { pc_offset: 0x40, scope: Some(ScopeIndex(1)) },
        ];
        assert!(nmethod.scope_at(Address(0x4030), ScopeLookup::Exact).is_none());
        let near = nmethod.scope_at(Address(0x4030), ScopeLookup::Nearest).unwrap();
        assert_eq!(near.bci(), 7);
        assert!(near.is_top());
        let exact = nmethod.scope_at(Address(0x4040), ScopeLookup::Exact).unwrap();
        assert_eq!(exact.bci(), 3);
        assert!(!exact.is_top());
        assert_eq!(exact.sender().unwrap(), near);
        // before every descriptor: fall back to the first one
        let first = nmethod.pc_desc_near(Address(0x4000)).unwrap();
        assert_eq!(first.pc_offset, 0x20);
    }

    #[test]
    fn scope_chains_only_lead_to_earlier_scopes() {
        let mut nmethod = blob("Foo.spin", BlobKind::Nmethod, 0x5000, 0x100);
        let scope = |sender: Option<usize>| ScopeDesc {
            method: Address(0xaa00),
            bci: 1,
            sender: sender.map(ScopeIndex),
            reexecute: false,
            locals: vec![],
            expressions: vec![],
            monitors: vec![],
        };
        nmethod.scopes = vec![scope(Some(0)), scope(Some(2)), scope(Some(0))];
        nmethod.pc_descs = vec![PcDesc { pc_offset: 0x10, scope: Some(ScopeIndex(0)) }];
        let looping = nmethod.scope(ScopeIndex(0)).unwrap();
        assert!(looping.sender().is_none());
        assert!(looping.is_top());
        assert!(nmethod.scope(ScopeIndex(1)).unwrap().sender().is_none());
        assert_eq!(nmethod.scope(ScopeIndex(2)).unwrap().sender().unwrap().index(), ScopeIndex(0));
        assert_eq!(nmethod.malformed_scope(), Some(ScopeIndex(0)));

        nmethod.scopes = vec![scope(None), scope(Some(0))];
        assert_eq!(nmethod.malformed_scope(), None);
        nmethod.pc_descs.push(PcDesc { pc_offset: 0x20, scope: Some(ScopeIndex(5)) });
        assert_eq!(nmethod.malformed_scope(), Some(ScopeIndex(5)));
    }

    #[test]
    fn snapshot_form_rebuilds_index() {
        let code_cache = code_cache();
        let text = ron::to_string(&code_cache).unwrap();
        let reloaded: CodeCache = ron::from_str(text.as_str()).unwrap();
        assert_eq!(reloaded.blobs().len(), 3);
        assert_eq!(reloaded.find_blob(Address(0x3120)).unwrap().name, "resolve_stub");
    }
}
