use log::debug;
use strum_macros::Display;

use code_cache::blob::{BlobKind, CodeBlob};
use code_cache::{CodeCache, CodeRegion};
use sa_common::{Address, Register};
use vm_model::layout::{anchor_last_java_fp_offset, anchor_last_java_pc_offset, anchor_last_java_sp_offset, BASIC_OBJECT_LOCK_LOCK_OFFSET, BASIC_OBJECT_LOCK_OBJ_OFFSET, BASIC_OBJECT_LOCK_SIZE_WORDS, call_wrapper_anchor_offset, ENTRY_FRAME_CALL_WRAPPER_OFFSET, INTERPRETER_FRAME_BCP_OFFSET, INTERPRETER_FRAME_LOCALS_OFFSET, INTERPRETER_FRAME_METHOD_OFFSET, INTERPRETER_FRAME_MONITOR_BLOCK_BOTTOM_OFFSET, INTERPRETER_FRAME_MONITOR_BLOCK_TOP_OFFSET, INTERPRETER_FRAME_SENDER_SP_OFFSET, LINK_OFFSET, MAX_INTERPRETED_FRAME_WORDS, RETURN_ADDR_OFFSET, SENDER_SP_OFFSET};
use vm_model::methods::Method;
use vm_model::threads::FrameAnchor;
use vm_model::VM;

use crate::register_map::RegisterMap;

/// What kind of code a frame is executing, decided by its pc alone.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum FrameKind {
    Interpreted,
    Compiled,
    /// compiled wrapper of a native method
    Native,
    /// call stub, where the vm calls into java
    Entry,
    RuntimeStub,
    External,
}

impl FrameKind {
    pub fn classify(pc: Address, code_cache: &CodeCache) -> FrameKind {
        match code_cache.classify(pc) {
            CodeRegion::Interpreter => FrameKind::Interpreted,
            CodeRegion::CallStub => FrameKind::Entry,
            CodeRegion::Blob(blob) => match blob.kind {
                BlobKind::Nmethod => FrameKind::Compiled,
                BlobKind::NativeWrapper => FrameKind::Native,
                BlobKind::RuntimeStub | BlobKind::Adapter | BlobKind::BufferBlob => FrameKind::RuntimeStub,
            },
            CodeRegion::Unknown => FrameKind::External,
        }
    }

    pub fn is_java(&self) -> bool {
        matches!(self, FrameKind::Interpreted | FrameKind::Compiled | FrameKind::Native)
    }
}

/// One lock record of an interpreted frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BasicObjectLock {
    pub address: Address,
    pub displaced_header: u64,
    pub obj: Option<Address>,
}

/// A physical activation record. Walking produces new frames, a frame is never changed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Frame {
    raw_sp: Address,
    /// sp before any extension by the callee (an adapter or the interpreter's locals)
    unextended_sp: Address,
    fp: Address,
    pc: Address,
    deoptimized: bool,
}

impl Frame {
    /// Recovers the original pc of a frame that returns into a deopt handler.
    pub fn new(vm: &VM, raw_sp: Address, unextended_sp: Address, fp: Address, pc: Address) -> Frame {
        let mut res = Frame { raw_sp, unextended_sp, fp, pc, deoptimized: false };
        if let Some(blob) = vm.code_cache.find_blob(pc) {
            if blob.is_deopt_handler(pc) {
                match blob.orig_pc_offset {
                    None => debug!("{} returns into its deopt handler but has no original pc slot", blob.name),
                    Some(orig_pc_offset) => {
                        res.pc = vm.memory().read_address(unextended_sp.offset(orig_pc_offset));
                        res.deoptimized = true;
                    }
                }
            }
        }
        res
    }

    pub fn at(vm: &VM, sp: Address, fp: Address, pc: Address) -> Frame {
        Frame::new(vm, sp, sp, fp, pc)
    }

    /// The pc is the return address just below `sp`.
    pub fn from_sp_fp(vm: &VM, sp: Address, fp: Address) -> Frame {
        let pc = vm.memory().read_address(sp.add_words(-1));
        Frame::at(vm, sp, fp, pc)
    }

    pub fn raw_sp(&self) -> Address {
        self.raw_sp
    }

    pub fn unextended_sp(&self) -> Address {
        self.unextended_sp
    }

    pub fn fp(&self) -> Address {
        self.fp
    }

    pub fn pc(&self) -> Address {
        self.pc
    }

    pub fn is_deoptimized(&self) -> bool {
        self.deoptimized
    }

    pub fn kind(&self, vm: &VM) -> FrameKind {
        FrameKind::classify(self.pc, &vm.code_cache)
    }

    pub fn code_blob<'v>(&self, vm: &'v VM) -> Option<&'v CodeBlob> {
        vm.code_cache.find_blob(self.pc)
    }

    pub fn is_interpreted_frame(&self, vm: &VM) -> bool {
        self.kind(vm) == FrameKind::Interpreted
    }

    pub fn is_compiled_frame(&self, vm: &VM) -> bool {
        self.kind(vm) == FrameKind::Compiled
    }

    pub fn is_native_frame(&self, vm: &VM) -> bool {
        self.kind(vm) == FrameKind::Native
    }

    pub fn is_entry_frame(&self, vm: &VM) -> bool {
        self.kind(vm) == FrameKind::Entry
    }

    pub fn is_runtime_frame(&self, vm: &VM) -> bool {
        self.kind(vm) == FrameKind::RuntimeStub
    }

    pub fn is_java_frame(&self, vm: &VM) -> bool {
        self.kind(vm).is_java()
    }

    fn read_slot(&self, vm: &VM, offset_words: i64) -> Address {
        vm.memory().read_address(self.fp.add_words(offset_words))
    }

    pub fn link(&self, vm: &VM) -> Address {
        self.read_slot(vm, LINK_OFFSET)
    }

    pub fn sender_pc(&self, vm: &VM) -> Address {
        self.read_slot(vm, RETURN_ADDR_OFFSET)
    }

    pub fn sender_sp(&self) -> Address {
        self.fp.add_words(SENDER_SP_OFFSET)
    }

    fn has_platform_sender(&self, vm: &VM) -> bool {
        match self.kind(vm) {
            FrameKind::External => !self.fp.is_null() && self.fp.is_word_aligned() && !self.sender_pc(vm).is_null(),
            _ => true,
        }
    }

    /// True for the bottom frame of a stack: an entry frame not called from java, or a frame
    /// that is neither java code nor has a platform defined sender.
    pub fn is_first_frame(&self, vm: &VM) -> bool {
        let kind = self.kind(vm);
        match kind {
            FrameKind::Entry => !self.entry_frame_anchor(vm).has_last_java_frame(),
            _ => !kind.is_java() && !self.has_platform_sender(vm),
        }
    }

    /// Computes the calling frame, updating `map` with the caller's register locations.
    pub fn sender(&self, map: &mut RegisterMap, vm: &VM) -> Option<Frame> {
        map.set_include_argument_oops(false);
        let kind = self.kind(vm);
        let res = match kind {
            FrameKind::Entry => self.sender_for_entry_frame(map, vm),
            FrameKind::Interpreted => self.sender_for_interpreter_frame(map, vm),
            FrameKind::Compiled | FrameKind::Native | FrameKind::RuntimeStub => {
                self.code_blob(vm).and_then(|blob| self.sender_for_compiled_frame(map, vm, blob))
            }
            FrameKind::External => self.sender_for_external_frame(vm),
        };
        let res = res.filter(|sender| {
            let sane = !sender.pc.is_null() && sender.raw_sp > self.raw_sp;
            if !sane {
                debug!("discarding sender of {} frame at {}: sp {} pc {}", kind, self.pc, sender.raw_sp, sender.pc);
            }
            sane
        });
        vm.tracing.trace_sender(kind, self.pc, res.map(|sender| (sender.raw_sp, sender.pc)));
        res
    }

    /// Like [`Frame::sender`] but skips frames of runtime stubs.
    pub fn real_sender(&self, map: &mut RegisterMap, vm: &VM) -> Option<Frame> {
        let mut res = self.sender(map, vm)?;
        while res.is_runtime_frame(vm) {
            res = res.sender(map, vm)?;
        }
        Some(res)
    }

    fn sender_for_entry_frame(&self, map: &mut RegisterMap, vm: &VM) -> Option<Frame> {
        let anchor = self.entry_frame_anchor(vm);
        map.clear();
        if !anchor.has_last_java_frame() {
            return None;
        }
        Some(if anchor.last_java_pc.is_null() {
            Frame::from_sp_fp(vm, anchor.last_java_sp, anchor.last_java_fp)
        } else {
            Frame::at(vm, anchor.last_java_sp, anchor.last_java_fp, anchor.last_java_pc)
        })
    }

    fn sender_for_interpreter_frame(&self, map: &mut RegisterMap, vm: &VM) -> Option<Frame> {
        let unextended_sp = self.read_slot(vm, INTERPRETER_FRAME_SENDER_SP_OFFSET);
        let sp = self.sender_sp();
        if map.update_map() {
            map.set_location(Register::Rbp, self.fp.add_words(LINK_OFFSET));
        }
        Some(Frame::new(vm, sp, unextended_sp, self.link(vm), self.sender_pc(vm)))
    }

    fn sender_for_compiled_frame(&self, map: &mut RegisterMap, vm: &VM, blob: &CodeBlob) -> Option<Frame> {
        if blob.frame_size_words == 0 {
            debug!("{} has no frame size", blob.name);
            return None;
        }
        let sender_sp = self.unextended_sp.offset(blob.frame_size_bytes());
        let sender_pc = vm.memory().read_address(sender_sp.add_words(-RETURN_ADDR_OFFSET));
        let saved_fp_address = sender_sp.add_words(-SENDER_SP_OFFSET);
        if map.update_map() {
            map.set_include_argument_oops(blob.caller_must_gc_arguments);
            if let Some(oop_map) = blob.oop_map_at(self.pc) {
                for (register, stack_offset) in oop_map.callee_saved() {
                    map.set_location(register, self.unextended_sp.offset(stack_offset));
                }
            }
            map.set_location(Register::Rbp, saved_fp_address);
        }
        Some(Frame::at(vm, sender_sp, vm.memory().read_address(saved_fp_address), sender_pc))
    }

    fn sender_for_external_frame(&self, vm: &VM) -> Option<Frame> {
        if !self.has_platform_sender(vm) {
            return None;
        }
        Some(Frame::at(vm, self.sender_sp(), self.link(vm), self.sender_pc(vm)))
    }

    pub fn entry_frame_call_wrapper(&self, vm: &VM) -> Address {
        self.read_slot(vm, ENTRY_FRAME_CALL_WRAPPER_OFFSET)
    }

    /// The java frame the thread was in when it made the call this entry frame belongs to.
    pub fn entry_frame_anchor(&self, vm: &VM) -> FrameAnchor {
        let wrapper = self.entry_frame_call_wrapper(vm);
        if wrapper.is_null() {
            return FrameAnchor::default();
        }
        let anchor = wrapper.offset(call_wrapper_anchor_offset());
        let memory = vm.memory();
        FrameAnchor {
            last_java_sp: memory.read_address(anchor.offset(anchor_last_java_sp_offset())),
            last_java_fp: memory.read_address(anchor.offset(anchor_last_java_fp_offset())),
            last_java_pc: memory.read_address(anchor.offset(anchor_last_java_pc_offset())),
        }
    }

    pub fn interpreter_frame_method(&self, vm: &VM) -> Address {
        self.read_slot(vm, INTERPRETER_FRAME_METHOD_OFFSET)
    }

    pub fn interpreter_frame_method_info<'v>(&self, vm: &'v VM) -> Option<&'v Method> {
        vm.method(self.interpreter_frame_method(vm))
    }

    pub fn interpreter_frame_bcp(&self, vm: &VM) -> Address {
        self.read_slot(vm, INTERPRETER_FRAME_BCP_OFFSET)
    }

    pub fn interpreter_frame_bci(&self, vm: &VM) -> i32 {
        match self.interpreter_frame_method_info(vm) {
            None => 0,
            Some(method) => method.bci_from_bcp(self.interpreter_frame_bcp(vm)),
        }
    }

    pub fn interpreter_frame_local_address(&self, vm: &VM, index: usize) -> Address {
        self.read_slot(vm, INTERPRETER_FRAME_LOCALS_OFFSET).add_words(-(index as i64))
    }

    /// Lock records run from here down to the monitor end.
    pub fn interpreter_frame_monitor_begin(&self) -> Address {
        self.fp.add_words(INTERPRETER_FRAME_MONITOR_BLOCK_BOTTOM_OFFSET)
    }

    pub fn interpreter_frame_monitor_end(&self, vm: &VM) -> Address {
        self.read_slot(vm, INTERPRETER_FRAME_MONITOR_BLOCK_TOP_OFFSET)
    }

    /// Oldest first.
    pub fn interpreter_frame_monitors(&self, vm: &VM) -> Vec<BasicObjectLock> {
        let begin = self.interpreter_frame_monitor_begin();
        let end = self.interpreter_frame_monitor_end(vm);
        if end > begin || begin.minus(end) > MAX_INTERPRETED_FRAME_WORDS * 8 {
            debug!("implausible monitor block [{}, {}) in interpreted frame at {}", end, begin, self.fp);
            return vec![];
        }
        let memory = vm.memory();
        let mut res = vec![];
        let mut current = begin.add_words(-BASIC_OBJECT_LOCK_SIZE_WORDS);
        while current >= end {
            res.push(BasicObjectLock {
                address: current,
                displaced_header: memory.read_u64(current.offset(BASIC_OBJECT_LOCK_LOCK_OFFSET)),
                obj: memory.read_address(current.offset(BASIC_OBJECT_LOCK_OBJ_OFFSET)).non_null(),
            });
            current = current.add_words(-BASIC_OBJECT_LOCK_SIZE_WORDS);
        }
        res
    }

    pub fn interpreter_frame_expression_stack_address(&self, vm: &VM, index: usize) -> Address {
        self.interpreter_frame_monitor_end(vm).add_words(-1 - index as i64)
    }

    pub fn interpreter_frame_expression_stack_size(&self, vm: &VM) -> usize {
        let words = self.interpreter_frame_monitor_end(vm).minus(self.unextended_sp) / 8;
        if words < 0 || words > MAX_INTERPRETED_FRAME_WORDS {
            debug!("implausible expression stack of {} words in interpreted frame at {}", words, self.fp);
            return 0;
        }
        words as usize
    }

    /// Sanity check for frames made up from registers of a running thread.
    pub fn is_interpreted_frame_valid(&self, vm: &VM) -> bool {
        if !self.is_interpreted_frame(vm) {
            return false;
        }
        if self.fp.is_null() || self.unextended_sp.is_null() || !self.fp.is_word_aligned() || !self.unextended_sp.is_word_aligned() {
            return false;
        }
        if self.fp <= self.unextended_sp || self.fp.minus(self.unextended_sp) > MAX_INTERPRETED_FRAME_WORDS * 8 {
            return false;
        }
        let method = match vm.methods.get(&self.interpreter_frame_method(vm)) {
            None => return false,
            Some(method) => method,
        };
        if !method.is_native() && !method.contains_bcp(self.interpreter_frame_bcp(vm)) {
            return false;
        }
        if self.read_slot(vm, INTERPRETER_FRAME_LOCALS_OFFSET) < self.fp {
            return false;
        }
        let monitor_end = self.interpreter_frame_monitor_end(vm);
        monitor_end <= self.interpreter_frame_monitor_begin() && monitor_end >= self.unextended_sp
    }
}
