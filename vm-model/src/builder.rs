//! Lays out thread stacks the way the x86-64 VM would, for tests and demo snapshots.
//!
//! Frames are pushed oldest first. Every push writes the return address and saved frame pointer
//! the walker will read back, so the frames recorded here are exactly what a correct walk finds.

use std::collections::BTreeMap;
use std::ops::Range;

use code_cache::blob::{BlobKind, CodeBlob};
use code_cache::CodeCache;
use sa_common::{Address, WORD_SIZE};

use crate::heap::{EETOP_FIELD, HeapObject, ObjectHeap, PARK_BLOCKER_FIELD, THREAD_CLASS, THREAD_STATUS_FIELD, ThreadStatus};
use crate::layout::{anchor_last_java_fp_offset, anchor_last_java_pc_offset, anchor_last_java_sp_offset, BASIC_OBJECT_LOCK_OBJ_OFFSET, BASIC_OBJECT_LOCK_SIZE_WORDS, call_wrapper_anchor_offset, call_wrapper_size, ENTRY_FRAME_CALL_WRAPPER_OFFSET, INTERPRETER_FRAME_BCP_OFFSET, INTERPRETER_FRAME_INITIAL_SP_OFFSET, INTERPRETER_FRAME_LAST_SP_OFFSET, INTERPRETER_FRAME_LOCALS_OFFSET, INTERPRETER_FRAME_METHOD_OFFSET, INTERPRETER_FRAME_SENDER_SP_OFFSET, NarrowOopEncoding};
use crate::memory::SparseMemory;
use crate::methods::Method;
use crate::monitors::ObjectMonitor;
use crate::threads::{FrameAnchor, JavaThread, JavaThreadState, RegisterContext};
use crate::vm::{Capabilities, VmSnapshot};

const INTERPRETER_BEGIN: Address = Address(0x0000_7f00_1000_0000);
const INTERPRETER_SIZE: i64 = 0x1_0000;
const INTERPRETER_PC_OFFSET: i64 = 0x200;
const CALL_STUB_SIZE: i64 = 0x100;
const CALL_STUB_RETURN_OFFSET: i64 = 0x40;
const CODE_HEAP_BEGIN: Address = Address(0x0000_7f00_2000_0000);
const BLOB_SIZE: u64 = 0x400;
const METHOD_AREA_BEGIN: Address = Address(0x0000_0008_0000_0000);
const BYTECODE_AREA_BEGIN: Address = Address(0x0000_0008_1000_0000);
const BYTECODE_AREA_STRIDE: i64 = 0x1000;
const HEAP_BEGIN: Address = Address(0x0000_0007_f000_0000);
const OBJECT_SIZE: i64 = 0x20;
const MONITOR_AREA_BEGIN: Address = Address(0x0000_7f00_7000_0000);
const THREAD_AREA_BEGIN: Address = Address(0x0000_7f00_8000_0000);
const STACK_AREA_TOP: Address = Address(0x0000_7ffe_0000_0000);
const STACK_SIZE: u64 = 0x8_0000;
const NATIVE_CODE_BEGIN: Address = Address(0x0000_7f00_f000_0000);
const EXTERNAL_FRAME_WORDS: i64 = 4;
const UNLOCKED_MARK: u64 = 0x1;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ImageKind {
    /// the native frame every thread starts in
    ThreadRoot,
    Entry,
    Interpreted,
    Compiled,
    NativeWrapper,
    Stub,
    External,
}

/// A frame as laid out in memory, the pc is the one a walker should report.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FrameImage {
    pub kind: ImageKind,
    pub raw_sp: Address,
    pub unextended_sp: Address,
    pub fp: Address,
    pub pc: Address,
    pub deoptimized: bool,
}

#[derive(Clone, Debug)]
pub struct BuiltThread {
    pub address: Address,
    /// youngest first, ending with the thread root
    pub frames: Vec<FrameImage>,
}

impl BuiltThread {
    pub fn frames_of_kind(&self, kind: ImageKind) -> impl Iterator<Item=&FrameImage> {
        self.frames.iter().filter(move |frame| frame.kind == kind)
    }
}

/// How the thread was caught when the image was taken.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Capture {
    /// stopped at a safepoint, the anchor points at the youngest code cache frame
    Safepoint,
    /// running, only the register context is known
    Running,
    /// running outside java code with the anchor still set
    RunningInVm,
}

#[derive(Clone, Debug, Default)]
pub struct InterpretedContents {
    pub locals: Vec<u64>,
    pub expressions: Vec<u64>,
    /// locked objects, oldest first
    pub monitors: Vec<Address>,
}

pub struct StackImageBuilder {
    memory: SparseMemory,
    blobs: Vec<CodeBlob>,
    methods: Vec<Method>,
    heap: ObjectHeap,
    threads: Vec<JavaThread>,
    monitors: Vec<ObjectMonitor>,
    capabilities: Capabilities,
    debugging: bool,
    narrow_oops: NarrowOopEncoding,
    next_native_pc: Address,
}

impl Default for StackImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StackImageBuilder {
    pub fn new() -> Self {
        Self {
            memory: SparseMemory::new(),
            blobs: vec![],
            methods: vec![],
            heap: ObjectHeap::new(),
            threads: vec![],
            monitors: vec![],
            capabilities: Capabilities::default(),
            debugging: false,
            narrow_oops: NarrowOopEncoding::default(),
            next_native_pc: NATIVE_CODE_BEGIN,
        }
    }

    pub fn interpreter() -> Range<Address> {
        INTERPRETER_BEGIN..INTERPRETER_BEGIN.offset(INTERPRETER_SIZE)
    }

    pub fn call_stub() -> Range<Address> {
        let begin = INTERPRETER_BEGIN.offset(INTERPRETER_SIZE);
        begin..begin.offset(CALL_STUB_SIZE)
    }

    pub fn call_stub_return() -> Address {
        Self::call_stub().start.offset(CALL_STUB_RETURN_OFFSET)
    }

    pub fn interpreter_pc() -> Address {
        INTERPRETER_BEGIN.offset(INTERPRETER_PC_OFFSET)
    }

    pub fn memory_mut(&mut self) -> &mut SparseMemory {
        &mut self.memory
    }

    pub fn set_debugging(&mut self, debugging: bool) -> &mut Self {
        self.debugging = debugging;
        self
    }

    pub fn set_capabilities(&mut self, capabilities: Capabilities) -> &mut Self {
        self.capabilities = capabilities;
        self
    }

    pub fn narrow_oops(&self) -> NarrowOopEncoding {
        self.narrow_oops
    }

    pub fn method(&mut self, holder: &str, name: &str, signature: &str, max_locals: u16) -> Address {
        let index = self.methods.len() as i64;
        let address = METHOD_AREA_BEGIN.add_words(index * 32);
        self.methods.push(Method {
            address,
            holder: holder.to_string(),
            name: name.to_string(),
            signature: signature.to_string(),
            access_flags: 0,
            max_locals,
            max_stack: 8,
            code_base: BYTECODE_AREA_BEGIN.offset(index * BYTECODE_AREA_STRIDE),
            code_size: 0x100,
            line_numbers: vec![],
            oop_masks: BTreeMap::new(),
        });
        address
    }

    pub fn method_mut(&mut self, address: Address) -> &mut Method {
        self.methods.iter_mut()
            .find(|method| method.address == address)
            .unwrap_or_else(|| panic!("no method at {}", address))
    }

    fn method_ref(&self, address: Address) -> &Method {
        self.methods.iter()
            .find(|method| method.address == address)
            .unwrap_or_else(|| panic!("no method at {}", address))
    }

    /// Adds an empty code blob and returns its first instruction.
    pub fn code_blob(&mut self, kind: BlobKind, name: &str, method: Option<Address>, frame_size_words: u64) -> Address {
        assert!(frame_size_words >= 2, "a compiled frame holds at least the return address and saved fp");
        let code_begin = CODE_HEAP_BEGIN.offset((self.blobs.len() as u64 * BLOB_SIZE) as i64);
        self.blobs.push(CodeBlob {
            name: name.to_string(),
            kind,
            code_begin,
            code_size: BLOB_SIZE,
            frame_size_words,
            method,
            caller_must_gc_arguments: false,
            oop_maps: vec![],
            pc_descs: vec![],
            scopes: vec![],
            deopt_handler_offset: None,
            orig_pc_offset: None,
            native_lock_slots: None,
        });
        code_begin
    }

    pub fn blob_mut(&mut self, code_begin: Address) -> &mut CodeBlob {
        self.blobs.iter_mut()
            .find(|blob| blob.code_begin == code_begin)
            .unwrap_or_else(|| panic!("no code blob at {}", code_begin))
    }

    fn blob_ref(&self, code_begin: Address) -> &CodeBlob {
        self.blobs.iter()
            .find(|blob| blob.code_begin == code_begin)
            .unwrap_or_else(|| panic!("no code blob at {}", code_begin))
    }

    pub fn class(&mut self, name: &str, super_name: &str) -> &mut Self {
        self.heap.declare_class(name, super_name);
        self
    }

    pub fn object(&mut self, klass: &str) -> Address {
        let address = HEAP_BEGIN.offset(self.heap.len() as i64 * OBJECT_SIZE);
        self.heap.insert(address, HeapObject { klass: klass.to_string(), fields: BTreeMap::new() });
        address
    }

    pub fn set_field(&mut self, object: Address, name: &str, value: u64) -> &mut Self {
        assert!(self.heap.set_field(object, name, value), "no object at {}", object);
        self
    }

    pub fn monitor(&mut self, object: Option<Address>) -> Address {
        let address = MONITOR_AREA_BEGIN.add_words(self.monitors.len() as i64 * 8);
        self.monitors.push(ObjectMonitor { address, owner: Address::NULL, object, recursions: 0 });
        address
    }

    pub fn set_monitor_owner(&mut self, monitor: Address, owner: Address) -> &mut Self {
        let monitor = self.monitors.iter_mut()
            .find(|known| known.address == monitor)
            .unwrap_or_else(|| panic!("no monitor at {}", monitor));
        monitor.owner = owner;
        self
    }

    /// A pc in native code outside the code cache.
    pub fn native_pc(&mut self) -> Address {
        let res = self.next_native_pc;
        self.next_native_pc = res.offset(0x40);
        res
    }

    pub fn thread(&mut self, name: &str) -> ThreadBuilder<'_> {
        ThreadBuilder::new(self, name)
    }

    pub fn build(self) -> VmSnapshot {
        let mut code_cache = CodeCache::new(Self::interpreter(), Self::call_stub(), Self::call_stub_return());
        for blob in self.blobs {
            code_cache.add_blob(blob);
        }
        VmSnapshot {
            memory: self.memory,
            code_cache,
            methods: self.methods,
            heap: self.heap,
            threads: self.threads,
            monitors: self.monitors,
            capabilities: self.capabilities,
            debugging: self.debugging,
            narrow_oops: self.narrow_oops,
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct PendingFrame {
    kind: ImageKind,
    unextended_sp: Address,
    fp: Address,
    /// as stored in memory by a callee
    pc: Address,
    reported_pc: Address,
    deoptimized: bool,
}

pub struct ThreadBuilder<'b> {
    builder: &'b mut StackImageBuilder,
    thread: JavaThread,
    youngest: PendingFrame,
    finished: Vec<FrameImage>,
    /// youngest code cache frame since the last entry frame
    last_java: Option<PendingFrame>,
}

impl<'b> ThreadBuilder<'b> {
    fn new(builder: &'b mut StackImageBuilder, name: &str) -> Self {
        let index = builder.threads.len() as i64;
        let address = THREAD_AREA_BEGIN.offset(index * 0x1000);
        let stack_base = STACK_AREA_TOP.offset(-index * 2 * STACK_SIZE as i64);
        let thread_oop = builder.object(THREAD_CLASS);
        builder.set_field(thread_oop, EETOP_FIELD, address.0);
        builder.set_field(thread_oop, THREAD_STATUS_FIELD, ThreadStatus::Runnable.jvmti_bits());
        let root_fp = stack_base.add_words(-2);
        let root_pc = builder.native_pc();
        let root = PendingFrame {
            kind: ImageKind::ThreadRoot,
            unextended_sp: root_fp.add_words(-EXTERNAL_FRAME_WORDS),
            fp: root_fp,
            pc: root_pc,
            reported_pc: root_pc,
            deoptimized: false,
        };
        Self {
            builder,
            thread: JavaThread {
                address,
                name: name.to_string(),
                state: JavaThreadState::InJava,
                thread_oop: Some(thread_oop),
                anchor: FrameAnchor::default(),
                context: None,
                stack_base,
                stack_size: STACK_SIZE,
                current_pending_monitor: None,
                current_waiting_monitor: None,
            },
            youngest: root,
            finished: vec![],
            last_java: None,
        }
    }

    pub fn address(&self) -> Address {
        self.thread.address
    }

    pub fn thread_oop(&self) -> Address {
        self.thread.thread_oop.unwrap_or(Address::NULL)
    }

    pub fn pending_monitor(&mut self, monitor: Address) -> &mut Self {
        self.thread.current_pending_monitor = Some(monitor);
        self
    }

    pub fn waiting_monitor(&mut self, monitor: Address) -> &mut Self {
        self.thread.current_waiting_monitor = Some(monitor);
        self
    }

    pub fn park_blocker(&mut self, blocker: Address) -> &mut Self {
        let thread_oop = self.thread_oop();
        self.builder.set_field(thread_oop, PARK_BLOCKER_FIELD, blocker.0);
        self
    }

    pub fn thread_status(&mut self, status: ThreadStatus) -> &mut Self {
        let thread_oop = self.thread_oop();
        self.builder.set_field(thread_oop, THREAD_STATUS_FIELD, status.jvmti_bits());
        self
    }

    fn write(&mut self, address: Address, value: u64) {
        assert!(self.thread.is_in_stack(address), "{} is outside the stack of \"{}\"", address, self.thread.name);
        self.builder.memory.write_u64(address, value);
    }

    /// Pushes the return address and saved fp of the current youngest frame below `callee_entry_sp`
    /// and returns the callee's fp.
    fn push_return(&mut self, callee_entry_sp: Address) -> Address {
        let caller = self.youngest;
        self.write(callee_entry_sp.add_words(-1), caller.pc.0);
        self.write(callee_entry_sp.add_words(-2), caller.fp.0);
        self.finished.push(FrameImage {
            kind: caller.kind,
            raw_sp: callee_entry_sp,
            unextended_sp: caller.unextended_sp,
            fp: caller.fp,
            pc: caller.reported_pc,
            deoptimized: caller.deoptimized,
        });
        callee_entry_sp.add_words(-2)
    }

    fn push(&mut self, frame: PendingFrame) {
        self.youngest = frame;
        if !matches!(frame.kind, ImageKind::Entry | ImageKind::External | ImageKind::ThreadRoot) {
            self.last_java = Some(frame);
        }
    }

    /// A call stub frame. Its call wrapper records the youngest java frame pushed since the previous
    /// entry frame, if any, so the walk can cross the native code in between.
    pub fn entry_frame(&mut self) -> &mut Self {
        let caller_sp = self.youngest.unextended_sp;
        let fp = self.push_return(caller_sp);
        let wrapper = fp.add_words(ENTRY_FRAME_CALL_WRAPPER_OFFSET - 1).offset(-call_wrapper_size());
        self.write(fp.add_words(ENTRY_FRAME_CALL_WRAPPER_OFFSET), wrapper.0);
        self.write(wrapper, self.thread.address.0);
        let anchor = wrapper.offset(call_wrapper_anchor_offset());
        let (last_sp, last_fp, last_pc) = match self.last_java.take() {
            None => (Address::NULL, Address::NULL, Address::NULL),
            Some(java) => (java.unextended_sp, java.fp, java.pc),
        };
        self.write(anchor.offset(anchor_last_java_sp_offset()), last_sp.0);
        self.write(anchor.offset(anchor_last_java_fp_offset()), last_fp.0);
        self.write(anchor.offset(anchor_last_java_pc_offset()), last_pc.0);
        let pc = StackImageBuilder::call_stub_return();
        self.push(PendingFrame { kind: ImageKind::Entry, unextended_sp: wrapper, fp, pc, reported_pc: pc, deoptimized: false });
        self
    }

    pub fn interpreted_frame(&mut self, method: Address, bci: i32, contents: InterpretedContents) -> &mut Self {
        let (max_locals, bcp) = {
            let method = self.builder.method_ref(method);
            let bcp = if method.is_native() { Address::NULL } else { method.bcp_from_bci(bci) };
            (method.max_locals as i64, bcp)
        };
        let caller_sp = self.youngest.unextended_sp;
        let local_count = max_locals.max(contents.locals.len() as i64);
        let locals = caller_sp.add_words(-1);
        for i in 0..local_count {
            let value = contents.locals.get(i as usize).copied().unwrap_or(0);
            self.write(locals.add_words(-i), value);
        }
        let fp = self.push_return(caller_sp.add_words(-local_count));
        self.write(fp.add_words(INTERPRETER_FRAME_SENDER_SP_OFFSET), caller_sp.0);
        self.write(fp.add_words(INTERPRETER_FRAME_LAST_SP_OFFSET), 0);
        self.write(fp.add_words(INTERPRETER_FRAME_METHOD_OFFSET), method.0);
        self.write(fp.add_words(INTERPRETER_FRAME_LOCALS_OFFSET), locals.0);
        self.write(fp.add_words(INTERPRETER_FRAME_BCP_OFFSET), bcp.0);
        let monitor_begin = fp.add_words(INTERPRETER_FRAME_INITIAL_SP_OFFSET);
        let mut monitor_end = monitor_begin;
        for object in contents.monitors.iter() {
            monitor_end = monitor_end.add_words(-BASIC_OBJECT_LOCK_SIZE_WORDS);
            self.write(monitor_end, UNLOCKED_MARK);
            self.write(monitor_end.offset(BASIC_OBJECT_LOCK_OBJ_OFFSET), object.0);
        }
        self.write(monitor_begin, monitor_end.0);
        for (i, value) in contents.expressions.iter().enumerate() {
            self.write(monitor_end.add_words(-1 - i as i64), *value);
        }
        let sp = monitor_end.add_words(-(contents.expressions.len() as i64));
        let pc = StackImageBuilder::interpreter_pc();
        self.push(PendingFrame { kind: ImageKind::Interpreted, unextended_sp: sp, fp, pc, reported_pc: pc, deoptimized: false });
        self
    }

    /// A frame of any code blob. `slots` are written at byte offsets from the new frame's sp.
    pub fn compiled_frame(&mut self, code_begin: Address, pc_offset: u64, slots: &[(i64, u64)]) -> &mut Self {
        let pc = code_begin.offset(pc_offset as i64);
        self.blob_frame(code_begin, pc, pc, false, slots)
    }

    /// A compiled frame whose return address was patched to the deopt handler.
    pub fn deoptimized_frame(&mut self, code_begin: Address, original_pc_offset: u64, slots: &[(i64, u64)]) -> &mut Self {
        let (handler, orig_pc_offset) = {
            let blob = self.builder.blob_ref(code_begin);
            match (blob.deopt_handler_offset, blob.orig_pc_offset) {
                (Some(handler), Some(orig_pc_offset)) => (code_begin.offset(handler as i64), orig_pc_offset),
                _ => panic!("{} has no deopt handler", blob.name),
            }
        };
        let original_pc = code_begin.offset(original_pc_offset as i64);
        let mut slots = slots.to_vec();
        slots.push((orig_pc_offset, original_pc.0));
        self.blob_frame(code_begin, handler, original_pc, true, slots.as_slice())
    }

    fn blob_frame(&mut self, code_begin: Address, pc: Address, reported_pc: Address, deoptimized: bool, slots: &[(i64, u64)]) -> &mut Self {
        let (frame_size, kind) = {
            let blob = self.builder.blob_ref(code_begin);
            let kind = match blob.kind {
                BlobKind::Nmethod => ImageKind::Compiled,
                BlobKind::NativeWrapper => ImageKind::NativeWrapper,
                BlobKind::RuntimeStub | BlobKind::Adapter | BlobKind::BufferBlob => ImageKind::Stub,
            };
            (blob.frame_size_bytes(), kind)
        };
        let caller_sp = self.youngest.unextended_sp;
        let fp = self.push_return(caller_sp);
        let sp = caller_sp.offset(-frame_size);
        for (offset, value) in slots {
            assert!(*offset >= 0 && *offset < frame_size - 2 * WORD_SIZE as i64, "slot {} is outside the frame body", offset);
            self.write(sp.offset(*offset), *value);
        }
        self.push(PendingFrame { kind, unextended_sp: sp, fp, pc, reported_pc, deoptimized });
        self
    }

    /// A C frame outside the code cache, linked through its frame pointer.
    pub fn external_frame(&mut self) -> &mut Self {
        let caller_sp = self.youngest.unextended_sp;
        let fp = self.push_return(caller_sp);
        let pc = self.builder.native_pc();
        self.push(PendingFrame {
            kind: ImageKind::External,
            unextended_sp: fp.add_words(-EXTERNAL_FRAME_WORDS),
            fp,
            pc,
            reported_pc: pc,
            deoptimized: false,
        });
        self
    }

    pub fn finish(mut self, state: JavaThreadState, capture: Capture) -> BuiltThread {
        let youngest = self.youngest;
        self.finished.push(FrameImage {
            kind: youngest.kind,
            raw_sp: youngest.unextended_sp,
            unextended_sp: youngest.unextended_sp,
            fp: youngest.fp,
            pc: youngest.reported_pc,
            deoptimized: youngest.deoptimized,
        });
        let anchor = match self.last_java {
            Some(java) if capture != Capture::Running => FrameAnchor {
                last_java_sp: java.unextended_sp,
                last_java_fp: java.fp,
                last_java_pc: java.pc,
            },
            _ => FrameAnchor::default(),
        };
        self.thread.anchor = anchor;
        if capture != Capture::Safepoint {
            self.thread.context = Some(RegisterContext { pc: youngest.pc, sp: youngest.unextended_sp, fp: youngest.fp });
        }
        self.thread.state = state;
        let address = self.thread.address;
        self.builder.threads.push(self.thread);
        let mut frames = self.finished;
        frames.reverse();
        BuiltThread { address, frames }
    }
}
