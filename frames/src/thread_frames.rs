use code_cache::CodeRegion;
use sa_common::{Address, Precision};
use vm_model::layout::{LINK_OFFSET, MAX_FRAME_GUESS_DEPTH, RETURN_ADDR_OFFSET, SENDER_SP_OFFSET};
use vm_model::{JavaThread, VM};

use crate::frame::Frame;
use crate::register_map::RegisterMap;

pub fn new_register_map(thread: &JavaThread, update_map: bool) -> RegisterMap {
    RegisterMap::new(thread.address, update_map)
}

/// The frame the thread recorded when it last left java code.
pub fn last_frame(thread: &JavaThread, vm: &VM) -> Option<Frame> {
    let anchor = &thread.anchor;
    if !anchor.has_last_java_frame() {
        return None;
    }
    Some(if anchor.last_java_pc.is_null() {
        Frame::from_sp_fp(vm, anchor.last_java_sp, anchor.last_java_fp)
    } else {
        Frame::at(vm, anchor.last_java_sp, anchor.last_java_fp, anchor.last_java_pc)
    })
}

/// Best effort top frame of a thread that may be running.
pub fn current_frame_guess(thread: &JavaThread, vm: &VM) -> Option<Frame> {
    current_frame_guess_with_precision(thread, vm).map(|(frame, _)| frame)
}

/// [`current_frame_guess`] with how far the guess can be trusted: a frame from the recorded
/// anchor is exact, one read from the register context or the fp chain is not.
pub fn current_frame_guess_with_precision(thread: &JavaThread, vm: &VM) -> Option<(Frame, Precision)> {
    let tracing = &vm.tracing;
    let from_anchor = |reason: &str| {
        tracing.trace_frame_guess(thread.name.as_str(), reason);
        last_frame(thread, vm).map(|frame| (frame, Precision::Precise))
    };
    let context = match thread.context {
        None => return from_anchor("no register context, using the last java frame"),
        Some(context) => context,
    };
    if context.sp.is_null() {
        return from_anchor("null sp, using the last java frame");
    }
    match vm.code_cache.classify(context.pc) {
        CodeRegion::Interpreter => {
            let frame = Frame::at(vm, context.sp, context.fp, context.pc);
            if frame.is_interpreted_frame_valid(vm) {
                tracing.trace_frame_guess(thread.name.as_str(), "valid interpreted frame at pc");
                return Some((frame, Precision::Imprecise));
            }
            tracing.trace_frame_guess(thread.name.as_str(), "interpreted frame at pc is not set up yet");
        }
        CodeRegion::CallStub | CodeRegion::Blob(_) => {
            tracing.trace_frame_guess(thread.name.as_str(), "pc in the code cache");
            return Some((Frame::at(vm, context.sp, context.fp, context.pc), Precision::Imprecise));
        }
        CodeRegion::Unknown => {
            if thread.has_last_java_frame() {
                return from_anchor("pc outside java code, using the last java frame");
            }
        }
    }
    scan_fp_chain(thread, vm, context.fp).map(|frame| (frame, Precision::Imprecise))
}

/// Follows saved frame pointers looking for a return address into java code.
fn scan_fp_chain(thread: &JavaThread, vm: &VM, start_fp: Address) -> Option<Frame> {
    let memory = vm.memory();
    let mut fp = start_fp;
    for _ in 0..MAX_FRAME_GUESS_DEPTH {
        if fp.is_null() || !fp.is_word_aligned() || !thread.is_in_stack(fp) {
            break;
        }
        let return_pc = memory.read_address(fp.add_words(RETURN_ADDR_OFFSET));
        let link = memory.read_address(fp.add_words(LINK_OFFSET));
        if vm.code_cache.contains(return_pc) {
            let frame = Frame::at(vm, fp.add_words(SENDER_SP_OFFSET), link, return_pc);
            if frame.is_java_frame(vm) {
                vm.tracing.trace_frame_guess(thread.name.as_str(), "found a return into java code on the fp chain");
                return Some(frame);
            }
        }
        if link <= fp {
            break;
        }
        fp = link;
    }
    vm.tracing.trace_frame_guess(thread.name.as_str(), "no java frame found");
    None
}
