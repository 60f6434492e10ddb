use frames::thread_frames::{current_frame_guess_with_precision, last_frame, new_register_map};
use sa_common::Precision;
use vm_model::{JavaThread, VM};

use crate::vframe::{JavaVFrame, new_vframe};

/// The youngest java frame of a thread stopped at a safepoint.
pub fn last_java_vframe<'v>(thread: &'v JavaThread, vm: &'v VM) -> Option<JavaVFrame<'v>> {
    let frame = last_frame(thread, vm)?;
    let mut current = new_vframe(frame, new_register_map(thread, true), thread, vm, false, Precision::Precise);
    while !current.is_java_frame() {
        current = current.sender(Precision::Precise)?;
    }
    current.into_java_vframe()
}

/// Like [`last_java_vframe`] for a thread that may be running. The first frame is marked
/// imprecise unless it came from the recorded anchor or the current frame guess had to be
/// discarded.
pub fn last_java_vframe_dbg<'v>(thread: &'v JavaThread, vm: &'v VM) -> Option<JavaVFrame<'v>> {
    let mut map = new_register_map(thread, true);
    let (mut frame, mut precision) = current_frame_guess_with_precision(thread, vm)?;
    if frame.is_interpreted_frame(vm) && !frame.is_interpreted_frame_valid(vm) {
        frame = frame.sender(&mut map, vm)?;
        precision = Precision::Precise;
    }
    let vframe = new_vframe(frame, map, thread, vm, true, precision);
    if vframe.is_java_frame() {
        vframe.into_java_vframe()
    } else {
        vframe.java_sender()
    }
}

/// Java frames of a thread, youngest first, the way a thread dump shows them.
pub fn java_vframes<'v>(thread: &'v JavaThread, vm: &'v VM) -> Vec<JavaVFrame<'v>> {
    let mut res = vec![];
    let mut current = if vm.debugging {
        last_java_vframe_dbg(thread, vm)
    } else {
        last_java_vframe(thread, vm)
    };
    while let Some(vframe) = current {
        current = vframe.java_sender();
        res.push(vframe);
    }
    res
}
