use std::fmt;
use std::fmt::Write;

use sa_common::Address;
use vm_model::descriptor::external_class_name;
use vm_model::heap::{ABSTRACT_OWNABLE_SYNCHRONIZER, EXCLUSIVE_OWNER_THREAD_FIELD, ThreadStatus};
use vm_model::{JavaThread, VM};

use crate::stack_value::{MonitorInfo, MonitorOwner, StackValue};
use crate::thread_vframes::java_vframes;
use crate::vframe::JavaVFrame;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PrintOptions {
    /// lock lines after each frame
    pub locks: bool,
    /// ownable synchronizers held by each thread
    pub concurrent_locks: bool,
}

fn print_locked_object(out: &mut impl Write, vm: &VM, object: Address, lock_state: &str) -> fmt::Result {
    if object.is_null() {
        return Ok(());
    }
    writeln!(out, "\t- {} <{}> (a {})", lock_state, object, vm.heap.external_klass_name(object))
}

/// Only an inflated monitor can block a monitor enter.
fn identify_lock_state(vframe: &JavaVFrame<'_>, monitor: &MonitorInfo, waiting_state: &'static str) -> &'static str {
    let vm = vframe.vm();
    let thread = vframe.thread();
    let inflated = monitor.owner().and_then(|object| vm.monitors.for_object(object));
    match inflated {
        Some(inflated) if thread.current_pending_monitor == Some(inflated.address) || !vm.is_monitor_entered_by(inflated, thread) => waiting_state,
        _ => "locked",
    }
}

/// Lock lines for one frame. Frame 0 also shows what the thread is waiting on.
pub fn print_lock_info(out: &mut impl Write, vframe: &JavaVFrame<'_>, frame_count: usize) -> fmt::Result {
    let vm = vframe.vm();
    let thread = vframe.thread();
    if frame_count == 0 {
        if vframe.method().map(|method| method.is_object_wait()).unwrap_or(false) {
            let locals = vframe.locals();
            match locals.first() {
                None => writeln!(out, "\t- waiting on <no object reference available>")?,
                Some(StackValue::Object { handle, .. }) => {
                    let blocked = thread.thread_oop
                        .and_then(|thread_oop| vm.heap.thread_status(thread_oop))
                        .map(|status| status == ThreadStatus::Blocked)
                        .unwrap_or(false);
                    let wait_state = if blocked { "waiting to re-lock in wait()" } else { "waiting on" };
                    print_locked_object(out, vm, handle.unwrap_or(Address::NULL), wait_state)?;
                }
                Some(StackValue::Int(_)) | Some(StackValue::Conflict) => {}
            }
        } else if let Some(blocker) = thread.current_park_blocker(&vm.heap) {
            writeln!(out, "\t- parking to wait for <{}> (a {})", blocker, vm.heap.external_klass_name(blocker))?;
        }
    }

    let mut found_first_monitor = false;
    for monitor in vframe.monitors().iter().rev() {
        if monitor.eliminated && vframe.is_compiled_frame() {
            match &monitor.owner {
                MonitorOwner::ScalarReplaced { klass } => {
                    writeln!(out, "\t- eliminated <owner is scalar replaced> (a {})", external_class_name(klass.as_str()))?;
                }
                MonitorOwner::Object(owner) => {
                    if let Some(owner) = owner {
                        print_locked_object(out, vm, *owner, "eliminated")?;
                    }
                }
            }
            continue;
        }
        if let Some(owner) = monitor.owner() {
            let lock_state = if !found_first_monitor && frame_count == 0 {
                identify_lock_state(vframe, monitor, "waiting to lock")
            } else {
                "locked"
            };
            print_locked_object(out, vm, owner, lock_state)?;
            found_first_monitor = true;
        }
    }
    Ok(())
}

pub fn print_java_frame(out: &mut impl Write, vframe: &JavaVFrame<'_>) -> fmt::Result {
    match vframe.method() {
        None => write!(out, " - <unknown method at {}>", vframe.method_address())?,
        Some(method) => write!(out, " - {}", method.external_name_and_signature())?,
    }
    write!(out, " @bci={}", vframe.bci())?;
    if let Some(line) = vframe.line_number() {
        write!(out, ", line={}", line)?;
    }
    if vframe.is_interpreted_frame() {
        write!(out, " (Interpreted frame")?;
    } else {
        write!(out, " (Compiled frame")?;
        if vframe.is_deoptimized() {
            write!(out, " [deoptimized]")?;
        }
    }
    if vframe.precision().is_imprecise() {
        write!(out, "; information may be imprecise")?;
    }
    writeln!(out, ")")
}

/// Synchronizers whose exclusive owner is `thread`, in heap address order.
pub fn locked_ownable_synchronizers(thread: &JavaThread, vm: &VM) -> Vec<Address> {
    let thread_oop = match thread.thread_oop {
        None => return vec![],
        Some(thread_oop) => thread_oop,
    };
    vm.heap.instances_of(ABSTRACT_OWNABLE_SYNCHRONIZER)
        .filter(|synchronizer| vm.heap.field_ref(*synchronizer, EXCLUSIVE_OWNER_THREAD_FIELD) == Some(thread_oop))
        .collect()
}

pub fn print_thread_stack(out: &mut impl Write, thread: &JavaThread, vm: &VM, options: PrintOptions) -> fmt::Result {
    writeln!(out, "Thread {} \"{}\": (state = {})", thread.address, thread.name, thread.state)?;
    for (frame_count, vframe) in java_vframes(thread, vm).iter().enumerate() {
        print_java_frame(out, vframe)?;
        if options.locks {
            print_lock_info(out, vframe, frame_count)?;
        }
    }
    if options.concurrent_locks {
        writeln!(out)?;
        writeln!(out, "Locked ownable synchronizers:")?;
        let synchronizers = locked_ownable_synchronizers(thread, vm);
        if synchronizers.is_empty() {
            writeln!(out, "    - None")?;
        }
        for synchronizer in synchronizers {
            writeln!(out, "    - <{}>, (a {})", synchronizer, vm.heap.external_klass_name(synchronizer))?;
        }
    }
    writeln!(out)
}

pub fn print_all_threads(out: &mut impl Write, vm: &VM, options: PrintOptions) -> fmt::Result {
    for thread in vm.threads.iter() {
        print_thread_stack(out, thread, vm, options)?;
    }
    Ok(())
}
