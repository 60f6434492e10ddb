use std::collections::HashMap;

use log::debug;

use sa_common::Address;
use vm_model::{JavaThread, VM};

use crate::error::DeadlockDetectionError;
use crate::report::{BlockedOn, DeadlockCycle, DeadlockedThread, DeadlockLink, DeadlockReport};

/// The thread `thread` waits for and what it is blocked on. A pending monitor takes precedence
/// over a park blocker, park blockers only count with `concurrent_locks`.
fn wait_for_edge<'v>(vm: &'v VM, thread: &JavaThread, concurrent_locks: bool) -> Option<(BlockedOn, &'v JavaThread)> {
    if let Some(pending) = thread.current_pending_monitor {
        let monitor = vm.monitor(pending)?;
        let owner = vm.owning_thread_from_monitor(monitor)?;
        let object = monitor.object.map(|object| (object, vm.heap.external_klass_name(object)));
        return Some((BlockedOn::Monitor { monitor: monitor.address, object }, owner));
    }
    if !concurrent_locks {
        return None;
    }
    let blocker = thread.current_park_blocker(&vm.heap)?;
    let owner = vm.synchronizer_owner(blocker)?;
    Some((BlockedOn::Synchronizer { object: blocker, class: vm.heap.external_klass_name(blocker) }, owner))
}

fn deadlocked_thread(thread: &JavaThread) -> DeadlockedThread {
    DeadlockedThread { address: thread.address, name: thread.name.clone() }
}

/// Follows wait-for edges from `start` until they lead back to it.
fn collect_cycle(vm: &VM, start: &JavaThread, concurrent_locks: bool) -> DeadlockCycle {
    let mut links = vec![];
    let mut current = start;
    for _ in 0..vm.threads.len() {
        let (blocked_on, owner) = match wait_for_edge(vm, current, concurrent_locks) {
            None => {
                debug!("wait-for edge of \"{}\" vanished while collecting a cycle", current.name);
                break;
            }
            Some(edge) => edge,
        };
        links.push(DeadlockLink { thread: deadlocked_thread(current), blocked_on, held_by: deadlocked_thread(owner) });
        if owner.address == start.address {
            break;
        }
        current = owner;
    }
    DeadlockCycle { links }
}

/// Finds cycles in the wait-for graph of the vm's threads.
///
/// Threads are numbered in the order a walk along their wait-for edges first reaches them. A walk
/// stops at a thread that is not blocked, at a thread numbered by an earlier walk, or on coming
/// back to a thread numbered by itself, which is a new deadlock. Each deadlock is reported once,
/// starting at the thread where its walk closed the cycle.
pub fn find_deadlocks(vm: &VM, concurrent_locks: bool) -> Result<DeadlockReport, DeadlockDetectionError> {
    if !vm.capabilities.pending_monitor_tracking {
        return Err(DeadlockDetectionError::PendingMonitorsUnsupported);
    }
    let tracing = &vm.tracing;
    let mut dfn: HashMap<Address, i64> = HashMap::new();
    let mut global_dfn = 0;
    let mut cycles = vec![];
    for thread in vm.threads.iter() {
        if dfn.contains_key(&thread.address) {
            continue;
        }
        let this_dfn = global_dfn;
        let mut previous = thread;
        let mut current = wait_for_edge(vm, thread, concurrent_locks).map(|(_, owner)| owner);
        loop {
            let current_thread = match current {
                None => {
                    tracing.trace_walk_stop(thread.name.as_str(), "reached a thread that is not blocked");
                    break;
                }
                Some(current_thread) => current_thread,
            };
            match dfn.get(&current_thread.address).copied() {
                None => {
                    dfn.insert(current_thread.address, global_dfn);
                    tracing.trace_dfn_assignment(current_thread.name.as_str(), global_dfn);
                    global_dfn += 1;
                }
                Some(current_dfn) if current_dfn < this_dfn => {
                    tracing.trace_walk_stop(thread.name.as_str(), "reached a thread of an earlier walk");
                    break;
                }
                Some(_) if current_thread.address == previous.address => {
                    tracing.trace_walk_stop(thread.name.as_str(), "thread waits for itself");
                    break;
                }
                Some(_) => {
                    tracing.trace_walk_stop(thread.name.as_str(), "found a new cycle");
                    cycles.push(collect_cycle(vm, current_thread, concurrent_locks));
                    break;
                }
            }
            previous = current_thread;
            current = wait_for_edge(vm, current_thread, concurrent_locks).map(|(_, owner)| owner);
        }
    }
    Ok(DeadlockReport { cycles })
}
