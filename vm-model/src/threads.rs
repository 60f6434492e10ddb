use serde::{Deserialize, Serialize};
use strum_macros::Display;

use sa_common::Address;

use crate::heap::{EETOP_FIELD, ObjectHeap, PARK_BLOCKER_FIELD};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JavaThreadState {
    Uninitialized,
    New,
    NewTrans,
    InNative,
    InNativeTrans,
    InVm,
    InVmTrans,
    InJava,
    InJavaTrans,
    Blocked,
    BlockedTrans,
}

/// Last java frame recorded by a thread when it left java code. Null sp means not recorded.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct FrameAnchor {
    pub last_java_sp: Address,
    pub last_java_fp: Address,
    /// may be null, in which case the pc is the word below the sp
    pub last_java_pc: Address,
}

impl FrameAnchor {
    pub fn has_last_java_frame(&self) -> bool {
        !self.last_java_sp.is_null()
    }
}

/// Registers captured from a thread that was stopped outside a safepoint.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RegisterContext {
    pub pc: Address,
    pub sp: Address,
    pub fp: Address,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JavaThread {
    pub address: Address,
    pub name: String,
    pub state: JavaThreadState,
    #[serde(default)]
    pub thread_oop: Option<Address>,
    #[serde(default)]
    pub anchor: FrameAnchor,
    #[serde(default)]
    pub context: Option<RegisterContext>,
    /// highest address of the stack, the stack grows down from here
    pub stack_base: Address,
    pub stack_size: u64,
    #[serde(default)]
    pub current_pending_monitor: Option<Address>,
    #[serde(default)]
    pub current_waiting_monitor: Option<Address>,
}

impl JavaThread {
    pub fn has_last_java_frame(&self) -> bool {
        self.anchor.has_last_java_frame()
    }

    pub fn stack_end(&self) -> Address {
        self.stack_base.offset(-(self.stack_size as i64))
    }

    pub fn is_in_stack(&self, address: Address) -> bool {
        self.stack_end() <= address && address < self.stack_base
    }

    /// A stack-locked object's owner field points at the lock record in the owner's stack.
    pub fn is_lock_owned(&self, address: Address) -> bool {
        self.is_in_stack(address)
    }

    pub fn current_park_blocker(&self, heap: &ObjectHeap) -> Option<Address> {
        heap.field_ref(self.thread_oop?, PARK_BLOCKER_FIELD)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Threads {
    threads: Vec<JavaThread>,
}

impl Threads {
    pub fn new(threads: Vec<JavaThread>) -> Self {
        Self { threads }
    }

    pub fn iter(&self) -> impl Iterator<Item=&JavaThread> {
        self.threads.iter()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn find(&self, address: Address) -> Option<&JavaThread> {
        self.threads.iter().find(|thread| thread.address == address)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&JavaThread> {
        self.threads.iter().find(|thread| thread.name == name)
    }

    /// An owner is either the owning thread itself or, for a stack lock, an address in the
    /// owning thread's stack.
    pub fn owning_thread_from_monitor_owner(&self, owner: Address) -> Option<&JavaThread> {
        if owner.is_null() {
            return None;
        }
        if let Some(thread) = self.find(owner) {
            return Some(thread);
        }
        self.threads.iter().find(|thread| thread.is_lock_owned(owner))
    }

    pub fn thread_from_thread_oop(&self, heap: &ObjectHeap, thread_oop: Address) -> Option<&JavaThread> {
        let eetop = heap.field_ref(thread_oop, EETOP_FIELD)?;
        self.find(eetop)
    }

    pub fn into_vec(self) -> Vec<JavaThread> {
        self.threads
    }
}

#[cfg(test)]
mod tests {
    use sa_common::Address;

    use crate::threads::{FrameAnchor, JavaThread, JavaThreadState, Threads};

    fn thread(address: u64, name: &str, stack_base: u64) -> JavaThread {
        JavaThread {
            address: Address(address),
            name: name.to_string(),
            state: JavaThreadState::Blocked,
            thread_oop: None,
            anchor: FrameAnchor::default(),
            context: None,
            stack_base: Address(stack_base),
            stack_size: 0x1000,
            current_pending_monitor: None,
            current_waiting_monitor: None,
        }
    }

    #[test]
    fn monitor_owner_resolution() {
        let threads = Threads::new(vec![thread(0x100, "a", 0x10000), thread(0x200, "b", 0x20000)]);
        assert_eq!(threads.owning_thread_from_monitor_owner(Address(0x200)).unwrap().name, "b");
        assert_eq!(threads.owning_thread_from_monitor_owner(Address(0xff80)).unwrap().name, "a");
        assert_eq!(threads.owning_thread_from_monitor_owner(Address(0x1f000)).unwrap().name, "b");
        assert!(threads.owning_thread_from_monitor_owner(Address(0x20000)).is_none());
        assert!(threads.owning_thread_from_monitor_owner(Address::NULL).is_none());
        assert_eq!(JavaThreadState::InNative.to_string(), "IN_NATIVE");
    }
}
