use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use sa_common::Address;

use crate::descriptor::external_class_name;

pub const ABSTRACT_OWNABLE_SYNCHRONIZER: &str = "java/util/concurrent/locks/AbstractOwnableSynchronizer";
pub const EXCLUSIVE_OWNER_THREAD_FIELD: &str = "exclusiveOwnerThread";
pub const THREAD_CLASS: &str = "java/lang/Thread";
pub const EETOP_FIELD: &str = "eetop";
pub const PARK_BLOCKER_FIELD: &str = "parkBlocker";
pub const THREAD_STATUS_FIELD: &str = "threadStatus";

pub const JVMTI_THREAD_STATE_ALIVE: u64 = 0x0001;
pub const JVMTI_THREAD_STATE_TERMINATED: u64 = 0x0002;
pub const JVMTI_THREAD_STATE_RUNNABLE: u64 = 0x0004;
pub const JVMTI_THREAD_STATE_WAITING_INDEFINITELY: u64 = 0x0010;
pub const JVMTI_THREAD_STATE_WAITING_WITH_TIMEOUT: u64 = 0x0020;
pub const JVMTI_THREAD_STATE_SLEEPING: u64 = 0x0040;
pub const JVMTI_THREAD_STATE_WAITING: u64 = 0x0080;
pub const JVMTI_THREAD_STATE_IN_OBJECT_WAIT: u64 = 0x0100;
pub const JVMTI_THREAD_STATE_PARKED: u64 = 0x0200;
pub const JVMTI_THREAD_STATE_BLOCKED_ON_MONITOR_ENTER: u64 = 0x0400;

/// `java.lang.Thread.State`, derived from the `threadStatus` bits of a thread oop.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreadStatus {
    New,
    Runnable,
    Blocked,
    Waiting,
    TimedWaiting,
    Terminated,
}

impl ThreadStatus {
    pub fn from_jvmti_bits(bits: u64) -> Self {
        if bits & JVMTI_THREAD_STATE_BLOCKED_ON_MONITOR_ENTER != 0 {
            ThreadStatus::Blocked
        } else if bits & JVMTI_THREAD_STATE_WAITING_WITH_TIMEOUT != 0 {
            ThreadStatus::TimedWaiting
        } else if bits & JVMTI_THREAD_STATE_WAITING_INDEFINITELY != 0 {
            ThreadStatus::Waiting
        } else if bits & JVMTI_THREAD_STATE_RUNNABLE != 0 {
            ThreadStatus::Runnable
        } else if bits & JVMTI_THREAD_STATE_TERMINATED != 0 {
            ThreadStatus::Terminated
        } else {
            ThreadStatus::New
        }
    }

    pub fn jvmti_bits(&self) -> u64 {
        match self {
            ThreadStatus::New => 0,
            ThreadStatus::Runnable => JVMTI_THREAD_STATE_ALIVE | JVMTI_THREAD_STATE_RUNNABLE,
            ThreadStatus::Blocked => JVMTI_THREAD_STATE_ALIVE | JVMTI_THREAD_STATE_BLOCKED_ON_MONITOR_ENTER,
            ThreadStatus::Waiting => JVMTI_THREAD_STATE_ALIVE | JVMTI_THREAD_STATE_WAITING | JVMTI_THREAD_STATE_WAITING_INDEFINITELY | JVMTI_THREAD_STATE_IN_OBJECT_WAIT,
            ThreadStatus::TimedWaiting => JVMTI_THREAD_STATE_ALIVE | JVMTI_THREAD_STATE_WAITING | JVMTI_THREAD_STATE_WAITING_WITH_TIMEOUT | JVMTI_THREAD_STATE_SLEEPING,
            ThreadStatus::Terminated => JVMTI_THREAD_STATE_TERMINATED,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeapObject {
    /// internal form
    pub klass: String,
    /// raw field values, references are addresses
    #[serde(default)]
    pub fields: BTreeMap<String, u64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ObjectHeap {
    #[serde(default)]
    objects: BTreeMap<Address, HeapObject>,
    /// class name to super class name
    #[serde(default)]
    supers: BTreeMap<String, String>,
}

impl ObjectHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: Address, object: HeapObject) {
        self.objects.insert(address, object);
    }

    pub fn declare_class(&mut self, name: impl Into<String>, super_name: impl Into<String>) {
        self.supers.insert(name.into(), super_name.into());
    }

    pub fn object(&self, address: Address) -> Option<&HeapObject> {
        self.objects.get(&address)
    }

    pub fn set_field(&mut self, address: Address, name: impl Into<String>, value: u64) -> bool {
        match self.objects.get_mut(&address) {
            None => false,
            Some(object) => {
                object.fields.insert(name.into(), value);
                true
            }
        }
    }

    pub fn klass_name(&self, address: Address) -> Option<&str> {
        self.object(address).map(|object| object.klass.as_str())
    }

    pub fn external_klass_name(&self, address: Address) -> String {
        match self.klass_name(address) {
            None => "<unknown>".to_string(),
            Some(klass) => external_class_name(klass),
        }
    }

    pub fn is_subclass_of(&self, klass: &str, target: &str) -> bool {
        let mut current = klass;
        // bounded, a malformed hierarchy may contain a loop
        for _ in 0..=self.supers.len() {
            if current == target {
                return true;
            }
            match self.supers.get(current) {
                None => return false,
                Some(super_name) => current = super_name.as_str(),
            }
        }
        false
    }

    pub fn is_instance_of(&self, address: Address, target: &str) -> bool {
        match self.klass_name(address) {
            None => false,
            Some(klass) => self.is_subclass_of(klass, target),
        }
    }

    pub fn field(&self, address: Address, name: &str) -> Option<u64> {
        self.object(address)?.fields.get(name).copied()
    }

    pub fn field_ref(&self, address: Address, name: &str) -> Option<Address> {
        Address(self.field(address, name)?).non_null()
    }

    pub fn thread_status(&self, thread_oop: Address) -> Option<ThreadStatus> {
        self.field(thread_oop, THREAD_STATUS_FIELD).map(ThreadStatus::from_jvmti_bits)
    }

    /// In address order.
    pub fn instances_of<'h>(&'h self, target: &'h str) -> impl Iterator<Item=Address> + 'h {
        self.objects.iter()
            .filter(move |(_, object)| self.is_subclass_of(object.klass.as_str(), target))
            .map(|(address, _)| *address)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use sa_common::Address;

    use crate::heap::{ABSTRACT_OWNABLE_SYNCHRONIZER, HeapObject, ObjectHeap, ThreadStatus};

    #[test]
    fn hierarchy() {
        let mut heap = ObjectHeap::new();
        heap.declare_class("java/util/concurrent/locks/ReentrantLock$NonfairSync", "java/util/concurrent/locks/ReentrantLock$Sync");
        heap.declare_class("java/util/concurrent/locks/ReentrantLock$Sync", "java/util/concurrent/locks/AbstractQueuedSynchronizer");
        heap.declare_class("java/util/concurrent/locks/AbstractQueuedSynchronizer", ABSTRACT_OWNABLE_SYNCHRONIZER);
        heap.declare_class("a", "b");
        heap.declare_class("b", "a");
        heap.insert(Address(0x100), HeapObject { klass: "java/util/concurrent/locks/ReentrantLock$NonfairSync".to_string(), fields: BTreeMap::new() });
        heap.insert(Address(0x200), HeapObject { klass: "a".to_string(), fields: BTreeMap::new() });
        assert!(heap.is_instance_of(Address(0x100), ABSTRACT_OWNABLE_SYNCHRONIZER));
        assert!(!heap.is_instance_of(Address(0x200), ABSTRACT_OWNABLE_SYNCHRONIZER));
        assert!(!heap.is_instance_of(Address(0x300), ABSTRACT_OWNABLE_SYNCHRONIZER));
        assert_eq!(heap.external_klass_name(Address(0x100)), "java.util.concurrent.locks.ReentrantLock$NonfairSync");
    }

    #[test]
    fn thread_status_bits() {
        for status in [ThreadStatus::New, ThreadStatus::Runnable, ThreadStatus::Blocked, ThreadStatus::Waiting, ThreadStatus::TimedWaiting, ThreadStatus::Terminated] {
            assert_eq!(ThreadStatus::from_jvmti_bits(status.jvmti_bits()), status);
        }
        assert_eq!(ThreadStatus::TimedWaiting.to_string(), "TIMED_WAITING");
    }
}
