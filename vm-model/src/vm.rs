use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use code_cache::CodeCache;
use sa_common::Address;
use sa_common::tracing::TracingSettings;

use crate::error::SnapshotError;
use crate::heap::{ABSTRACT_OWNABLE_SYNCHRONIZER, EXCLUSIVE_OWNER_THREAD_FIELD, ObjectHeap};
use crate::layout::NarrowOopEncoding;
use crate::memory::{SparseMemory, TargetMemory};
use crate::methods::Method;
use crate::monitors::{Monitors, ObjectMonitor};
use crate::threads::{JavaThread, Threads};

/// What the inspected VM exposes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub pending_monitor_tracking: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self { pending_monitor_tracking: true }
    }
}

/// Everything the stack walker and deadlock detector know about the inspected VM.
pub struct VM {
    pub memory: Box<dyn TargetMemory>,
    pub code_cache: CodeCache,
    pub methods: BTreeMap<Address, Method>,
    pub heap: ObjectHeap,
    pub threads: Threads,
    pub monitors: Monitors,
    pub capabilities: Capabilities,
    /// attached to a process that may not be at a safepoint, frame information is best effort
    pub debugging: bool,
    pub narrow_oops: NarrowOopEncoding,
    pub tracing: TracingSettings,
}

impl VM {
    pub fn load(path: impl AsRef<Path>) -> Result<VM, SnapshotError> {
        VM::from_snapshot(VmSnapshot::load(path)?)
    }

    pub fn from_snapshot(snapshot: VmSnapshot) -> Result<VM, SnapshotError> {
        snapshot.validate()?;
        let VmSnapshot { memory, code_cache, methods, heap, threads, monitors, capabilities, debugging, narrow_oops } = snapshot;
        Ok(VM {
            memory: Box::new(memory),
            code_cache,
            methods: methods.into_iter().map(|method| (method.address, method)).collect(),
            heap,
            threads: Threads::new(threads),
            monitors: Monitors::new(monitors),
            capabilities,
            debugging,
            narrow_oops,
            tracing: TracingSettings::disabled(),
        })
    }

    pub fn memory(&self) -> &dyn TargetMemory {
        self.memory.as_ref()
    }

    pub fn method(&self, address: Address) -> Option<&Method> {
        let res = self.methods.get(&address);
        if res.is_none() {
            debug!("no method metadata at {}", address);
        }
        res
    }

    pub fn monitor(&self, address: Address) -> Option<&ObjectMonitor> {
        self.monitors.get(address)
    }

    pub fn owning_thread_from_monitor(&self, monitor: &ObjectMonitor) -> Option<&JavaThread> {
        let res = self.threads.owning_thread_from_monitor_owner(monitor.owner);
        self.tracing.trace_monitor_owner(monitor.address, res.map(|thread| thread.name.as_str()));
        res
    }

    pub fn is_monitor_entered_by(&self, monitor: &ObjectMonitor, thread: &JavaThread) -> bool {
        match self.threads.owning_thread_from_monitor_owner(monitor.owner) {
            None => false,
            Some(owner) => owner.address == thread.address,
        }
    }

    pub fn thread_from_thread_oop(&self, thread_oop: Address) -> Option<&JavaThread> {
        self.threads.thread_from_thread_oop(&self.heap, thread_oop)
    }

    /// The thread recorded as exclusive owner of an ownable synchronizer. None when `synchronizer`
    /// isn't one or isn't owned.
    pub fn synchronizer_owner(&self, synchronizer: Address) -> Option<&JavaThread> {
        if !self.heap.is_instance_of(synchronizer, ABSTRACT_OWNABLE_SYNCHRONIZER) {
            return None;
        }
        let owner_oop = self.heap.field_ref(synchronizer, EXCLUSIVE_OWNER_THREAD_FIELD)?;
        self.thread_from_thread_oop(owner_oop)
    }
}

/// Serializable form of a [`VM`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VmSnapshot {
    pub memory: SparseMemory,
    pub code_cache: CodeCache,
    #[serde(default)]
    pub methods: Vec<Method>,
    #[serde(default)]
    pub heap: ObjectHeap,
    #[serde(default)]
    pub threads: Vec<JavaThread>,
    #[serde(default)]
    pub monitors: Vec<ObjectMonitor>,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub debugging: bool,
    #[serde(default)]
    pub narrow_oops: NarrowOopEncoding,
}

impl VmSnapshot {
    pub fn load(path: impl AsRef<Path>) -> Result<VmSnapshot, SnapshotError> {
        let text = fs::read_to_string(path)?;
        Ok(ron::from_str(text.as_str())?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SnapshotError> {
        let mut seen = HashSet::new();
        for thread in self.threads.iter() {
            if !seen.insert(thread.address) {
                return Err(SnapshotError::DuplicateThread(thread.address));
            }
        }
        for thread in self.threads.iter() {
            for monitor in [thread.current_pending_monitor, thread.current_waiting_monitor].into_iter().flatten() {
                if !self.monitors.iter().any(|known| known.address == monitor) {
                    return Err(SnapshotError::UnknownMonitor { thread: thread.name.clone(), monitor });
                }
            }
        }
        for blob in self.code_cache.blobs() {
            if let Some(scope) = blob.malformed_scope() {
                return Err(SnapshotError::MalformedScopes { blob: blob.name.clone(), scope: scope.0 });
            }
        }
        Ok(())
    }
}
