use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sa_common::Address;

/// An inflated monitor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectMonitor {
    pub address: Address,
    /// a thread, a stack lock address or null
    #[serde(default)]
    pub owner: Address,
    /// None for raw monitors used inside the vm
    #[serde(default)]
    pub object: Option<Address>,
    #[serde(default)]
    pub recursions: u64,
}

#[derive(Clone, Debug, Default)]
pub struct Monitors {
    by_address: BTreeMap<Address, ObjectMonitor>,
}

impl Monitors {
    pub fn new(monitors: impl IntoIterator<Item=ObjectMonitor>) -> Self {
        Self {
            by_address: monitors.into_iter().map(|monitor| (monitor.address, monitor)).collect(),
        }
    }

    pub fn get(&self, address: Address) -> Option<&ObjectMonitor> {
        self.by_address.get(&address)
    }

    pub fn contains(&self, address: Address) -> bool {
        self.by_address.contains_key(&address)
    }

    /// The inflated monitor of `object`, if it has one.
    pub fn for_object(&self, object: Address) -> Option<&ObjectMonitor> {
        self.by_address.values().find(|monitor| monitor.object == Some(object))
    }

    pub fn iter(&self) -> impl Iterator<Item=&ObjectMonitor> {
        self.by_address.values()
    }

    pub fn into_vec(self) -> Vec<ObjectMonitor> {
        self.by_address.into_values().collect()
    }
}
