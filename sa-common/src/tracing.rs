use std::fmt::Display;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::{Address, Precision};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingSettings {
    pub trace_stack_walk: bool,
    pub trace_frame_guess: bool,
    pub trace_vframe_creation: bool,
    pub trace_deadlock_search: bool,
    pub trace_monitor_resolution: bool,
}

impl Default for TracingSettings {
    fn default() -> Self {
        Self::disabled()
    }
}

impl TracingSettings {
    pub fn new() -> Self {
        TracingSettings {
            trace_stack_walk: true,
            trace_frame_guess: true,
            trace_vframe_creation: true,
            trace_deadlock_search: true,
            trace_monitor_resolution: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            trace_stack_walk: false,
            trace_frame_guess: false,
            trace_vframe_creation: false,
            trace_deadlock_search: false,
            trace_monitor_resolution: false,
        }
    }

    pub fn trace_sender(&self, kind: impl Display, from_pc: Address, to: Option<(Address, Address)>) {
        if self.trace_stack_walk {
            match to {
                None => trace!("sender of {} frame at pc {}: none", kind, from_pc),
                Some((sp, pc)) => trace!("sender of {} frame at pc {}: sp {} pc {}", kind, from_pc, sp, pc),
            }
        }
    }

    pub fn trace_frame_guess(&self, thread_name: &str, reason: impl Display) {
        if self.trace_frame_guess {
            trace!("current frame guess for \"{}\": {}", thread_name, reason);
        }
    }

    pub fn trace_new_vframe(&self, kind: impl Display, pc: Address, precision: Precision) {
        if self.trace_vframe_creation {
            trace!("new {} vframe at pc {} ({:?})", kind, pc, precision);
        }
    }

    pub fn trace_dfn_assignment(&self, thread_name: &str, dfn: i64) {
        if self.trace_deadlock_search {
            trace!("dfn {} assigned to \"{}\"", dfn, thread_name);
        }
    }

    pub fn trace_walk_stop(&self, start_thread_name: &str, reason: impl Display) {
        if self.trace_deadlock_search {
            trace!("wait-for walk from \"{}\" stopped: {}", start_thread_name, reason);
        }
    }

    pub fn trace_monitor_owner(&self, monitor: Address, owner: Option<&str>) {
        if self.trace_monitor_resolution {
            match owner {
                None => trace!("monitor {} has no owning thread", monitor),
                Some(owner) => trace!("monitor {} owned by \"{}\"", monitor, owner),
            }
        }
    }
}
