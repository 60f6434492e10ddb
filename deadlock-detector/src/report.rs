use std::fmt;
use std::fmt::{Display, Formatter, Write};

use sa_common::Address;
use vframes::print::{print_java_frame, print_lock_info};
use vframes::java_vframes;
use vm_model::VM;

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DeadlockedThread {
    pub address: Address,
    pub name: String,
}

/// What a thread in a cycle is blocked on. Class names are in external form.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum BlockedOn {
    /// `object` is None for a raw monitor
    Monitor { monitor: Address, object: Option<(Address, String)> },
    Synchronizer { object: Address, class: String },
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DeadlockLink {
    pub thread: DeadlockedThread,
    pub blocked_on: BlockedOn,
    pub held_by: DeadlockedThread,
}

/// Each link's `held_by` is the next link's `thread`, the last link leads back to the first.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DeadlockCycle {
    pub links: Vec<DeadlockLink>,
}

impl DeadlockCycle {
    pub fn threads(&self) -> impl Iterator<Item=&DeadlockedThread> {
        self.links.iter().map(|link| &link.thread)
    }

    pub fn contains(&self, thread: Address) -> bool {
        self.threads().any(|member| member.address == thread)
    }
}

impl Display for DeadlockCycle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Found one Java-level deadlock:")?;
        writeln!(f, "=============================")?;
        for link in self.links.iter() {
            writeln!(f)?;
            writeln!(f, "\"{}\":", link.thread.name)?;
            match &link.blocked_on {
                BlockedOn::Monitor { monitor, object } => {
                    write!(f, "  waiting to lock Monitor@{}", monitor)?;
                    match object {
                        None => write!(f, " (raw monitor),")?,
                        Some((object, class)) => write!(f, " (Object@{}, a {}),", object, class)?,
                    }
                }
                BlockedOn::Synchronizer { object, class } => {
                    write!(f, "  waiting for ownable synchronizer {}, (a {}),", object, class)?;
                }
            }
            write!(f, "\n  which is held by \"{}\"", link.held_by.name)?;
        }
        writeln!(f)?;
        writeln!(f)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeadlockReport {
    pub cycles: Vec<DeadlockCycle>,
}

impl DeadlockReport {
    pub fn deadlock_count(&self) -> usize {
        self.cycles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }

    /// Threads of all cycles, in report order.
    pub fn threads(&self) -> impl Iterator<Item=&DeadlockedThread> {
        self.cycles.iter().flat_map(|cycle| cycle.threads())
    }

    fn write_cycles(&self, f: &mut impl Write) -> fmt::Result {
        writeln!(f, "Deadlock Detection:")?;
        writeln!(f)?;
        for cycle in self.cycles.iter() {
            write!(f, "{}", cycle)?;
        }
        Ok(())
    }

    fn write_summary(&self, f: &mut impl Write) -> fmt::Result {
        match self.deadlock_count() {
            0 => writeln!(f, "No deadlocks found."),
            1 => {
                writeln!(f, "Found a total of 1 deadlock.")?;
                writeln!(f)
            }
            count => {
                writeln!(f, "Found a total of {} deadlocks.", count)?;
                writeln!(f)
            }
        }
    }
}

impl Display for DeadlockReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.write_cycles(f)?;
        self.write_summary(f)
    }
}

/// The report followed, when `java_stacks` is set and there is a deadlock, by the java stacks of
/// the deadlocked threads.
pub fn print_deadlocks(out: &mut impl Write, vm: &VM, report: &DeadlockReport, java_stacks: bool) -> fmt::Result {
    report.write_cycles(out)?;
    if java_stacks && !report.is_empty() {
        writeln!(out, "Java stack information for the threads listed above:")?;
        writeln!(out, "===================================================")?;
        for deadlocked in report.threads() {
            let thread = match vm.threads.find(deadlocked.address) {
                None => continue,
                Some(thread) => thread,
            };
            writeln!(out, "\"{}\":", thread.name)?;
            for (frame_count, vframe) in java_vframes(thread, vm).iter().enumerate() {
                print_java_frame(out, vframe)?;
                print_lock_info(out, vframe, frame_count)?;
            }
        }
        writeln!(out)?;
    }
    report.write_summary(out)
}
