use std::fmt::Write;
use std::path::Path;

use anyhow::Context;
use log::info;

use deadlock_detector::{find_deadlocks, print_deadlocks, DeadlockReport};
use vframes::print::{print_all_threads, PrintOptions};
use vm_model::VM;

use crate::config::SaConfig;
use crate::demo::demo_snapshot;

pub fn open_snapshot(snapshot_path: &Path, config: &SaConfig) -> anyhow::Result<VM> {
    let mut vm = VM::load(snapshot_path).with_context(|| format!("loading snapshot {}", snapshot_path.display()))?;
    vm.tracing = config.tracing.clone();
    info!("loaded {} threads from {}", vm.threads.len(), snapshot_path.display());
    Ok(vm)
}

/// Thread dump. With `locks`, lock lines are printed and, if configured, ownable synchronizers.
pub fn jstack(out: &mut impl Write, vm: &VM, locks: bool, config: &SaConfig) -> anyhow::Result<()> {
    let options = PrintOptions { locks, concurrent_locks: locks && config.concurrent_locks };
    print_all_threads(out, vm, options)?;
    Ok(())
}

pub fn deadlocks(out: &mut impl Write, vm: &VM, concurrent_locks: bool, config: &SaConfig) -> anyhow::Result<DeadlockReport> {
    let report = find_deadlocks(vm, concurrent_locks)?;
    print_deadlocks(out, vm, &report, config.print_java_stacks_for_deadlocks)?;
    Ok(report)
}

pub fn write_demo_snapshot(output: &Path) -> anyhow::Result<()> {
    demo_snapshot().save(output).with_context(|| format!("writing snapshot {}", output.display()))?;
    Ok(())
}
