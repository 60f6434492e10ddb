use std::path::PathBuf;

use rust_sa::commands::{deadlocks, jstack, open_snapshot, write_demo_snapshot};
use rust_sa::config::{load_config, load_or_create_config, SaConfig};
use rust_sa::demo::{demo_snapshot, DEADLOCKED_THREADS, MIXED_STACK_THREAD};
use vm_model::VM;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rust-sa-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn demo_snapshot_has_one_deadlock() {
    let vm = VM::from_snapshot(demo_snapshot()).unwrap();
    let mut out = String::new();
    let report = deadlocks(&mut out, &vm, true, &SaConfig::default()).unwrap();
    assert_eq!(report.deadlock_count(), 1);
    let names = report.threads().map(|thread| thread.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec![DEADLOCKED_THREADS[1], DEADLOCKED_THREADS[0]]);
    assert!(out.starts_with("Deadlock Detection:\n\nFound one Java-level deadlock:\n"));
    assert!(out.contains("Java stack information for the threads listed above:\n"));
    assert!(out.contains(" - demo.Account.transfer(demo.Account, long) @bci=12, line=19 (Interpreted frame)\n"));
    assert!(out.ends_with("Found a total of 1 deadlock.\n\n"));
}

#[test]
fn java_stacks_can_be_left_out_of_deadlock_output() {
    let vm = VM::from_snapshot(demo_snapshot()).unwrap();
    let config = SaConfig { print_java_stacks_for_deadlocks: false, ..Default::default() };
    let mut out = String::new();
    deadlocks(&mut out, &vm, true, &config).unwrap();
    assert!(!out.contains("Java stack information"));
}

#[test]
fn jstack_of_the_mixed_stack() {
    let vm = VM::from_snapshot(demo_snapshot()).unwrap();
    let mut out = String::new();
    jstack(&mut out, &vm, true, &SaConfig::default()).unwrap();
    let header = format!("\"{}\": (state = IN_JAVA)", MIXED_STACK_THREAD);
    let start = out.find(header.as_str()).unwrap();
    let lines = out[start..].lines().collect::<Vec<_>>();
    assert_eq!(lines[1], " - demo.Ledger.total(int) @bci=9 (Compiled frame)");
    assert_eq!(lines[2], " - demo.Main.main(java.lang.String[]) @bci=5, line=8 (Interpreted frame)");
    assert_eq!(lines[3], "");
    assert_eq!(lines[4], "Locked ownable synchronizers:");
    assert_eq!(lines[5], "    - None");
}

#[test]
fn snapshot_file_round_trip() {
    let dir = scratch_dir("snapshot");
    let path = dir.join("demo.ron");
    write_demo_snapshot(path.as_path()).unwrap();
    let vm = open_snapshot(path.as_path(), &SaConfig::default()).unwrap();
    assert_eq!(vm.threads.len(), 3);
    let mut from_file = String::new();
    jstack(&mut from_file, &vm, true, &SaConfig::default()).unwrap();
    let mut in_memory = String::new();
    jstack(&mut in_memory, &VM::from_snapshot(demo_snapshot()).unwrap(), true, &SaConfig::default()).unwrap();
    assert_eq!(from_file, in_memory);
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn missing_snapshot_is_an_error() {
    let dir = scratch_dir("missing");
    assert!(open_snapshot(dir.join("nothing.ron").as_path(), &SaConfig::default()).is_err());
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn config_is_created_once() {
    let dir = scratch_dir("config");
    let path = dir.join("sa.config");
    assert!(load_config(path.as_path()).unwrap().is_none());
    let created = load_or_create_config(path.as_path()).unwrap();
    assert!(created.concurrent_locks);
    std::fs::write(&path, "(concurrent_locks: false, log_level: \"debug\")").unwrap();
    let loaded = load_or_create_config(path.as_path()).unwrap();
    assert!(!loaded.concurrent_locks);
    assert_eq!(loaded.log_level, "debug");
    std::fs::remove_dir_all(dir).unwrap();
}
