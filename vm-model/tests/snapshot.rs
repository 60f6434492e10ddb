use code_cache::blob::BlobKind;
use code_cache::scope::{PcDesc, ScopeDesc, ScopeIndex};
use sa_common::Address;
use vm_model::builder::{Capture, InterpretedContents, StackImageBuilder};
use vm_model::{SnapshotError, VM, VmSnapshot};
use vm_model::{JavaThreadState, TargetMemory};

fn small_snapshot() -> VmSnapshot {
    let mut builder = StackImageBuilder::new();
    let main = builder.method("App", "main", "([Ljava/lang/String;)V", 1);
    let compiled = builder.code_blob(BlobKind::Nmethod, "App.loop", Some(main), 4);
    let lock = builder.object("java/lang/Object");
    let monitor = builder.monitor(Some(lock));
    let mut thread = builder.thread("main");
    thread.entry_frame()
        .interpreted_frame(main, 0, InterpretedContents { monitors: vec![lock], ..Default::default() })
        .compiled_frame(compiled, 0x20, &[]);
    thread.pending_monitor(monitor);
    thread.finish(JavaThreadState::Blocked, Capture::Safepoint);
    builder.build()
}

#[test]
fn save_and_load() {
    let snapshot = small_snapshot();
    let path = std::env::temp_dir().join(format!("sa-snapshot-{}.ron", std::process::id()));
    snapshot.save(&path).unwrap();
    let vm = VM::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(vm.threads.len(), 1);
    let thread = vm.threads.find_by_name("main").unwrap();
    assert!(thread.has_last_java_frame());
    assert_eq!(vm.memory().read_address(thread.anchor.last_java_sp.add_words(3)), StackImageBuilder::interpreter_pc());
    assert!(vm.code_cache.find_blob(Address(thread.anchor.last_java_pc.0)).is_some());
    assert_eq!(vm.methods.len(), 1);
}

#[test]
fn duplicate_thread() {
    let mut snapshot = small_snapshot();
    let copy = snapshot.threads[0].clone();
    snapshot.threads.push(copy);
    assert!(matches!(VM::from_snapshot(snapshot), Err(SnapshotError::DuplicateThread(_))));
}

#[test]
fn unknown_monitor() {
    let mut snapshot = small_snapshot();
    snapshot.monitors.clear();
    match VM::from_snapshot(snapshot) {
        Err(SnapshotError::UnknownMonitor { thread, .. }) => assert_eq!(thread, "main"),
        _ => panic!("expected an unknown monitor"),
    }
}

#[test]
fn malformed_snapshot() {
    let path = std::env::temp_dir().join(format!("sa-malformed-{}.ron", std::process::id()));
    std::fs::write(&path, "(memory: {").unwrap();
    let res = VM::load(&path);
    std::fs::remove_file(&path).unwrap();
    assert!(matches!(res, Err(SnapshotError::Parse(_))));
}

#[test]
fn scope_that_is_its_own_sender() {
    let mut builder = StackImageBuilder::new();
    let main = builder.method("App", "main", "([Ljava/lang/String;)V", 1);
    let compiled = builder.code_blob(BlobKind::Nmethod, "App.spin", Some(main), 4);
    {
        let blob = builder.blob_mut(compiled);
        blob.scopes = vec![ScopeDesc {
            method: main,
            bci: 2,
            sender: Some(ScopeIndex(0)),
            reexecute: false,
            locals: vec![],
            expressions: vec![],
            monitors: vec![],
        }];
        blob.pc_descs = vec![PcDesc { pc_offset: 0x20, scope: Some(ScopeIndex(0)) }];
    }
    let mut thread = builder.thread("main");
    thread.entry_frame().compiled_frame(compiled, 0x20, &[]);
    thread.finish(JavaThreadState::InJava, Capture::Safepoint);
    match VM::from_snapshot(builder.build()) {
        Err(SnapshotError::MalformedScopes { blob, scope }) => {
            assert_eq!(blob, "App.spin");
            assert_eq!(scope, 0);
        }
        _ => panic!("expected a malformed scope chain"),
    }
}
