use code_cache::blob::BlobKind;
use code_cache::location::{Location, LocationType, ScopeValue};
use code_cache::scope::{PcDesc, ScopeDesc, ScopeIndex};
use vm_model::builder::{Capture, InterpretedContents, StackImageBuilder};
use vm_model::methods::LineNumber;
use vm_model::vm::VmSnapshot;
use vm_model::JavaThreadState;

pub const DEADLOCKED_THREADS: [&str; 2] = ["account-1", "account-2"];
pub const MIXED_STACK_THREAD: &str = "main";

/// Two threads each holding one account's monitor while waiting for the other's, and a main
/// thread running a compiled method called from the interpreter.
pub fn demo_snapshot() -> VmSnapshot {
    let mut builder = StackImageBuilder::new();
    let run = builder.method("demo/Transfer", "run", "()V", 1);
    let transfer = builder.method("demo/Account", "transfer", "(Ldemo/Account;J)V", 4);
    builder.method_mut(transfer).line_numbers = vec![LineNumber { start_bci: 0, line: 17 }, LineNumber { start_bci: 12, line: 19 }];
    let main = builder.method("demo/Main", "main", "([Ljava/lang/String;)V", 2);
    builder.method_mut(main).line_numbers = vec![LineNumber { start_bci: 0, line: 8 }];
    let total = builder.method("demo/Ledger", "total", "(I)J", 2);

    let ledger = builder.code_blob(BlobKind::Nmethod, "demo.Ledger.total", Some(total), 6);
    {
        let blob = builder.blob_mut(ledger);
        blob.scopes = vec![ScopeDesc {
            method: total,
            bci: 9,
            sender: None,
            reexecute: false,
            locals: vec![ScopeValue::ConstantInt(3), ScopeValue::Location(Location::on_stack(8, LocationType::Long))],
            expressions: vec![],
            monitors: vec![],
        }];
        blob.pc_descs = vec![PcDesc { pc_offset: 0x48, scope: Some(ScopeIndex(0)) }];
    }

    let accounts = DEADLOCKED_THREADS.map(|_| builder.object("demo/Account"));
    let monitors = accounts.map(|account| builder.monitor(Some(account)));
    let mut owners = vec![];
    for (i, name) in DEADLOCKED_THREADS.iter().enumerate() {
        let other = (i + 1) % accounts.len();
        let mut thread = builder.thread(name);
        thread.entry_frame()
            .interpreted_frame(run, 4, InterpretedContents::default())
            .interpreted_frame(transfer, 12, InterpretedContents {
                locals: vec![accounts[i].0, accounts[other].0, 100, 0],
                monitors: vec![accounts[i], accounts[other]],
                ..Default::default()
            })
            .pending_monitor(monitors[other]);
        owners.push(thread.address());
        thread.finish(JavaThreadState::Blocked, Capture::Safepoint);
    }
    for (monitor, owner) in monitors.iter().zip(owners) {
        builder.set_monitor_owner(*monitor, owner);
    }

    let mut thread = builder.thread(MIXED_STACK_THREAD);
    thread.entry_frame()
        .interpreted_frame(main, 5, InterpretedContents { locals: vec![0, 3], ..Default::default() })
        .compiled_frame(ledger, 0x48, &[(8, 4200)]);
    thread.finish(JavaThreadState::InJava, Capture::Safepoint);
    builder.build()
}
