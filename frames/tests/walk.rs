use code_cache::blob::BlobKind;
use code_cache::oop_map::{OopMap, OopMapValue};
use frames::thread_frames::{current_frame_guess, current_frame_guess_with_precision, last_frame, new_register_map};
use frames::{Frame, FrameKind, StackFrameStream};
use sa_common::{Address, Precision, Register};
use vm_model::builder::{BuiltThread, Capture, FrameImage, ImageKind, InterpretedContents, StackImageBuilder};
use vm_model::{JavaThreadState, VM};

fn assert_frame(frame: &Frame, image: &FrameImage) {
    assert_eq!(frame.raw_sp(), image.raw_sp, "raw sp of {:?}", image.kind);
    assert_eq!(frame.unextended_sp(), image.unextended_sp, "unextended sp of {:?}", image.kind);
    assert_eq!(frame.fp(), image.fp, "fp of {:?}", image.kind);
    assert_eq!(frame.pc(), image.pc, "pc of {:?}", image.kind);
    assert_eq!(frame.is_deoptimized(), image.deoptimized, "deoptimized flag of {:?}", image.kind);
}

fn visible(built: &BuiltThread) -> Vec<FrameImage> {
    built.frames.iter()
        .copied()
        .filter(|image| image.kind != ImageKind::ThreadRoot)
        .collect()
}

/// entry -> interpreted -> interpreted -> compiled -> compiled -> safepoint stub
fn mixed_stack(builder: &mut StackImageBuilder) -> BuiltThread {
    let run = builder.method("Worker", "run", "()V", 2);
    let step = builder.method("Worker", "step", "(I)V", 3);
    let compute = builder.method("Worker", "compute", "(I)I", 1);
    let compute_nm = builder.code_blob(BlobKind::Nmethod, "Worker.compute", Some(compute), 6);
    let inner_nm = builder.code_blob(BlobKind::Nmethod, "Worker.inner", Some(compute), 4);
    let stub = builder.code_blob(BlobKind::RuntimeStub, "safepoint_blob", None, 4);
    builder.blob_mut(stub).oop_maps.push(OopMap {
        pc_offset: 0x8,
        values: vec![OopMapValue::CalleeSaved { register: Register::Rbx, stack_offset: 8 }],
    });
    let mut thread = builder.thread("worker");
    thread.entry_frame()
        .interpreted_frame(run, 4, InterpretedContents { locals: vec![1, 2], ..Default::default() })
        .interpreted_frame(step, 9, InterpretedContents { locals: vec![3], expressions: vec![5, 6], ..Default::default() })
        .compiled_frame(compute_nm, 0x40, &[(0, 11)])
        .compiled_frame(inner_nm, 0x10, &[])
        .compiled_frame(stub, 0x8, &[(8, 0xabcd)]);
    thread.finish(JavaThreadState::Blocked, Capture::Safepoint)
}

#[test]
fn sender_visits_every_frame_in_order() {
    let mut builder = StackImageBuilder::new();
    let built = mixed_stack(&mut builder);
    let vm = VM::from_snapshot(builder.build()).unwrap();
    let thread = vm.threads.find(built.address).unwrap();
    let expected = visible(&built);
    let mut map = new_register_map(thread, true);
    let mut frame = last_frame(thread, &vm).unwrap();
    let mut walked = vec![frame];
    while !frame.is_first_frame(&vm) {
        frame = frame.sender(&mut map, &vm).unwrap();
        walked.push(frame);
    }
    assert_eq!(walked.len(), expected.len());
    for (frame, image) in walked.iter().zip(expected.iter()) {
        assert_frame(frame, image);
    }
    let kinds = walked.iter().map(|frame| frame.kind(&vm)).collect::<Vec<_>>();
    assert_eq!(kinds, vec![FrameKind::RuntimeStub, FrameKind::Compiled, FrameKind::Compiled, FrameKind::Interpreted, FrameKind::Interpreted, FrameKind::Entry]);
    assert!(frame.sender(&mut map, &vm).is_none());
}

#[test]
fn compiled_sender_records_callee_saved_registers() {
    let mut builder = StackImageBuilder::new();
    let built = mixed_stack(&mut builder);
    let vm = VM::from_snapshot(builder.build()).unwrap();
    let thread = vm.threads.find(built.address).unwrap();
    let stub = last_frame(thread, &vm).unwrap();
    let mut map = new_register_map(thread, true);
    let sender = stub.sender(&mut map, &vm).unwrap();
    assert_eq!(map.location(Register::Rbx), Some(stub.unextended_sp().offset(8)));
    assert_eq!(vm.memory().read_u64(map.location(Register::Rbx).unwrap()), 0xabcd);
    assert_eq!(map.location(Register::Rbp), Some(sender.raw_sp().add_words(-2)));
    assert_eq!(map.location(Register::R12), None);

    let mut frozen = new_register_map(thread, false);
    stub.sender(&mut frozen, &vm).unwrap();
    assert_eq!(frozen.location(Register::Rbx), None);
}

#[test]
fn real_sender_skips_runtime_stubs() {
    let mut builder = StackImageBuilder::new();
    let built = mixed_stack(&mut builder);
    let vm = VM::from_snapshot(builder.build()).unwrap();
    let thread = vm.threads.find(built.address).unwrap();
    let expected = visible(&built);
    let mut map = new_register_map(thread, true);
    let stub = last_frame(thread, &vm).unwrap();
    let compiled = stub.real_sender(&mut map, &vm).unwrap();
    assert_frame(&compiled, &expected[1]);
    // the stub's saved registers stay visible to its caller
    assert!(map.location(Register::Rbx).is_some());
}

#[test]
fn interpreter_accessors() {
    let mut builder = StackImageBuilder::new();
    let built = mixed_stack(&mut builder);
    let vm = VM::from_snapshot(builder.build()).unwrap();
    let thread = vm.threads.find(built.address).unwrap();
    let step = StackFrameStream::new(thread, &vm, true)
        .find(|frame| frame.is_interpreted_frame(&vm))
        .unwrap();
    assert_eq!(vm.method(step.interpreter_frame_method(&vm)).unwrap().name, "step");
    assert_eq!(step.interpreter_frame_bci(&vm), 9);
    assert_eq!(vm.memory().read_u64(step.interpreter_frame_local_address(&vm, 0)), 3);
    assert_eq!(step.interpreter_frame_expression_stack_size(&vm), 2);
    assert_eq!(vm.memory().read_u64(step.interpreter_frame_expression_stack_address(&vm, 1)), 6);
    assert!(step.interpreter_frame_monitors(&vm).is_empty());
    assert!(step.is_interpreted_frame_valid(&vm));
}

#[test]
fn nested_entry_frames_cross_native_code() {
    let mut builder = StackImageBuilder::new();
    let main = builder.method("App", "main", "([Ljava/lang/String;)V", 1);
    let callback = builder.method("App", "callback", "()V", 0);
    let native = builder.method("App", "nativeLoop", "()V", 0);
    let wrapper = builder.code_blob(BlobKind::NativeWrapper, "App.nativeLoop", Some(native), 4);
    let mut thread = builder.thread("main");
    thread.entry_frame()
        .interpreted_frame(main, 2, InterpretedContents::default())
        .compiled_frame(wrapper, 0x30, &[])
        .external_frame()
        .entry_frame()
        .interpreted_frame(callback, 0, InterpretedContents::default());
    let built = thread.finish(JavaThreadState::InJava, Capture::Safepoint);
    let vm = VM::from_snapshot(builder.build()).unwrap();
    let thread = vm.threads.find(built.address).unwrap();
    let expected = visible(&built)
        .into_iter()
        .filter(|image| image.kind != ImageKind::External)
        .collect::<Vec<_>>();
    let mut stream = StackFrameStream::new(thread, &vm, true);
    let mut walked = vec![];
    while !stream.is_done() {
        walked.push(*stream.current().unwrap());
        stream.advance();
    }
    // the bottom entry frame ends the stream without being visited
    assert_eq!(walked.len(), expected.len() - 1);
    for (frame, image) in walked.iter().zip(expected.iter()) {
        assert_frame(frame, image);
    }
    assert!(walked[2].is_native_frame(&vm));
}

#[test]
fn deoptimized_frame_reports_original_pc() {
    let mut builder = StackImageBuilder::new();
    let run = builder.method("Worker", "run", "()V", 0);
    let nm = builder.code_blob(BlobKind::Nmethod, "Worker.hot", Some(run), 6);
    builder.blob_mut(nm).deopt_handler_offset = Some(0x300);
    builder.blob_mut(nm).orig_pc_offset = Some(8);
    let top = builder.code_blob(BlobKind::Nmethod, "Worker.top", Some(run), 4);
    let mut thread = builder.thread("worker");
    thread.entry_frame()
        .interpreted_frame(run, 0, InterpretedContents::default())
        .deoptimized_frame(nm, 0x58, &[])
        .compiled_frame(top, 0x10, &[]);
    let built = thread.finish(JavaThreadState::InJava, Capture::Safepoint);
    let vm = VM::from_snapshot(builder.build()).unwrap();
    let thread = vm.threads.find(built.address).unwrap();
    let frames = StackFrameStream::new(thread, &vm, true).collect::<Vec<_>>();
    assert_eq!(frames.len(), 3);
    assert!(frames[1].is_deoptimized());
    assert_eq!(frames[1].pc(), Address(nm.0 + 0x58));
    assert_frame(&frames[1], &built.frames[1]);
    assert_frame(&frames[2], &built.frames[2]);
}

#[test]
fn single_frame_stack_is_done_immediately() {
    let mut builder = StackImageBuilder::new();
    builder.set_debugging(true);
    let mut thread = builder.thread("idle");
    thread.entry_frame();
    let built = thread.finish(JavaThreadState::InVm, Capture::Running);
    let vm = VM::from_snapshot(builder.build()).unwrap();
    let thread = vm.threads.find(built.address).unwrap();
    assert!(current_frame_guess(thread, &vm).unwrap().is_entry_frame(&vm));
    let mut stream = StackFrameStream::new(thread, &vm, true);
    assert!(stream.is_done());
    stream.advance();
    assert!(stream.is_done());
    assert!(stream.current().is_none());
    assert_eq!(stream.count(), 0);
}

#[test]
fn thread_without_java_frames() {
    let mut builder = StackImageBuilder::new();
    let mut thread = builder.thread("Signal Dispatcher");
    thread.external_frame();
    let built = thread.finish(JavaThreadState::Blocked, Capture::Safepoint);
    let vm = VM::from_snapshot(builder.build()).unwrap();
    let thread = vm.threads.find(built.address).unwrap();
    assert!(last_frame(thread, &vm).is_none());
    assert!(StackFrameStream::new(thread, &vm, false).is_done());
}

#[test]
fn running_thread_in_native_code_is_found_through_fp_chain() {
    let mut builder = StackImageBuilder::new();
    builder.set_debugging(true);
    let main = builder.method("App", "main", "([Ljava/lang/String;)V", 1);
    let native = builder.method("App", "read0", "()I", 0);
    let wrapper = builder.code_blob(BlobKind::NativeWrapper, "App.read0", Some(native), 4);
    let mut thread = builder.thread("reader");
    thread.entry_frame()
        .interpreted_frame(main, 7, InterpretedContents::default())
        .compiled_frame(wrapper, 0x30, &[])
        .external_frame()
        .external_frame();
    let built = thread.finish(JavaThreadState::InNative, Capture::Running);
    let vm = VM::from_snapshot(builder.build()).unwrap();
    let thread = vm.threads.find(built.address).unwrap();
    let expected = built.frames_of_kind(ImageKind::NativeWrapper).next().copied().unwrap();
    let guess = current_frame_guess(thread, &vm).unwrap();
    assert_frame(&guess, &expected);

    let stream = StackFrameStream::new(thread, &vm, true);
    assert_eq!(stream.precision(), Precision::Imprecise);
    let frames = stream.collect::<Vec<_>>();
    assert_eq!(frames.len(), 2);
    assert!(frames[1].is_interpreted_frame(&vm));
}

#[test]
fn running_thread_in_the_interpreter() {
    let mut builder = StackImageBuilder::new();
    builder.set_debugging(true);
    let main = builder.method("App", "main", "([Ljava/lang/String;)V", 1);
    let spin = builder.method("App", "spin", "()V", 2);
    let mut thread = builder.thread("spinner");
    thread.entry_frame()
        .interpreted_frame(main, 7, InterpretedContents::default())
        .interpreted_frame(spin, 3, InterpretedContents { expressions: vec![1], ..Default::default() });
    let built = thread.finish(JavaThreadState::InJava, Capture::Running);
    let vm = VM::from_snapshot(builder.build()).unwrap();
    let thread = vm.threads.find(built.address).unwrap();
    let guess = current_frame_guess(thread, &vm).unwrap();
    assert!(guess.is_interpreted_frame_valid(&vm));
    assert_frame(&guess, &built.frames[0]);
    let mut stream = StackFrameStream::new(thread, &vm, false);
    assert_eq!(stream.precision(), Precision::Imprecise);
    stream.advance();
    assert_eq!(stream.precision(), Precision::Precise);
    assert_frame(stream.current().unwrap(), &built.frames[1]);
}

#[test]
fn frame_guess_from_the_anchor_is_precise() {
    let mut builder = StackImageBuilder::new();
    builder.set_debugging(true);
    let main = builder.method("App", "main", "([Ljava/lang/String;)V", 1);
    let mut thread = builder.thread("poller");
    thread.entry_frame()
        .interpreted_frame(main, 7, InterpretedContents::default())
        .external_frame();
    let built = thread.finish(JavaThreadState::InNative, Capture::RunningInVm);
    let vm = VM::from_snapshot(builder.build()).unwrap();
    let thread = vm.threads.find(built.address).unwrap();
    let expected = built.frames_of_kind(ImageKind::Interpreted).next().copied().unwrap();

    let (guess, precision) = current_frame_guess_with_precision(thread, &vm).unwrap();
    assert_eq!(precision, Precision::Precise);
    assert_frame(&guess, &expected);
    let stream = StackFrameStream::new(thread, &vm, true);
    assert_eq!(stream.precision(), Precision::Precise);
    assert_frame(stream.current().unwrap(), &expected);
}
