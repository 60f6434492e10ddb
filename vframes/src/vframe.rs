use std::fmt::{Debug, Formatter};
use std::ops::Deref;

use log::debug;

use code_cache::blob::CodeBlob;
use code_cache::location::{Location, LocationType, MonitorValue, ScopeValue};
use code_cache::scope::{ScopeLookup, ScopeRef};
use frames::{Frame, FrameKind, RegisterMap};
use sa_common::{Address, Precision, SYNCHRONIZATION_ENTRY_BCI};
use vm_model::methods::Method;
use vm_model::{JavaThread, VM};

use crate::stack_value::{MonitorInfo, MonitorOwner, StackValue};

#[derive(Copy, Clone, Debug)]
pub enum VFrameKind<'v> {
    Interpreted,
    /// `scope` is None for native wrappers, and for compiled code without debug info at the pc
    Compiled { blob: &'v CodeBlob, scope: Option<ScopeRef<'v>> },
    External,
}

/// A frame as the java program sees it. A compiled frame unfolds into one virtual frame per
/// inlined scope, innermost first.
pub struct VFrame<'v> {
    vm: &'v VM,
    thread: &'v JavaThread,
    frame: Frame,
    /// describes `frame`, owned by this vframe
    map: RegisterMap,
    precision: Precision,
    kind: VFrameKind<'v>,
}

/// Picks the kind of virtual frame for a physical frame. Runtime stubs have no java meaning, the
/// vframe of their sender is returned instead.
pub fn new_vframe<'v>(frame: Frame, map: RegisterMap, thread: &'v JavaThread, vm: &'v VM, unsafe_lookup: bool, precision: Precision) -> VFrame<'v> {
    let frame_kind = frame.kind(vm);
    vm.tracing.trace_new_vframe(frame_kind, frame.pc(), precision);
    let kind = match frame_kind {
        FrameKind::Interpreted => VFrameKind::Interpreted,
        FrameKind::Compiled | FrameKind::Native => match frame.code_blob(vm) {
            None => VFrameKind::External,
            Some(blob) => {
                let lookup = if unsafe_lookup || precision.is_imprecise() {
                    ScopeLookup::Nearest
                } else {
                    ScopeLookup::Exact
                };
                let scope = blob.scope_at(frame.pc(), lookup);
                if scope.is_none() && frame_kind == FrameKind::Compiled {
                    debug!("no scope at pc {} in {}", frame.pc(), blob.name);
                }
                VFrameKind::Compiled { blob, scope }
            }
        },
        FrameKind::RuntimeStub => {
            let mut sender_map = map.copy();
            match frame.sender(&mut sender_map, vm) {
                Some(sender) => return new_vframe(sender, sender_map, thread, vm, true, Precision::Precise),
                None => VFrameKind::External,
            }
        }
        FrameKind::Entry | FrameKind::External => VFrameKind::External,
    };
    VFrame { vm, thread, frame, map, precision, kind }
}

impl<'v> VFrame<'v> {
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn register_map(&self) -> &RegisterMap {
        &self.map
    }

    pub fn thread(&self) -> &'v JavaThread {
        self.thread
    }

    pub fn vm(&self) -> &'v VM {
        self.vm
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn kind(&self) -> VFrameKind<'v> {
        self.kind
    }

    pub fn scope(&self) -> Option<ScopeRef<'v>> {
        match self.kind {
            VFrameKind::Compiled { scope, .. } => scope,
            VFrameKind::Interpreted | VFrameKind::External => None,
        }
    }

    pub fn is_java_frame(&self) -> bool {
        matches!(self.kind, VFrameKind::Interpreted | VFrameKind::Compiled { .. })
    }

    pub fn is_interpreted_frame(&self) -> bool {
        matches!(self.kind, VFrameKind::Interpreted)
    }

    pub fn is_compiled_frame(&self) -> bool {
        matches!(self.kind, VFrameKind::Compiled { .. })
    }

    pub fn is_external_frame(&self) -> bool {
        matches!(self.kind, VFrameKind::External)
    }

    /// True for the last virtual frame of its physical frame.
    pub fn is_top(&self) -> bool {
        match self.scope() {
            None => true,
            Some(scope) => scope.is_top(),
        }
    }

    /// Only an external frame passes its imprecision on to the java frames behind it.
    pub fn may_be_imprecise_dbg(&self) -> bool {
        self.is_external_frame() && self.precision.is_imprecise()
    }

    pub fn sender(&self, precision: Precision) -> Option<VFrame<'v>> {
        if let VFrameKind::Compiled { blob, scope: Some(scope) } = self.kind {
            if let Some(outer) = scope.sender() {
                return Some(VFrame {
                    vm: self.vm,
                    thread: self.thread,
                    frame: self.frame,
                    map: self.map.copy(),
                    precision,
                    kind: VFrameKind::Compiled { blob, scope: Some(outer) },
                });
            }
        }
        if self.frame.is_first_frame(self.vm) {
            return None;
        }
        let mut map = self.map.copy();
        let sender = self.frame.real_sender(&mut map, self.vm)?;
        if sender.is_first_frame(self.vm) {
            return None;
        }
        Some(new_vframe(sender, map, self.thread, self.vm, self.vm.debugging, precision))
    }

    /// The next java frame toward the bottom of the stack.
    pub fn java_sender(&self) -> Option<JavaVFrame<'v>> {
        let imprecise = self.vm.debugging && !self.is_java_frame() && self.may_be_imprecise_dbg();
        let precision = Precision::from_may_be_imprecise(imprecise);
        let mut current = self.sender(precision)?;
        while !current.is_java_frame() {
            current = current.sender(precision)?;
        }
        current.into_java_vframe()
    }

    pub fn into_java_vframe(self) -> Option<JavaVFrame<'v>> {
        if self.is_java_frame() {
            Some(JavaVFrame(self))
        } else {
            None
        }
    }
}

impl Clone for VFrame<'_> {
    fn clone(&self) -> Self {
        Self {
            vm: self.vm,
            thread: self.thread,
            frame: self.frame,
            map: self.map.copy(),
            precision: self.precision,
            kind: self.kind,
        }
    }
}

impl Debug for VFrame<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VFrame")
            .field("thread", &self.thread.name)
            .field("frame", &self.frame)
            .field("precision", &self.precision)
            .field("kind", &self.kind)
            .finish()
    }
}

/// A virtual frame of java code, interpreted or compiled.
#[derive(Clone, Debug)]
pub struct JavaVFrame<'v>(VFrame<'v>);

impl<'v> Deref for JavaVFrame<'v> {
    type Target = VFrame<'v>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'v> JavaVFrame<'v> {
    pub fn into_vframe(self) -> VFrame<'v> {
        self.0
    }

    pub fn method_address(&self) -> Address {
        match self.kind {
            VFrameKind::Interpreted => self.frame.interpreter_frame_method(self.vm),
            VFrameKind::Compiled { blob, scope } => match scope {
                Some(scope) => scope.method(),
                None => blob.method.unwrap_or(Address::NULL),
            },
            VFrameKind::External => Address::NULL,
        }
    }

    pub fn method(&self) -> Option<&'v Method> {
        self.vm.method(self.method_address())
    }

    /// May be the synchronization entry bci of a compiled frame.
    pub fn raw_bci(&self) -> i32 {
        match self.kind {
            VFrameKind::Interpreted => self.frame.interpreter_frame_bci(self.vm),
            VFrameKind::Compiled { scope, .. } => scope.map(|scope| scope.bci()).unwrap_or(0),
            VFrameKind::External => 0,
        }
    }

    pub fn bci(&self) -> i32 {
        match self.raw_bci() {
            SYNCHRONIZATION_ENTRY_BCI => 0,
            bci => bci,
        }
    }

    pub fn line_number(&self) -> Option<u32> {
        self.method()?.line_number_from_bci(self.bci())
    }

    pub fn is_deoptimized(&self) -> bool {
        self.frame.is_deoptimized()
    }

    pub fn locals(&self) -> Vec<StackValue> {
        match self.kind {
            VFrameKind::Interpreted => {
                let method = match self.method() {
                    None => return vec![],
                    Some(method) => method,
                };
                let count = if method.is_native() {
                    method.size_of_parameters()
                } else {
                    method.max_locals as usize
                };
                (0..count)
                    .map(|i| self.interpreted_slot(method, i, self.frame.interpreter_frame_local_address(self.vm, i)))
                    .collect()
            }
            VFrameKind::Compiled { scope, .. } => match scope {
                None => vec![],
                Some(scope) => scope.desc().locals.iter().map(|value| self.create_stack_value(value)).collect(),
            },
            VFrameKind::External => vec![],
        }
    }

    pub fn expressions(&self) -> Vec<StackValue> {
        match self.kind {
            VFrameKind::Interpreted => {
                let method = match self.method() {
                    None => return vec![],
                    Some(method) => method,
                };
                let max_locals = method.max_locals as usize;
                (0..self.frame.interpreter_frame_expression_stack_size(self.vm))
                    .map(|i| self.interpreted_slot(method, max_locals + i, self.frame.interpreter_frame_expression_stack_address(self.vm, i)))
                    .collect()
            }
            VFrameKind::Compiled { scope, .. } => match scope {
                None => vec![],
                Some(scope) => scope.desc().expressions.iter().map(|value| self.create_stack_value(value)).collect(),
            },
            VFrameKind::External => vec![],
        }
    }

    /// Oldest first.
    pub fn monitors(&self) -> Vec<MonitorInfo> {
        match self.kind {
            VFrameKind::Interpreted => self.frame.interpreter_frame_monitors(self.vm)
                .into_iter()
                .map(|lock| MonitorInfo {
                    owner: MonitorOwner::Object(lock.obj),
                    lock: lock.address,
                    eliminated: false,
                })
                .collect(),
            VFrameKind::Compiled { blob, scope } => match scope {
                None => self.native_wrapper_monitors(blob),
                Some(scope) => scope.desc().monitors.iter().map(|monitor| self.create_monitor_info(monitor)).collect(),
            },
            VFrameKind::External => vec![],
        }
    }

    /// A synchronized native method holds its one lock in the wrapper frame.
    fn native_wrapper_monitors(&self, blob: &CodeBlob) -> Vec<MonitorInfo> {
        let synchronized = self.method().map(|method| method.is_synchronized()).unwrap_or(false);
        if !blob.is_native_method() || !synchronized {
            return vec![];
        }
        let slots = match blob.native_lock_slots {
            None => {
                debug!("synchronized native wrapper {} has no lock slots", blob.name);
                return vec![];
            }
            Some(slots) => slots,
        };
        let sp = self.frame.unextended_sp();
        let owner = self.vm.memory().read_address(sp.offset(slots.owner_offset)).non_null();
        vec![MonitorInfo {
            owner: MonitorOwner::Object(owner),
            lock: sp.offset(slots.basic_lock_offset),
            eliminated: false,
        }]
    }

    fn interpreted_slot(&self, method: &Method, slot: usize, address: Address) -> StackValue {
        let value = self.vm.memory().read_u64(address);
        if method.is_oop_slot(self.raw_bci(), slot) {
            StackValue::object(Address(value))
        } else {
            StackValue::Int(value)
        }
    }

    fn location_address(&self, location: &Location) -> Option<Address> {
        match location.stack_offset() {
            Some(offset) => Some(self.frame.unextended_sp().offset(offset)),
            None => self.map.location(location.register()?),
        }
    }

    fn create_stack_value(&self, value: &ScopeValue) -> StackValue {
        match value {
            ScopeValue::Location(location) => self.read_location(location),
            ScopeValue::ConstantInt(value) => StackValue::Int(*value as u32 as u64),
            ScopeValue::ConstantOop(handle) => StackValue::object(*handle),
            ScopeValue::ConstantLong(value) => StackValue::Int(*value as u64),
            ScopeValue::ConstantDouble(value) => StackValue::Int(value.to_bits()),
            ScopeValue::Object { .. } => StackValue::Object { handle: None, scalar_replaced: true },
        }
    }

    fn read_location(&self, location: &Location) -> StackValue {
        if location.is_illegal() {
            return StackValue::Conflict;
        }
        let address = match self.location_address(location) {
            None => {
                debug!("no saved location for {:?} in frame at pc {}", location, self.frame.pc());
                return StackValue::Conflict;
            }
            Some(address) => address,
        };
        let memory = self.vm.memory();
        match location.location_type {
            LocationType::FloatInDouble => StackValue::Int((memory.read_f64(address) as f32).to_bits() as u64),
            LocationType::IntInLong | LocationType::Normal => StackValue::Int(memory.read_u64(address) & 0xFFFF_FFFF),
            LocationType::NarrowOop => StackValue::Object {
                handle: self.vm.narrow_oops.decode(memory.read_u32(address)),
                scalar_replaced: false,
            },
            LocationType::Oop => StackValue::object(memory.read_address(address)),
            LocationType::Long | LocationType::Double | LocationType::Address => StackValue::Int(memory.read_u64(address)),
            LocationType::Invalid => StackValue::Conflict,
        }
    }

    fn create_monitor_info(&self, monitor: &MonitorValue) -> MonitorInfo {
        let owner = match &monitor.owner {
            ScopeValue::Object { klass, .. } => MonitorOwner::ScalarReplaced { klass: klass.clone() },
            owner => MonitorOwner::Object(self.create_stack_value(owner).as_object()),
        };
        let lock = match self.location_address(&monitor.basic_lock) {
            None => {
                debug!("no saved location for lock {:?} in frame at pc {}", monitor.basic_lock, self.frame.pc());
                Address::NULL
            }
            Some(lock) => lock,
        };
        MonitorInfo { owner, lock, eliminated: monitor.eliminated }
    }

    /// Equal method and bci with equal values, allowing a compiled frame's untracked slot to
    /// stand for anything the other frame holds there.
    pub fn structural_compare(&self, other: &JavaVFrame<'_>) -> bool {
        if self.method_address() != other.method_address() || self.bci() != other.bci() {
            return false;
        }
        let locals = self.locals();
        let other_locals = other.locals();
        if locals.len() != other_locals.len() {
            return false;
        }
        for (local, other_local) in locals.iter().zip(other_locals.iter()) {
            if self.is_compiled_frame() && local.is_conflict() {
                continue;
            }
            if other.is_compiled_frame() && other_local.is_conflict() {
                continue;
            }
            if local != other_local {
                return false;
            }
        }
        self.expressions() == other.expressions()
    }
}

impl PartialEq for JavaVFrame<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.method_address() == other.method_address() && self.bci() == other.bci() && self.frame == other.frame
    }
}
