use sa_common::{Address, Register};
use serde::{Deserialize, Serialize};

/// What kind of value a debug-info location holds.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum LocationType {
    /// int-sized value in a word sized slot
    Normal,
    Oop,
    NarrowOop,
    IntInLong,
    Long,
    /// float spilled as a double from a floating point register
    FloatInDouble,
    Double,
    /// return address, from jsr
    Address,
    Invalid,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Place {
    /// byte offset from the frame's unextended sp
    Stack { offset: i64 },
    Register { number: u16 },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub place: Place,
    pub location_type: LocationType,
}

impl Location {
    pub fn on_stack(offset: i64, location_type: LocationType) -> Self {
        Self { place: Place::Stack { offset }, location_type }
    }

    pub fn in_register(register: Register, location_type: LocationType) -> Self {
        Self { place: Place::Register { number: register.number() as u16 }, location_type }
    }

    pub fn is_register(&self) -> bool {
        matches!(self.place, Place::Register { .. })
    }

    pub fn is_stack(&self) -> bool {
        matches!(self.place, Place::Stack { .. })
    }

    /// None for stack locations and for register numbers this platform doesn't have
    pub fn register(&self) -> Option<Register> {
        match self.place {
            Place::Stack { .. } => None,
            Place::Register { number } => Register::from_number(number),
        }
    }

    pub fn stack_offset(&self) -> Option<i64> {
        match self.place {
            Place::Stack { offset } => Some(offset),
            Place::Register { .. } => None,
        }
    }

    pub fn is_illegal(&self) -> bool {
        self.location_type == LocationType::Invalid
    }
}

/// A value in a compiled scope: either where to find it or what it is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ScopeValue {
    Location(Location),
    ConstantInt(i32),
    ConstantOop(Address),
    ConstantLong(i64),
    ConstantDouble(f64),
    /// object removed by escape analysis, only its class survives
    Object { id: u32, klass: String },
}

impl ScopeValue {
    pub fn is_object(&self) -> bool {
        matches!(self, ScopeValue::Object { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitorValue {
    pub owner: ScopeValue,
    pub basic_lock: Location,
    #[serde(default)]
    pub eliminated: bool,
}
