use sa_common::Address;

/// A local, expression stack slot or constant as seen from a java frame.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum StackValue {
    /// any primitive, as the raw slot contents
    Int(u64),
    Object {
        handle: Option<Address>,
        /// removed by escape analysis, there is no handle
        scalar_replaced: bool,
    },
    /// the compiler doesn't track this slot at this point
    Conflict,
}

impl StackValue {
    pub fn object(handle: Address) -> StackValue {
        StackValue::Object { handle: handle.non_null(), scalar_replaced: false }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StackValue::Conflict)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, StackValue::Object { .. })
    }

    pub fn as_int(&self) -> Option<u64> {
        match self {
            StackValue::Int(value) => Some(*value),
            StackValue::Object { .. } | StackValue::Conflict => None,
        }
    }

    pub fn as_object(&self) -> Option<Address> {
        match self {
            StackValue::Object { handle, .. } => *handle,
            StackValue::Int(_) | StackValue::Conflict => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum MonitorOwner {
    Object(Option<Address>),
    /// the locked object was scalar replaced, only its class (internal form) is known
    ScalarReplaced { klass: String },
}

/// A lock held, or being acquired, by a java frame.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct MonitorInfo {
    pub owner: MonitorOwner,
    /// the lock record in the frame
    pub lock: Address,
    /// the compiler removed the locking, the object is only locked on deoptimization
    pub eliminated: bool,
}

impl MonitorInfo {
    pub fn owner(&self) -> Option<Address> {
        match &self.owner {
            MonitorOwner::Object(owner) => *owner,
            MonitorOwner::ScalarReplaced { .. } => None,
        }
    }

    pub fn owner_is_scalar_replaced(&self) -> bool {
        matches!(self.owner, MonitorOwner::ScalarReplaced { .. })
    }
}
