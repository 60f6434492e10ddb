use std::fmt::{Debug, Formatter};

use itertools::Itertools;
use strum::{EnumCount, IntoEnumIterator};

use sa_common::{Address, Register};

const REGISTER_COUNT: usize = Register::COUNT;

/// Where the caller-saved value of each register lives at the current point of a stack walk.
///
/// A linear walk mutates one map in place. Anything that branches off into a different physical
/// frame while the original view stays in use works on a [`RegisterMap::copy`].
pub struct RegisterMap {
    locations: [Address; REGISTER_COUNT],
    valid: u64,
    update_map: bool,
    include_argument_oops: bool,
    thread: Address,
}

impl RegisterMap {
    pub fn new(thread: Address, update_map: bool) -> Self {
        let mut res = Self {
            locations: [Address::NULL; REGISTER_COUNT],
            valid: 0,
            update_map,
            include_argument_oops: true,
            thread,
        };
        res.clear();
        res
    }

    pub fn location(&self, register: Register) -> Option<Address> {
        if self.valid & (1 << register.number()) != 0 {
            Some(self.locations[register.number()])
        } else {
            None
        }
    }

    pub fn set_location(&mut self, register: Register, location: Address) {
        assert!(self.update_map, "InvalidStateError: setting location of {} on a register map that does not update", register);
        self.locations[register.number()] = location;
        self.valid |= 1 << register.number();
    }

    /// Only a map that tracks locations passes them on.
    pub fn copy(&self) -> RegisterMap {
        let mut res = RegisterMap {
            locations: [Address::NULL; REGISTER_COUNT],
            valid: 0,
            update_map: self.update_map,
            include_argument_oops: self.include_argument_oops,
            thread: self.thread,
        };
        if self.update_map {
            res.locations = self.locations;
            res.valid = self.valid;
        }
        res
    }

    pub fn clear(&mut self) {
        self.include_argument_oops = true;
        if self.update_map {
            self.valid = 0;
        }
    }

    pub fn update_map(&self) -> bool {
        self.update_map
    }

    pub fn include_argument_oops(&self) -> bool {
        self.include_argument_oops
    }

    pub fn set_include_argument_oops(&mut self, include_argument_oops: bool) {
        self.include_argument_oops = include_argument_oops;
    }

    pub fn thread(&self) -> Address {
        self.thread
    }

    pub fn valid_registers(&self) -> impl Iterator<Item=(Register, Address)> + '_ {
        Register::iter().filter_map(|register| Some((register, self.location(register)?)))
    }
}

impl Debug for RegisterMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RegisterMap {{ update_map: {}, include_argument_oops: {}, thread: {}, locations: [{}] }}",
               self.update_map,
               self.include_argument_oops,
               self.thread,
               self.valid_registers().map(|(register, location)| format!("{}: {}", register, location)).join(", "))
    }
}
