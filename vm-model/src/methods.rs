use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sa_common::Address;

use crate::descriptor::{external_class_name, parse_method_descriptor};

pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_SYNCHRONIZED: u16 = 0x0020;
pub const ACC_NATIVE: u16 = 0x0100;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LineNumber {
    pub start_bci: i32,
    pub line: u32,
}

/// Method metadata as found at `address` in the target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Method {
    pub address: Address,
    /// internal form, e.g. `java/lang/Object`
    pub holder: String,
    pub name: String,
    pub signature: String,
    #[serde(default)]
    pub access_flags: u16,
    pub max_locals: u16,
    pub max_stack: u16,
    pub code_base: Address,
    pub code_size: u32,
    #[serde(default)]
    pub line_numbers: Vec<LineNumber>,
    /// interpreter slots holding references, keyed by the bci the mask was computed at; slot numbers
    /// at or past `max_locals` are expression stack slots
    #[serde(default)]
    pub oop_masks: BTreeMap<i32, Vec<u16>>,
}

impl Method {
    pub fn is_native(&self) -> bool {
        self.access_flags & ACC_NATIVE != 0
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    pub fn is_synchronized(&self) -> bool {
        self.access_flags & ACC_SYNCHRONIZED != 0
    }

    pub fn size_of_parameters(&self) -> usize {
        let receiver = if self.is_static() { 0 } else { 1 };
        match parse_method_descriptor(self.signature.as_str()) {
            None => receiver,
            Some(desc) => receiver + desc.parameter_slots(),
        }
    }

    pub fn is_object_wait(&self) -> bool {
        self.holder == "java/lang/Object" && self.name == "wait"
    }

    /// e.g. `java.lang.Object.wait(long)`
    pub fn external_name_and_signature(&self) -> String {
        let parameters = match parse_method_descriptor(self.signature.as_str()) {
            None => self.signature.clone(),
            Some(desc) => desc.render_parameters(),
        };
        format!("{}.{}({})", external_class_name(self.holder.as_str()), self.name, parameters)
    }

    pub fn contains_bcp(&self, bcp: Address) -> bool {
        self.code_base <= bcp && bcp < self.code_base.offset(self.code_size as i64)
    }

    pub fn bci_from_bcp(&self, bcp: Address) -> i32 {
        if self.is_native() && bcp.is_null() {
            return 0;
        }
        bcp.minus(self.code_base) as i32
    }

    pub fn bcp_from_bci(&self, bci: i32) -> Address {
        self.code_base.offset(bci as i64)
    }

    /// The line of the entry with the largest start bci not past `bci`.
    pub fn line_number_from_bci(&self, bci: i32) -> Option<u32> {
        self.line_numbers.iter()
            .filter(|entry| entry.start_bci <= bci)
            .max_by_key(|entry| entry.start_bci)
            .map(|entry| entry.line)
    }

    pub fn is_oop_slot(&self, bci: i32, slot: usize) -> bool {
        match self.oop_masks.range(..=bci).next_back() {
            None => false,
            Some((_, slots)) => slots.iter().any(|oop_slot| *oop_slot as usize == slot),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use sa_common::Address;

    use crate::methods::{LineNumber, Method};

    fn object_wait() -> Method {
        Method {
            address: Address(0x5000),
            holder: "java/lang/Object".to_string(),
            name: "wait".to_string(),
            signature: "(J)V".to_string(),
            access_flags: 0x0111,
            max_locals: 3,
            max_stack: 0,
            code_base: Address(0x5100),
            code_size: 0,
            line_numbers: vec![LineNumber { start_bci: 0, line: 502 }],
            oop_masks: BTreeMap::new(),
        }
    }

    #[test]
    fn rendering() {
        let method = object_wait();
        assert_eq!(method.external_name_and_signature(), "java.lang.Object.wait(long)");
        assert!(method.is_native());
        assert!(method.is_object_wait());
        assert_eq!(method.size_of_parameters(), 3);
    }

    #[test]
    fn line_numbers_and_masks() {
        let mut method = object_wait();
        method.line_numbers = vec![
            LineNumber { start_bci: 0, line: 10 },
            LineNumber { start_bci: 8, line: 12 },
            LineNumber { start_bci: 4, line: 11 },
        ];
        assert_eq!(method.line_number_from_bci(5), Some(11));
        assert_eq!(method.line_number_from_bci(9), Some(12));
        assert_eq!(method.line_number_from_bci(-1), None);
        method.oop_masks.insert(0, vec![0]);
        method.oop_masks.insert(6, vec![0, 2]);
        assert!(method.is_oop_slot(3, 0));
        assert!(!method.is_oop_slot(3, 2));
        assert!(method.is_oop_slot(7, 2));
    }
}
