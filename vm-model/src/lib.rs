pub mod builder;
pub mod descriptor;
pub mod error;
pub mod heap;
pub mod layout;
pub mod memory;
pub mod methods;
pub mod monitors;
pub mod threads;
pub mod vm;

pub use error::SnapshotError;
pub use memory::{SparseMemory, TargetMemory};
pub use threads::{JavaThread, JavaThreadState};
pub use vm::{Capabilities, VM, VmSnapshot};
