pub mod detector;
pub mod error;
pub mod report;

pub use detector::find_deadlocks;
pub use error::DeadlockDetectionError;
pub use report::{BlockedOn, DeadlockCycle, DeadlockedThread, DeadlockLink, DeadlockReport, print_deadlocks};
