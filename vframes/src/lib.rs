pub mod print;
pub mod stack_value;
pub mod thread_vframes;
pub mod vframe;

pub use stack_value::{MonitorInfo, MonitorOwner, StackValue};
pub use thread_vframes::{java_vframes, last_java_vframe, last_java_vframe_dbg};
pub use vframe::{JavaVFrame, new_vframe, VFrame, VFrameKind};
