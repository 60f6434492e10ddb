pub mod frame;
pub mod register_map;
pub mod stream;
pub mod thread_frames;

pub use frame::{Frame, FrameKind};
pub use register_map::RegisterMap;
pub use stream::StackFrameStream;
