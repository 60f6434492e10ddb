use sa_common::Precision;
use vm_model::{JavaThread, VM};

use crate::frame::Frame;
use crate::register_map::RegisterMap;
use crate::thread_frames::{current_frame_guess_with_precision, last_frame, new_register_map};

/// Forward walk over the physical frames of one thread, newest first.
///
/// One register map is updated in place as the walk advances, it always describes the current
/// frame. The bottom frame of the stack is never the current frame of a stream that is not done.
pub struct StackFrameStream<'v> {
    vm: &'v VM,
    current: Option<Frame>,
    map: RegisterMap,
    precision: Precision,
    done: bool,
}

impl<'v> StackFrameStream<'v> {
    pub fn new(thread: &JavaThread, vm: &'v VM, update_map: bool) -> Self {
        let mut map = new_register_map(thread, update_map);
        let (current, precision) = if !vm.debugging {
            (last_frame(thread, vm), Precision::Precise)
        } else {
            let (mut current, precision) = match current_frame_guess_with_precision(thread, vm) {
                None => (None, Precision::Imprecise),
                Some((frame, precision)) => (Some(frame), precision),
            };
            while let Some(frame) = current {
                if frame.is_java_frame(vm) || frame.is_first_frame(vm) {
                    break;
                }
                current = frame.sender(&mut map, vm);
            }
            (current, precision)
        };
        let done = match current {
            None => true,
            Some(frame) => frame.is_first_frame(vm),
        };
        Self { vm, current, map, precision, done }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn current(&self) -> Option<&Frame> {
        if self.done {
            None
        } else {
            self.current.as_ref()
        }
    }

    pub fn register_map(&self) -> &RegisterMap {
        &self.map
    }

    /// Only the first frame of a stream over a running thread can be imprecise.
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Moves to the sender of the current frame, a no-op once done.
    pub fn advance(&mut self) {
        if self.done {
            return;
        }
        self.current = self.current.and_then(|frame| frame.sender(&mut self.map, self.vm));
        self.precision = Precision::Precise;
        self.done = match self.current {
            None => true,
            Some(frame) => frame.is_first_frame(self.vm),
        };
    }
}

impl Iterator for StackFrameStream<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Self::Item> {
        let res = *self.current()?;
        self.advance();
        Some(res)
    }
}
