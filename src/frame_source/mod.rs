//! Frame sources
//!
//! A `FrameSource` yields one frame per poll. A read that fails is "no
//! data this tick": the camera is skipped and its state left untouched. A
//! source that cannot be opened at startup is a hard error; the
//! orchestrator records that camera as absent for the process lifetime.

pub mod ffmpeg;

use crate::frame::Frame;
use async_trait::async_trait;

#[async_trait]
pub trait FrameSource: Send {
    /// Pull the next frame, or `None` when the read fails this tick
    async fn read(&mut self) -> Option<Frame>;

    /// Frame dimensions this source was opened with
    fn dimensions(&self) -> (u32, u32);
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted source: yields queued frames, then read failures
    pub struct ScriptedSource {
        pub frames: VecDeque<Option<Frame>>,
        pub width: u32,
        pub height: u32,
    }

    impl ScriptedSource {
        pub fn new(width: u32, height: u32, frames: Vec<Option<Frame>>) -> Self {
            Self {
                frames: frames.into(),
                width,
                height,
            }
        }
    }

    #[async_trait]
    impl FrameSource for ScriptedSource {
        async fn read(&mut self) -> Option<Frame> {
            self.frames.pop_front().flatten()
        }

        fn dimensions(&self) -> (u32, u32) {
            (self.width, self.height)
        }
    }
}
