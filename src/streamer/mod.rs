//! streamer - Turns irregular PCM chunks into gapless scheduled playback
//!
//! `queue` holds decoded blocks, `core` is the lock-protected state machine
//! that commits them to the graph ahead of the device clock, and `handle`
//! wraps it in the `AudioStreamer` API with a tokio driver for its timers.

mod core;
mod handle;
pub mod queue;
pub mod scheduler;

pub use self::core::StreamerCore;
pub use handle::AudioStreamer;
pub use queue::{PlaybackQueue, SampleBlock, split_into_blocks};
pub use scheduler::{EndMarker, Outcome, Rearm, SchedulerState};
