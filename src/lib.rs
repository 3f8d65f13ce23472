//! speech_streamer - gapless playback of streamed PCM16 speech
//!
//! The library half: the playback graph and its output devices (`audio`)
//! and the streaming scheduler driving it (`streamer`). The binary adds the
//! UDP bridges and the controller around them.

pub mod audio;
pub mod streamer;

pub use audio::{AudioConfig, PlaybackGraph, TapRegistry};
pub use streamer::AudioStreamer;
