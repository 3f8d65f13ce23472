//! audio - Playback graph, output devices and sound sources
//!
//! The graph is a small software mixer rendered on a dedicated thread into
//! an `OutputDevice` (ALSA behind the `alsa` feature, or a paced null sink).
//! Speech units, the ambient pad and the keep-alive tone are sources on it.

#[cfg(feature = "alsa")]
mod alsa_device;
mod audio_system;
mod dsp;
pub mod graph;
pub mod keep_alive;
pub mod pad;
mod param;
mod pcm_decoder;
pub mod stream_decoder;
pub mod tap;

pub use audio_system::{
    AudioConfig, AudioSystem, KeepAliveConfig, NullDevice, OutputDevice, PadConfig, open_device,
};
pub use graph::{GraphEvent, PadVoices, PlaybackGraph, UnitId, UnitInfo};
pub use pad::{PadCommand, PadEngine, PadTeardown};
pub use pcm_decoder::Pcm16Decoder;
pub use stream_decoder::{StreamDecoder, create_decoder};
pub use tap::{LevelMeterTap, Tap, TapHandle, TapRegistry};
