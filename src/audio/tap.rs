//! Post-processing taps on the speech signal.
//!
//! A tap receives a copy of every scheduled unit's mixed signal (before the
//! main gain) and adds its own output straight to the device. Taps never take
//! part in queue draining or completion tracking.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

pub trait Tap: Send {
    /// `input` is the speech signal for this period; write the tap's
    /// contribution into `output` (pre-zeroed, same length).
    fn process(&mut self, input: &[f32], output: &mut [f32]);
}

type TapFactory = Box<dyn Fn(f32) -> Box<dyn Tap> + Send + Sync>;

/// Named tap factories handed to the graph at construction.
#[derive(Default)]
pub struct TapRegistry {
    factories: HashMap<String, TapFactory>,
}

impl TapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory; the closure receives the graph sample rate.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(f32) -> Box<dyn Tap> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub(crate) fn build(&self, name: &str, sample_rate: f32) -> Option<Box<dyn Tap>> {
        self.factories.get(name).map(|f| f(sample_rate))
    }
}

/// Returned by `PlaybackGraph::attach_tap`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapHandle {
    pub name: String,
    /// How many times this tap has been attached to the graph.
    pub listeners: usize,
}

/// Publishes the RMS level of the speech signal, e.g. for a talking-face UI.
/// Produces no audio of its own.
pub struct LevelMeterTap {
    alpha: f32,
    state: f32,
    level: Arc<AtomicU32>,
}

impl LevelMeterTap {
    /// `window_ms` is the smoothing time constant.
    pub fn new(window_ms: f32, sample_rate: f32, level: Arc<AtomicU32>) -> Self {
        let alpha = 1.0 - (-1.0 / (window_ms * 0.001 * sample_rate)).exp();
        Self { alpha, state: 0.0, level }
    }

    /// Read the last published level.
    pub fn read(level: &AtomicU32) -> f32 {
        f32::from_bits(level.load(Ordering::Relaxed))
    }
}

impl Tap for LevelMeterTap {
    fn process(&mut self, input: &[f32], _output: &mut [f32]) {
        for x in input {
            self.state += self.alpha * (x * x - self.state);
        }
        self.level.store(self.state.sqrt().to_bits(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_builds_registered_taps_only() {
        let level = Arc::new(AtomicU32::new(0));
        let mut reg = TapRegistry::new();
        let l = level.clone();
        reg.register("level-meter", move |sr| {
            Box::new(LevelMeterTap::new(50.0, sr, l.clone()))
        });
        assert!(reg.build("level-meter", 24_000.0).is_some());
        assert!(reg.build("reverb", 24_000.0).is_none());
    }

    #[test]
    fn level_meter_tracks_rms() {
        let level = Arc::new(AtomicU32::new(0));
        let mut tap = LevelMeterTap::new(10.0, 24_000.0, level.clone());
        let input = vec![0.5f32; 24_000];
        let mut out = vec![0.0f32; 24_000];
        tap.process(&input, &mut out);
        let rms = LevelMeterTap::read(&level);
        assert!((rms - 0.5).abs() < 1e-3, "rms {rms}");
        assert!(out.iter().all(|s| *s == 0.0));
    }
}
