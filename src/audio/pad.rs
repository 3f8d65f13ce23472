//! Ambient pad engine: a detuned three-voice drone under the speech output.
//!
//! The pad has its own lifecycle, independent of the speech scheduler.
//! Tear-down after a fade-out is not done here directly: `stop` hands back a
//! `PadTeardown` token that the driver fires later, and any `start` in the
//! meantime bumps the generation so the stale token becomes a no-op.

use rand::Rng;

use super::audio_system::PadConfig;
use super::dsp::cents_to_ratio;
use super::graph::{PadVoices, PlaybackGraph};

/// Deferred pad release, due `delay` seconds after the fade-out began.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PadTeardown {
    pub delay: f64,
    pub generation: u64,
}

/// What the caller must do with the pad teardown timer after an operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PadCommand {
    None,
    ScheduleTeardown(PadTeardown),
    CancelTeardown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PadPhase {
    Running,
    FadingOut,
}

pub struct PadEngine {
    config: PadConfig,
    graph: PlaybackGraph,
    phase: Option<PadPhase>,
    generation: u64,
}

impl PadEngine {
    pub fn new(config: PadConfig, graph: PlaybackGraph) -> Self {
        Self {
            config,
            graph,
            phase: None,
            generation: 0,
        }
    }

    /// True from `start` until the fade-out teardown has run.
    pub fn is_active(&self) -> bool {
        self.phase.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.phase == Some(PadPhase::Running)
    }

    pub fn start(&mut self, volume: f32) -> PadCommand {
        let volume = volume.clamp(0.0, 1.0);
        let fade_in = self.config.fade_in_ms as f64 / 1000.0;

        match self.phase {
            Some(PadPhase::Running) => PadCommand::None,
            Some(PadPhase::FadingOut) => {
                // Revive the fading pad instead of racing its release.
                self.generation += 1;
                if let Err(e) = self.graph.ramp_pad_gain(volume, fade_in) {
                    log::warn!("Failed to revive pad: {}", e);
                    self.phase = None;
                    return PadCommand::CancelTeardown;
                }
                self.phase = Some(PadPhase::Running);
                log::info!("Pad fade-out cancelled, ramping back to {:.2}", volume);
                PadCommand::CancelTeardown
            }
            None => {
                let voices = self.voices();
                if let Err(e) = self.graph.start_pad(voices) {
                    log::warn!("Failed to start pad: {}", e);
                    return PadCommand::None;
                }
                if let Err(e) = self.graph.ramp_pad_gain(volume, fade_in) {
                    log::warn!("Failed to fade in pad: {}", e);
                }
                self.phase = Some(PadPhase::Running);
                log::info!(
                    "Pad started at {:?} Hz, fading in to {:.2}",
                    voices.frequencies,
                    volume
                );
                PadCommand::None
            }
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        if !self.is_running() {
            return;
        }
        let ramp = self.config.volume_ramp_ms as f64 / 1000.0;
        if let Err(e) = self.graph.ramp_pad_gain(volume.clamp(0.0, 1.0), ramp) {
            log::warn!("Failed to change pad volume: {}", e);
        }
    }

    pub fn stop(&mut self) -> PadCommand {
        if !self.is_running() {
            return PadCommand::None;
        }
        let fade_out = self.config.fade_out_ms as f64 / 1000.0;
        if let Err(e) = self.graph.ramp_pad_gain(0.0, fade_out) {
            log::warn!("Failed to fade out pad: {}", e);
        }
        self.generation += 1;
        self.phase = Some(PadPhase::FadingOut);
        log::info!("Pad fading out over {:.1}s", fade_out);
        PadCommand::ScheduleTeardown(PadTeardown {
            delay: fade_out,
            generation: self.generation,
        })
    }

    /// Release oscillators and filter if `generation` is still current.
    pub fn finish_teardown(&mut self, generation: u64) -> bool {
        if self.phase != Some(PadPhase::FadingOut) || generation != self.generation {
            return false;
        }
        self.graph.stop_pad();
        self.phase = None;
        log::debug!("Pad released");
        true
    }

    fn voices(&self) -> PadVoices {
        let mut rng = rand::thread_rng();
        let spread = self.config.detune_cents.abs();
        let frequencies = self.config.frequencies.map(|f| {
            let cents = if spread > 0.0 { rng.gen_range(-spread..=spread) } else { 0.0 };
            f * cents_to_ratio(cents)
        });
        PadVoices {
            frequencies,
            cutoff_hz: self.config.cutoff_hz,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::audio_system::AudioConfig;
    use crate::audio::tap::TapRegistry;

    fn engine() -> (PadEngine, PlaybackGraph) {
        let config = AudioConfig::default();
        let (graph, _rx) = PlaybackGraph::new(&config, TapRegistry::new());
        (PadEngine::new(config.pad.clone(), graph.clone()), graph)
    }

    fn advance(graph: &PlaybackGraph, seconds: f64) {
        let mut buf = vec![0.0; (seconds * graph.sample_rate() as f64).round() as usize];
        graph.render(&mut buf);
    }

    #[test]
    fn start_twice_creates_one_oscillator_set() {
        let (mut pad, graph) = engine();
        pad.start(0.3);
        let first = graph.pad_frequencies().unwrap();
        assert_eq!(pad.start(0.3), PadCommand::None);
        assert_eq!(graph.pad_frequencies().unwrap(), first);
    }

    #[test]
    fn voices_are_detuned_within_spread() {
        let (mut pad, graph) = engine();
        pad.start(0.3);
        let base = [110.0f32, 164.81, 220.0];
        for (f, b) in graph.pad_frequencies().unwrap().iter().zip(base) {
            let ratio = f / b;
            assert!(ratio >= cents_to_ratio(-6.0) - 1e-6 && ratio <= cents_to_ratio(6.0) + 1e-6);
        }
    }

    #[test]
    fn fade_in_reaches_volume_after_two_seconds() {
        let (mut pad, graph) = engine();
        pad.start(0.3);
        advance(&graph, 1.0);
        assert!((graph.pad_gain().unwrap() - 0.15).abs() < 1e-3);
        advance(&graph, 1.0);
        assert!((graph.pad_gain().unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn volume_change_ramps_from_current_value() {
        let (mut pad, graph) = engine();
        pad.start(0.3);
        advance(&graph, 0.5);
        let before = graph.pad_gain().unwrap();
        pad.set_volume(0.1);
        assert!((graph.pad_gain().unwrap() - before).abs() < 1e-6);
        advance(&graph, 0.25);
        let mid = graph.pad_gain().unwrap();
        assert!(mid < before.max(0.1) && mid > before.min(0.1));
        advance(&graph, 0.25);
        assert!((graph.pad_gain().unwrap() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn set_volume_without_pad_is_a_no_op() {
        let (mut pad, graph) = engine();
        pad.set_volume(0.5);
        assert!(graph.pad_gain().is_none());
    }

    #[test]
    fn stop_fades_then_teardown_releases() {
        let (mut pad, graph) = engine();
        pad.start(0.3);
        advance(&graph, 2.0);
        let PadCommand::ScheduleTeardown(t) = pad.stop() else {
            panic!("expected a teardown");
        };
        assert!((t.delay - 2.0).abs() < 1e-9);
        assert_eq!(pad.stop(), PadCommand::None);
        advance(&graph, 2.0);
        assert_eq!(graph.pad_gain(), Some(0.0));
        assert!(pad.finish_teardown(t.generation));
        assert!(graph.pad_gain().is_none());
        assert!(!pad.is_active());
    }

    #[test]
    fn start_during_fade_out_cancels_teardown() {
        let (mut pad, graph) = engine();
        pad.start(0.4);
        advance(&graph, 2.0);
        let PadCommand::ScheduleTeardown(t) = pad.stop() else {
            panic!("expected a teardown");
        };
        advance(&graph, 1.0);
        assert_eq!(pad.start(0.4), PadCommand::CancelTeardown);
        assert!(!pad.finish_teardown(t.generation));
        assert!(graph.pad_gain().is_some());
        assert!(pad.is_running());
    }
}
