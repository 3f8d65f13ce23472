//! Near-silent tone that keeps the output device from idling out between
//! utterances. Routed straight to the device, past the main gain.

use super::audio_system::KeepAliveConfig;
use super::graph::PlaybackGraph;

/// Start the keep-alive oscillator. Returns whether it is running.
/// Failure is logged and otherwise ignored: speech plays fine without it.
pub fn start(graph: &PlaybackGraph, config: &KeepAliveConfig) -> bool {
    if !config.enabled {
        log::debug!("Keep-alive tone disabled");
        return false;
    }
    match graph.start_keep_alive(config.frequency_hz, config.amplitude) {
        Ok(()) => {
            log::info!(
                "Keep-alive tone started: {} Hz, amplitude {}",
                config.frequency_hz,
                config.amplitude
            );
            true
        }
        Err(e) => {
            log::warn!("Failed to start keep-alive tone: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::audio_system::AudioConfig;
    use crate::audio::tap::TapRegistry;

    #[test]
    fn starts_once_and_respects_disabled_flag() {
        let config = AudioConfig::default();
        let (graph, _rx) = PlaybackGraph::new(&config, TapRegistry::new());
        assert!(start(&graph, &config.keep_alive));
        assert!(!start(&graph, &config.keep_alive));
        assert!(graph.has_keep_alive());

        let (quiet, _rx) = PlaybackGraph::new(&config, TapRegistry::new());
        let disabled = KeepAliveConfig { enabled: false, ..config.keep_alive.clone() };
        assert!(!start(&quiet, &disabled));
        assert!(!quiet.has_keep_alive());
    }

    #[test]
    fn source_exhaustion_is_not_fatal() {
        let config = AudioConfig { max_sources: 0, ..AudioConfig::default() };
        let (graph, _rx) = PlaybackGraph::new(&config, TapRegistry::new());
        assert!(!start(&graph, &config.keep_alive));
    }
}
