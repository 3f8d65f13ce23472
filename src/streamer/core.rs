//! Synchronous streaming state machine.
//!
//! `StreamerCore` owns the queue, the scheduled-time cursor, the active unit
//! set and the pad. It never sleeps or spawns: every operation returns an
//! `Outcome` telling the driver how to re-arm and whether the completion
//! callback is due. All methods run under the `AudioStreamer` mutex.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;

use super::queue::{PlaybackQueue, split_into_blocks};
use super::scheduler::{EndMarker, Outcome, Rearm, SchedulerState, rearm_delay};
use crate::audio::{AudioConfig, PadEngine, PlaybackGraph, StreamDecoder, UnitId, create_decoder};

pub struct StreamerCore {
    config: AudioConfig,
    graph: PlaybackGraph,
    decoder: Box<dyn StreamDecoder>,
    queue: PlaybackQueue,
    /// Active units; the value is the marker generation the unit was tagged with.
    active: HashMap<UnitId, Option<u64>>,
    marker: Option<EndMarker>,
    generation: u64,
    cursor: f64,
    is_playing: bool,
    stream_complete: bool,
    /// Completion already delivered for the current cycle.
    completion_fired: bool,
    epoch: u64,
    pad: PadEngine,
}

impl StreamerCore {
    pub fn new(config: AudioConfig, graph: PlaybackGraph) -> Result<Self> {
        let decoder = create_decoder(&config.stream_format)?;
        let pad = PadEngine::new(config.pad.clone(), graph.clone());
        Ok(Self {
            config,
            graph,
            decoder,
            queue: PlaybackQueue::new(),
            active: HashMap::new(),
            marker: None,
            generation: 0,
            cursor: 0.0,
            is_playing: false,
            stream_complete: false,
            completion_fired: false,
            epoch: 0,
            pad,
        })
    }

    // ------------------------------------------------------------- getters

    pub fn graph(&self) -> &PlaybackGraph {
        &self.graph
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn is_stream_complete(&self) -> bool {
        self.stream_complete
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn active_units(&self) -> usize {
        self.active.len()
    }

    pub fn scheduled_time(&self) -> f64 {
        self.cursor
    }

    pub fn end_marker(&self) -> Option<EndMarker> {
        self.marker
    }

    pub fn pad_active(&self) -> bool {
        self.pad.is_active()
    }

    pub fn state(&self) -> SchedulerState {
        match (self.is_playing, self.queue.is_empty()) {
            (true, false) => SchedulerState::Draining,
            (true, true) => SchedulerState::Waiting,
            (false, _) if self.stream_complete => SchedulerState::Complete,
            (false, _) => SchedulerState::Idle,
        }
    }

    // ----------------------------------------------------------- lifecycle

    /// Decode `data`, queue its blocks and start the loop if it is idle.
    pub fn ingest(&mut self, data: &[u8]) -> Outcome {
        self.stream_complete = false;
        self.completion_fired = false;

        let samples = match self.decoder.decode(data) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Failed to decode {} byte chunk: {}", data.len(), e);
                Vec::new()
            }
        };
        let blocks = split_into_blocks(&samples, self.config.block_length);
        log::debug!(
            "Ingest {} bytes -> {} samples in {} blocks",
            data.len(),
            samples.len(),
            blocks.len()
        );
        self.queue.extend(blocks);
        log::debug!(
            "{} blocks ({} samples) waiting",
            self.queue.len(),
            self.queue.buffered_samples()
        );

        if self.is_playing {
            return Outcome::keep(self.epoch);
        }
        self.is_playing = true;
        self.cursor = self.graph.now() + self.config.initial_buffer_delay();
        log::info!("Playback loop started, first block at {:.3}s", self.cursor);
        self.schedule_pass()
    }

    /// Re-arm deadline fired. Decisions from an older epoch are ignored.
    pub fn on_rearm(&mut self, epoch: u64) -> Outcome {
        if epoch != self.epoch || !self.is_playing {
            log::debug!("Dropping stale re-arm (epoch {}, current {})", epoch, self.epoch);
            return Outcome::keep(self.epoch);
        }
        self.schedule_pass()
    }

    /// A unit played out. Units removed by `stop` never reach here.
    pub fn on_unit_ended(&mut self, id: UnitId) -> Outcome {
        let mut outcome = Outcome::keep(self.epoch);
        let Some(tag) = self.active.remove(&id) else {
            return outcome;
        };

        let is_marker = matches!(
            (tag, self.marker),
            (Some(g), Some(m)) if m.unit == id && m.generation == g
        );
        if is_marker {
            self.marker = None;
        }

        // The marker is normally the last unit to end; an empty active set
        // covers a tail block that was dropped before it got a marker.
        if (is_marker || (self.active.is_empty() && self.marker.is_none()))
            && self.queue.is_empty()
            && self.stream_complete
            && !self.completion_fired
        {
            log::info!("Stream finished playing");
            self.completion_fired = true;
            outcome.completed = true;
        }
        outcome
    }

    /// Interrupt: drop everything queued or sounding. Pad and main gain stay.
    pub fn stop(&mut self) -> Outcome {
        self.is_playing = false;
        self.stream_complete = true;
        // Stopped units never report an end, so only `complete()` can fire now.
        self.completion_fired = false;
        self.queue.clear();

        for (id, _) in self.active.drain() {
            if let Err(e) = self.graph.stop_unit(id) {
                log::debug!("stop_unit({}) ignored: {}", id, e);
            }
        }
        self.marker = None;
        self.generation += 1;
        self.cursor = self.graph.now();
        self.epoch += 1;
        log::info!("Playback stopped");

        Outcome {
            rearm: Rearm::Cancel,
            ..Outcome::keep(self.epoch)
        }
    }

    /// Prepare for a new stream after `stop` (or wake a suspended device).
    pub fn resume(&mut self) -> Outcome {
        if self.graph.is_suspended() {
            self.graph.resume();
            log::info!("Output device resumed");
        }
        self.stream_complete = false;
        self.completion_fired = false;
        let primed = self.graph.now() + self.config.initial_buffer_delay();
        // Never pull the cursor back over audio already committed.
        self.cursor = self.cursor.max(primed);
        self.graph.set_main_gain(1.0);
        log::info!("Playback resumed, cursor at {:.3}s", self.cursor);
        Outcome::keep(self.epoch)
    }

    /// No more data will arrive for this stream.
    pub fn complete(&mut self) -> Outcome {
        self.stream_complete = true;
        let mut outcome = Outcome::keep(self.epoch);
        if !self.queue.is_empty() || !self.active.is_empty() {
            log::debug!(
                "Stream marked complete, {} blocks queued, {} units active",
                self.queue.len(),
                self.active.len()
            );
            return outcome;
        }

        if self.is_playing {
            self.is_playing = false;
            self.epoch += 1;
            outcome.rearm = Rearm::Cancel;
            outcome.epoch = self.epoch;
        }
        if !self.completion_fired {
            log::info!("Stream complete with nothing left to play");
            self.completion_fired = true;
            outcome.completed = true;
        }
        outcome
    }

    /// Freeze the device clock; audio resumes where it left off on `resume`.
    pub fn suspend(&mut self) -> Outcome {
        if !self.graph.is_suspended() {
            self.graph.suspend();
            log::info!("Output device suspended");
        }
        Outcome::keep(self.epoch)
    }

    /// Host volume on the shared gain stage (speech and pad alike).
    pub fn set_volume(&mut self, volume: f32) -> Outcome {
        self.graph.set_main_gain(volume.clamp(0.0, 1.0));
        Outcome::keep(self.epoch)
    }

    // ----------------------------------------------------------------- pad

    pub fn start_pad(&mut self, volume: f32) -> Outcome {
        Outcome {
            pad: self.pad.start(volume),
            ..Outcome::keep(self.epoch)
        }
    }

    pub fn set_pad_volume(&mut self, volume: f32) -> Outcome {
        self.pad.set_volume(volume);
        Outcome::keep(self.epoch)
    }

    pub fn stop_pad(&mut self) -> Outcome {
        Outcome {
            pad: self.pad.stop(),
            ..Outcome::keep(self.epoch)
        }
    }

    /// Pad teardown deadline fired.
    pub fn on_pad_teardown(&mut self, generation: u64) {
        if !self.pad.finish_teardown(generation) {
            log::debug!("Stale pad teardown {} ignored", generation);
        }
    }

    // ----------------------------------------------------------- scheduling

    fn schedule_pass(&mut self) -> Outcome {
        let now = self.graph.now();
        let horizon = now + self.config.lookahead();
        let sr = self.graph.sample_rate() as f64;

        while self.cursor < horizon {
            let Some(block) = self.queue.dequeue() else {
                break;
            };
            let start = self.cursor.max(now);
            let len = block.len();
            match self.graph.schedule_block(block, start) {
                Ok(id) => {
                    let tag = if self.queue.is_empty() {
                        self.generation += 1;
                        self.marker = Some(EndMarker {
                            unit: id,
                            generation: self.generation,
                        });
                        Some(self.generation)
                    } else {
                        None
                    };
                    self.active.insert(id, tag);
                    self.cursor = start + len as f64 / sr;
                    log::debug!("Scheduled unit {} ({} samples) at {:.3}s", id, len, start);
                }
                Err(e) => {
                    log::warn!("Dropping {} sample block: {}", len, e);
                }
            }
        }

        self.epoch += 1;
        let mut outcome = Outcome::keep(self.epoch);

        if !self.queue.is_empty() {
            let delay = rearm_delay(
                self.cursor,
                now,
                self.config.safety_margin(),
                Duration::from_millis(self.config.min_rearm_ms),
            );
            outcome.rearm = Rearm::After(delay);
        } else if !self.stream_complete {
            outcome.rearm = Rearm::After(Duration::from_millis(self.config.recheck_interval_ms));
        } else {
            self.is_playing = false;
            outcome.rearm = Rearm::Cancel;
            log::debug!("Queue drained, loop stopped");
            if self.active.is_empty() && !self.completion_fired {
                self.completion_fired = true;
                outcome.completed = true;
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{GraphEvent, TapRegistry};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn core_with(config: AudioConfig) -> (StreamerCore, UnboundedReceiver<GraphEvent>) {
        let (graph, rx) = PlaybackGraph::new(&config, TapRegistry::new());
        (StreamerCore::new(config, graph).unwrap(), rx)
    }

    fn core() -> (StreamerCore, UnboundedReceiver<GraphEvent>) {
        core_with(AudioConfig::default())
    }

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn render(core: &StreamerCore, frames: usize) {
        let mut buf = vec![0.0; frames];
        core.graph().render(&mut buf);
    }

    /// Feed every pending end event back into the core; returns how many completions fired.
    fn drain_events(core: &mut StreamerCore, rx: &mut UnboundedReceiver<GraphEvent>) -> usize {
        let mut fired = 0;
        while let Ok(GraphEvent::UnitEnded(id)) = rx.try_recv() {
            if core.on_unit_ended(id).completed {
                fired += 1;
            }
        }
        fired
    }

    #[test]
    fn one_full_block_from_15360_bytes() {
        let (mut core, _rx) = core();
        let out = core.ingest(&vec![0u8; 15_360]);
        let units = core.graph().active_units();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].len, 7680);
        assert!((units[0].start - 0.1).abs() < 1e-9);
        assert!(core.is_playing());
        assert_eq!(core.queue_len(), 0);
        assert_eq!(out.rearm, Rearm::After(Duration::from_millis(100)));
        assert_eq!(core.end_marker().map(|m| m.unit), Some(units[0].id));
    }

    #[test]
    fn two_small_ingests_play_back_to_back() {
        let (mut core, _rx) = core();
        core.ingest(&pcm(&[1000; 9]));
        core.ingest(&pcm(&[2000; 9]));
        // Second block waits for the next pass.
        assert_eq!(core.queue_len(), 1);
        let epoch = core.epoch;
        core.on_rearm(epoch);

        let units = core.graph().active_units();
        assert_eq!(units.len(), 2);
        assert!(units.iter().all(|u| u.len == 9));
        assert!((units[1].start - (units[0].start + 9.0 / 24_000.0)).abs() < 1e-9);
        assert_eq!(core.end_marker().map(|m| m.unit), Some(units[1].id));
    }

    #[test]
    fn lookahead_bounds_committed_audio() {
        let (mut core, _rx) = core();
        let out = core.ingest(&vec![0u8; 7680 * 2 * 4]);
        assert_eq!(core.active_units(), 1);
        assert_eq!(core.queue_len(), 3);
        let Rearm::After(d) = out.rearm else {
            panic!("expected a re-arm");
        };
        assert!((d.as_secs_f64() - 0.37).abs() < 1e-6);
    }

    #[test]
    fn first_timed_wake_schedules_next_block() {
        let (mut core, _rx) = core();
        let out = core.ingest(&vec![0u8; 7680 * 2 * 4]);
        let Rearm::After(d) = out.rearm else {
            panic!("expected a re-arm");
        };
        render(&core, (d.as_secs_f64() * 24_000.0).round() as usize);

        let out = core.on_rearm(out.epoch);
        assert_eq!(core.active_units(), 2);
        assert_eq!(core.queue_len(), 2);
        let units = core.graph().active_units();
        assert!((units[1].start - 0.42).abs() < 1e-9);
        let Rearm::After(next) = out.rearm else {
            panic!("expected a re-arm");
        };
        assert!((next.as_secs_f64() - 0.32).abs() < 1e-6);
    }

    #[test]
    fn stale_rearm_is_ignored() {
        let (mut core, _rx) = core();
        core.ingest(&vec![0u8; 7680 * 2 * 4]);
        let old = core.epoch - 1;
        render(&core, 24_000);
        let out = core.on_rearm(old);
        assert_eq!(out.rearm, Rearm::Keep);
        assert_eq!(core.queue_len(), 3);
    }

    #[test]
    fn stop_then_complete_fires_only_on_request() {
        let (mut core, mut rx) = core();
        core.ingest(&vec![0u8; 7680 * 2 * 3]);
        let out = core.stop();
        assert_eq!(out.rearm, Rearm::Cancel);
        assert!(!out.completed);
        assert_eq!(core.queue_len(), 0);
        assert_eq!(core.active_units(), 0);
        assert!(!core.is_playing());
        assert!(core.graph().active_units().is_empty());
        assert!(core.end_marker().is_none());

        render(&core, 24_000);
        assert_eq!(drain_events(&mut core, &mut rx), 0);
        // The service's end-of-turn after an interrupt still reaches the host.
        assert!(core.complete().completed);
        assert!(!core.complete().completed);
    }

    #[test]
    fn complete_when_idle_fires_once() {
        let (mut core, _rx) = core();
        assert!(core.complete().completed);
        assert!(!core.complete().completed);
        assert!(core.is_stream_complete());
    }

    #[test]
    fn completion_waits_for_the_last_unit() {
        let (mut core, mut rx) = core();
        core.ingest(&pcm(&[500; 9]));
        assert!(!core.complete().completed);
        render(&core, 2_000);
        assert_eq!(drain_events(&mut core, &mut rx), 0);
        render(&core, 1_000);
        assert_eq!(drain_events(&mut core, &mut rx), 1);
        assert!(core.end_marker().is_none());
    }

    #[test]
    fn never_completes_while_queue_has_blocks() {
        let (mut core, mut rx) = core();
        core.ingest(&pcm(&[500; 9]));
        core.ingest(&pcm(&[500; 9]));
        core.complete();
        // First unit ends while the second block is still queued.
        render(&core, 24_000);
        assert_eq!(drain_events(&mut core, &mut rx), 0);
        assert_eq!(core.queue_len(), 1);

        let epoch = core.epoch;
        let out = core.on_rearm(epoch);
        assert!(!out.completed);
        assert_eq!(out.rearm, Rearm::Cancel);
        assert!(!core.is_playing());
        render(&core, 24_000);
        assert_eq!(drain_events(&mut core, &mut rx), 1);
    }

    #[test]
    fn superseded_marker_cannot_complete() {
        let (mut core, mut rx) = core();
        core.ingest(&pcm(&[500; 9]));
        let first = core.end_marker().unwrap();
        core.ingest(&pcm(&[500; 4800]));
        let epoch = core.epoch;
        core.on_rearm(epoch);
        let second = core.end_marker().unwrap();
        assert!(second.generation > first.generation);
        core.complete();

        assert!(!core.on_unit_ended(first.unit).completed);
        render(&core, 24_000);
        assert_eq!(drain_events(&mut core, &mut rx), 1);
    }

    #[test]
    fn resume_primes_cursor_and_restores_gain() {
        let (mut core, _rx) = core();
        render(&core, 12_000);
        core.set_volume(0.2);
        core.stop();
        core.resume();
        assert!(core.scheduled_time() >= core.graph().now() + 0.1 - 1e-9);
        assert!(!core.is_stream_complete());
        assert!((core.graph().main_gain() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn resume_wakes_suspended_device() {
        let (mut core, _rx) = core();
        core.suspend();
        assert!(core.graph().is_suspended());
        core.resume();
        assert!(!core.graph().is_suspended());
    }

    #[test]
    fn stop_leaves_pad_running() {
        let (mut core, _rx) = core();
        core.start_pad(0.3);
        core.ingest(&vec![0u8; 4800]);
        core.stop();
        assert!(core.pad_active());
        assert!(core.graph().pad_gain().is_some());
    }

    #[test]
    fn dropped_block_does_not_advance_cursor() {
        let config = AudioConfig { max_sources: 1, ..AudioConfig::default() };
        let (mut core, mut rx) = core_with(config);
        core.graph().start_keep_alive(1.0, 1e-4).unwrap();
        core.ingest(&pcm(&[500; 9]));
        assert_eq!(core.active_units(), 0);
        assert!((core.scheduled_time() - 0.1).abs() < 1e-9);
        assert!(core.complete().completed);
        assert_eq!(drain_events(&mut core, &mut rx), 0);
    }

    #[test]
    fn states_follow_the_stream() {
        let (mut core, _rx) = core();
        assert_eq!(core.state(), SchedulerState::Idle);
        core.ingest(&vec![0u8; 7680 * 2 * 3]);
        assert_eq!(core.state(), SchedulerState::Draining);
        core.stop();
        assert_eq!(core.state(), SchedulerState::Complete);
        core.resume();
        assert_eq!(core.state(), SchedulerState::Idle);
    }
}
