//! Playback graph: the software mixer the scheduler commits audio into.
//!
//! The control side schedules speech units at future device times, drives
//! gain automation and owns the pad/keep-alive sources. The render side
//! (`render`, called from the `audio-play` thread) mixes one period at a
//! time, advances the device clock and reports finished units through an
//! unbounded channel so it never waits on the control side.
//!
//! Signal flow per sample:
//!
//! ```text
//! speech units ─┬─> (+ pad) ─> main gain ─┐
//!               └─> taps ─────────────────┼─> clamp ─> device
//! keep-alive ─────────────────────────────┘
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Result, anyhow, bail};
use tokio::sync::mpsc;

use super::audio_system::AudioConfig;
use super::dsp::{LowPass, Osc, Wave};
use super::param::AudioParam;
use super::tap::{Tap, TapHandle, TapRegistry};

pub type UnitId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphEvent {
    /// A speech unit played its last sample. Not sent for units removed by `stop_unit`.
    UnitEnded(UnitId),
}

/// Snapshot of one scheduled speech unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitInfo {
    pub id: UnitId,
    /// Start time on the device clock, seconds.
    pub start: f64,
    pub len: usize,
}

/// Oscillator set for the ambient pad; frequencies already include detune.
#[derive(Debug, Clone, Copy)]
pub struct PadVoices {
    pub frequencies: [f32; 3],
    pub cutoff_hz: f32,
}

struct Voice {
    id: UnitId,
    start_frame: u64,
    samples: Arc<[f32]>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

struct PadSource {
    oscs: [Osc; 3],
    filter: LowPass,
    gain: AudioParam,
}

impl PadSource {
    #[inline]
    fn next(&mut self, sr: f32, t: f64) -> f32 {
        let x: f32 = self.oscs.iter_mut().map(|o| o.next(sr)).sum::<f32>() / 3.0;
        self.filter.process(x) * self.gain.value_at(t)
    }
}

struct KeepAliveSource {
    osc: Osc,
    amplitude: f32,
}

struct TapSlot {
    name: String,
    listeners: usize,
    tap: Box<dyn Tap>,
    out: Vec<f32>,
}

struct GraphState {
    sample_rate: f32,
    frame: u64,
    suspended: bool,
    next_id: UnitId,
    max_sources: usize,
    voices: Vec<Voice>,
    main_gain: AudioParam,
    pad: Option<PadSource>,
    keep_alive: Option<KeepAliveSource>,
    registry: TapRegistry,
    taps: Vec<TapSlot>,
    speech: Vec<f32>,
    events: mpsc::UnboundedSender<GraphEvent>,
}

impl GraphState {
    fn now(&self) -> f64 {
        self.frame as f64 / self.sample_rate as f64
    }

    fn source_count(&self) -> usize {
        self.voices.len() + usize::from(self.pad.is_some()) + usize::from(self.keep_alive.is_some())
    }

    fn reserve_source(&self, what: &str) -> Result<()> {
        if self.source_count() >= self.max_sources {
            bail!(
                "audio graph source limit ({}) reached, cannot create {}",
                self.max_sources,
                what
            );
        }
        Ok(())
    }

    fn render(&mut self, out: &mut [f32]) {
        let n = out.len();
        if self.suspended || n == 0 {
            out.fill(0.0);
            return;
        }

        let sr = self.sample_rate;
        let base = self.frame;
        let period_end = base + n as u64;

        let mut speech = std::mem::take(&mut self.speech);
        speech.clear();
        speech.resize(n, 0.0);

        let mut ended: Vec<(u64, UnitId)> = Vec::new();
        for v in &self.voices {
            if v.start_frame >= period_end {
                continue;
            }
            let from = v.start_frame.max(base);
            let to = v.end_frame().min(period_end);
            if from < to {
                let src = &v.samples[(from - v.start_frame) as usize..(to - v.start_frame) as usize];
                let dst = &mut speech[(from - base) as usize..(to - base) as usize];
                for (d, s) in dst.iter_mut().zip(src) {
                    *d += *s;
                }
            }
            if v.end_frame() <= period_end {
                ended.push((v.end_frame(), v.id));
            }
        }
        self.voices.retain(|v| v.end_frame() > period_end);

        for (i, o) in out.iter_mut().enumerate() {
            let t = (base + i as u64) as f64 / sr as f64;
            let pad = match self.pad.as_mut() {
                Some(p) => p.next(sr, t),
                None => 0.0,
            };
            *o = (speech[i] + pad) * self.main_gain.value_at(t);
        }

        for slot in &mut self.taps {
            slot.out.clear();
            slot.out.resize(n, 0.0);
            slot.tap.process(&speech, &mut slot.out);
            for (o, t) in out.iter_mut().zip(&slot.out) {
                *o += *t;
            }
        }

        if let Some(ka) = self.keep_alive.as_mut() {
            for o in out.iter_mut() {
                *o += ka.osc.next(sr) * ka.amplitude;
            }
        }

        for o in out.iter_mut() {
            *o = o.clamp(-1.0, 1.0);
        }

        self.speech = speech;
        self.frame = period_end;

        let now = self.now();
        self.main_gain.settle(now);
        if let Some(p) = self.pad.as_mut() {
            p.gain.settle(now);
        }

        ended.sort_unstable();
        for (_, id) in ended {
            // Receiver gone means the streamer was dropped; nothing to notify.
            let _ = self.events.send(GraphEvent::UnitEnded(id));
        }
    }
}

/// Cloneable handle to the shared graph.
#[derive(Clone)]
pub struct PlaybackGraph {
    inner: Arc<Mutex<GraphState>>,
    sample_rate: f32,
}

impl PlaybackGraph {
    /// Build an empty graph. The receiver yields `GraphEvent`s from the render path.
    pub fn new(
        config: &AudioConfig,
        registry: TapRegistry,
    ) -> (Self, mpsc::UnboundedReceiver<GraphEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sample_rate = config.sample_rate as f32;
        let state = GraphState {
            sample_rate,
            frame: 0,
            suspended: false,
            next_id: 1,
            max_sources: config.max_sources,
            voices: Vec::new(),
            main_gain: AudioParam::new(1.0),
            pad: None,
            keep_alive: None,
            registry,
            taps: Vec::new(),
            speech: Vec::new(),
            events: tx,
        };
        let graph = Self {
            inner: Arc::new(Mutex::new(state)),
            sample_rate,
        };
        (graph, rx)
    }

    fn lock(&self) -> MutexGuard<'_, GraphState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Current device time in seconds.
    pub fn now(&self) -> f64 {
        self.lock().now()
    }

    /// Mix the next `out.len()` frames and advance the clock.
    pub fn render(&self, out: &mut [f32]) {
        self.lock().render(out);
    }

    // ---------------------------------------------------------------- speech

    /// Create a unit playing `samples` from device time `start` (clamped to now).
    pub fn schedule_block(&self, samples: Arc<[f32]>, start: f64) -> Result<UnitId> {
        let mut st = self.lock();
        if samples.is_empty() {
            bail!("refusing to schedule an empty block");
        }
        st.reserve_source("speech unit")?;

        let requested = (start.max(0.0) * st.sample_rate as f64).round() as u64;
        let start_frame = requested.max(st.frame);
        let id = st.next_id;
        st.next_id += 1;
        st.voices.push(Voice { id, start_frame, samples });
        Ok(id)
    }

    /// Silence a unit immediately. Fails if it already finished or never existed.
    pub fn stop_unit(&self, id: UnitId) -> Result<()> {
        let mut st = self.lock();
        let idx = st
            .voices
            .iter()
            .position(|v| v.id == id)
            .ok_or_else(|| anyhow!("unit {} is not playing", id))?;
        st.voices.swap_remove(idx);
        Ok(())
    }

    pub fn active_units(&self) -> Vec<UnitInfo> {
        let st = self.lock();
        let sr = st.sample_rate as f64;
        let mut units: Vec<UnitInfo> = st
            .voices
            .iter()
            .map(|v| UnitInfo {
                id: v.id,
                start: v.start_frame as f64 / sr,
                len: v.samples.len(),
            })
            .collect();
        units.sort_by_key(|u| u.id);
        units
    }

    // ------------------------------------------------------------- main gain

    pub fn main_gain(&self) -> f32 {
        let st = self.lock();
        st.main_gain.value_at(st.now())
    }

    pub fn set_main_gain(&self, value: f32) {
        self.lock().main_gain.set_value(value.max(0.0));
    }

    // ------------------------------------------------------------------- pad

    pub fn start_pad(&self, voices: PadVoices) -> Result<()> {
        let mut st = self.lock();
        if st.pad.is_some() {
            bail!("pad source already running");
        }
        st.reserve_source("pad")?;
        let sr = st.sample_rate;
        st.pad = Some(PadSource {
            oscs: voices.frequencies.map(|f| Osc::new(f, Wave::Tri)),
            filter: LowPass::new(voices.cutoff_hz, 0.707, sr),
            gain: AudioParam::new(0.0),
        });
        Ok(())
    }

    pub fn ramp_pad_gain(&self, target: f32, duration: f64) -> Result<()> {
        let mut st = self.lock();
        let now = st.now();
        let pad = st.pad.as_mut().ok_or_else(|| anyhow!("pad source not running"))?;
        pad.gain.linear_ramp_to(target, now, duration);
        Ok(())
    }

    /// Instantaneous pad gain, `None` if no pad source exists.
    pub fn pad_gain(&self) -> Option<f32> {
        let st = self.lock();
        let now = st.now();
        st.pad.as_ref().map(|p| p.gain.value_at(now))
    }

    /// Frequencies of the running pad oscillators.
    pub fn pad_frequencies(&self) -> Option<[f32; 3]> {
        self.lock().pad.as_ref().map(|p| p.oscs.map(|o| o.freq()))
    }

    /// Release the pad oscillators and filter. Returns whether one existed.
    pub fn stop_pad(&self) -> bool {
        self.lock().pad.take().is_some()
    }

    // ------------------------------------------------------------ keep-alive

    pub fn start_keep_alive(&self, frequency_hz: f32, amplitude: f32) -> Result<()> {
        let mut st = self.lock();
        if st.keep_alive.is_some() {
            bail!("keep-alive oscillator already running");
        }
        st.reserve_source("keep-alive oscillator")?;
        st.keep_alive = Some(KeepAliveSource {
            osc: Osc::new(frequency_hz, Wave::Sine),
            amplitude,
        });
        Ok(())
    }

    pub fn has_keep_alive(&self) -> bool {
        self.lock().keep_alive.is_some()
    }

    // ------------------------------------------------------------------ taps

    /// Attach a registered tap. Attaching the same name again only adds a listener.
    pub fn attach_tap(&self, name: &str) -> Result<TapHandle> {
        let mut st = self.lock();
        if let Some(slot) = st.taps.iter_mut().find(|s| s.name == name) {
            slot.listeners += 1;
            return Ok(TapHandle {
                name: slot.name.clone(),
                listeners: slot.listeners,
            });
        }
        let tap = st
            .registry
            .build(name, st.sample_rate)
            .ok_or_else(|| anyhow!("no tap registered as '{}'", name))?;
        st.taps.push(TapSlot {
            name: name.to_string(),
            listeners: 1,
            tap,
            out: Vec::new(),
        });
        Ok(TapHandle {
            name: name.to_string(),
            listeners: 1,
        })
    }

    pub fn tap_count(&self) -> usize {
        self.lock().taps.len()
    }

    // ---------------------------------------------------------------- device

    /// Freeze the clock and render silence until `resume`.
    pub fn suspend(&self) {
        self.lock().suspended = true;
    }

    pub fn resume(&self) {
        self.lock().suspended = false;
    }

    pub fn is_suspended(&self) -> bool {
        self.lock().suspended
    }
}
