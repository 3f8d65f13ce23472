//! The AudioSystem that owns the playback render thread.
//!
//! Uses std::thread (NOT tokio tasks) for real-time audio I/O to avoid
//! contention with async network tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Result;

use super::graph::PlaybackGraph;

/// Ambient pad configuration.
#[derive(Debug, Clone)]
pub struct PadConfig {
    /// Drone chord (A2, E3, A3) before detune
    pub frequencies: [f32; 3],
    /// Maximum random detune per voice, in cents (±)
    pub detune_cents: f32,
    /// Fixed low-pass cutoff in Hz
    pub cutoff_hz: f32,
    pub fade_in_ms: u64,
    pub fade_out_ms: u64,
    /// Transition time for `set_pad_volume`
    pub volume_ramp_ms: u64,
}

impl Default for PadConfig {
    fn default() -> Self {
        Self {
            frequencies: [110.0, 164.81, 220.0],
            detune_cents: 6.0,
            cutoff_hz: 800.0,
            fade_in_ms: 2000,
            fade_out_ms: 2000,
            volume_ramp_ms: 500,
        }
    }
}

/// Keep-alive tone configuration.
#[derive(Debug, Clone)]
pub struct KeepAliveConfig {
    pub enabled: bool,
    pub frequency_hz: f32,
    pub amplitude: f32,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            frequency_hz: 1.0,
            amplitude: 1.0e-4,
        }
    }
}

/// Audio system configuration.
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Stream sample rate; also the graph and device rate (mono in, mono mix)
    pub sample_rate: u32,
    /// Wire format of incoming chunks, see `create_decoder`
    pub stream_format: String,
    /// Samples per scheduled block (7680 ≈ 320 ms at 24 kHz)
    pub block_length: usize,
    /// Head start given to the first block after ingest/resume
    pub initial_buffer_delay_ms: u64,
    /// How far ahead of the device clock audio may be committed
    pub lookahead_ms: u64,
    /// Poll period while waiting for more data
    pub recheck_interval_ms: u64,
    /// Wake-up margin before committed audio runs out
    pub safety_margin_ms: u64,
    /// Lower bound for any re-arm delay
    pub min_rearm_ms: u64,
    /// Maximum number of simultaneous graph sources
    pub max_sources: usize,
    /// Output backend: "null" or "alsa"
    pub output_backend: String,
    /// ALSA playback device name
    pub playback_device: String,
    /// Desired device channel count (mono is duplicated)
    pub playback_channels: u32,
    /// Frames rendered per device write
    pub playback_period_size: usize,
    pub pad: PadConfig,
    pub keep_alive: KeepAliveConfig,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24000,
            stream_format: "pcm16".to_string(),
            block_length: 7680,
            initial_buffer_delay_ms: 100,
            lookahead_ms: 200,
            recheck_interval_ms: 100,
            safety_margin_ms: 50,
            min_rearm_ms: 10,
            max_sources: 256,
            output_backend: "null".to_string(),
            playback_device: "default".to_string(),
            playback_channels: 2,
            playback_period_size: 480,
            pad: PadConfig::default(),
            keep_alive: KeepAliveConfig::default(),
        }
    }
}

impl AudioConfig {
    pub fn initial_buffer_delay(&self) -> f64 {
        self.initial_buffer_delay_ms as f64 / 1000.0
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead_ms as f64 / 1000.0
    }

    pub fn safety_margin(&self) -> f64 {
        self.safety_margin_ms as f64 / 1000.0
    }
}

/// Where rendered mono periods go.
pub trait OutputDevice: Send {
    /// Frames per `write` call.
    fn period_frames(&self) -> usize;
    /// Write one mono period; blocks until the device accepted it.
    fn write(&mut self, frames: &[f32]) -> Result<()>;
}

/// Discards audio but paces writes in real time, so the graph clock behaves
/// like a device clock on headless hosts.
pub struct NullDevice {
    period: usize,
    period_duration: Duration,
    next_deadline: Option<Instant>,
}

impl NullDevice {
    pub fn new(sample_rate: u32, period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            period_duration: Duration::from_secs_f64(period as f64 / sample_rate.max(1) as f64),
            next_deadline: None,
        }
    }
}

impl OutputDevice for NullDevice {
    fn period_frames(&self) -> usize {
        self.period
    }

    fn write(&mut self, _frames: &[f32]) -> Result<()> {
        let now = Instant::now();
        let deadline = self.next_deadline.unwrap_or(now) + self.period_duration;
        if deadline > now {
            thread::sleep(deadline - now);
        }
        // Fell behind (e.g. host stalled): restart pacing instead of bursting.
        self.next_deadline = Some(deadline.max(now));
        Ok(())
    }
}

#[cfg(feature = "alsa")]
pub struct AlsaDevice {
    pcm: alsa::pcm::PCM,
    channels: usize,
    period: usize,
    interleaved: Vec<i16>,
}

#[cfg(feature = "alsa")]
impl AlsaDevice {
    pub fn open(config: &AudioConfig) -> Result<Self> {
        let period = if config.playback_period_size > 0 {
            Some(config.playback_period_size)
        } else {
            None
        };
        let (pcm, params) = super::alsa_device::open_playback(
            &config.playback_device,
            config.sample_rate,
            config.playback_channels,
            period,
        )?;
        if params.sample_rate != config.sample_rate {
            anyhow::bail!(
                "ALSA negotiated {} Hz but the stream is {} Hz",
                params.sample_rate,
                config.sample_rate
            );
        }
        Ok(Self {
            pcm,
            channels: params.channels as usize,
            period: params.period_size.max(1),
            interleaved: Vec::new(),
        })
    }
}

#[cfg(feature = "alsa")]
impl OutputDevice for AlsaDevice {
    fn period_frames(&self) -> usize {
        self.period
    }

    fn write(&mut self, frames: &[f32]) -> Result<()> {
        self.interleaved.clear();
        for s in frames {
            let v = (s * 32767.0) as i16;
            for _ in 0..self.channels {
                self.interleaved.push(v);
            }
        }

        let io = self.pcm.io_i16()?;
        let channels = self.channels;
        let interleaved = &self.interleaved;
        let pcm = &self.pcm;
        write_with_recovery(
            frames.len(),
            |done| io.writei(&interleaved[done * channels..]),
            || pcm.prepare(),
        );
        Ok(())
    }
}

/// Push `total_frames` through `write` (called with the frames done so far),
/// recovering with `recover` after an error. A failed recovery or too many
/// retries drops the rest of this period; the caller keeps running either
/// way. Returns the frames written.
#[cfg_attr(not(feature = "alsa"), allow(dead_code))]
fn write_with_recovery<W, R, E1, E2>(total_frames: usize, mut write: W, mut recover: R) -> usize
where
    W: FnMut(usize) -> std::result::Result<usize, E1>,
    R: FnMut() -> std::result::Result<(), E2>,
    E1: std::fmt::Display,
    E2: std::fmt::Display,
{
    let mut frames_written = 0;
    let mut retry_count = 0u32;

    // Retry loop handles short writes and XRUN recovery without losing frames.
    while frames_written < total_frames {
        match write(frames_written) {
            Ok(n) => {
                frames_written += n;
                retry_count = 0;
            }
            Err(e) => {
                log::warn!("ALSA XRUN or error: {}, recovering...", e);
                retry_count += 1;

                if let Err(e2) = recover() {
                    log::error!("Failed to recover PCM playback: {}", e2);
                    break;
                }

                // 底层持续跟不上写入速度时，丢弃剩余帧防止死循环
                if retry_count >= 3 {
                    log::error!(
                        "Max recovery retries ({}) reached. Dropping {} unwritten frames.",
                        retry_count,
                        total_frames - frames_written
                    );
                    break;
                }
            }
        }
    }
    frames_written
}

/// Factory function: open the output device named by `config.output_backend`.
pub fn open_device(config: &AudioConfig) -> Result<Box<dyn OutputDevice>> {
    match config.output_backend.as_str() {
        "null" => {
            log::warn!("Output backend 'null': audio is paced but discarded");
            Ok(Box::new(NullDevice::new(
                config.sample_rate,
                config.playback_period_size,
            )))
        }
        #[cfg(feature = "alsa")]
        "alsa" => Ok(Box::new(AlsaDevice::open(config)?)),
        other => anyhow::bail!("Unsupported output backend: {}", other),
    }
}

/// Owns the `audio-play` thread that pulls periods from the graph into the device.
pub struct AudioSystem {
    running: Arc<AtomicBool>,
    play_handle: Option<JoinHandle<()>>,
}

impl AudioSystem {
    /// Start rendering `graph` into `device` on a dedicated OS thread.
    pub fn start(graph: PlaybackGraph, device: Box<dyn OutputDevice>) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));

        log::info!(
            "AudioSystem starting, rate: {}Hz, period: {} frames",
            graph.sample_rate(),
            device.period_frames(),
        );

        let play_handle = {
            let running = running.clone();
            thread::Builder::new()
                .name("audio-play".into())
                .spawn(move || {
                    if let Err(e) = play_thread(&graph, device, &running) {
                        log::error!("Playback thread error: {}", e);
                    }
                })?
        };

        Ok(Self {
            running,
            play_handle: Some(play_handle),
        })
    }

    /// Signal the render thread to stop and wait for it.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(h) = self.play_handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for AudioSystem {
    fn drop(&mut self) {
        self.stop();
    }
}

fn play_thread(
    graph: &PlaybackGraph,
    mut device: Box<dyn OutputDevice>,
    running: &AtomicBool,
) -> Result<()> {
    let mut period = vec![0.0f32; device.period_frames()];

    log::info!("Playback started: period={}", period.len());

    while running.load(Ordering::Relaxed) {
        graph.render(&mut period);
        device.write(&period)?;
    }

    log::info!("Playback stopped");
    Ok(())
}
