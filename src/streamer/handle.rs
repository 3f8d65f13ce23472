//! `AudioStreamer`: thread-safe facade over `StreamerCore` plus the tokio
//! driver task that owns the re-arm and pad teardown deadlines.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, sleep_until};

use super::core::StreamerCore;
use super::scheduler::{Outcome, Rearm, SchedulerState};
use crate::audio::{AudioConfig, GraphEvent, PadCommand, PlaybackGraph, keep_alive};

type CompletionCallback = Arc<dyn Fn() + Send + Sync>;

/// Timer updates from host calls to the driver.
#[derive(Debug)]
enum DriverCommand {
    Apply { rearm: Rearm, epoch: u64, pad: PadCommand },
}

pub struct AudioStreamer {
    core: Arc<Mutex<StreamerCore>>,
    graph: PlaybackGraph,
    commands: mpsc::UnboundedSender<DriverCommand>,
    on_complete: CompletionCallback,
    driver: JoinHandle<()>,
}

impl AudioStreamer {
    /// Build the streamer and spawn its driver on the current tokio runtime.
    ///
    /// `events` is the receiver returned by `PlaybackGraph::new`. The
    /// keep-alive tone is started here and lives as long as the graph.
    pub fn new<F>(
        config: AudioConfig,
        graph: PlaybackGraph,
        events: mpsc::UnboundedReceiver<GraphEvent>,
        on_complete: F,
    ) -> Result<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        keep_alive::start(&graph, &config.keep_alive);

        let core = Arc::new(Mutex::new(StreamerCore::new(config, graph.clone())?));
        let on_complete: CompletionCallback = Arc::new(on_complete);
        let (tx, rx) = mpsc::unbounded_channel();

        let driver = tokio::spawn(drive(core.clone(), rx, events, on_complete.clone()));

        Ok(Self {
            core,
            graph,
            commands: tx,
            on_complete,
            driver,
        })
    }

    fn lock(&self) -> MutexGuard<'_, StreamerCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand timer changes to the driver and run the callback, lock released.
    fn apply(&self, outcome: Outcome) {
        if outcome.rearm != Rearm::Keep || outcome.pad != PadCommand::None {
            let cmd = DriverCommand::Apply {
                rearm: outcome.rearm,
                epoch: outcome.epoch,
                pad: outcome.pad,
            };
            if self.commands.send(cmd).is_err() {
                log::error!("Streamer driver is gone, timer update lost");
            }
        }
        if outcome.completed {
            (self.on_complete)();
        }
    }

    pub fn ingest(&self, data: &[u8]) {
        let outcome = self.lock().ingest(data);
        self.apply(outcome);
    }

    pub fn stop(&self) {
        let outcome = self.lock().stop();
        self.apply(outcome);
    }

    pub fn resume(&self) {
        let outcome = self.lock().resume();
        self.apply(outcome);
    }

    /// Mark the stream finished. Fires the callback right here if nothing
    /// is left to play.
    pub fn complete(&self) {
        let outcome = self.lock().complete();
        self.apply(outcome);
    }

    pub fn suspend(&self) {
        let outcome = self.lock().suspend();
        self.apply(outcome);
    }

    pub fn set_volume(&self, volume: f32) {
        let outcome = self.lock().set_volume(volume);
        self.apply(outcome);
    }

    pub fn start_pad(&self, volume: f32) {
        let outcome = self.lock().start_pad(volume);
        self.apply(outcome);
    }

    pub fn set_pad_volume(&self, volume: f32) {
        let outcome = self.lock().set_pad_volume(volume);
        self.apply(outcome);
    }

    pub fn stop_pad(&self) {
        let outcome = self.lock().stop_pad();
        self.apply(outcome);
    }

    pub fn graph(&self) -> &PlaybackGraph {
        &self.graph
    }

    pub fn is_playing(&self) -> bool {
        self.lock().is_playing()
    }

    pub fn is_stream_complete(&self) -> bool {
        self.lock().is_stream_complete()
    }

    pub fn queue_len(&self) -> usize {
        self.lock().queue_len()
    }

    pub fn active_units(&self) -> usize {
        self.lock().active_units()
    }

    pub fn scheduled_time(&self) -> f64 {
        self.lock().scheduled_time()
    }

    pub fn pad_active(&self) -> bool {
        self.lock().pad_active()
    }

    pub fn state(&self) -> SchedulerState {
        self.lock().state()
    }
}

impl Drop for AudioStreamer {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

fn lock_core(core: &Mutex<StreamerCore>) -> MutexGuard<'_, StreamerCore> {
    core.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Deadlines owned by the driver task.
#[derive(Default)]
struct Timers {
    rearm: Option<(Instant, u64)>,
    teardown: Option<(Instant, u64)>,
    /// Newest re-arm epoch applied; older decisions arriving late are dropped.
    epoch: u64,
}

impl Timers {
    fn apply(&mut self, rearm: Rearm, epoch: u64, pad: PadCommand) {
        if rearm != Rearm::Keep && epoch >= self.epoch {
            self.epoch = epoch;
            self.rearm = match rearm {
                Rearm::After(delay) => Some((Instant::now() + delay, epoch)),
                _ => None,
            };
        }
        match pad {
            PadCommand::None => {}
            PadCommand::CancelTeardown => self.teardown = None,
            PadCommand::ScheduleTeardown(t) => {
                let at = Instant::now() + Duration::from_secs_f64(t.delay.max(0.0));
                self.teardown = Some((at, t.generation));
            }
        }
    }

    /// Apply a decision made on the driver itself and report completion.
    fn apply_outcome(&mut self, outcome: Outcome, on_complete: &CompletionCallback) {
        self.apply(outcome.rearm, outcome.epoch, outcome.pad);
        if outcome.completed {
            on_complete();
        }
    }
}

async fn drive(
    core: Arc<Mutex<StreamerCore>>,
    mut commands: mpsc::UnboundedReceiver<DriverCommand>,
    mut events: mpsc::UnboundedReceiver<GraphEvent>,
    on_complete: CompletionCallback,
) {
    let mut timers = Timers::default();
    log::debug!("Streamer driver started");

    loop {
        // 无定时器时用一个很远的时间占位，分支被 if 条件禁用
        let far = Instant::now() + Duration::from_secs(86_400);
        let rearm_at = timers.rearm.map_or(far, |(at, _)| at);
        let teardown_at = timers.teardown.map_or(far, |(at, _)| at);

        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(DriverCommand::Apply { rearm, epoch, pad }) => timers.apply(rearm, epoch, pad),
                None => break,
            },

            Some(event) = events.recv() => {
                let GraphEvent::UnitEnded(id) = event;
                let outcome = lock_core(&core).on_unit_ended(id);
                timers.apply_outcome(outcome, &on_complete);
            }

            _ = sleep_until(rearm_at), if timers.rearm.is_some() => {
                if let Some((_, epoch)) = timers.rearm.take() {
                    let outcome = lock_core(&core).on_rearm(epoch);
                    timers.apply_outcome(outcome, &on_complete);
                }
            }

            _ = sleep_until(teardown_at), if timers.teardown.is_some() => {
                if let Some((_, generation)) = timers.teardown.take() {
                    lock_core(&core).on_pad_teardown(generation);
                }
            }
        }
    }

    log::debug!("Streamer driver stopped");
}
