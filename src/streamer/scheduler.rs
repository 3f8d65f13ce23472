//! Scheduling decisions shared by the core and its driver task.

use std::time::Duration;

use crate::audio::{PadCommand, UnitId};

/// What the driver must do with the single re-arm deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rearm {
    /// Leave the current deadline alone.
    Keep,
    Cancel,
    /// Replace the deadline with one `Duration` from now.
    After(Duration),
}

/// Result of one core operation. Applied by the caller with no lock held.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub rearm: Rearm,
    /// Epoch the re-arm decision belongs to; older decisions are stale.
    pub epoch: u64,
    /// Fire the completion callback.
    pub completed: bool,
    pub pad: PadCommand,
}

impl Outcome {
    pub fn keep(epoch: u64) -> Self {
        Self {
            rearm: Rearm::Keep,
            epoch,
            completed: false,
            pad: PadCommand::None,
        }
    }
}

/// Unit that emptied the queue when it was scheduled. Only a unit still
/// carrying the current generation may complete the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndMarker {
    pub unit: UnitId,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    /// Queue holds blocks not yet committed.
    Draining,
    /// Queue empty, stream still open.
    Waiting,
    /// Stream complete; the loop has stopped.
    Complete,
}

/// Delay until the next pass while blocks are still queued: wake
/// `safety_margin` before committed audio runs out at `cursor`. The lookahead
/// window is open by then, so the wake always schedules.
pub fn rearm_delay(cursor: f64, now: f64, safety_margin: f64, min: Duration) -> Duration {
    let wait = (cursor - now) - safety_margin;
    if wait.is_finite() && wait > min.as_secs_f64() {
        Duration::from_secs_f64(wait)
    } else {
        min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: Duration = Duration::from_millis(10);

    #[test]
    fn waits_until_margin_before_cursor() {
        let d = rearm_delay(0.42, 0.0, 0.05, MIN);
        assert!((d.as_secs_f64() - 0.37).abs() < 1e-9);
    }

    #[test]
    fn wake_lands_inside_lookahead_window() {
        let (cursor, lookahead) = (0.42, 0.2);
        let wake = rearm_delay(cursor, 0.0, 0.05, MIN).as_secs_f64();
        assert!(cursor < wake + lookahead);
    }

    #[test]
    fn never_below_minimum() {
        assert_eq!(rearm_delay(0.05, 0.0, 0.05, MIN), MIN);
        assert_eq!(rearm_delay(0.0, 5.0, 0.05, MIN), MIN);
    }
}
