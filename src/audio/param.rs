//! Sample-accurate gain automation on the device clock.
//!
//! An `AudioParam` holds a steady value plus at most one linear ramp. Ramps
//! always start from the value the parameter has at the moment the ramp is
//! requested, so retargeting mid-ramp never jumps.

#[derive(Debug, Clone, Copy)]
struct Ramp {
    from: f32,
    to: f32,
    start: f64,
    end: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct AudioParam {
    value: f32,
    ramp: Option<Ramp>,
}

impl AudioParam {
    pub fn new(value: f32) -> Self {
        Self { value, ramp: None }
    }

    /// Value at device time `t` (seconds).
    pub fn value_at(&self, t: f64) -> f32 {
        match self.ramp {
            None => self.value,
            Some(r) if t <= r.start => r.from,
            Some(r) if t >= r.end => r.to,
            Some(r) => {
                let k = ((t - r.start) / (r.end - r.start)) as f32;
                r.from + (r.to - r.from) * k
            }
        }
    }

    /// Jump to `value` immediately, dropping any ramp in flight.
    pub fn set_value(&mut self, value: f32) {
        self.value = value;
        self.ramp = None;
    }

    /// Ramp linearly from the current value at `now` to `target` over `duration` seconds.
    pub fn linear_ramp_to(&mut self, target: f32, now: f64, duration: f64) {
        let from = self.value_at(now);
        if duration <= 0.0 {
            self.set_value(target);
            return;
        }
        self.value = target;
        self.ramp = Some(Ramp {
            from,
            to: target,
            start: now,
            end: now + duration,
        });
    }

    /// Collapse a finished ramp so the render loop takes the cheap path.
    pub fn settle(&mut self, now: f64) {
        if matches!(self.ramp, Some(r) if now >= r.end) {
            self.ramp = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_interpolates_linearly() {
        let mut p = AudioParam::new(0.0);
        p.linear_ramp_to(1.0, 10.0, 2.0);
        assert_eq!(p.value_at(10.0), 0.0);
        assert!((p.value_at(11.0) - 0.5).abs() < 1e-6);
        assert_eq!(p.value_at(12.0), 1.0);
        assert_eq!(p.value_at(20.0), 1.0);
    }

    #[test]
    fn retarget_mid_ramp_starts_from_current_value() {
        let mut p = AudioParam::new(0.0);
        p.linear_ramp_to(0.3, 0.0, 2.0);
        let at_half = p.value_at(1.0);
        p.linear_ramp_to(0.1, 1.0, 0.5);
        assert!((p.value_at(1.0) - at_half).abs() < 1e-6);
        assert!((p.value_at(1.5) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn set_value_cancels_ramp() {
        let mut p = AudioParam::new(0.0);
        p.linear_ramp_to(1.0, 0.0, 1.0);
        p.set_value(0.25);
        assert_eq!(p.value_at(0.5), 0.25);
    }

    #[test]
    fn settle_drops_finished_ramp() {
        let mut p = AudioParam::new(0.0);
        p.linear_ramp_to(0.8, 0.0, 1.0);
        p.settle(2.0);
        assert_eq!(p.value_at(0.0), 0.8);
    }
}
