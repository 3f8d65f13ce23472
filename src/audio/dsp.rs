//! Per-sample building blocks for the pad and keep-alive sources.
//!
//! Zero-allocation and `Copy`; everything steps one sample at a time at the
//! graph's sample rate.

use std::f32::consts::PI;

const TAU: f32 = 2.0 * PI;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Wave {
    Sine,
    Tri,
}

#[inline]
fn wave_sample(phase01: f32, wave: Wave) -> f32 {
    match wave {
        Wave::Sine => (TAU * phase01).sin(),
        Wave::Tri => 4.0 * (phase01 - 0.5).abs() - 1.0,
    }
}

/// Free-running oscillator with phase kept in `[0, 1)`.
#[derive(Copy, Clone, Debug)]
pub struct Osc {
    phase: f32,
    freq: f32,
    wave: Wave,
}

impl Osc {
    #[inline]
    pub fn new(freq_hz: f32, wave: Wave) -> Self {
        Self { phase: 0.0, freq: freq_hz.max(0.0), wave }
    }

    #[inline]
    pub fn freq(&self) -> f32 {
        self.freq
    }

    #[inline]
    pub fn next(&mut self, sr: f32) -> f32 {
        let s = wave_sample(self.phase, self.wave);
        self.phase = (self.phase + self.freq / sr) % 1.0;
        s
    }
}

/// Detune ratio for an offset in cents (1200 cents = one octave).
#[inline]
pub fn cents_to_ratio(cents: f32) -> f32 {
    (std::f32::consts::LN_2 * (cents / 1200.0)).exp()
}

/// Two-pole TPT state-variable low-pass (`g = tan(pi fc / sr)`, `R = 1/(2Q)`).
#[derive(Copy, Clone, Debug)]
pub struct LowPass {
    g: f32,
    r: f32,
    ic1eq: f32,
    ic2eq: f32,
}

impl LowPass {
    pub fn new(cut_hz: f32, q: f32, sr: f32) -> Self {
        let fc = cut_hz.clamp(1.0, 0.49 * sr);
        Self {
            g: (PI * fc / sr).tan(),
            r: 1.0 / (2.0 * q.max(1e-3)),
            ic1eq: 0.0,
            ic2eq: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let h = 1.0 / (1.0 + 2.0 * self.r * self.g + self.g * self.g);
        let hp = (x - (2.0 * self.r + self.g) * self.ic1eq - self.ic2eq) * h;
        let bp = self.g * hp + self.ic1eq;
        let lp = self.g * bp + self.ic2eq;
        self.ic1eq = self.g * hp + bp;
        self.ic2eq = self.g * bp + lp;
        if lp.abs() < 1.0e-20 { 0.0 } else { lp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oscillators_stay_bounded() {
        for wave in [Wave::Sine, Wave::Tri] {
            let mut osc = Osc::new(440.0, wave);
            for _ in 0..48_000 {
                let s = osc.next(24_000.0);
                assert!((-1.0..=1.0).contains(&s), "{wave:?} produced {s}");
            }
        }
    }

    #[test]
    fn low_pass_passes_dc_and_damps_nyquist() {
        let sr = 24_000.0;
        let mut lp = LowPass::new(800.0, 0.707, sr);
        let mut y = 0.0;
        for _ in 0..24_000 {
            y = lp.process(1.0);
        }
        assert!((y - 1.0).abs() < 1e-3, "dc gain {y}");

        let mut lp = LowPass::new(800.0, 0.707, sr);
        let mut peak: f32 = 0.0;
        for n in 0..24_000 {
            let x = if n % 2 == 0 { 1.0 } else { -1.0 };
            let y = lp.process(x);
            if n > 1000 {
                peak = peak.max(y.abs());
            }
        }
        assert!(peak < 0.05, "nyquist leaked {peak}");
    }

    #[test]
    fn cents_ratio_is_octave_exact() {
        assert!((cents_to_ratio(1200.0) - 2.0).abs() < 1e-5);
        assert!((cents_to_ratio(0.0) - 1.0).abs() < 1e-7);
    }
}
