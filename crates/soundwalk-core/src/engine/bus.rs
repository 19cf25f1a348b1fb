//! Mix buses: per-bus gain, low-pass filtering, and sidechain ducking
//!
//! Every track renders into exactly one bus accumulator. After all tracks
//! have rendered a segment, the engine runs the ducking pass (so every key
//! bus is complete before any consumer reads it), then each bus applies
//! its gain ramp and filter and sums into the master block.

use std::f32::consts::{FRAC_1_SQRT_2, TAU};

use crate::types::{db_to_linear, StereoBuffer, StereoSample, MAX_BLOCK_SIZE};

use super::ramp::Ramp;

/// One-pole low-pass filter with state persisting across blocks
///
/// Coefficient `alpha = 1 - exp(-2π·cutoff/sr)`. A cutoff that is zero,
/// negative, or non-finite disables the filter and resets its state.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnePoleLpf {
    enabled: bool,
    cutoff_hz: f32,
    alpha: f32,
    state: StereoSample,
}

impl OnePoleLpf {
    /// Set the cutoff frequency, deriving the coefficient for `sample_rate`
    pub fn set_cutoff(&mut self, cutoff_hz: f32, sample_rate: u32) {
        if !cutoff_hz.is_finite() || cutoff_hz <= 0.0 {
            self.enabled = false;
            self.cutoff_hz = 0.0;
            self.state = StereoSample::silence();
            return;
        }
        self.cutoff_hz = cutoff_hz;
        self.alpha = 1.0 - (-TAU * cutoff_hz / sample_rate as f32).exp();
        self.enabled = true;
    }

    /// Re-derive the coefficient after an engine rate change
    pub fn retune(&mut self, sample_rate: u32) {
        if self.enabled {
            self.alpha = 1.0 - (-TAU * self.cutoff_hz / sample_rate as f32).exp();
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Filter a block in place
    pub fn process(&mut self, block: &mut [StereoSample]) {
        if !self.enabled {
            return;
        }
        for sample in block.iter_mut() {
            self.state.left += self.alpha * (sample.left - self.state.left);
            self.state.right += self.alpha * (sample.right - self.state.right);
            *sample = self.state;
        }
    }
}

/// Sidechain ducker parameters
///
/// Defaults are tuned for speech-over-ambience: the ambience dips by up
/// to 12 dB while the voice bus is above threshold and recovers over
/// 200 ms after it falls silent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuckerParams {
    pub threshold_db: f32,
    pub ratio: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub max_atten_db: f32,
    pub makeup_db: f32,
}

impl Default for DuckerParams {
    fn default() -> Self {
        Self {
            threshold_db: -24.0,
            ratio: 6.0,
            attack_ms: 10.0,
            release_ms: 200.0,
            max_atten_db: 12.0,
            makeup_db: 0.0,
        }
    }
}

/// Envelope-follower sidechain ducker
///
/// Follows the key bus's stereo magnitude with attack/release smoothing,
/// converts overshoot above threshold into attenuation limited by
/// `max_atten_db`, then smooths the gain itself with the coefficients
/// reversed so ducking engages at attack speed and recovers at release
/// speed.
#[derive(Debug, Clone)]
struct Ducker {
    key_bus: String,
    threshold_db: f32,
    threshold_lin: f32,
    ratio: f32,
    attack: f32,
    release: f32,
    max_atten_db: f32,
    makeup_lin: f32,
    env: f32,
    gain: f32,
}

impl Ducker {
    fn new(key_bus: String, params: DuckerParams, sample_rate: u32) -> Self {
        let mut ducker = Self {
            key_bus,
            threshold_db: params.threshold_db,
            threshold_lin: db_to_linear(params.threshold_db),
            ratio: params.ratio.max(1.0),
            attack: 0.0,
            release: 0.0,
            max_atten_db: params.max_atten_db.max(0.0),
            makeup_lin: db_to_linear(params.makeup_db),
            env: 0.0,
            gain: 1.0,
        };
        ducker.retune(params, sample_rate);
        ducker
    }

    fn retune(&mut self, params: DuckerParams, sample_rate: u32) {
        let coef = |ms: f32| 1.0 - (-1.0f32 / (sample_rate as f32 * ms.max(1.0) / 1000.0)).exp();
        self.attack = coef(params.attack_ms);
        self.release = coef(params.release_ms);
    }

    fn process(&mut self, target: &mut [StereoSample], key: &[StereoSample]) {
        let n = target.len().min(key.len());
        for i in 0..n {
            let k = key[i];
            let mag = (k.left * k.left + k.right * k.right).sqrt() * FRAC_1_SQRT_2;
            let delta = mag - self.env;
            self.env += if delta > 0.0 { self.attack } else { self.release } * delta;

            let mut target_gain = 1.0;
            if self.env > self.threshold_lin {
                let env_db = 20.0 * (self.env + 1e-12).log10();
                let exceed = env_db - self.threshold_db;
                let atten_db = ((1.0 - 1.0 / self.ratio) * exceed).clamp(0.0, self.max_atten_db);
                target_gain = db_to_linear(-atten_db);
            }

            // Reversed: ducking in is the fast (attack) direction
            let dg = target_gain - self.gain;
            self.gain += if dg > 0.0 { self.release } else { self.attack } * dg;

            target[i] *= self.gain * self.makeup_lin;
        }
    }
}

/// A mix bus
///
/// Owns its pre-allocated accumulator; the working length is set per
/// segment without allocating.
pub struct Bus {
    id: String,
    gain: Ramp,
    lpf: OnePoleLpf,
    ducker: Option<Ducker>,
    ducker_params: DuckerParams,
    acc: StereoBuffer,
}

impl Bus {
    /// Create a bus resting at `gain_db` (no ramp-in)
    pub fn new(id: String, gain_db: f32, cutoff_hz: Option<f32>, sample_rate: u32) -> Self {
        let mut lpf = OnePoleLpf::default();
        if let Some(cutoff) = cutoff_hz {
            lpf.set_cutoff(cutoff, sample_rate);
        }
        Self {
            id,
            gain: Ramp::new(db_to_linear(gain_db)),
            lpf,
            ducker: None,
            ducker_params: DuckerParams::default(),
            acc: StereoBuffer::with_capacity(MAX_BLOCK_SIZE),
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Begin a gain ramp toward `gain_db` over `ramp_samples`
    pub fn set_gain_db(&mut self, gain_db: f32, ramp_samples: u32) {
        self.gain.set_target(db_to_linear(gain_db), ramp_samples);
    }

    /// Set or disable the low-pass filter
    pub fn set_lpf(&mut self, cutoff_hz: f32, sample_rate: u32) {
        self.lpf.set_cutoff(cutoff_hz, sample_rate);
    }

    /// Install (or replace) the sidechain ducker keyed on `key_bus`
    pub fn set_ducker(&mut self, key_bus: String, params: DuckerParams, sample_rate: u32) {
        self.ducker = Some(Ducker::new(key_bus, params, sample_rate));
        self.ducker_params = params;
    }

    /// Key bus id of the installed ducker, if any
    pub fn ducker_key(&self) -> Option<&str> {
        self.ducker.as_ref().map(|d| d.key_bus.as_str())
    }

    /// Re-derive rate-dependent coefficients after an engine rate change
    pub fn retune(&mut self, sample_rate: u32) {
        self.lpf.retune(sample_rate);
        if let Some(ducker) = self.ducker.as_mut() {
            let params = self.ducker_params;
            ducker.retune(params, sample_rate);
        }
    }

    /// Reset the accumulator to `len` silent frames (no allocation)
    pub(crate) fn begin_segment(&mut self, len: usize) {
        self.acc.set_len_from_capacity(len);
        self.acc.fill_silence();
    }

    /// Accumulator for tracks to render into
    #[inline]
    pub(crate) fn accumulator_mut(&mut self) -> &mut [StereoSample] {
        self.acc.as_mut_slice()
    }

    /// Raw accumulator, read by ducking consumers of this bus
    #[inline]
    pub(crate) fn accumulator(&self) -> &[StereoSample] {
        self.acc.as_slice()
    }

    /// Run this bus's ducker against the key bus's rendered segment
    pub(crate) fn apply_ducker(&mut self, key: &[StereoSample]) {
        if let Some(ducker) = self.ducker.as_mut() {
            ducker.process(self.acc.as_mut_slice(), key);
        }
    }

    /// Apply gain and filter, then sum the segment into `out`
    ///
    /// While a gain ramp is in flight it is stepped per sample; otherwise
    /// the segment gets a single constant multiply.
    pub(crate) fn finish_segment(&mut self, out: &mut [StereoSample]) {
        if self.gain.is_ramping() {
            for sample in self.acc.iter_mut() {
                let g = self.gain.step();
                *sample *= g;
            }
        } else {
            let g = self.gain.value();
            if g != 1.0 {
                for sample in self.acc.iter_mut() {
                    *sample *= g;
                }
            }
        }

        self.lpf.process(self.acc.as_mut_slice());

        for (dst, src) in out.iter_mut().zip(self.acc.iter()) {
            *dst += *src;
        }
    }

    #[cfg(test)]
    pub(crate) fn gain_value(&self) -> f32 {
        self.gain.value()
    }
}
