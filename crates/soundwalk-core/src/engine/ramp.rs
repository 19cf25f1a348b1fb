//! Linear parameter ramp
//!
//! Every audible parameter change (gains, master level) goes through a
//! ramp so there are no zipper clicks. The ramp is stepped once per
//! rendered sample by whoever owns it.

/// A linear per-sample ramp toward a target value
///
/// `step()` snaps exactly to the target on the final step, so repeated
/// float addition can never leave the value slightly off.
#[derive(Debug, Clone, Copy)]
pub struct Ramp {
    current: f32,
    target: f32,
    remaining: u32,
    delta: f32,
}

impl Ramp {
    /// Create a ramp resting at `value` (no ramp in flight)
    pub fn new(value: f32) -> Self {
        Self {
            current: value,
            target: value,
            remaining: 0,
            delta: 0.0,
        }
    }

    /// Begin a ramp toward `target` over `duration` samples
    ///
    /// A duration of 0 jumps immediately.
    pub fn set_target(&mut self, target: f32, duration: u32) {
        self.target = target;
        if duration == 0 {
            self.current = target;
            self.remaining = 0;
            self.delta = 0.0;
        } else {
            self.remaining = duration;
            self.delta = (target - self.current) / duration as f32;
        }
    }

    /// Advance one sample and return the new value
    #[inline]
    pub fn step(&mut self) -> f32 {
        if self.remaining > 0 {
            self.current += self.delta;
            self.remaining -= 1;
            if self.remaining == 0 {
                self.current = self.target;
            }
        }
        self.current
    }

    /// Current value without advancing
    #[inline]
    pub fn value(&self) -> f32 {
        self.current
    }

    /// Whether a ramp is still in flight
    #[inline]
    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }
}
