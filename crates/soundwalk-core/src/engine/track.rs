//! Track playback: resampling read cursor, loops, and marker transitions
//!
//! A track binds one asset to one bus and renders into the bus accumulator
//! with linear-interpolation resampling. The read cursor is an f64 in
//! source frames; `step = asset_rate / engine_rate` advances it once per
//! rendered output sample.

use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};
use std::sync::Arc;

use basedrop::Shared;

use crate::types::{PlayState, StereoSample};

use super::asset::AssetBuffer;
use super::command::TransitionAt;
use super::ramp::Ramp;

/// Loop behavior at the loop end point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    /// Jump straight back to the loop start, interpolating across the seam
    Seamless,
    /// Blend the tail into the head over a crossfade window before the end
    Crossfade,
}

/// Loop region as specified by the control side
///
/// `start`/`end` are in source frames; `end` of `None` means end-of-asset.
/// The crossfade length is given in milliseconds and converted to source
/// frames when the loop is armed against a concrete asset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopConfig {
    pub mode: LoopMode,
    pub start: usize,
    pub end: Option<usize>,
    pub crossfade_ms: f32,
}

/// A loop armed against a concrete asset (crossfade resolved to frames)
#[derive(Debug, Clone, Copy)]
struct LoopSpec {
    mode: LoopMode,
    start: usize,
    end: Option<usize>,
    crossfade: usize,
}

impl LoopSpec {
    /// Validate and arm a loop for an asset
    ///
    /// Returns `None` (play once) when the region is degenerate: start at
    /// or past the effective end. An `end` past the asset clamps to it.
    /// The crossfade window never exceeds the loop length.
    fn from_config(cfg: &LoopConfig, sample_rate: u32, frames: usize) -> Option<Self> {
        let end = cfg.end.map(|e| e.min(frames));
        let effective_end = end.unwrap_or(frames);
        if cfg.start >= effective_end {
            log::debug!("loop dropped: start {} >= end {}", cfg.start, effective_end);
            return None;
        }
        let crossfade = if cfg.mode == LoopMode::Crossfade {
            let xf = (cfg.crossfade_ms.max(0.0) * sample_rate as f32 / 1000.0) as usize;
            xf.min(effective_end - cfg.start)
        } else {
            0
        };
        Some(Self {
            mode: cfg.mode,
            start: cfg.start,
            end,
            crossfade,
        })
    }
}

/// Equal-power pan gains for a pan position in [-1, 1]
///
/// Center sits at -3 dB per channel so perceived loudness is constant
/// across the sweep.
pub(crate) fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
    (angle.cos(), angle.sin())
}

/// An asset switch armed to fire at a loop end or marker
struct PendingSwitch {
    asset_id: String,
    buffer: Shared<AssetBuffer>,
    loop_cfg: Option<LoopConfig>,
}

/// A playback voice bound to one bus and one asset
pub struct Track {
    id: Arc<str>,
    bus_id: String,
    asset_id: String,
    buffer: Shared<AssetBuffer>,
    engine_rate: u32,
    state: PlayState,
    /// Read cursor in source frames
    read_pos: f64,
    /// Source frames per output sample
    step: f64,
    pan: f32,
    pan_l: f32,
    pan_r: f32,
    gain: Ramp,
    loop_spec: Option<LoopSpec>,
    /// Sorted, deduplicated transition points in source frames
    markers: Vec<usize>,
    pending: Option<PendingSwitch>,
    /// Marker position arming `pending`; `None` means fire at loop end
    pending_at: Option<usize>,
}

impl Track {
    pub fn new(
        id: Arc<str>,
        bus_id: String,
        asset_id: String,
        buffer: Shared<AssetBuffer>,
        gain_db: f32,
        pan: f32,
        engine_rate: u32,
    ) -> Self {
        let (pan_l, pan_r) = pan_gains(pan);
        let step = buffer.sample_rate() as f64 / engine_rate as f64;
        Self {
            id,
            bus_id,
            asset_id,
            buffer,
            engine_rate,
            state: PlayState::Idle,
            read_pos: 0.0,
            step,
            pan,
            pan_l,
            pan_r,
            gain: Ramp::new(crate::types::db_to_linear(gain_db)),
            loop_spec: None,
            markers: Vec::new(),
            pending: None,
            pending_at: None,
        }
    }

    #[inline]
    pub fn id(&self) -> &Arc<str> {
        &self.id
    }

    #[inline]
    pub fn bus_id(&self) -> &str {
        &self.bus_id
    }

    #[inline]
    pub fn state(&self) -> PlayState {
        self.state
    }

    #[inline]
    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    /// Recompute the resampling step after an engine rate change
    pub fn set_engine_rate(&mut self, engine_rate: u32) {
        self.engine_rate = engine_rate;
        self.step = self.buffer.sample_rate() as f64 / engine_rate as f64;
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.pan = pan;
        let (l, r) = pan_gains(pan);
        self.pan_l = l;
        self.pan_r = r;
    }

    #[inline]
    pub fn pan(&self) -> f32 {
        self.pan
    }

    pub fn set_gain_db(&mut self, gain_db: f32, ramp_samples: u32) {
        self.gain
            .set_target(crate::types::db_to_linear(gain_db), ramp_samples);
    }

    /// Replace the marker list, dropping junk and normalizing order
    ///
    /// Negative and non-finite positions are discarded; the rest are
    /// sorted ascending and deduplicated.
    pub fn set_markers(&mut self, markers: &[f64]) {
        self.markers.clear();
        self.markers.extend(
            markers
                .iter()
                .filter(|m| m.is_finite() && **m >= 0.0)
                .map(|m| *m as usize),
        );
        self.markers.sort_unstable();
        self.markers.dedup();
    }

    /// Arm or clear the loop against the currently bound asset
    pub fn set_loop(&mut self, cfg: Option<LoopConfig>) {
        self.loop_spec = cfg.and_then(|c| {
            LoopSpec::from_config(&c, self.buffer.sample_rate(), self.buffer.frames())
        });
    }

    /// Begin playback at `offset` output samples into the asset
    ///
    /// The offset is given at the engine rate and converted into source
    /// frames through the resampling step. An explicit start discards any
    /// armed switch.
    pub(crate) fn start(&mut self, offset: u64, loop_cfg: Option<LoopConfig>) {
        self.read_pos = offset as f64 * self.step;
        self.set_loop(loop_cfg);
        self.pending = None;
        self.pending_at = None;
        self.state = PlayState::Playing;
    }

    /// Stop playback; returns whether the track was playing
    pub(crate) fn stop(&mut self) -> bool {
        if self.state == PlayState::Playing {
            self.state = PlayState::Stopped;
            true
        } else {
            false
        }
    }

    /// Switch this track to another asset, now or at a musical boundary
    pub(crate) fn transition(
        &mut self,
        at: TransitionAt,
        asset_id: String,
        buffer: Shared<AssetBuffer>,
        loop_cfg: Option<LoopConfig>,
    ) {
        match at {
            TransitionAt::Now => self.apply_switch(asset_id, buffer, loop_cfg),
            TransitionAt::LoopEnd => {
                self.pending = Some(PendingSwitch { asset_id, buffer, loop_cfg });
                self.pending_at = None;
            }
            TransitionAt::NextMarker => {
                let cursor = self.read_pos as usize;
                // No marker ahead falls back to loop-end arming
                self.pending_at = self.markers.iter().find(|&&m| m > cursor).copied();
                self.pending = Some(PendingSwitch { asset_id, buffer, loop_cfg });
            }
        }
    }

    /// Rebind to a new asset and reposition at its loop start
    fn apply_switch(
        &mut self,
        asset_id: String,
        buffer: Shared<AssetBuffer>,
        loop_cfg: Option<LoopConfig>,
    ) {
        self.step = buffer.sample_rate() as f64 / self.engine_rate as f64;
        self.loop_spec = loop_cfg
            .and_then(|c| LoopSpec::from_config(&c, buffer.sample_rate(), buffer.frames()));
        self.read_pos = self.loop_spec.map(|s| s.start as f64).unwrap_or(0.0);
        self.buffer = buffer;
        self.asset_id = asset_id;
        self.pending = None;
        self.pending_at = None;
    }

    fn take_pending(&mut self) {
        if let Some(p) = self.pending.take() {
            self.apply_switch(p.asset_id, p.buffer, p.loop_cfg);
        } else {
            self.pending_at = None;
        }
    }

    /// Render this track into a bus accumulator segment
    ///
    /// Returns the in-segment index at which playback ended, if it did.
    /// Samples past that index are left untouched (silent).
    pub(crate) fn render(&mut self, acc: &mut [StereoSample]) -> Option<usize> {
        if self.state != PlayState::Playing {
            return None;
        }

        for (i, out) in acc.iter_mut().enumerate() {
            // Marker-armed switch fires when the cursor reaches the marker
            if let Some(at) = self.pending_at {
                if self.read_pos as usize >= at {
                    self.take_pending();
                }
            }

            let gain = self.gain.step();
            let frames = self.buffer.frames();

            if let Some(spec) = self.loop_spec {
                let end = spec.end.unwrap_or(frames);
                if self.read_pos >= end as f64 {
                    if self.pending.is_some() && self.pending_at.is_none() {
                        // Content switch at the loop boundary
                        self.take_pending();
                    } else {
                        self.read_pos = spec.start as f64 + (self.read_pos - end as f64);
                    }
                }
            } else if self.read_pos >= frames as f64 {
                self.state = PlayState::Stopped;
                return Some(i);
            }

            let frame = self.read_frame();
            *out += StereoSample::new(frame.left * gain * self.pan_l, frame.right * gain * self.pan_r);
            self.read_pos += self.step;
        }

        None
    }

    /// Read one interpolated frame at the current cursor
    fn read_frame(&self) -> StereoSample {
        let idx = self.read_pos as usize;
        let frac = (self.read_pos - idx as f64) as f32;

        let Some(spec) = self.loop_spec else {
            return self.buffer.frame_lerp(idx, idx + 1, frac);
        };

        let end = spec.end.unwrap_or(self.buffer.frames());

        if spec.mode == LoopMode::Crossfade && spec.crossfade > 0 {
            let win_start = end - spec.crossfade;
            if idx >= win_start && idx < end {
                // Equal-power blend: tail fades out as the head fades in
                let t = ((self.read_pos - win_start as f64) / spec.crossfade as f64) as f32;
                let angle = t * FRAC_PI_2;
                let head_pos = spec.start as f64 + (self.read_pos - win_start as f64);
                let head_idx = head_pos as usize;
                let head_frac = (head_pos - head_idx as f64) as f32;
                let tail = self.buffer.frame_lerp(idx, idx + 1, frac);
                let head = self.buffer.frame_lerp(head_idx, head_idx + 1, head_frac);
                return tail * angle.cos() + head * angle.sin();
            }
        }

        // Seamless interpolation wraps the neighbor to the loop start
        let next = if spec.mode == LoopMode::Seamless && idx + 1 >= end {
            spec.start
        } else {
            idx + 1
        };
        self.buffer.frame_lerp(idx, next, frac)
    }

    #[cfg(test)]
    pub(crate) fn read_pos(&self) -> f64 {
        self.read_pos
    }
}
