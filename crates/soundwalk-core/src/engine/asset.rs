//! Decoded PCM assets and the asset store
//!
//! Assets arrive already decoded (decoding is the host's job) and are
//! immutable once registered. The store hands out `basedrop::Shared`
//! handles: cloning one onto a track is an atomic refcount bump, and
//! dropping the last handle on the audio thread defers the free to the
//! GC thread instead of unmapping inline.

use basedrop::Shared;
use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};
use crate::types::{Sample, StereoSample};

/// An immutable decoded audio asset
///
/// Channel data is planar: `channels[ch][frame]`. Mono assets are
/// rendered to both output channels; channels beyond the second are
/// ignored.
pub struct AssetBuffer {
    sample_rate: u32,
    channels: Vec<Vec<Sample>>,
}

impl AssetBuffer {
    /// Create a validated asset buffer
    ///
    /// Rejects a zero sample rate, an empty channel list, and channels of
    /// differing lengths. A zero-frame asset is allowed; a track playing
    /// it simply ends immediately.
    pub fn new(sample_rate: u32, channels: Vec<Vec<Sample>>) -> EngineResult<Self> {
        if sample_rate == 0 {
            return Err(EngineError::InvalidAsset("sample rate must be > 0".into()));
        }
        if channels.is_empty() {
            return Err(EngineError::InvalidAsset("no channel data".into()));
        }
        let frames = channels[0].len();
        if channels.iter().any(|ch| ch.len() != frames) {
            return Err(EngineError::InvalidAsset(format!(
                "channel lengths differ (first is {} frames)",
                frames
            )));
        }
        Ok(Self { sample_rate, channels })
    }

    /// Source sample rate in Hz
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length in frames
    #[inline]
    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    /// Read one frame with linear interpolation between `idx` and `next`
    ///
    /// The caller chooses `next` so loop modes control wrapping (seamless
    /// loops interpolate toward the loop start on the final frame). Both
    /// indices are clamped to the asset, so a cursor at the very end reads
    /// the last frame instead of running off it.
    #[inline]
    pub(crate) fn frame_lerp(&self, idx: usize, next: usize, frac: f32) -> StereoSample {
        let frames = self.frames();
        if frames == 0 {
            return StereoSample::silence();
        }
        let last = frames - 1;
        let i = idx.min(last);
        let j = next.min(last);

        let ch_l = &self.channels[0];
        let ch_r = if self.channels.len() > 1 { &self.channels[1] } else { ch_l };

        StereoSample::new(
            ch_l[i] + (ch_l[j] - ch_l[i]) * frac,
            ch_r[i] + (ch_r[j] - ch_r[i]) * frac,
        )
    }
}

/// Registry of decoded assets, keyed by id
///
/// Mutated only during the command phase, never mid-render.
#[derive(Default)]
pub struct AssetStore {
    assets: HashMap<String, Shared<AssetBuffer>>,
}

impl AssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an asset, replacing any existing entry with the same id
    ///
    /// Tracks already bound to a replaced asset keep their old handle
    /// until they next switch; the old buffer is freed by the GC thread
    /// once the last handle drops.
    pub fn register(&mut self, id: String, asset: Shared<AssetBuffer>) {
        if self.assets.insert(id, asset).is_some() {
            log::debug!("asset store: replaced existing asset");
        }
    }

    /// Look up an asset handle by id
    pub fn get(&self, id: &str) -> Option<&Shared<AssetBuffer>> {
        self.assets.get(id)
    }

    /// Number of registered assets
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
