//! Lock-free command and notification queues
//!
//! Control threads never touch engine state directly. They push
//! [`EngineCommand`]s into a wait-free rtrb ring buffer; the audio thread
//! drains the queue fully, in arrival order, at the start of every block.
//! Notifications travel the other way on a second ring buffer, flushed
//! after each block's audio is complete.
//!
//! Both queues are bounded and allocation-free at the queue level. Large
//! command payloads are boxed so the enum stays small enough for
//! cache-efficient queueing.

use std::sync::Arc;

use basedrop::Shared;

use crate::error::{EngineError, EngineResult};

use super::asset::AssetBuffer;
use super::bus::DuckerParams;
use super::track::LoopConfig;

/// Which gain a `SetGain` command targets
pub enum GainScope {
    Master,
    Bus(String),
    Track(String),
}

/// When a `Transition` switches the track's content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionAt {
    /// Immediately, repositioning at the new loop's start
    Now,
    /// When the current loop's end point is reached
    LoopEnd,
    /// At the next marker ahead of the cursor (falls back to loop end)
    NextMarker,
}

/// Which mixing implementation renders the next blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MixerMode {
    #[default]
    BuiltIn,
    /// Use the installed alternate mixer when it reports ready
    Alternate,
}

/// Payload for `CreateTrack`, boxed to keep the command enum small
pub struct CreateTrackRequest {
    pub id: String,
    pub bus: String,
    pub asset: String,
    pub gain_db: f32,
    pub pan: f32,
}

/// Payload for `SchedulePlay`
pub struct SchedulePlayRequest {
    pub track: String,
    /// Absolute sample time; `None` means "now" (the engine's current
    /// sample counter when the command is processed)
    pub when: Option<u64>,
    /// Playback offset into the asset, in engine-rate samples
    pub offset: u64,
    pub loop_cfg: Option<LoopConfig>,
}

/// Payload for `SetLoop`
pub struct SetLoopRequest {
    pub track: String,
    /// `None` clears the loop (play once)
    pub loop_cfg: Option<LoopConfig>,
}

/// Payload for `SetDucker`
pub struct SetDuckerRequest {
    pub target: String,
    pub key: String,
    pub params: DuckerParams,
}

/// Payload for `Transition`
pub struct TransitionRequest {
    pub track: String,
    pub at: TransitionAt,
    pub to_asset: String,
    pub loop_cfg: Option<LoopConfig>,
}

/// Commands sent from control threads to the audio thread
///
/// Each variant is an atomic operation on the engine, applied at the
/// start of a block before any audio renders. Unknown ids degrade to
/// inaction; the render path never fails because of a command.
pub enum EngineCommand {
    // ─────────────────────────────────────────────────────────────
    // Setup
    // ─────────────────────────────────────────────────────────────
    /// (Re)initialize the engine clock rate; emits `Ready`
    Init { sample_rate: u32 },
    /// Register a decoded asset, replacing any previous one with this id
    ///
    /// The buffer is `Shared` so the audio thread can drop a replaced
    /// binding without freeing memory inline.
    LoadAsset { id: String, asset: Shared<AssetBuffer> },
    /// Create (or reset) a mix bus
    CreateBus {
        id: String,
        gain_db: f32,
        /// Initial low-pass cutoff; `None` leaves the filter disabled
        cutoff_hz: Option<f32>,
    },
    /// Create (or replace) a track bound to a bus and an asset
    ///
    /// Silently dropped when the bus or asset is unknown.
    CreateTrack(Box<CreateTrackRequest>),
    /// Remove a track entirely; pending events for it become no-ops
    RemoveTrack { track: String },

    // ─────────────────────────────────────────────────────────────
    // Scheduling
    // ─────────────────────────────────────────────────────────────
    /// Schedule playback with sample accuracy
    SchedulePlay(Box<SchedulePlayRequest>),
    /// Schedule a stop; emits `TrackEnded` when it fires
    Stop { track: String, when: Option<u64> },

    // ─────────────────────────────────────────────────────────────
    // Mixing Parameters
    // ─────────────────────────────────────────────────────────────
    /// Ramp a gain to a new level over `ramp_ms`
    SetGain {
        scope: GainScope,
        gain_db: f32,
        ramp_ms: f32,
    },
    /// Set a bus low-pass cutoff; <= 0 or non-finite disables the filter
    SetLpf { bus: String, cutoff_hz: f32 },
    /// Install a sidechain ducker on `target`, keyed on `key`
    SetDucker(Box<SetDuckerRequest>),

    // ─────────────────────────────────────────────────────────────
    // Loops, Markers, Transitions
    // ─────────────────────────────────────────────────────────────
    /// Replace a track's marker list (sanitized: sorted, deduplicated)
    SetMarkers { track: String, markers: Vec<f64> },
    /// Arm or clear a track's loop against its current asset
    SetLoop(Box<SetLoopRequest>),
    /// Switch a track to another asset now or at a musical boundary
    Transition(Box<TransitionRequest>),

    // ─────────────────────────────────────────────────────────────
    // Introspection & Modes
    // ─────────────────────────────────────────────────────────────
    /// Ask for the current sample clock; emits `Time`
    QueryTime,
    /// Select the mixing implementation for subsequent blocks
    SetMixerMode { mode: MixerMode },
}

impl EngineCommand {
    /// Variant name, for logging dropped commands without Debug on payloads
    pub fn name(&self) -> &'static str {
        match self {
            EngineCommand::Init { .. } => "Init",
            EngineCommand::LoadAsset { .. } => "LoadAsset",
            EngineCommand::CreateBus { .. } => "CreateBus",
            EngineCommand::CreateTrack(_) => "CreateTrack",
            EngineCommand::RemoveTrack { .. } => "RemoveTrack",
            EngineCommand::SchedulePlay(_) => "SchedulePlay",
            EngineCommand::Stop { .. } => "Stop",
            EngineCommand::SetGain { .. } => "SetGain",
            EngineCommand::SetLpf { .. } => "SetLpf",
            EngineCommand::SetDucker(_) => "SetDucker",
            EngineCommand::SetMarkers { .. } => "SetMarkers",
            EngineCommand::SetLoop(_) => "SetLoop",
            EngineCommand::Transition(_) => "Transition",
            EngineCommand::QueryTime => "QueryTime",
            EngineCommand::SetMixerMode { .. } => "SetMixerMode",
        }
    }
}

/// Notifications sent from the audio thread back to control threads
///
/// Track ids are `Arc<str>` so emitting a notification on the render
/// path is a refcount bump, not a string allocation.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Emitted after `Init`
    Ready { sample_rate: u32, block_size: usize },
    /// A scheduled start fired
    TrackStarted { track: Arc<str>, at: u64 },
    /// Playback reached end-of-asset, or a scheduled stop fired
    TrackEnded { track: Arc<str>, at: u64 },
    /// Reply to `QueryTime`
    Time { sample: u64 },
}

/// Default capacity of the command queue
///
/// A route recomputation bursts at most a few commands per track; 256
/// gives generous headroom at negligible memory cost.
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Default capacity of the notification queue
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Create a command channel (producer for control, consumer for audio)
pub fn command_channel(
    capacity: usize,
) -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(capacity)
}

/// Create a notification channel (producer for audio, consumer for control)
pub fn event_channel(
    capacity: usize,
) -> (rtrb::Producer<EngineEvent>, rtrb::Consumer<EngineEvent>) {
    rtrb::RingBuffer::new(capacity)
}

/// Control-side handle for sending commands to the audio thread
///
/// Thin wrapper over the rtrb producer that turns a full queue into a
/// typed error naming the dropped command.
pub struct CommandSender {
    producer: rtrb::Producer<EngineCommand>,
}

impl CommandSender {
    pub fn new(producer: rtrb::Producer<EngineCommand>) -> Self {
        Self { producer }
    }

    /// Send a command to the audio thread (non-blocking)
    pub fn send(&mut self, command: EngineCommand) -> EngineResult<()> {
        let name = command.name();
        self.producer.push(command).map_err(|_| {
            log::warn!("command queue full, dropping {}", name);
            EngineError::CommandQueueFull(name)
        })
    }

    /// Remaining capacity in the queue
    pub fn slots(&self) -> usize {
        self.producer.slots()
    }
}
