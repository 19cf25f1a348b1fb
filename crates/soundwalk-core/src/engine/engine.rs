//! Main audio engine - ties together assets, buses, tracks, and the scheduler
//!
//! One instance lives on the audio thread. Each host callback is two
//! calls: `process_commands` drains the control queue, then `process`
//! renders one block into a caller-provided buffer. Everything the render
//! path touches is pre-allocated; registry mutation happens only in the
//! command phase.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::types::{db_to_linear, PlayState, Sample, StereoBuffer, StereoSample, MAX_BLOCK_SIZE};

use super::asset::AssetStore;
use super::bus::Bus;
use super::command::{EngineCommand, EngineEvent, GainScope, MixerMode};
use super::ramp::Ramp;
use super::scheduler::{EventKind, EventScheduler, ScheduledEvent};
use super::track::Track;

/// A drop-in replacement for the built-in mixing pipeline
///
/// Selected per block by `SetMixerMode`. When the implementation reports
/// not-ready the engine falls back to the built-in pipeline for that
/// block, so a mixer that is still warming up never produces a gap.
pub trait AlternateMixer: Send {
    /// Whether the implementation can take the next block
    fn is_ready(&self) -> bool;
    /// Render one block into `out` (already sized and silenced)
    fn process_block(&mut self, out: &mut StereoBuffer);
}

/// Pre-allocated capacity for per-block event extraction
const BLOCK_EVENT_CAPACITY: usize = 64;

/// The main audio engine
///
/// Owns all buses, tracks, and registered assets. Not `Sync`; exactly
/// one thread may drive it.
pub struct AudioEngine {
    sample_rate: u32,
    block_size: usize,
    current_sample: u64,
    master_gain: Ramp,
    assets: AssetStore,
    buses: Vec<Bus>,
    tracks: Vec<Track>,
    scheduler: EventScheduler,
    /// Scratch for events extracted each block
    block_events: Vec<ScheduledEvent>,
    /// Notifications queued during the block, flushed after its audio
    pending_events: Vec<EngineEvent>,
    event_tx: rtrb::Producer<EngineEvent>,
    /// Notifications lost to a full outbound queue
    dropped_events: u64,
    mixer_mode: MixerMode,
    alternate: Option<Box<dyn AlternateMixer>>,
    /// Scratch block for the planar `process_into` entry point
    planar_buf: StereoBuffer,
}

impl AudioEngine {
    pub fn new(config: &EngineConfig, event_tx: rtrb::Producer<EngineEvent>) -> Self {
        Self {
            sample_rate: config.sample_rate,
            block_size: config.block_size,
            current_sample: 0,
            master_gain: Ramp::new(db_to_linear(config.master_gain_db)),
            assets: AssetStore::new(),
            buses: Vec::new(),
            tracks: Vec::new(),
            scheduler: EventScheduler::new(),
            block_events: Vec::with_capacity(BLOCK_EVENT_CAPACITY),
            pending_events: Vec::with_capacity(BLOCK_EVENT_CAPACITY),
            event_tx,
            dropped_events: 0,
            mixer_mode: MixerMode::BuiltIn,
            alternate: None,
            planar_buf: StereoBuffer::with_capacity(MAX_BLOCK_SIZE),
        }
    }

    /// Engine sample clock: samples rendered since startup
    #[inline]
    pub fn current_sample(&self) -> u64 {
        self.current_sample
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Notifications lost to a full outbound queue since startup
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events
    }

    /// Install the alternate mixer implementation
    ///
    /// Installation alone changes nothing; `SetMixerMode` selects it.
    pub fn set_alternate_mixer(&mut self, mixer: Box<dyn AlternateMixer>) {
        self.alternate = Some(mixer);
    }

    /// Drain and apply all pending commands, in arrival order
    ///
    /// Call at the start of every host callback, before `process`.
    pub fn process_commands(&mut self, rx: &mut rtrb::Consumer<EngineCommand>) {
        while let Ok(command) = rx.pop() {
            self.apply_command(command);
        }
    }

    fn apply_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Init { sample_rate } => {
                if sample_rate == 0 {
                    log::debug!("Init dropped: zero sample rate");
                    return;
                }
                self.sample_rate = sample_rate;
                for track in &mut self.tracks {
                    track.set_engine_rate(sample_rate);
                }
                for bus in &mut self.buses {
                    bus.retune(sample_rate);
                }
                self.pending_events.push(EngineEvent::Ready {
                    sample_rate,
                    block_size: self.block_size,
                });
            }
            EngineCommand::LoadAsset { id, asset } => {
                self.assets.register(id, asset);
            }
            EngineCommand::CreateBus { id, gain_db, cutoff_hz } => {
                let bus = Bus::new(id, gain_db, cutoff_hz, self.sample_rate);
                match self.buses.iter_mut().find(|b| b.id() == bus.id()) {
                    Some(existing) => *existing = bus,
                    None => self.buses.push(bus),
                }
            }
            EngineCommand::CreateTrack(req) => {
                if self.buses.iter().all(|b| b.id() != req.bus) {
                    log::debug!("CreateTrack dropped: unknown bus {}", req.bus);
                    return;
                }
                let Some(buffer) = self.assets.get(&req.asset) else {
                    log::debug!("CreateTrack dropped: unknown asset {}", req.asset);
                    return;
                };
                let track = Track::new(
                    Arc::from(req.id.as_str()),
                    req.bus,
                    req.asset,
                    buffer.clone(),
                    req.gain_db,
                    req.pan,
                    self.sample_rate,
                );
                match self
                    .tracks
                    .iter_mut()
                    .find(|t| t.id().as_ref() == req.id.as_str())
                {
                    Some(existing) => *existing = track,
                    None => self.tracks.push(track),
                }
            }
            EngineCommand::RemoveTrack { track } => {
                self.tracks.retain(|t| t.id().as_ref() != track);
            }
            EngineCommand::SchedulePlay(req) => {
                if self.track(&req.track).is_none() {
                    log::debug!("SchedulePlay dropped: unknown track {}", req.track);
                    return;
                }
                let when = req.when.unwrap_or(self.current_sample);
                self.scheduler.schedule(
                    req.track,
                    when,
                    EventKind::Start {
                        offset: req.offset,
                        loop_cfg: req.loop_cfg,
                    },
                );
            }
            EngineCommand::Stop { track, when } => {
                if self.track(&track).is_none() {
                    log::debug!("Stop dropped: unknown track {}", track);
                    return;
                }
                let when = when.unwrap_or(self.current_sample);
                self.scheduler.schedule(track, when, EventKind::Stop);
            }
            EngineCommand::SetGain { scope, gain_db, ramp_ms } => {
                let ramp_samples =
                    (ramp_ms.max(0.0) / 1000.0 * self.sample_rate as f32) as u32;
                match scope {
                    GainScope::Master => {
                        self.master_gain
                            .set_target(db_to_linear(gain_db), ramp_samples);
                    }
                    GainScope::Bus(id) => {
                        if let Some(bus) = self.buses.iter_mut().find(|b| b.id() == id) {
                            bus.set_gain_db(gain_db, ramp_samples);
                        }
                    }
                    GainScope::Track(id) => {
                        if let Some(track) = self.track_mut(&id) {
                            track.set_gain_db(gain_db, ramp_samples);
                        }
                    }
                }
            }
            EngineCommand::SetLpf { bus, cutoff_hz } => {
                let sample_rate = self.sample_rate;
                if let Some(bus) = self.buses.iter_mut().find(|b| b.id() == bus) {
                    bus.set_lpf(cutoff_hz, sample_rate);
                }
            }
            EngineCommand::SetDucker(req) => {
                if req.target == req.key {
                    log::debug!("SetDucker dropped: bus {} cannot key itself", req.target);
                    return;
                }
                if self.buses.iter().all(|b| b.id() != req.key) {
                    log::debug!("SetDucker dropped: unknown key bus {}", req.key);
                    return;
                }
                let sample_rate = self.sample_rate;
                if let Some(bus) = self.buses.iter_mut().find(|b| b.id() == req.target) {
                    bus.set_ducker(req.key, req.params, sample_rate);
                }
            }
            EngineCommand::SetMarkers { track, markers } => {
                if let Some(track) = self.track_mut(&track) {
                    track.set_markers(&markers);
                }
            }
            EngineCommand::SetLoop(req) => {
                if let Some(track) = self.track_mut(&req.track) {
                    track.set_loop(req.loop_cfg);
                }
            }
            EngineCommand::Transition(req) => {
                let Some(buffer) = self.assets.get(&req.to_asset) else {
                    log::debug!("Transition dropped: unknown asset {}", req.to_asset);
                    return;
                };
                let buffer = buffer.clone();
                if let Some(track) = self.track_mut(&req.track) {
                    track.transition(req.at, req.to_asset, buffer, req.loop_cfg);
                }
            }
            EngineCommand::QueryTime => {
                self.pending_events.push(EngineEvent::Time {
                    sample: self.current_sample,
                });
            }
            EngineCommand::SetMixerMode { mode } => {
                self.mixer_mode = mode;
            }
        }
    }

    fn track(&self, id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id().as_ref() == id)
    }

    fn track_mut(&mut self, id: &str) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id().as_ref() == id)
    }

    /// Render one block into `out`
    ///
    /// The block length is `out.len()`, clamped to [`MAX_BLOCK_SIZE`].
    /// Any scheduled event falling inside the block splits it into
    /// segments so starts and stops land on their exact sample.
    pub fn process(&mut self, out: &mut StereoBuffer) {
        debug_assert!(out.len() <= MAX_BLOCK_SIZE);
        let frames = out.len().min(MAX_BLOCK_SIZE);
        out.fill_silence();

        let block_start = self.current_sample;
        let block_end = block_start + frames as u64;

        if self.mixer_mode == MixerMode::Alternate {
            if let Some(alternate) = self.alternate.as_mut() {
                if alternate.is_ready() {
                    alternate.process_block(out);
                    self.current_sample = block_end;
                    // Command-phase replies (Ready, Time) still go out
                    // even though the alternate rendered the audio
                    self.flush_events();
                    return;
                }
            }
        }

        self.scheduler
            .extract_block(block_start, block_end, &mut self.block_events);
        let mut events = std::mem::take(&mut self.block_events);

        let mut cursor = 0usize;
        for event in events.drain(..) {
            let event_offset = (event.when - block_start) as usize;
            if event_offset > cursor {
                let abs_start = block_start + cursor as u64;
                self.render_segment(
                    &mut out.as_mut_slice()[cursor..event_offset],
                    abs_start,
                );
                cursor = event_offset;
            }
            self.apply_event(event);
        }
        if cursor < frames {
            let abs_start = block_start + cursor as u64;
            self.render_segment(&mut out.as_mut_slice()[cursor..frames], abs_start);
        }
        self.block_events = events;

        // Master gain over the summed block, stepped once per output sample
        for sample in out.as_mut_slice()[..frames].iter_mut() {
            let g = self.master_gain.step();
            *sample *= g;
        }

        self.current_sample = block_end;
        self.flush_events();
    }

    /// Planar entry point for hosts that hand out one slice per channel
    pub fn process_into(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        let frames = left.len().min(right.len()).min(MAX_BLOCK_SIZE);
        let mut block = std::mem::take(&mut self.planar_buf);
        block.set_len_from_capacity(frames);
        self.process(&mut block);
        block.to_channels(&mut left[..frames], &mut right[..frames]);
        self.planar_buf = block;
    }

    /// Fire a scheduled event at its exact segment boundary
    fn apply_event(&mut self, event: ScheduledEvent) {
        let Some(track) = self
            .tracks
            .iter_mut()
            .find(|t| t.id().as_ref() == event.track_id)
        else {
            // Track removed after scheduling
            return;
        };
        match event.kind {
            EventKind::Start { offset, loop_cfg } => {
                track.start(offset, loop_cfg);
                self.pending_events.push(EngineEvent::TrackStarted {
                    track: track.id().clone(),
                    at: event.when,
                });
            }
            EventKind::Stop => {
                if track.stop() {
                    self.pending_events.push(EngineEvent::TrackEnded {
                        track: track.id().clone(),
                        at: event.when,
                    });
                }
            }
        }
    }

    /// Render one event-free segment: tracks into bus accumulators, the
    /// ducking pass, then per-bus gain/filter summed into `out`
    fn render_segment(&mut self, out: &mut [StereoSample], abs_start: u64) {
        let len = out.len();
        if len == 0 {
            return;
        }

        for bus in &mut self.buses {
            bus.begin_segment(len);
        }

        for track in &mut self.tracks {
            if track.state() != PlayState::Playing {
                continue;
            }
            let Some(bus) = self.buses.iter_mut().find(|b| b.id() == track.bus_id()) else {
                continue;
            };
            if let Some(ended) = track.render(bus.accumulator_mut()) {
                self.pending_events.push(EngineEvent::TrackEnded {
                    track: track.id().clone(),
                    at: abs_start + ended as u64,
                });
            }
        }

        // Ducking pass: every key accumulator is complete by now
        for target_idx in 0..self.buses.len() {
            let key_idx = {
                let Some(key_id) = self.buses[target_idx].ducker_key() else {
                    continue;
                };
                let Some(key_idx) = self.buses.iter().position(|b| b.id() == key_id) else {
                    continue;
                };
                key_idx
            };
            if key_idx == target_idx {
                continue;
            }
            let (target, key) = if target_idx < key_idx {
                let (head, tail) = self.buses.split_at_mut(key_idx);
                (&mut head[target_idx], &tail[0])
            } else {
                let (head, tail) = self.buses.split_at_mut(target_idx);
                (&mut tail[0], &head[key_idx])
            };
            target.apply_ducker(key.accumulator());
        }

        for bus in &mut self.buses {
            bus.finish_segment(out);
        }
    }

    /// Flush queued notifications to the outbound ring buffer
    fn flush_events(&mut self) {
        for event in self.pending_events.drain(..) {
            if self.event_tx.push(event).is_err() {
                self.dropped_events += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        command_channel, event_channel, gc_handle, AssetBuffer, CreateTrackRequest,
        DuckerParams, LoopConfig, LoopMode, SchedulePlayRequest, SetDuckerRequest,
        SetLoopRequest, TransitionAt, TransitionRequest, COMMAND_QUEUE_CAPACITY,
        EVENT_QUEUE_CAPACITY,
    };
    use basedrop::Shared;
    use std::f32::consts::FRAC_1_SQRT_2;

    struct Rig {
        engine: AudioEngine,
        cmd_tx: rtrb::Producer<EngineCommand>,
        cmd_rx: rtrb::Consumer<EngineCommand>,
        evt_rx: rtrb::Consumer<EngineEvent>,
    }

    impl Rig {
        /// Engine with master at unity so expected amplitudes stay legible
        fn new() -> Self {
            let config = EngineConfig {
                master_gain_db: 0.0,
                ..Default::default()
            };
            let (cmd_tx, cmd_rx) = command_channel(COMMAND_QUEUE_CAPACITY);
            let (evt_tx, evt_rx) = event_channel(EVENT_QUEUE_CAPACITY);
            Self {
                engine: AudioEngine::new(&config, evt_tx),
                cmd_tx,
                cmd_rx,
                evt_rx,
            }
        }

        fn send(&mut self, command: EngineCommand) {
            self.cmd_tx.push(command).ok().unwrap();
        }

        fn render(&mut self, frames: usize) -> StereoBuffer {
            let mut out = StereoBuffer::silence(frames);
            self.engine.process_commands(&mut self.cmd_rx);
            self.engine.process(&mut out);
            out
        }

        fn events(&mut self) -> Vec<EngineEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.evt_rx.pop() {
                events.push(event);
            }
            events
        }

        fn load_constant_asset(&mut self, id: &str, value: f32, frames: usize) {
            let asset = AssetBuffer::new(48000, vec![vec![value; frames]]).unwrap();
            self.send(EngineCommand::LoadAsset {
                id: id.to_string(),
                asset: Shared::new(&gc_handle(), asset),
            });
        }

        fn create_bus(&mut self, id: &str, gain_db: f32) {
            self.send(EngineCommand::CreateBus {
                id: id.to_string(),
                gain_db,
                cutoff_hz: None,
            });
        }

        fn create_track(&mut self, id: &str, bus: &str, asset: &str) {
            self.send(EngineCommand::CreateTrack(Box::new(CreateTrackRequest {
                id: id.to_string(),
                bus: bus.to_string(),
                asset: asset.to_string(),
                gain_db: 0.0,
                pan: 0.0,
            })));
        }

        fn play(&mut self, track: &str, when: Option<u64>, loop_cfg: Option<LoopConfig>) {
            self.send(EngineCommand::SchedulePlay(Box::new(SchedulePlayRequest {
                track: track.to_string(),
                when,
                offset: 0,
                loop_cfg,
            })));
        }
    }

    fn seamless_full() -> Option<LoopConfig> {
        Some(LoopConfig {
            mode: LoopMode::Seamless,
            start: 0,
            end: None,
            crossfade_ms: 0.0,
        })
    }

    #[test]
    fn test_end_to_end_play_once() {
        let mut rig = Rig::new();
        rig.load_constant_asset("hit", 1.0, 100);
        rig.create_bus("sfx", -6.0);
        rig.create_track("t", "sfx", "hit");
        rig.play("t", None, None);

        let out = rig.render(128);

        // Center pan (-3 dB per channel) into a -6 dB bus
        let expected = FRAC_1_SQRT_2 * db_to_linear(-6.0);
        assert!((out[0].left - expected).abs() < 1e-4);
        assert!((out[0].right - expected).abs() < 1e-4);
        assert!((out[99].left - expected).abs() < 1e-4);
        // Silent after end-of-asset
        assert_eq!(out[100].left, 0.0);
        assert_eq!(out[127].left, 0.0);

        let events = rig.events();
        assert!(events.contains(&EngineEvent::TrackStarted { track: "t".into(), at: 0 }));
        assert!(events.contains(&EngineEvent::TrackEnded { track: "t".into(), at: 100 }));
    }

    #[test]
    fn test_sample_accurate_start() {
        let mut rig = Rig::new();
        rig.load_constant_asset("amb", 1.0, 48000);
        rig.create_bus("bed", 0.0);
        rig.create_track("t", "bed", "amb");
        rig.play("t", Some(64), None);

        let out = rig.render(128);

        for i in 0..64 {
            assert_eq!(out[i].left, 0.0, "sample {} should precede the start", i);
        }
        assert!(out[64].left > 0.5);

        let events = rig.events();
        assert!(events.contains(&EngineEvent::TrackStarted { track: "t".into(), at: 64 }));
    }

    #[test]
    fn test_sample_accurate_stop_mid_block() {
        let mut rig = Rig::new();
        rig.load_constant_asset("amb", 1.0, 48000);
        rig.create_bus("bed", 0.0);
        rig.create_track("t", "bed", "amb");
        rig.play("t", None, seamless_full());
        rig.send(EngineCommand::Stop {
            track: "t".to_string(),
            when: Some(200),
        });

        rig.render(128);
        let out = rig.render(128);

        assert!(out[71].left > 0.5);
        assert_eq!(out[72].left, 0.0);
        assert!(rig
            .events()
            .contains(&EngineEvent::TrackEnded { track: "t".into(), at: 200 }));
    }

    #[test]
    fn test_stop_on_idle_track_emits_nothing() {
        let mut rig = Rig::new();
        rig.load_constant_asset("amb", 1.0, 48000);
        rig.create_bus("bed", 0.0);
        rig.create_track("t", "bed", "amb");
        rig.send(EngineCommand::Stop {
            track: "t".to_string(),
            when: None,
        });

        rig.render(128);
        // A track that never started has no lifecycle to report
        assert!(rig.events().is_empty());
    }

    #[test]
    fn test_fifo_tie_break_applies_in_send_order() {
        let mut rig = Rig::new();
        rig.load_constant_asset("amb", 1.0, 48000);
        rig.create_bus("bed", 0.0);
        rig.create_track("t", "bed", "amb");
        rig.play("t", Some(64), seamless_full());
        rig.send(EngineCommand::Stop {
            track: "t".to_string(),
            when: Some(64),
        });

        let out = rig.render(128);

        // Start then stop at the same sample: net silence
        assert_eq!(out.peak(), 0.0);
        let events = rig.events();
        assert_eq!(
            events,
            vec![
                EngineEvent::TrackStarted { track: "t".into(), at: 64 },
                EngineEvent::TrackEnded { track: "t".into(), at: 64 },
            ]
        );
    }

    #[test]
    fn test_past_dated_event_fires_at_block_start() {
        let mut rig = Rig::new();
        rig.load_constant_asset("amb", 1.0, 48000);
        rig.create_bus("bed", 0.0);
        rig.create_track("t", "bed", "amb");

        rig.render(128);
        rig.render(128);

        rig.play("t", Some(10), None);
        let out = rig.render(128);

        assert!(out[0].left > 0.5);
        assert!(rig
            .events()
            .contains(&EngineEvent::TrackStarted { track: "t".into(), at: 256 }));
    }

    #[test]
    fn test_master_ramp() {
        let mut rig = Rig::new();
        rig.load_constant_asset("amb", 1.0, 48000);
        rig.create_bus("bed", 0.0);
        rig.create_track("t", "bed", "amb");
        rig.play("t", None, seamless_full());
        rig.render(128);

        rig.send(EngineCommand::SetGain {
            scope: GainScope::Master,
            gain_db: -6.0,
            ramp_ms: 1.0, // 48 samples
        });
        let out = rig.render(128);

        assert!(out[0].left > out[20].left);
        assert!(out[20].left > out[47].left);
        let expected = FRAC_1_SQRT_2 * db_to_linear(-6.0);
        assert!((out[48].left - expected).abs() < 1e-4);
        assert!((out[127].left - expected).abs() < 1e-4);
    }

    #[test]
    fn test_track_gain_scope() {
        let mut rig = Rig::new();
        rig.load_constant_asset("amb", 1.0, 48000);
        rig.create_bus("bed", 0.0);
        rig.create_track("t", "bed", "amb");
        rig.play("t", None, seamless_full());
        rig.render(128);

        rig.send(EngineCommand::SetGain {
            scope: GainScope::Track("t".to_string()),
            gain_db: -20.0,
            ramp_ms: 0.0,
        });
        let out = rig.render(128);

        let expected = FRAC_1_SQRT_2 * db_to_linear(-20.0);
        assert!((out[64].left - expected).abs() < 1e-4);
    }

    #[test]
    fn test_ducker_end_to_end() {
        let mut rig = Rig::new();
        rig.load_constant_asset("bed-loop", 0.5, 48000);
        rig.load_constant_asset("speech", 0.8, 48000);
        rig.create_bus("bed", 0.0);
        rig.create_bus("voice", 0.0);
        rig.create_track("amb", "bed", "bed-loop");
        rig.create_track("talk", "voice", "speech");
        rig.send(EngineCommand::SetDucker(Box::new(SetDuckerRequest {
            target: "bed".to_string(),
            key: "voice".to_string(),
            params: DuckerParams::default(),
        })));

        rig.play("amb", None, seamless_full());
        let mut unducked = 0.0;
        for _ in 0..100 {
            unducked = rig.render(128)[64].left;
        }

        rig.play("talk", None, seamless_full());
        let mut ducked_total = 0.0;
        for _ in 0..400 {
            ducked_total = rig.render(128)[64].left;
        }

        let voice_level = 0.8 * FRAC_1_SQRT_2;
        let bed_after = ducked_total - voice_level;
        // The bed contribution dips well below its unducked level but is
        // capped by max_atten_db
        assert!(bed_after < unducked * 0.5, "bed not ducked: {}", bed_after);
        assert!(bed_after > unducked * db_to_linear(-12.0) - 1e-3);
    }

    #[test]
    fn test_self_keyed_ducker_is_rejected() {
        let mut rig = Rig::new();
        rig.load_constant_asset("amb", 1.0, 48000);
        rig.create_bus("bed", 0.0);
        rig.create_track("t", "bed", "amb");
        rig.send(EngineCommand::SetDucker(Box::new(SetDuckerRequest {
            target: "bed".to_string(),
            key: "bed".to_string(),
            params: DuckerParams::default(),
        })));
        rig.play("t", None, seamless_full());

        let out = rig.render(128);
        assert!((out[64].left - FRAC_1_SQRT_2).abs() < 1e-4);
    }

    #[test]
    fn test_transition_via_commands() {
        let mut rig = Rig::new();
        rig.load_constant_asset("day", 0.5, 48000);
        rig.load_constant_asset("night", -0.5, 48000);
        rig.create_bus("bed", 0.0);
        rig.create_track("t", "bed", "day");
        rig.play("t", None, seamless_full());
        rig.render(128);

        rig.send(EngineCommand::Transition(Box::new(TransitionRequest {
            track: "t".to_string(),
            at: TransitionAt::Now,
            to_asset: "night".to_string(),
            loop_cfg: seamless_full(),
        })));
        let out = rig.render(128);

        assert!(out[0].left < 0.0);
    }

    #[test]
    fn test_set_loop_arms_mid_playback() {
        let mut rig = Rig::new();
        rig.load_constant_asset("amb", 1.0, 256);
        rig.create_bus("bed", 0.0);
        rig.create_track("t", "bed", "amb");
        rig.play("t", None, None);
        rig.render(128);

        // Arm a loop while the cursor is halfway through the asset
        rig.send(EngineCommand::SetLoop(Box::new(SetLoopRequest {
            track: "t".to_string(),
            loop_cfg: seamless_full(),
        })));

        // The 256-frame asset keeps sounding well past its length
        for _ in 0..10 {
            let out = rig.render(128);
            assert!(out[64].left > 0.5);
        }
        assert!(rig.events().iter().all(|e| !matches!(e, EngineEvent::TrackEnded { .. })));
    }

    #[test]
    fn test_query_time_and_init_ready() {
        let mut rig = Rig::new();
        rig.send(EngineCommand::Init { sample_rate: 44100 });
        rig.render(128);
        assert_eq!(
            rig.events(),
            vec![EngineEvent::Ready { sample_rate: 44100, block_size: 128 }]
        );
        assert_eq!(rig.engine.sample_rate(), 44100);

        rig.send(EngineCommand::QueryTime);
        rig.render(128);
        assert_eq!(rig.events(), vec![EngineEvent::Time { sample: 128 }]);
        assert_eq!(rig.engine.current_sample(), 256);
    }

    #[test]
    fn test_unknown_ids_are_noops() {
        let mut rig = Rig::new();
        rig.play("ghost", None, None);
        rig.send(EngineCommand::Stop { track: "ghost".to_string(), when: None });
        rig.send(EngineCommand::SetGain {
            scope: GainScope::Bus("ghost".to_string()),
            gain_db: 0.0,
            ramp_ms: 0.0,
        });
        rig.send(EngineCommand::SetLpf { bus: "ghost".to_string(), cutoff_hz: 100.0 });
        rig.send(EngineCommand::RemoveTrack { track: "ghost".to_string() });

        let out = rig.render(128);
        assert_eq!(out.peak(), 0.0);
        assert!(rig.events().is_empty());
    }

    #[test]
    fn test_remove_track_silences_pending_start() {
        let mut rig = Rig::new();
        rig.load_constant_asset("amb", 1.0, 48000);
        rig.create_bus("bed", 0.0);
        rig.create_track("t", "bed", "amb");
        rig.play("t", Some(64), None);
        rig.send(EngineCommand::RemoveTrack { track: "t".to_string() });

        let out = rig.render(128);
        assert_eq!(out.peak(), 0.0);
        assert!(rig.events().is_empty());
    }

    struct ConstMixer {
        ready: bool,
        value: f32,
    }

    impl AlternateMixer for ConstMixer {
        fn is_ready(&self) -> bool {
            self.ready
        }

        fn process_block(&mut self, out: &mut StereoBuffer) {
            for sample in out.iter_mut() {
                *sample = StereoSample::mono(self.value);
            }
        }
    }

    #[test]
    fn test_alternate_mixer_substitution() {
        let mut rig = Rig::new();
        rig.load_constant_asset("amb", 1.0, 48000);
        rig.create_bus("bed", 0.0);
        rig.create_track("t", "bed", "amb");
        rig.play("t", None, seamless_full());
        rig.engine
            .set_alternate_mixer(Box::new(ConstMixer { ready: true, value: 0.25 }));

        // Built-in until the mode flips
        let out = rig.render(128);
        assert!((out[0].left - FRAC_1_SQRT_2).abs() < 1e-4);

        rig.send(EngineCommand::SetMixerMode { mode: MixerMode::Alternate });
        let out = rig.render(128);
        assert_eq!(out[0].left, 0.25);
        assert_eq!(out[127].left, 0.25);
        // The sample clock still advances
        assert_eq!(rig.engine.current_sample(), 256);

        rig.send(EngineCommand::SetMixerMode { mode: MixerMode::BuiltIn });
        let out = rig.render(128);
        assert!((out[0].left - FRAC_1_SQRT_2).abs() < 1e-4);
    }

    #[test]
    fn test_alternate_mixer_delivers_command_replies() {
        let mut rig = Rig::new();
        rig.engine
            .set_alternate_mixer(Box::new(ConstMixer { ready: true, value: 0.0 }));
        rig.send(EngineCommand::SetMixerMode { mode: MixerMode::Alternate });
        rig.render(128);

        rig.send(EngineCommand::QueryTime);
        rig.send(EngineCommand::Init { sample_rate: 44100 });
        rig.render(128);

        let events = rig.events();
        assert!(events.contains(&EngineEvent::Time { sample: 128 }));
        assert!(events.contains(&EngineEvent::Ready { sample_rate: 44100, block_size: 128 }));
    }

    #[test]
    fn test_alternate_mixer_not_ready_falls_back() {
        let mut rig = Rig::new();
        rig.load_constant_asset("amb", 1.0, 48000);
        rig.create_bus("bed", 0.0);
        rig.create_track("t", "bed", "amb");
        rig.play("t", None, seamless_full());
        rig.engine
            .set_alternate_mixer(Box::new(ConstMixer { ready: false, value: 0.25 }));
        rig.send(EngineCommand::SetMixerMode { mode: MixerMode::Alternate });

        let out = rig.render(128);
        assert!((out[0].left - FRAC_1_SQRT_2).abs() < 1e-4);
    }

    #[test]
    fn test_process_into_planar() {
        let mut rig = Rig::new();
        rig.load_constant_asset("amb", 1.0, 48000);
        rig.create_bus("bed", 0.0);
        rig.create_track("t", "bed", "amb");
        rig.play("t", None, seamless_full());

        let mut left = [0.0f32; 128];
        let mut right = [0.0f32; 128];
        rig.engine.process_commands(&mut rig.cmd_rx);
        rig.engine.process_into(&mut left, &mut right);

        assert!((left[0] - FRAC_1_SQRT_2).abs() < 1e-4);
        assert!((right[64] - FRAC_1_SQRT_2).abs() < 1e-4);
    }

    #[test]
    fn test_lpf_command_shapes_output() {
        let mut rig = Rig::new();
        rig.load_constant_asset("amb", 1.0, 48000);
        rig.create_bus("bed", 0.0);
        rig.create_track("t", "bed", "amb");
        rig.send(EngineCommand::SetLpf { bus: "bed".to_string(), cutoff_hz: 50.0 });
        rig.play("t", None, seamless_full());

        let out = rig.render(128);
        // A 50 Hz one-pole rises slowly on a step input
        assert!(out[0].left < 0.1);
        assert!(out[0].left < out[127].left);
        assert!(out[127].left < FRAC_1_SQRT_2);
    }
}
