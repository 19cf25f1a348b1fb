//! Real-time audio engine
//!
//! This module contains the core rendering components:
//! - Track: playback voice with resampling, loops, and marker transitions
//! - Bus: accumulator with gain ramp, low-pass filter, and sidechain ducker
//! - EventScheduler: sample-accurate start/stop timing
//! - AudioEngine: main engine tying everything together
//!
//! One audio thread owns the engine. Control threads talk to it through
//! lock-free queues only: commands in, notifications out, both handled at
//! block boundaries.

mod asset;
mod bus;
mod command;
mod engine;
mod gc;
mod ramp;
mod scheduler;
mod track;

pub use asset::*;
pub use bus::*;
pub use command::*;
pub use engine::*;
pub use gc::*;
pub use ramp::*;
pub use scheduler::*;
pub use track::*;
