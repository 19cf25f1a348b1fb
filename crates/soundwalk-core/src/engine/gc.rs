//! RT-safe garbage collection for asset buffers
//!
//! A global `basedrop` collector enables deferred deallocation of decoded
//! PCM assets. When the last `Shared<AssetBuffer>` is dropped on the audio
//! thread (asset replacement, track switch), the memory isn't freed inline.
//! Instead the pointer is enqueued for a background GC thread.
//!
//! Freeing a multi-minute decoded walk soundtrack can take long enough to
//! blow the render deadline; enqueueing a pointer takes nanoseconds.

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// Global handle for creating Shared<T> allocations
///
/// Initialized once; the actual Collector lives on a dedicated GC thread.
static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// Initialize the global collector and return a handle
fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("audio-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it must be created on its own thread
            let mut collector = Collector::new();

            let handle = collector.handle();
            tx.send(handle).expect("Failed to send GC handle");

            log::info!("Audio GC thread started");

            loop {
                collector.collect();

                // 100ms is fast enough for memory reclamation
                thread::sleep(Duration::from_millis(100));
            }
        })
        .expect("Failed to spawn audio GC thread");

    rx.recv().expect("Failed to receive GC handle")
}

/// Get a handle for creating `Shared<T>` allocations
///
/// ```ignore
/// use basedrop::Shared;
/// use soundwalk_core::engine::gc_handle;
///
/// let asset = Shared::new(&gc_handle(), AssetBuffer::new(48000, channels)?);
/// ```
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}
