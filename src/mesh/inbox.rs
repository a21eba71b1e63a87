//! Mesh-stack event inbox.
//!
//! The stack callback context posts [`MeshEvent`]s here; the event loop
//! drains them one at a time.  Bounded, no heap.
//!
//! ```text
//! ┌──────────────┐  MeshEvent  ┌──────────────┐
//! │  Mesh stack  │────────────▶│  Event loop  │
//! │  callbacks   │             │  (sync)      │
//! └──────────────┘             └──────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

use super::MeshEvent;

/// Inbox depth.
pub const INBOX_DEPTH: usize = 16;

pub type MeshInbox = Channel<CriticalSectionRawMutex, MeshEvent, INBOX_DEPTH>;

/// Events from the mesh stack, waiting for the event loop.
pub static MESH_INBOX: MeshInbox = Channel::new();

/// Queue an event.  Returns `false` (and drops the event) when full.
pub fn post(event: MeshEvent) -> bool {
    match MESH_INBOX.try_send(event) {
        Ok(()) => true,
        Err(_) => {
            warn!("MESH | inbox full, event dropped");
            false
        }
    }
}

/// Next queued event, if any.
pub fn next() -> Option<MeshEvent> {
    MESH_INBOX.try_receive().ok()
}

pub fn is_empty() -> bool {
    MESH_INBOX.is_empty()
}
