//! # World Events
//!
//! The world's outbound collaborators: the network layer (block updates)
//! and the renderer (chunk re-render requests).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  BlockUpdateSink   ┌─────────────┐
//! │    World    │───────────────────>│   Network   │
//! │   (Chunk)   │  RenderSink        ├─────────────┤
//! │             │───────────────────>│  Renderer   │
//! └─────────────┘                    └─────────────┘
//! ```
//!
//! Both are traits so the core never depends on a concrete transport.
//! [`EventBus`] implements both over one bounded crossbeam channel for
//! embedders that want to poll.

use crate::block::Block;
use crate::coords::ChunkPos;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::warn;

/// Receives block changes for broadcast or forwarding.
///
/// Always invoked from a scheduler worker, never from the mutating thread.
pub trait BlockUpdateSink: Send + Sync {
    /// A block changed material. `block` is `None` for air.
    fn block_changed(&self, world_x: i32, world_y: i32, block: Option<Block>);
}

/// Receives chunk re-render requests.
pub trait RenderSink: Send + Sync {
    /// The chunk's texture or light changed.
    fn request_render(&self, pos: ChunkPos, prioritize: bool);
}

/// Events emitted by a world.
#[derive(Clone, Debug, PartialEq)]
pub enum WorldEvent {
    /// A block changed material.
    BlockChanged {
        /// World x.
        x: i32,
        /// World y.
        y: i32,
        /// New block, `None` for air.
        block: Option<Block>,
    },
    /// A chunk needs re-rendering.
    RenderChunk {
        /// Chunk position.
        pos: ChunkPos,
        /// Jump the render queue.
        prioritize: bool,
    },
}

/// Bounded event channel.
///
/// When full, new events are dropped with a warning so the world never
/// blocks on a slow consumer.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: Sender<WorldEvent>,
    receiver: Receiver<WorldEvent>,
}

impl EventBus {
    /// Creates a bus holding at most `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self { sender, receiver }
    }

    /// Sends an event (non-blocking). Returns false if it was dropped.
    #[inline]
    pub fn send(&self, event: WorldEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(?event, "event bus full, dropping event");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Receives all pending events (non-blocking).
    #[must_use]
    pub fn drain(&self) -> Vec<WorldEvent> {
        self.receiver.try_iter().collect()
    }

    /// Receives one event (non-blocking).
    #[must_use]
    pub fn try_recv(&self) -> Option<WorldEvent> {
        self.receiver.try_recv().ok()
    }

    /// Number of pending events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }
}

impl BlockUpdateSink for EventBus {
    fn block_changed(&self, world_x: i32, world_y: i32, block: Option<Block>) {
        self.send(WorldEvent::BlockChanged {
            x: world_x,
            y: world_y,
            block,
        });
    }
}

impl RenderSink for EventBus {
    fn request_render(&self, pos: ChunkPos, prioritize: bool) {
        self.send(WorldEvent::RenderChunk { pos, prioritize });
    }
}
