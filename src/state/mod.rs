//! State management module.
//!
//! Contains live room state and the per-room dispatch queue. The room
//! *registry* (ownership and eviction) lives on [`crate::bot::Bot`].

mod queue;
mod room;

pub use queue::enqueue;
pub use room::{MESSAGE_BUFFER_CAPACITY, RoomMember, RoomState};
