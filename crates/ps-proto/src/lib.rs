//! Protocol types for a pipe-delimited, room-multiplexed chat protocol.
//!
//! The upstream server multiplexes many rooms over one text stream. Each
//! transport read event delivers a *frame*: a blob of newline-separated
//! lines, optionally prefixed with a room marker line. This crate turns
//! frames into typed per-room messages and provides the identifier and
//! rank types shared by everything above the transport:
//!
//! - [`decode_frame`]: one frame into room + ordered [`ServerMessage`]s
//! - [`RoomId`] / [`UserId`]: normalized identifiers
//! - [`Rank`]: the total order over privilege sigils

mod frame;
mod id;
mod message;
mod rank;

pub use frame::{decode_frame, DecodedFrame, FIELD_SEPARATOR, ROOM_MARKER};
pub use id::{RoomId, UserId};
pub use message::ServerMessage;
pub use rank::{Rank, RankParseError};
