//! Frame decoding: one transport read event into per-room messages.

use crate::id::RoomId;
use crate::message::ServerMessage;

/// First character of a frame that names its room on the first line.
pub const ROOM_MARKER: char = '>';

/// Delimiter between the message type and its params.
pub const FIELD_SEPARATOR: char = '|';

/// Text pattern announcing the room's primary language. The announcement
/// updates room state directly instead of being queued as a message.
const LANGUAGE_PATTERN: &str = "This room's primary language is ";

/// The result of decoding one frame.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Room named by the frame's marker line; `None` means the global room.
    pub room: Option<RoomId>,
    /// Messages in arrival order.
    pub messages: Vec<ServerMessage>,
    /// Language announced within the frame, if any.
    pub language: Option<String>,
}

/// Decode one raw frame into its room and ordered messages.
///
/// Lines that do not start with the field separator are ignored, except
/// the language announcement. Once an `init` message has been seen, a
/// subsequent `tournament` message aborts the rest of the frame:
/// tournament snapshots sent during room initialization are stale and the
/// whole tail is discarded with them. Suppression state does not carry
/// over to other frames.
pub fn decode_frame(raw: &str) -> DecodedFrame {
    let mut frame = DecodedFrame::default();
    let mut lines = raw.lines();

    if raw.starts_with(ROOM_MARKER) {
        let marker = lines.next().unwrap_or("");
        frame.room = Some(RoomId::new(&marker[ROOM_MARKER.len_utf8()..]));
    }

    let mut saw_init = false;
    for line in lines {
        if let Some(language) = language_announcement(line) {
            frame.language = Some(language.to_string());
            continue;
        }
        let Some(msg) = ServerMessage::parse(line) else {
            continue;
        };
        if saw_init && msg.command() == "tournament" {
            break;
        }
        if msg.command() == "init" {
            saw_init = true;
        }
        frame.messages.push(msg);
    }

    frame
}

fn language_announcement(line: &str) -> Option<&str> {
    let start = line.find(LANGUAGE_PATTERN)? + LANGUAGE_PATTERN.len();
    let rest = &line[start..];
    let end = rest
        .find(|c: char| !c.is_alphabetic())
        .unwrap_or(rest.len());
    match &rest[..end] {
        "" => None,
        language => Some(language),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_with_marker_names_its_room() {
        let frame = decode_frame(">bot-dev\n|init|chat\n|title|Bot Dev\n");
        assert_eq!(frame.room, Some(RoomId::new("bot-dev")));
        assert_eq!(frame.messages.len(), 2);
        assert_eq!(frame.messages[0].command(), "init");
        assert_eq!(frame.messages[1].command(), "title");
    }

    #[test]
    fn frame_without_marker_is_global() {
        let frame = decode_frame("|challstr|4|abcdef");
        assert_eq!(frame.room, None);
        assert_eq!(frame.messages[0].command(), "challstr");
    }

    #[test]
    fn non_separator_lines_are_ignored() {
        let frame = decode_frame(">lobby\nsome log text\n|c|user|hi\n");
        assert_eq!(frame.messages.len(), 1);
        assert_eq!(frame.messages[0].command(), "c");
    }

    #[test]
    fn tournament_after_init_aborts_the_frame() {
        let frame = decode_frame(">lobby\n|init|chat\n|tournament|create|gen9ou\n|c|user|hi\n");
        let commands: Vec<_> = frame.messages.iter().map(|m| m.command().to_string()).collect();
        // The tournament snapshot and everything after it is discarded.
        assert_eq!(commands, ["init"]);
    }

    #[test]
    fn tournament_before_init_is_kept() {
        let frame = decode_frame(">lobby\n|tournament|update|{}\n|init|chat\n");
        let commands: Vec<_> = frame.messages.iter().map(|m| m.command().to_string()).collect();
        assert_eq!(commands, ["tournament", "init"]);
    }

    #[test]
    fn suppression_does_not_cross_frames() {
        let _ = decode_frame(">lobby\n|init|chat\n");
        let frame = decode_frame(">lobby\n|tournament|update|{}\n");
        assert_eq!(frame.messages.len(), 1);
    }

    #[test]
    fn language_announcement_updates_state_not_queue() {
        let frame = decode_frame(">lobby\n|c|user|This room's primary language is German.\n|c|user|hi\n");
        assert_eq!(frame.language.as_deref(), Some("German"));
        // The announcement line itself is consumed.
        assert_eq!(frame.messages.len(), 1);
        assert_eq!(frame.messages[0].param(1), Some("hi"));
    }
}
