//! Decoded protocol messages.

use crate::frame::FIELD_SEPARATOR;

/// One decoded `|type|param|param...` line.
///
/// Immutable after construction. Params are the raw separator-delimited
/// fields; escaping is left to whichever handler consumes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMessage {
    command: String,
    params: Vec<String>,
}

impl ServerMessage {
    /// Parse a single protocol line. Returns `None` unless the line starts
    /// with the field separator.
    pub fn parse(line: &str) -> Option<ServerMessage> {
        let rest = line.strip_prefix(FIELD_SEPARATOR)?;
        let mut fields = rest.split(FIELD_SEPARATOR);
        let command = fields.next().unwrap_or_default().to_string();
        let params = fields.map(str::to_string).collect();
        Some(ServerMessage { command, params })
    }

    /// Build a message directly (used by tests and replay tooling).
    pub fn new(command: impl Into<String>, params: Vec<String>) -> ServerMessage {
        ServerMessage { command: command.into(), params }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Re-join the params from `from` onward. Free-text fields (chat
    /// bodies, login challenges) may legitimately contain the separator,
    /// so the tail has to be stitched back together.
    pub fn text_from(&self, from: usize) -> String {
        if from >= self.params.len() {
            return String::new();
        }
        self.params[from..].join("|")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_type_and_params() {
        let msg = ServerMessage::parse("|c|+voiced|hello there").unwrap();
        assert_eq!(msg.command(), "c");
        assert_eq!(msg.params(), ["+voiced", "hello there"]);
    }

    #[test]
    fn ignores_lines_without_separator() {
        assert!(ServerMessage::parse("plain log line").is_none());
        assert!(ServerMessage::parse("").is_none());
    }

    #[test]
    fn params_are_not_unescaped() {
        let msg = ServerMessage::parse("|c|user|a &amp; b").unwrap();
        assert_eq!(msg.param(1), Some("a &amp; b"));
    }

    #[test]
    fn text_from_rejoins_separator_fields() {
        let msg = ServerMessage::parse("|c:|1700000000|@mod|one|two|three").unwrap();
        assert_eq!(msg.text_from(2), "one|two|three");
        assert_eq!(msg.text_from(9), "");
    }
}
