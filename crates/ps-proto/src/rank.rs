//! User privilege ranks.
//!
//! Ranks are single-sigil prefixes on user strings (`@user`, `+user`).
//! Permission checks compare ranks through the derived total order, so
//! variant declaration order below is load-bearing.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A user's privilege level, either global or within one room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rank {
    /// `‽` - locked out of the service.
    Locked,
    /// `!` - muted in the room.
    Muted,
    /// No sigil (or a plain space) - a regular user.
    #[default]
    Normal,
    /// `+`
    Voice,
    /// `%`
    Driver,
    /// `@`
    Moderator,
    /// `*`
    Bot,
    /// `#`
    Owner,
    /// `&`
    Administrator,
}

impl Rank {
    /// Map a rank sigil to its rank. A space maps to [`Rank::Normal`]
    /// (the server pads unranked users with one in some messages).
    pub fn from_symbol(c: char) -> Option<Rank> {
        match c {
            ' ' => Some(Rank::Normal),
            '+' => Some(Rank::Voice),
            '%' => Some(Rank::Driver),
            '@' => Some(Rank::Moderator),
            '*' => Some(Rank::Bot),
            '#' => Some(Rank::Owner),
            '&' => Some(Rank::Administrator),
            '!' => Some(Rank::Muted),
            '‽' => Some(Rank::Locked),
            _ => None,
        }
    }

    /// The sigil used on the wire and in storage.
    pub fn symbol(&self) -> char {
        match self {
            Rank::Locked => '‽',
            Rank::Muted => '!',
            Rank::Normal => ' ',
            Rank::Voice => '+',
            Rank::Driver => '%',
            Rank::Moderator => '@',
            Rank::Bot => '*',
            Rank::Owner => '#',
            Rank::Administrator => '&',
        }
    }

    /// Split a raw user string into its rank prefix and the bare name.
    pub fn split(raw: &str) -> (Rank, &str) {
        let mut chars = raw.chars();
        match chars.next().and_then(Rank::from_symbol) {
            Some(rank) => (rank, chars.as_str()),
            None => (Rank::Normal, raw),
        }
    }
}

/// Error returned when a stored rank string cannot be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown rank: {0:?}")]
pub struct RankParseError(pub String);

impl FromStr for Rank {
    type Err = RankParseError;

    /// Parse a rank from a sigil or a spelled-out name. Both forms show up
    /// in user input; only the sigil is persisted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if let Some(rank) = Rank::from_symbol(c) {
                return Ok(rank);
            }
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "locked" => Ok(Rank::Locked),
            "muted" => Ok(Rank::Muted),
            "normal" | "regular" => Ok(Rank::Normal),
            "voice" => Ok(Rank::Voice),
            "driver" => Ok(Rank::Driver),
            "moderator" | "mod" => Ok(Rank::Moderator),
            "bot" => Ok(Rank::Bot),
            "owner" => Ok(Rank::Owner),
            "administrator" | "admin" => Ok(Rank::Administrator),
            _ => Err(RankParseError(s.to_string())),
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_is_total_and_ascending() {
        assert!(Rank::Locked < Rank::Muted);
        assert!(Rank::Muted < Rank::Normal);
        assert!(Rank::Normal < Rank::Voice);
        assert!(Rank::Voice < Rank::Driver);
        assert!(Rank::Driver < Rank::Moderator);
        assert!(Rank::Moderator < Rank::Bot);
        assert!(Rank::Bot < Rank::Owner);
        assert!(Rank::Owner < Rank::Administrator);
    }

    #[test]
    fn symbol_round_trip() {
        for rank in [
            Rank::Locked,
            Rank::Muted,
            Rank::Normal,
            Rank::Voice,
            Rank::Driver,
            Rank::Moderator,
            Rank::Bot,
            Rank::Owner,
            Rank::Administrator,
        ] {
            assert_eq!(Rank::from_symbol(rank.symbol()), Some(rank));
        }
    }

    #[test]
    fn split_rank_prefix() {
        assert_eq!(Rank::split("@Mod User"), (Rank::Moderator, "Mod User"));
        assert_eq!(Rank::split(" Regular"), (Rank::Normal, "Regular"));
        assert_eq!(Rank::split("Regular"), (Rank::Normal, "Regular"));
        assert_eq!(Rank::split("+voiced"), (Rank::Voice, "voiced"));
    }

    #[test]
    fn parse_names_and_symbols() {
        assert_eq!("@".parse::<Rank>(), Ok(Rank::Moderator));
        assert_eq!("mod".parse::<Rank>(), Ok(Rank::Moderator));
        assert_eq!("Voice".parse::<Rank>(), Ok(Rank::Voice));
        assert!("??".parse::<Rank>().is_err());
    }
}
