//! Unified error handling for psbot.
//!
//! Errors that cross layer boundaries live here; errors tied to one
//! subsystem (config, database, login) stay next to that subsystem and
//! convert into these at the dispatch seam.

use thiserror::Error;

/// Errors surfaced by protocol message handlers.
///
/// The dispatch queue logs these; a failing handler never aborts other
/// handlers for the same message, nor later messages in other rooms.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("login error: {0}")]
    Login(#[from] crate::client::LoginError),

    #[error("database error: {0}")]
    Db(#[from] crate::db::DbError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for protocol message handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Errors surfaced by chat commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("database error: {0}")]
    Db(#[from] crate::db::DbError),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for chat commands.
pub type CommandResult = Result<(), CommandError>;
