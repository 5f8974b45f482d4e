use std::{io, path::PathBuf};

use thiserror::Error;

/// Failures surfaced by the server. A malformed line only closes its
/// connection and is not an error.
#[derive(Debug, Error)]
pub enum Error {
    /// The listening socket could not be created.
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },
    /// The accept loop failed; the server cannot continue.
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),
    /// A connection failed for a reason other than the peer going away.
    #[error("failed to read from connection: {0}")]
    Read(#[source] io::Error),
    /// `stop` was called on a listener that is already closed.
    #[error("listener is already closed")]
    AlreadyClosed,
    #[error("server has not been started")]
    NotStarted,
    /// The output sink could not be opened.
    #[error("failed to open output {}: {source}", .path.display())]
    Sink { path: PathBuf, source: io::Error },
}

impl Error {
    /// Returns true if the error belongs to a single connection rather than
    /// the server as a whole.
    pub fn is_connection_local(&self) -> bool {
        matches!(self, Self::Read(_))
    }
}

/// Read failures that just mean the peer went away.
pub(crate) fn is_disconnect(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}
