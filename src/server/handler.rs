use std::{io, sync::Arc};

use futures::StreamExt;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    select,
};
use tokio_util::{
    codec::{FramedRead, LinesCodecError},
    sync::CancellationToken,
};
use tracing::{debug, info, trace, warn};

use super::{
    error::{is_disconnect, Error},
    sink::Sink,
    store::Store,
    wire::{Line, LineCodec},
    Number,
};

/// Runs the line protocol for one connection at a time.
///
/// Cheap to share: the store and sink are shared by every connection.
pub struct Handler {
    store: Arc<dyn Store>,
    sink: Arc<dyn Sink>,
}

/// What ended the read loop, before the connection is closed.
enum Outcome {
    Cancelled,
    Disconnected,
    Violation,
    Failed(io::Error),
}

impl Handler {
    pub fn new(store: Arc<dyn Store>, sink: Arc<dyn Sink>) -> Self {
        Self { store, sink }
    }

    /// Reads lines from `conn` until the peer leaves, sends something invalid,
    /// or `token` is cancelled.
    ///
    /// Only an unexpected read failure is returned as an error. A `terminate`
    /// line cancels `token`, which in turn closes this connection along with
    /// every other one.
    pub async fn handle<S>(&self, conn: S, token: CancellationToken) -> Result<(), Error>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut lines = FramedRead::new(conn, LineCodec::new());
        let outcome = loop {
            let next = select! {
                biased;
                _ = token.cancelled() => break Outcome::Cancelled,
                next = lines.next() => next,
            };
            let line = match next {
                Some(Ok(line)) => line,
                None => break Outcome::Disconnected,
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    debug!("line too long");
                    break Outcome::Violation;
                }
                Some(Err(LinesCodecError::Io(e))) if is_disconnect(&e) => {
                    break Outcome::Disconnected;
                }
                Some(Err(LinesCodecError::Io(e))) if e.kind() == io::ErrorKind::InvalidData => {
                    debug!("line is not valid utf-8");
                    break Outcome::Violation;
                }
                Some(Err(LinesCodecError::Io(e))) => break Outcome::Failed(e),
            };
            match line.parse() {
                Ok(Line::Number(number)) => self.record(number, &line),
                Ok(Line::Terminate) => {
                    info!("terminate requested");
                    token.cancel();
                }
                Err(e) => {
                    debug!(%line, "invalid line: {}", e);
                    break Outcome::Violation;
                }
            }
        };

        match outcome {
            Outcome::Disconnected => {
                debug!("peer disconnected");
                Ok(())
            }
            Outcome::Cancelled | Outcome::Violation => {
                close(lines).await;
                Ok(())
            }
            Outcome::Failed(e) => {
                close(lines).await;
                Err(Error::Read(e))
            }
        }
    }

    fn record(&self, number: Number, text: &str) {
        if !self.store.is_unique(number) {
            trace!(%number, "duplicate");
            return;
        }
        if let Err(e) = self.sink.write(text) {
            warn!(%number, "failed to write number: {}", e);
        }
    }
}

async fn close<S: AsyncWrite + Unpin>(lines: FramedRead<S, LineCodec>) {
    let mut conn = lines.into_inner();
    if let Err(e) = conn.shutdown().await {
        trace!("shutdown failed: {}", e);
    }
    debug!("connection closed");
}
