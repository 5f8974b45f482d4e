use std::{future::Future, io, net::SocketAddr, sync::Arc};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
    sync::{OwnedSemaphorePermit, Semaphore},
};

/// Something that hands out connections.
pub trait Listener: Send + Sync + 'static {
    type Conn: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn accept(&self) -> impl Future<Output = io::Result<(Self::Conn, SocketAddr)>> + Send;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl Listener for TcpListener {
    type Conn = TcpStream;

    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// A connection that holds one of the listener's admission slots. The slot
/// frees up when `permit` is dropped.
pub struct Admitted<C> {
    pub conn: C,
    pub peer: SocketAddr,
    pub permit: OwnedSemaphorePermit,
}

/// Wraps a listener so that at most `limit` connections are out at once.
///
/// Once the limit is reached `accept` waits for a slot before it accepts the
/// next connection, leaving pending clients queued in the OS backlog instead
/// of turning them away.
pub struct LimitListener<L> {
    inner: L,
    slots: Arc<Semaphore>,
}

impl<L: Listener> LimitListener<L> {
    pub fn new(inner: L, limit: usize) -> Self {
        Self {
            inner,
            slots: Arc::new(Semaphore::new(limit.max(1))),
        }
    }

    pub async fn accept(&self) -> io::Result<Admitted<L::Conn>> {
        let permit = self.slots.clone().acquire_owned().await.map_err(|_| {
            io::Error::new(io::ErrorKind::Other, "admission closed")
        })?;
        let (conn, peer) = self.inner.accept().await?;
        Ok(Admitted { conn, peer, permit })
    }

    /// Slots not currently held by a connection.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn waits_for_a_free_slot() {
        let listener =
            LimitListener::new(TcpListener::bind("127.0.0.1:0").await.unwrap(), 1);
        let addr = listener.local_addr().unwrap();

        let _first = TcpStream::connect(addr).await.unwrap();
        let second = TcpStream::connect(addr).await.unwrap();

        let admitted = listener.accept().await.unwrap();
        assert_eq!(listener.available(), 0);

        // the second client is connected but not admitted yet
        assert!(timeout(Duration::from_millis(100), listener.accept())
            .await
            .is_err());

        drop(admitted);
        let admitted = timeout(Duration::from_secs(5), listener.accept())
            .await
            .expect("second client was never admitted")
            .unwrap();
        assert_eq!(admitted.peer, second.local_addr().unwrap());
    }

    #[tokio::test]
    async fn zero_limit_admits_one() {
        let listener =
            LimitListener::new(TcpListener::bind("127.0.0.1:0").await.unwrap(), 0);
        assert_eq!(listener.available(), 1);
    }
}
