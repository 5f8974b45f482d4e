use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{
    net::TcpListener,
    select,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, debug_span, error, info, warn, Instrument};

use super::{
    config::ServerConfig,
    error::Error,
    handler::Handler,
    listener::{Admitted, LimitListener, Listener},
    recorder::Recorder,
    sink::Sink,
};

// tokio's interval panics on a zero period
const MIN_REPORT_INTERVAL: Duration = Duration::from_millis(1);

/// Accepts connections, hands each one to a [`Handler`] task and prints the
/// stats report on a timer.
pub struct Server<L = TcpListener> {
    config: ServerConfig,
    handler: Arc<Handler>,
    recorder: Arc<Recorder>,
    sink: Arc<dyn Sink>,
    slot: Mutex<Slot<L>>,
    token: CancellationToken,
}

enum Slot<L> {
    Idle,
    Bound(Bound<L>),
    Closed,
}

struct Bound<L> {
    listener: Arc<LimitListener<L>>,
    /// Tripped by `stop` so a running accept loop lets go of the socket.
    closed: CancellationToken,
}

impl Server<TcpListener> {
    pub fn new(config: ServerConfig, sink: Arc<dyn Sink>) -> Self {
        Self::build(config, sink)
    }

    /// Binds the listening socket and returns the address it ended up on.
    pub async fn start(&self) -> Result<SocketAddr, Error> {
        let listener = Self::bind(&self.config).await?;
        let local = listener.local_addr().map_err(|source| Error::Bind {
            addr: format!("{}:{}", self.config.host, self.config.port),
            source,
        })?;
        self.attach(listener);
        Ok(local)
    }

    /// Binds the socket `config` asks for without building a server, so a
    /// caller can check the address before setting anything else up.
    pub async fn bind(config: &ServerConfig) -> Result<TcpListener, Error> {
        let bind_error = |source| Error::Bind {
            addr: format!("{}:{}", config.host, config.port),
            source,
        };
        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .await
            .map_err(bind_error)?;
        let local = listener.local_addr().map_err(bind_error)?;
        info!(
            %local,
            max_connections = config.connection_limit(),
            "listening"
        );
        Ok(listener)
    }
}

impl<L: Listener> Server<L> {
    /// Creates a server around a listener that is already accepting.
    pub fn with_listener(listener: L, config: ServerConfig, sink: Arc<dyn Sink>) -> Self {
        let server = Self::build(config, sink);
        server.attach(listener);
        server
    }

    fn build(config: ServerConfig, sink: Arc<dyn Sink>) -> Self {
        let recorder = Arc::new(Recorder::new());
        let store = config.store.build(recorder.clone());
        Self {
            handler: Arc::new(Handler::new(store, sink.clone())),
            config,
            recorder,
            sink,
            slot: Mutex::new(Slot::Idle),
            token: CancellationToken::new(),
        }
    }

    fn attach(&self, listener: L) {
        let bound = Bound {
            listener: Arc::new(LimitListener::new(
                listener,
                self.config.connection_limit(),
            )),
            closed: CancellationToken::new(),
        };
        let previous = std::mem::replace(&mut *self.slot.lock(), Slot::Bound(bound));
        if let Slot::Bound(previous) = previous {
            previous.closed.cancel();
        }
    }

    /// Runs the accept loop until the server is cancelled or accepting fails.
    ///
    /// Returns `Ok` on cancellation, after every connection has been closed
    /// and the sink drained. Any other exit is an accept failure, which also
    /// cancels the server.
    pub async fn process(&self) -> Result<(), Error> {
        let (listener, closed) = match &*self.slot.lock() {
            Slot::Bound(bound) => (bound.listener.clone(), bound.closed.clone()),
            Slot::Idle => return Err(Error::NotStarted),
            Slot::Closed => return Err(Error::AlreadyClosed),
        };

        let connections = TaskTracker::new();
        let reporting = self.token.child_token();
        // stops the report timer however the loop below exits
        let _reporting = reporting.clone().drop_guard();
        tokio::spawn(report(
            self.recorder.clone(),
            self.config.report_interval,
            reporting,
        ));

        let result = loop {
            select! {
                biased;
                _ = self.token.cancelled() => break Ok(()),
                _ = closed.cancelled() => {
                    break Err(Error::Accept(io::Error::new(
                        io::ErrorKind::NotConnected,
                        "listener closed",
                    )))
                }
                accepted = listener.accept() => match accepted {
                    Ok(admitted) => {
                        debug!(free = listener.available(), "admitted");
                        self.dispatch(&connections, admitted)
                    }
                    Err(e) => break Err(Error::Accept(e)),
                },
            }
        };

        match &result {
            Ok(()) => info!(unique = self.recorder.total(), "shutting down"),
            Err(e) => error!("accept loop failed: {}", e),
        }
        self.token.cancel();
        connections.close();
        connections.wait().await;

        let sink = self.sink.clone();
        match tokio::task::spawn_blocking(move || sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("failed to close output: {}", e),
            Err(e) => warn!("failed to close output: {}", e),
        }
        result
    }

    fn dispatch(&self, connections: &TaskTracker, admitted: Admitted<L::Conn>) {
        let Admitted { conn, peer, permit } = admitted;
        let handler = self.handler.clone();
        let token = self.token.clone();
        let span = debug_span!("conn", %peer);
        connections.spawn(
            async move {
                debug!("accepted");
                if let Err(e) = handler.handle(conn, token).await {
                    if e.is_connection_local() {
                        warn!("connection failed: {}", e);
                    } else {
                        error!("connection failed: {}", e);
                    }
                }
                drop(permit);
            }
            .instrument(span),
        );
    }

    /// Closes the listening socket. A running `process` returns with an
    /// accept error.
    pub fn stop(&self) -> Result<(), Error> {
        let mut slot = self.slot.lock();
        match std::mem::replace(&mut *slot, Slot::Closed) {
            Slot::Bound(bound) => {
                bound.closed.cancel();
                debug!("listener closed");
                Ok(())
            }
            Slot::Closed => Err(Error::AlreadyClosed),
            Slot::Idle => {
                *slot = Slot::Idle;
                Err(Error::NotStarted)
            }
        }
    }

    /// The token shared by the accept loop, the report timer and every
    /// connection. Cancelling it shuts the server down.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn recorder(&self) -> &Arc<Recorder> {
        &self.recorder
    }

    /// Address of the listening socket, if one is bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.slot.lock() {
            Slot::Bound(bound) => bound.listener.local_addr().ok(),
            _ => None,
        }
    }
}

/// Prints a stats report every `period`.
async fn report(recorder: Arc<Recorder>, period: Duration, token: CancellationToken) {
    let period = period.max(MIN_REPORT_INTERVAL);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        select! {
            biased;
            _ = token.cancelled() => return,
            _ = ticker.tick() => println!("{}", recorder.report()),
        }
    }
}
