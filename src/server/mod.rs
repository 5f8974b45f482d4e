// Every accepted connection gets its own task. The only state shared between
// those tasks is the membership store and the stats recorder, and neither of
// them hands out locks to callers: a connection task asks the store a single
// question ("was this number new?") and moves on. Nothing orders work across
// connections, so a slow client never holds back a fast one.

// Shutdown is cooperative. A single cancellation token is created per server
// and handed to the accept loop, the report timer and every connection task.
// Any connection may trip it with the `terminate` command, after which each
// task notices at its next await point, closes what it owns and returns.

pub mod config;
pub mod error;
pub mod handler;
pub mod listener;
pub mod recorder;
pub mod scheduler;
pub mod sink;
pub mod store;
pub mod wire;

pub use config::ServerConfig;
pub use error::Error;
pub use handler::Handler;
pub use recorder::{Recorder, Report};
pub use scheduler::Server;
pub use sink::{FileSink, MemorySink, Sink};
pub use store::{AtomicBitmapStore, BitmapStore, MapStore, Recorded, Store, StoreKind};
pub use wire::{Line, Number};

const DEFAULT_PORT: u16 = 4000;
const DEFAULT_MAX_CONNECTIONS: usize = 5;
