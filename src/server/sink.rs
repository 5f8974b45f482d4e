use std::{
    fs::{self, File},
    io::{self, LineWriter, Write},
    path::Path,
    thread::{self, JoinHandle},
};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

use super::error::Error;

/// Where newly seen numbers end up. Called once per unique number with its
/// 9-character text; a failed write is not retried.
pub trait Sink: Send + Sync {
    fn write(&self, line: &str) -> io::Result<()>;

    /// Waits until every line written so far has been handed to its
    /// destination. Later writes fail.
    fn close(&self) -> io::Result<()> {
        Ok(())
    }
}

enum Command {
    Line(String),
    Close,
}

/// Appends one number per line to a file.
///
/// The file is started afresh: anything already at `path` is removed.
/// `write` only queues the line; a dedicated thread writes it out and
/// flushes after every line, so connections never wait on the disk.
pub struct FileSink {
    commands: mpsc::UnboundedSender<Command>,
    writer: Mutex<Option<JoinHandle<io::Result<()>>>>,
}

impl FileSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let sink_error = |source| Error::Sink {
            path: path.to_path_buf(),
            source,
        };
        let open = || -> io::Result<File> {
            if path.exists() {
                fs::remove_file(path)?;
            }
            File::create(path)
        };
        let file = open().map_err(sink_error)?;

        let (commands, queue) = mpsc::unbounded_channel();
        let writer = thread::Builder::new()
            .name("numbers-writer".into())
            .spawn(move || drain(LineWriter::new(file), queue))
            .map_err(sink_error)?;
        Ok(Self {
            commands,
            writer: Mutex::new(Some(writer)),
        })
    }
}

fn drain(
    mut file: LineWriter<File>,
    mut queue: mpsc::UnboundedReceiver<Command>,
) -> io::Result<()> {
    while let Some(command) = queue.blocking_recv() {
        match command {
            Command::Line(line) => {
                if let Err(e) = file.write_all(line.as_bytes()) {
                    warn!(%line, "failed to write number: {}", e);
                }
            }
            Command::Close => break,
        }
    }
    queue.close();
    file.flush()
}

impl Sink for FileSink {
    fn write(&self, line: &str) -> io::Result<()> {
        let mut line = line.to_owned();
        line.push('\n');
        self.commands
            .send(Command::Line(line))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "output is closed"))
    }

    fn close(&self) -> io::Result<()> {
        let Some(writer) = self.writer.lock().take() else {
            return Ok(());
        };
        // fails only if the writer already stopped, which join reports
        let _ = self.commands.send(Command::Close);
        writer
            .join()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "output writer panicked"))?
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of everything written so far, in write order.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

impl Sink for MemorySink {
    fn write(&self, line: &str) -> io::Result<()> {
        self.lines.lock().push(line.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        time::{Duration, Instant},
    };

    use tempfile::TempDir;

    use super::*;

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn file_sink_writes_one_number_per_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("numbers.log");

        let sink = FileSink::create(&path).unwrap();
        sink.write("000000001").unwrap();
        sink.write("123456789").unwrap();
        sink.close().unwrap();

        assert_eq!(read(&path), "000000001\n123456789\n");
    }

    #[test]
    fn file_sink_lines_reach_disk_before_close() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("numbers.log");

        let sink = FileSink::create(&path).unwrap();
        sink.write("000000042").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while read(&path) != "000000042\n" {
            assert!(Instant::now() < deadline, "line never left the sink");
            thread::sleep(Duration::from_millis(5));
        }
        sink.close().unwrap();
    }

    #[test]
    fn file_sink_close_drains_every_writer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("numbers.log");
        let sink = Arc::new(FileSink::create(&path).unwrap());

        let writers: Vec<_> = (0..8u32)
            .map(|w| {
                let sink = sink.clone();
                thread::spawn(move || {
                    for n in 0..1_000u32 {
                        sink.write(&format!("{:09}", w * 1_000 + n)).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }
        sink.close().unwrap();

        let mut lines: Vec<u32> = read(&path).lines().map(|l| l.parse().unwrap()).collect();
        lines.sort_unstable();
        assert_eq!(lines, (0..8_000).collect::<Vec<_>>());
    }

    #[test]
    fn file_sink_rejects_writes_after_close() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("numbers.log");

        let sink = FileSink::create(&path).unwrap();
        sink.write("000000001").unwrap();
        sink.close().unwrap();
        sink.close().unwrap();

        let err = sink.write("000000002").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(read(&path), "000000001\n");
    }

    #[test]
    fn file_sink_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("numbers.log");
        fs::write(&path, "left over from last run\n").unwrap();

        let sink = FileSink::create(&path).unwrap();
        sink.write("000000042").unwrap();
        sink.close().unwrap();

        assert_eq!(read(&path), "000000042\n");
    }

    #[test]
    fn file_sink_reports_unopenable_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("numbers.log");

        match FileSink::create(&path) {
            Err(Error::Sink { path: failed, .. }) => assert_eq!(failed, path),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("created a sink in a missing directory"),
        }
    }

    #[test]
    fn memory_sink_keeps_write_order() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.write("000000002").unwrap();
        sink.write("000000001").unwrap();
        assert_eq!(sink.lines(), vec!["000000002", "000000001"]);
        assert_eq!(sink.len(), 2);
    }
}
