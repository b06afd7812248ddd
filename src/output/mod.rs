//! Swappable output destinations.
//!
//! Everything that echoes subprocess output writes through an [`OutputHandle`]
//! obtained from the shared [`OutputSwitch`], never to the process streams
//! directly. A full-screen consumer calls [`OutputSwitch::suspend`] to route all
//! of it into a discard sink while it owns the terminal; dropping the returned
//! [`Suspension`] puts the previous destinations back.
//!
//! The lock only guards the target pointers. A write clones the current target
//! under a read lock and then writes to it, so a concurrent swap never tears a
//! write in half.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// A shared writer. Writes are serialized per target.
pub type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

fn sink<W: Write + Send + 'static>(writer: W) -> Sink {
    Arc::new(Mutex::new(Box::new(writer)))
}

fn lock_sink(sink: &Sink) -> MutexGuard<'_, Box<dyn Write + Send>> {
    sink.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Targets {
    stdout: RwLock<Sink>,
    stderr: RwLock<Sink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

#[derive(Clone)]
pub struct OutputSwitch {
    targets: Arc<Targets>,
}

impl std::fmt::Debug for OutputSwitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSwitch").finish_non_exhaustive()
    }
}

impl OutputSwitch {
    pub fn new<O, E>(stdout: O, stderr: E) -> Self
    where
        O: Write + Send + 'static,
        E: Write + Send + 'static,
    {
        Self::from_sinks(sink(stdout), sink(stderr))
    }

    fn from_sinks(stdout: Sink, stderr: Sink) -> Self {
        Self {
            targets: Arc::new(Targets {
                stdout: RwLock::new(stdout),
                stderr: RwLock::new(stderr),
            }),
        }
    }

    /// Routes to the real process streams
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }

    /// Drops everything
    pub fn discard() -> Self {
        Self::new(io::sink(), io::sink())
    }

    pub fn stdout(&self) -> OutputHandle {
        OutputHandle {
            switch: self.clone(),
            stream: Stream::Stdout,
        }
    }

    pub fn stderr(&self) -> OutputHandle {
        OutputHandle {
            switch: self.clone(),
            stream: Stream::Stderr,
        }
    }

    fn slot(&self, stream: Stream) -> &RwLock<Sink> {
        match stream {
            Stream::Stdout => &self.targets.stdout,
            Stream::Stderr => &self.targets.stderr,
        }
    }

    fn current(&self, stream: Stream) -> Sink {
        Arc::clone(&self.slot(stream).read().unwrap_or_else(PoisonError::into_inner))
    }

    fn replace(&self, stream: Stream, next: Sink) -> Sink {
        let mut slot = self.slot(stream).write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, next)
    }

    /// Install new destinations, returning the previous pair (stdout, stderr)
    pub fn swap<O, E>(&self, stdout: O, stderr: E) -> (Sink, Sink)
    where
        O: Write + Send + 'static,
        E: Write + Send + 'static,
    {
        (
            self.replace(Stream::Stdout, sink(stdout)),
            self.replace(Stream::Stderr, sink(stderr)),
        )
    }

    /// Silence both streams until the returned guard is restored or dropped
    pub fn suspend(&self) -> Suspension {
        let (stdout, stderr) = self.swap(io::sink(), io::sink());
        tracing::trace!("Output suspended");
        Suspension {
            switch: self.clone(),
            previous: Some((stdout, stderr)),
        }
    }
}

impl Default for OutputSwitch {
    fn default() -> Self {
        Self::stdio()
    }
}

/// Restores the destinations captured by [`OutputSwitch::suspend`].
///
/// Nested suspensions must be released in reverse order.
#[must_use = "output is restored as soon as the suspension is dropped"]
pub struct Suspension {
    switch: OutputSwitch,
    previous: Option<(Sink, Sink)>,
}

impl Suspension {
    pub fn restore(mut self) {
        self.put_back();
    }

    fn put_back(&mut self) {
        if let Some((stdout, stderr)) = self.previous.take() {
            self.switch.replace(Stream::Stdout, stdout);
            self.switch.replace(Stream::Stderr, stderr);
            tracing::trace!("Output restored");
        }
    }
}

impl Drop for Suspension {
    fn drop(&mut self) {
        self.put_back();
    }
}

/// Writer bound to one stream of an [`OutputSwitch`]
#[derive(Clone, Debug)]
pub struct OutputHandle {
    switch: OutputSwitch,
    stream: Stream,
}

impl OutputHandle {
    /// Write one line, ignoring failures of the destination
    pub fn line(&self, text: &str) {
        let target = self.switch.current(self.stream);
        let mut writer = lock_sink(&target);
        let _ = writeln!(writer, "{text}");
        let _ = writer.flush();
    }
}

impl Write for OutputHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let target = self.switch.current(self.stream);
        let mut writer = lock_sink(&target);
        writer.write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let target = self.switch.current(self.stream);
        let mut writer = lock_sink(&target);
        writer.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let target = self.switch.current(self.stream);
        let mut writer = lock_sink(&target);
        writer.flush()
    }
}

/// Cloneable in-memory writer, handy for capturing what went through a switch
#[derive(Clone, Default, Debug)]
pub struct CaptureBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
