//! Bounded in-process byte pipe between the producer thread and the copy

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, TableError};

/// How often a blocked reader re-checks the cancellation flag
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Cooperative cancellation shared by the loader, its producer and the pipe
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder of this flag to stop
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Create a pipe holding at most `capacity` chunks in flight
pub fn pipe(capacity: usize, cancel: CancelFlag) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    let finished = Arc::new(AtomicBool::new(false));
    (
        PipeWriter {
            tx,
            bytes: 0,
            finished: Arc::clone(&finished),
            cancel: cancel.clone(),
        },
        PipeReader {
            rx,
            chunk: Vec::new(),
            offset: 0,
            bytes: 0,
            finished,
            cancel,
        },
    )
}

/// Producer end; sends whole chunks and blocks while the pipe is full
pub struct PipeWriter {
    tx: SyncSender<Vec<u8>>,
    bytes: u64,
    finished: Arc<AtomicBool>,
    cancel: CancelFlag,
}

impl PipeWriter {
    /// Send one chunk; fails once the reader is gone or the load is cancelled
    pub fn send(&mut self, chunk: Vec<u8>) -> Result<()> {
        self.check_cancelled()?;
        if chunk.is_empty() {
            return Ok(());
        }
        let len = chunk.len() as u64;
        self.tx.send(chunk).map_err(|_| {
            TableError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "bulk copy stopped reading",
            ))
        })?;
        self.bytes += len;
        Ok(())
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(TableError::Interrupted);
        }
        Ok(())
    }

    /// Mark end of input and close the pipe; returns the bytes written
    ///
    /// A writer dropped without `finish` makes the reader fail instead of
    /// reporting end of input, so a copy never commits a truncated stream.
    pub fn finish(self) -> u64 {
        self.finished.store(true, Ordering::SeqCst);
        self.bytes
    }
}

/// Consumer end; a `Read` over the chunks in FIFO order
pub struct PipeReader {
    rx: Receiver<Vec<u8>>,
    chunk: Vec<u8>,
    offset: usize,
    bytes: u64,
    finished: Arc<AtomicBool>,
    cancel: CancelFlag,
}

impl PipeReader {
    /// Bytes delivered to the consumer so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            // not ErrorKind::Interrupted: io::copy would retry it
            if self.cancel.is_cancelled() {
                return Err(io::Error::other("bulk load cancelled"));
            }
            if self.offset < self.chunk.len() {
                let n = buf.len().min(self.chunk.len() - self.offset);
                buf[..n].copy_from_slice(&self.chunk[self.offset..self.offset + n]);
                self.offset += n;
                self.bytes += n as u64;
                return Ok(n);
            }
            match self.rx.recv_timeout(CANCEL_POLL) {
                Ok(chunk) => {
                    self.chunk = chunk;
                    self.offset = 0;
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    if self.finished.load(Ordering::SeqCst) {
                        return Ok(0);
                    }
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "producer stopped before end of input",
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_chunks_arrive_in_order() {
        let (mut writer, mut reader) = pipe(2, CancelFlag::new());
        let handle = thread::spawn(move || {
            for i in 0..100u8 {
                writer.send(vec![i; 3]).unwrap();
            }
            writer.finish()
        });

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        let written = handle.join().unwrap();

        assert_eq!(written, 300);
        assert_eq!(reader.bytes_read(), 300);
        assert!(out.chunks(3).enumerate().all(|(i, c)| c == [i as u8; 3]));
    }

    #[test]
    fn test_unfinished_writer_is_an_error() {
        let (mut writer, mut reader) = pipe(4, CancelFlag::new());
        writer.send(b"partial".to_vec()).unwrap();
        drop(writer);

        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(out, b"partial");
    }

    #[test]
    fn test_dropped_reader_breaks_the_pipe() {
        let (mut writer, reader) = pipe(1, CancelFlag::new());
        drop(reader);
        assert!(matches!(writer.send(b"x".to_vec()), Err(TableError::Io(_))));
    }

    #[test]
    fn test_cancel_stops_both_ends() {
        let cancel = CancelFlag::new();
        let (mut writer, mut reader) = pipe(1, cancel.clone());
        cancel.cancel();

        assert!(matches!(writer.send(b"x".to_vec()), Err(TableError::Interrupted)));
        let mut buf = [0u8; 8];
        assert!(reader.read(&mut buf).is_err());
    }
}
