//! Timed line reading over a possibly still-growing log file
//!
//! The traced system may still be running while we process its output, so the
//! log handle is opened with O_NONBLOCK and reads are driven by a sleep-poll
//! loop with a timeout budget instead of blocking on the kernel. Reaching the
//! physical end of the file is not an exhaustion signal (the producer may
//! append more at any moment); only the timeout expiring while we would have
//! to wait ends a session.

use anyhow::{Context, Result};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound on a single poll sleep; bounds the extra latency added on top
/// of a short timeout to at most half a second.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Open a file and set the O_NONBLOCK flag on its descriptor.
///
/// Regular files never block on read, but the log may also be a FIFO fed by a
/// live QEMU session, and those must not park us in the kernel.
pub fn open_nonblocking(path: &Path) -> Result<File> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;

    let flags = fcntl(&file, FcntlArg::F_GETFL)
        .with_context(|| format!("Failed to read fd flags for {}", path.display()))?;
    let flags = OFlag::from_bits_retain(flags) | OFlag::O_NONBLOCK;
    fcntl(&file, FcntlArg::F_SETFL(flags))
        .with_context(|| format!("Failed to set O_NONBLOCK on {}", path.display()))?;

    Ok(file)
}

/// Incremental line reader over a non-blocking handle.
///
/// A non-blocking read may hand back a prefix of a line because the producer
/// has not flushed the rest yet:
///
/// ```text
///  poll 1:   | line part |...
///  poll 2:             | line part |...
///  ..
///  poll k:                            | line+\n |
/// ```
///
/// Partial reads are accumulated until a terminated line is complete; callers
/// never see fragments.
pub struct TimedLineReader<R> {
    source: R,
    pending: Vec<u8>,
}

impl<R: Read> TimedLineReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            pending: Vec::new(),
        }
    }

    /// Read one complete line, waiting up to `timeout` for the producer.
    ///
    /// A zero `timeout` disables the budget entirely and polls forever. The
    /// budget is only consulted when we would have to wait: data already in
    /// the file is always returned no matter how long processing has taken,
    /// so a slow consumer never fails on a log that is fully written. Returns
    /// `None` once the budget runs out while still mid-line; the partial data
    /// collected so far is incomplete by definition and is discarded with the
    /// session.
    pub fn read_line(&mut self, timeout: Duration) -> Result<Option<String>> {
        let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);

        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }

            match self.fill() {
                // New bytes arrived; check again for a terminator.
                Ok(n) if n > 0 => continue,
                // At the current end of the file. It may still grow.
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("Failed to read from log file"),
            }

            let wait = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(None);
                    }
                    // Never sleep past the deadline; a fixed sleep is useless
                    // if we already know it would run us into the timeout.
                    remaining.min(POLL_INTERVAL)
                }
                None => POLL_INTERVAL,
            };
            thread::sleep(wait);
        }
    }

    fn fill(&mut self) -> std::io::Result<usize> {
        let mut buf = [0u8; 4096];
        let n = self.source.read(&mut buf)?;
        self.pending.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    /// Split one terminated line off the front of the pending buffer.
    ///
    /// Line breaks are normalized to a single `\n`: `\r\n` collapses, and a
    /// stray `\r` left over from the `\n\r` break seen in some logs is
    /// dropped rather than carried into the next line.
    fn take_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
        if line.first() == Some(&b'\r') {
            line.remove(0);
        }
        if line.len() >= 2 && line[line.len() - 2] == b'\r' {
            line.remove(line.len() - 2);
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Seek, SeekFrom, Write};
    use tempfile::NamedTempFile;

    #[test]
    fn test_complete_line_returned_immediately() {
        let mut reader = TimedLineReader::new(Cursor::new("hello world\n"));
        let start = Instant::now();
        let line = reader.read_line(Duration::from_secs(30)).unwrap();
        assert_eq!(line.as_deref(), Some("hello world\n"));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_multiple_buffered_lines_come_one_per_call() {
        let mut reader = TimedLineReader::new(Cursor::new("first\nsecond\n"));
        let timeout = Duration::from_millis(100);
        assert_eq!(reader.read_line(timeout).unwrap().as_deref(), Some("first\n"));
        assert_eq!(
            reader.read_line(timeout).unwrap().as_deref(),
            Some("second\n")
        );
        assert_eq!(reader.read_line(timeout).unwrap(), None);
    }

    #[test]
    fn test_partial_line_times_out() {
        let mut reader = TimedLineReader::new(Cursor::new("no terminator"));
        let start = Instant::now();
        let line = reader.read_line(Duration::from_millis(200)).unwrap();
        assert_eq!(line, None);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[test]
    fn test_complete_then_partial() {
        let mut reader = TimedLineReader::new(Cursor::new("done\ninflight"));
        let timeout = Duration::from_millis(100);
        assert_eq!(reader.read_line(timeout).unwrap().as_deref(), Some("done\n"));
        assert_eq!(reader.read_line(timeout).unwrap(), None);
    }

    #[test]
    fn test_crlf_normalized() {
        let mut reader = TimedLineReader::new(Cursor::new("a\r\nb\n"));
        let timeout = Duration::from_millis(100);
        assert_eq!(reader.read_line(timeout).unwrap().as_deref(), Some("a\n"));
        assert_eq!(reader.read_line(timeout).unwrap().as_deref(), Some("b\n"));
    }

    #[test]
    fn test_nl_cr_break_does_not_leak_cr() {
        // Some logs use "\n\r" instead of "\r\n".
        let mut reader = TimedLineReader::new(Cursor::new("a\n\rb\n"));
        let timeout = Duration::from_millis(100);
        assert_eq!(reader.read_line(timeout).unwrap().as_deref(), Some("a\n"));
        assert_eq!(reader.read_line(timeout).unwrap().as_deref(), Some("b\n"));
    }

    #[test]
    fn test_zero_timeout_still_returns_buffered_line() {
        let mut reader = TimedLineReader::new(Cursor::new("ready\n"));
        let line = reader.read_line(Duration::ZERO).unwrap();
        assert_eq!(line.as_deref(), Some("ready\n"));
    }

    #[test]
    fn test_line_completed_by_growing_file() {
        let mut tmp = NamedTempFile::new().unwrap();
        write!(tmp, "hello").unwrap();
        tmp.flush().unwrap();

        let file = open_nonblocking(tmp.path()).unwrap();
        let mut reader = TimedLineReader::new(file);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            let mut f = tmp.reopen().unwrap();
            f.seek(SeekFrom::End(0)).unwrap();
            write!(f, " world\n").unwrap();
            f.flush().unwrap();
            tmp
        });

        let line = reader.read_line(Duration::from_secs(10)).unwrap();
        assert_eq!(line.as_deref(), Some("hello world\n"));
        handle.join().unwrap();
    }

    #[test]
    fn test_open_nonblocking_missing_file_fails() {
        let result = open_nonblocking(Path::new("/nonexistent/trace.log"));
        assert!(result.is_err());
        let msg = format!("{:#}", result.unwrap_err());
        assert!(msg.contains("/nonexistent/trace.log"));
    }
}
