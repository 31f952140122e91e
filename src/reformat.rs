//! The read/classify/emit loop over the event stream
//!
//! Each line of the traced system's output is either an enter marker
//! (`0x<hex> {`), an exit marker (`0x<hex> }`), or an ordinary log line.
//! Markers are resolved to symbol names and printed with a `"| "` prefix per
//! open nesting level; everything else passes through verbatim, interleaved
//! in the order it was read.

use crate::reader::TimedLineReader;
use crate::symbols::SymbolResolver;
use anyhow::{Context, Result};
use regex::Regex;
use std::io::{Read, Seek, Write};
use std::time::Duration;

/// Reformats a marker stream into an indented call-nesting view.
pub struct TraceReformatter<R> {
    resolver: SymbolResolver<R>,
    /// Count of currently-open function markers. An exit without a matching
    /// enter drives this negative; a malformed trace is shown to the reader
    /// as-is instead of being silently corrected.
    depth: i64,
    enter_marker: Regex,
    exit_marker: Regex,
}

impl<R: Read + Seek> TraceReformatter<R> {
    pub fn new(resolver: SymbolResolver<R>) -> Result<Self> {
        Ok(Self {
            resolver,
            depth: 0,
            enter_marker: Regex::new(r"^0x([0-9a-f]+) \{")
                .context("Failed to build enter marker pattern")?,
            exit_marker: Regex::new(r"^0x([0-9a-f]+) \}")
                .context("Failed to build exit marker pattern")?,
        })
    }

    /// Consume the event stream until the read times out, writing the
    /// reformatted view to `out`.
    ///
    /// The timeout expiring is the normal end of a session, either true
    /// end-of-file or "caught up to a live producer"; it is not an error.
    pub fn run<S: Read, W: Write>(
        &mut self,
        stream: &mut TimedLineReader<S>,
        timeout: Duration,
        out: &mut W,
    ) -> Result<()> {
        while let Some(line) = stream.read_line(timeout)? {
            if line == "\n" {
                continue;
            }
            self.emit_line(&line, out)?;
        }
        tracing::debug!(depth = self.depth, "no more input within timeout, done");
        Ok(())
    }

    fn emit_line<W: Write>(&mut self, line: &str, out: &mut W) -> Result<()> {
        // The two marker checks are deliberately independent rather than an
        // if/else-if chain; their terminal characters differ, so at most one
        // can match any given line.
        let enter = self.enter_marker.captures(line);
        let exit = self.exit_marker.captures(line);

        if enter.is_none() && exit.is_none() {
            out.write_all(line.as_bytes())
                .context("Failed to write output")?;
        } else {
            if let Some(caps) = enter {
                let name = self.resolver.resolve(&caps[1])?;
                writeln!(out, "{}{}() {{", indent(self.depth), name)
                    .context("Failed to write output")?;
                self.depth += 1;
            }
            if let Some(caps) = exit {
                self.depth -= 1;
                let name = self.resolver.resolve(&caps[1])?;
                writeln!(out, "{}{}() }}", indent(self.depth), name)
                    .context("Failed to write output")?;
            }
        }
        // Keep a live session visible line by line.
        out.flush().context("Failed to flush output")?;
        Ok(())
    }

    /// Current nesting depth; negative after an unbalanced exit.
    pub fn depth(&self) -> i64 {
        self.depth
    }
}

/// One `"| "` per open nesting level; empty at depth zero or below.
fn indent(depth: i64) -> String {
    "| ".repeat(depth.max(0) as usize)
}
