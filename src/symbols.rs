//! Address-to-symbol resolution against a disassembly listing
//!
//! A `.lst` map file line for a symbol looks like:
//!
//! ```text
//! 00025a00 g     F .text  00000034 _GNUC_init_helper_MHD_init
//! ```
//!
//! The address is left-padded with zeros, the section marker `text` follows,
//! then a hex size field, then the symbol name. Resolution scans the listing
//! for the first such line matching the queried address and memoizes the
//! result, so each distinct address incurs at most one full scan.

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

/// Memoizing address-token → display-name resolver.
///
/// Owns the symbol listing handle and its read cursor; every cache miss
/// rewinds to the start and scans forward. The cache grows for the life of
/// the run and is never evicted, which is acceptable for the number of
/// distinct functions a trace can mention.
pub struct SymbolResolver<R> {
    table: BufReader<R>,
    cache: HashMap<String, String>,
    scans: u64,
}

impl<R: Read + Seek> SymbolResolver<R> {
    pub fn new(table: R) -> Self {
        Self {
            table: BufReader::new(table),
            cache: HashMap::new(),
            scans: 0,
        }
    }

    /// Resolve a hex address token (lowercase digits, no `0x` prefix) to a
    /// symbol name.
    ///
    /// Returns the raw token unchanged when the listing has no match. A
    /// failed lookup is not cached: the listing scan is best-effort and the
    /// common case is that every address resolves eventually.
    pub fn resolve(&mut self, addr: &str) -> Result<String> {
        if let Some(name) = self.cache.get(addr) {
            return Ok(name.clone());
        }

        self.scans += 1;
        self.table
            .seek(SeekFrom::Start(0))
            .context("Failed to rewind symbols file")?;

        let pattern = Regex::new(&format!(
            "^0+{}.*text.*0[0-9a-f]+ +(.*)",
            regex::escape(addr)
        ))
        .context("Failed to build symbol lookup pattern")?;

        let mut line = String::new();
        loop {
            line.clear();
            let n = self
                .table
                .read_line(&mut line)
                .context("Failed to read symbols file")?;
            if n == 0 {
                break;
            }
            if let Some(caps) = pattern.captures(&line) {
                let name = caps[1].trim().to_string();
                tracing::debug!(addr, name = %name, "resolved symbol");
                self.cache.insert(addr.to_string(), name.clone());
                return Ok(name);
            }
        }

        tracing::debug!(addr, "no symbol found, passing address through");
        Ok(addr.to_string())
    }

    /// Number of full listing scans performed so far. Cache hits do not scan.
    pub fn scan_count(&self) -> u64 {
        self.scans
    }
}
