// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;

use anyhow::Context;

/// `readline()`-style reads over a handle that keeps growing.
///
/// Each call returns the bytes up to and including the next `\n`, or
/// whatever is available if no newline has been written yet. An empty
/// chunk means nothing new is readable right now; it is not sticky, so a
/// later call picks up bytes appended in the meantime.
pub struct LineReader<R = File> {
    inner: BufReader<R>,
    consumed: u64,
}

impl LineReader<File> {
    /// Open `path` read-only, positioned at the start.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("opening target file {}", path.display()))?;
        Ok(Self::new(file))
    }
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner: BufReader::new(inner), consumed: 0 }
    }

    /// Read the next chunk. Empty at end of stream.
    ///
    /// `WouldBlock` from a non-blocking source counts as "no bytes yet".
    pub fn read_chunk(&mut self) -> std::io::Result<Vec<u8>> {
        let mut chunk = Vec::new();
        loop {
            match self.inner.read_until(b'\n', &mut chunk) {
                Ok(_) => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        self.consumed += chunk.len() as u64;
        Ok(chunk)
    }

    /// Total bytes returned so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }
}
