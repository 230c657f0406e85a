//! Durable staging areas for buffered frame data.
//!
//! During the scan pass every session-tagged data line is appended, verbatim
//! and uninterpreted, to an on-disk staging file owned by its session. The
//! assembly pass later replays that file sequentially. Staging keeps memory
//! flat no matter how large the source log is: the in-memory write buffer is
//! forced out every [`FLUSH_EVERY`] appended lines.
//!
//! Ownership is split in two so cleanup is guaranteed on every exit path:
//!
//! - [`StagingWriter`] owns the open file handle during the scan pass.
//!   Dropping it without a proper [`StagingWriter::close`] removes the file.
//! - [`StagingFile`] is the closed, fully-flushed result handed to the
//!   assembly pass. It removes the file on drop unless
//!   [`StagingFile::discard`] already did.
//!
//! Consuming `self` in `close` makes double-close unrepresentable.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{ReportError, Result};

/// Force the write buffer to disk every this many appended lines.
pub const FLUSH_EVERY: usize = 10_000;

/// File name extension for staging files.
const STAGING_EXTENSION: &str = "staging";

/// Open, append-only staging area for one session's raw data lines.
#[derive(Debug)]
pub struct StagingWriter {
    session_id: String,
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    lines: usize,
}

impl StagingWriter {
    /// Create the staging file for a session.
    ///
    /// The file name is derived deterministically from the session
    /// identifier, so re-running a conversion overwrites stale leftovers
    /// instead of accumulating them.
    pub fn create(dir: &Path, session_id: &str) -> Result<Self> {
        let path = dir.join(format!("{session_id}.{STAGING_EXTENSION}"));
        let file =
            File::create(&path).map_err(|e| ReportError::buffer_failure(session_id, e))?;
        debug!("opened staging area {}", path.display());

        Ok(Self {
            session_id: session_id.to_string(),
            path,
            writer: Some(BufWriter::new(file)),
            lines: 0,
        })
    }

    /// Append one raw line.
    pub fn append_line(&mut self, line: &str) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(ReportError::buffer_failure(
                &self.session_id,
                std::io::Error::other("staging area already closed"),
            ));
        };

        writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .map_err(|e| ReportError::buffer_failure(&self.session_id, e))?;

        self.lines += 1;
        if self.lines % FLUSH_EVERY == 0 {
            writer.flush().map_err(|e| ReportError::buffer_failure(&self.session_id, e))?;
        }
        Ok(())
    }

    /// Lines appended so far.
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Flush everything and convert into a read-side [`StagingFile`].
    ///
    /// After a successful close all buffered bytes are visible to the
    /// assembly pass. On flush failure the staging file is removed before
    /// the error is returned.
    pub fn close(mut self) -> Result<StagingFile> {
        let flushed = match self.writer.take() {
            Some(mut writer) => writer.flush(),
            None => Ok(()),
        };

        if let Err(e) = flushed {
            remove_staging(&self.path);
            return Err(ReportError::buffer_failure(&self.session_id, e));
        }

        debug!("closed staging area {} ({} lines)", self.path.display(), self.lines);
        Ok(StagingFile {
            session_id: std::mem::take(&mut self.session_id),
            path: std::mem::take(&mut self.path),
            lines: self.lines,
        })
    }
}

impl Drop for StagingWriter {
    fn drop(&mut self) {
        // Still holding the handle here means close() never ran: the scan
        // was cancelled or the session failed. The file must not outlive it.
        if self.writer.take().is_some() {
            remove_staging(&self.path);
        }
    }
}

/// Closed staging file, ready for the sequential assembly read pass.
///
/// Removed from disk on drop; [`StagingFile::discard`] makes the removal
/// explicit after a successful assembly.
#[derive(Debug)]
pub struct StagingFile {
    session_id: String,
    path: PathBuf,
    lines: usize,
}

impl StagingFile {
    /// Identifier of the owning session.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Location of the staging file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of buffered lines, usable as a capacity hint.
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Open the staging file for the sequential read pass.
    pub fn open_reader(&self) -> Result<BufReader<File>> {
        let file = File::open(&self.path)
            .map_err(|e| ReportError::buffer_failure(&self.session_id, e))?;
        Ok(BufReader::new(file))
    }

    /// Remove the staging file. Irreversible.
    pub fn discard(self) {
        // Removal happens in Drop.
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        remove_staging(&self.path);
    }
}

fn remove_staging(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("failed to remove staging file {}: {}", path.display(), e);
        }
    }
}
