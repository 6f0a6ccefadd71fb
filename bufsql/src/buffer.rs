//! Buffer file and history log.
//!
//! The buffer file is shared with an external producer that only appends.
//! Draining (read everything, truncate) and re-appending each run under an
//! exclusive `flock(2)` advisory lock so a cooperating producer never writes
//! between the read and the truncate.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{IngestError, Result};

/// Exclusive advisory lock, released on drop.
struct FileLock<'a> {
    #[cfg_attr(not(unix), allow(dead_code))]
    file: &'a File,
}

impl<'a> FileLock<'a> {
    fn exclusive(file: &'a File) -> io::Result<Self> {
        #[cfg(unix)]
        {
            use std::os::fd::AsRawFd;
            // SAFETY: the descriptor is owned by `file`, which outlives the guard.
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if rc != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(Self { file })
    }
}

impl Drop for FileLock<'_> {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::fd::AsRawFd;
            // SAFETY: see `exclusive`.
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
    }
}

/// Owner of the buffer file.
#[derive(Debug, Clone)]
pub struct BufferStore {
    path: PathBuf,
}

impl BufferStore {
    /// Open an existing buffer file. A missing file is a startup error.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(IngestError::buffer_missing(path));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every buffered line and truncate the file, as one locked step.
    ///
    /// Lines are returned as raw bytes without their `\n` terminator; any
    /// other trailing whitespace (`\r`, spaces) is kept. Nothing is decoded
    /// here, so a line that is not UTF-8 can go back to the file unchanged.
    pub fn drain(&self) -> Result<Vec<Vec<u8>>> {
        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let _lock = FileLock::exclusive(&file)?;

        let mut bytes = Vec::new();
        (&file).read_to_end(&mut bytes)?;
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        file.set_len(0)?;
        file.sync_data()?;

        let mut lines: Vec<Vec<u8>> = bytes.split(|b| *b == b'\n').map(<[u8]>::to_vec).collect();
        // A trailing terminator leaves one empty segment behind.
        if lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        debug!(path = %self.path.display(), lines = lines.len(), "drained buffer");
        Ok(lines)
    }

    /// Append lines back to the buffer, each newline-terminated.
    ///
    /// Opens in append mode so anything the producer wrote since the drain
    /// is preserved.
    pub fn reappend<L: AsRef<[u8]>>(&self, lines: &[L]) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        let file = OpenOptions::new().append(true).create(true).open(&self.path)?;
        let _lock = FileLock::exclusive(&file)?;
        write_lines(&file, lines)?;
        debug!(path = %self.path.display(), lines = lines.len(), "re-appended lines");
        Ok(())
    }
}

/// Append-only log of committed lines.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Like [`HistoryLog::new`], but fails now if the file cannot be opened
    /// for appending.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        OpenOptions::new().append(true).create(true).open(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append<L: AsRef<[u8]>>(&self, lines: &[L]) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        let file = OpenOptions::new().append(true).create(true).open(&self.path)?;
        write_lines(&file, lines)?;
        Ok(())
    }
}

fn write_lines<L: AsRef<[u8]>>(file: &File, lines: &[L]) -> io::Result<()> {
    let mut writer = BufWriter::new(file);
    for line in lines {
        writer.write_all(line.as_ref())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}
