//! Body buffering with a hard ceiling and disk spillover.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

enum Storage {
    Memory(Vec<u8>),
    File(NamedTempFile),
}

/// Accumulates body bytes up to `limit`.
///
/// Once more than `in_memory_limit` bytes are held, everything is moved to
/// a uniquely named temp file which is deleted when the buffer is dropped.
/// Bytes past `limit` are counted but not stored.
pub struct BodyBuffer {
    storage: Storage,
    stored: u64,
    received: u64,
    limit: u64,
    in_memory_limit: u64,
    tmp_dir: Option<PathBuf>,
    prefix: String,
    write_failed: bool,
    truncated: bool,
}

impl BodyBuffer {
    /// Create a buffer; `prefix` names spill files (the transaction id).
    pub fn new(limit: u64, in_memory_limit: u64, tmp_dir: Option<&Path>, prefix: &str) -> Self {
        Self {
            storage: Storage::Memory(Vec::new()),
            stored: 0,
            received: 0,
            limit,
            in_memory_limit,
            tmp_dir: tmp_dir.map(Path::to_path_buf),
            prefix: format!("zentinel-{}-", prefix),
            write_failed: false,
            truncated: false,
        }
    }

    /// Append a chunk; never fails.
    ///
    /// If the spill file cannot be created or written, the body is kept in
    /// memory from then on. Only when a spilled body cannot be read back is
    /// data lost, which [`truncated`](Self::truncated) reports.
    pub fn append(&mut self, data: &[u8]) {
        self.received = self.received.saturating_add(data.len() as u64);

        let room = self.limit.saturating_sub(self.stored);
        let take = usize::try_from(room).map_or(data.len(), |r| r.min(data.len()));
        if take == 0 {
            return;
        }
        let chunk = &data[..take];

        if let Storage::Memory(buf) = &mut self.storage {
            buf.extend_from_slice(chunk);
            self.stored += take as u64;
            if self.stored > self.in_memory_limit && !self.write_failed {
                self.spill();
            }
            return;
        }

        if let Storage::File(file) = &mut self.storage {
            match file.write_all(chunk) {
                Ok(()) => self.stored += take as u64,
                Err(e) => self.fall_back_to_memory(chunk, &e),
            }
        }
    }

    /// Move a spilled body back to memory after a failed write. The
    /// failed chunk may be partly on disk, so the read-back is cut at
    /// `stored` before `chunk` is added again.
    fn fall_back_to_memory(&mut self, chunk: &[u8], err: &io::Error) {
        tracing::error!(error = %err, "failed to append to body spill file, moving body back to memory");
        self.write_failed = true;
        match self.read_all() {
            Ok(mut buf) => {
                buf.truncate(usize::try_from(self.stored).unwrap_or(buf.len()));
                buf.extend_from_slice(chunk);
                self.stored += chunk.len() as u64;
                self.storage = Storage::Memory(buf);
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot read back body spill file, body is truncated");
                self.truncated = true;
            }
        }
    }

    fn spill(&mut self) {
        let mut builder = tempfile::Builder::new();
        builder.prefix(&self.prefix);
        let created = match &self.tmp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };

        let mut file = match created {
            Ok(f) => f,
            Err(e) => {
                tracing::error!(error = %e, "cannot create body spill file, keeping body in memory");
                self.write_failed = true;
                return;
            }
        };

        if let Storage::Memory(buf) = &self.storage {
            if let Err(e) = file.write_all(buf) {
                tracing::error!(error = %e, "cannot write body spill file, keeping body in memory");
                self.write_failed = true;
                return;
            }
        }
        tracing::debug!(path = %file.path().display(), bytes = self.stored, "body spilled to disk");
        self.storage = Storage::File(file);
    }

    /// Bytes stored.
    pub fn len(&self) -> u64 {
        self.stored
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.stored == 0
    }

    /// Bytes offered, including those past the limit.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Whether more than `limit` bytes were offered.
    pub fn exceeded(&self) -> bool {
        self.received > self.limit
    }

    /// Whether stored bytes were lost to an I/O error.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Whether the body lives in a temp file.
    pub fn is_spilled(&self) -> bool {
        matches!(self.storage, Storage::File(_))
    }

    /// Path of the spill file.
    pub fn spill_path(&self) -> Option<&Path> {
        match &self.storage {
            Storage::File(f) => Some(f.path()),
            Storage::Memory(_) => None,
        }
    }

    /// Read back the stored bytes.
    pub fn read_all(&mut self) -> io::Result<Vec<u8>> {
        match &mut self.storage {
            Storage::Memory(buf) => Ok(buf.clone()),
            Storage::File(file) => {
                let handle = file.as_file_mut();
                handle.flush()?;
                handle.seek(SeekFrom::Start(0))?;
                let mut out = Vec::with_capacity(usize::try_from(self.stored).unwrap_or(0));
                handle.read_to_end(&mut out)?;
                handle.seek(SeekFrom::End(0))?;
                Ok(out)
            }
        }
    }

    /// Delete any spill file now, reporting I/O errors.
    pub fn discard(self) -> io::Result<()> {
        match self.storage {
            Storage::File(file) => file.close(),
            Storage::Memory(_) => Ok(()),
        }
    }
}

impl std::fmt::Debug for BodyBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyBuffer")
            .field("stored", &self.stored)
            .field("received", &self.received)
            .field("limit", &self.limit)
            .field("spill_path", &self.spill_path())
            .finish()
    }
}
