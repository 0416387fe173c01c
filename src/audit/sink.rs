//! Audit record persistence.

use super::AuditRecord;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Destination for rendered audit records.
pub trait AuditSink: Send + Sync {
    /// Persist one rendered record.
    fn write(&self, record: &AuditRecord, rendered: &str) -> io::Result<()>;
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// One shared append-only file. Writers serialize on a mutex so records
/// never interleave.
pub struct SerialSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl SerialSink {
    /// Sink appending to `path`. The file is opened on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    /// Log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for SerialSink {
    fn write(&self, _record: &AuditRecord, rendered: &str) -> io::Result<()> {
        let mut guard = self.file.lock();
        if guard.is_none() {
            *guard = Some(open_append(&self.path)?);
        }
        let Some(file) = guard.as_mut() else {
            return Ok(());
        };

        let mut buf = Vec::with_capacity(rendered.len() + 1);
        buf.extend_from_slice(rendered.as_bytes());
        if !rendered.ends_with('\n') {
            buf.push(b'\n');
        }
        if let Err(e) = file.write_all(&buf).and_then(|()| file.flush()) {
            // Reopen on the next write.
            *guard = None;
            return Err(e);
        }
        Ok(())
    }
}

impl std::fmt::Debug for SerialSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialSink").field("path", &self.path).finish()
    }
}

/// One file per transaction under a storage directory. Each write touches
/// only its own file; the optional index is appended with a single write.
#[derive(Debug)]
pub struct ConcurrentSink {
    dir: PathBuf,
    index: Option<PathBuf>,
}

impl ConcurrentSink {
    /// Sink writing under `dir`, indexing into `index` when given.
    pub fn new(dir: impl Into<PathBuf>, index: Option<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            index,
        }
    }

    /// Relative path of a record: `%Y%m%d/%Y%m%d-%H%M/%Y%m%d-%H%M%S-<id>`.
    pub fn relative_path(record: &AuditRecord) -> PathBuf {
        let ts = record.transaction.timestamp;
        PathBuf::from(ts.format("%Y%m%d").to_string())
            .join(ts.format("%Y%m%d-%H%M").to_string())
            .join(format!(
                "{}-{}",
                ts.format("%Y%m%d-%H%M%S"),
                record.transaction.unique_id
            ))
    }
}

impl AuditSink for ConcurrentSink {
    fn write(&self, record: &AuditRecord, rendered: &str) -> io::Result<()> {
        let relative = Self::relative_path(record);
        let path = self.dir.join(&relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        file.write_all(rendered.as_bytes())?;

        if let Some(index) = &self.index {
            let line = format!(
                "{} {} {} {}\n",
                record.transaction.unique_id,
                record.transaction.client_ip,
                relative.display(),
                rendered.len()
            );
            open_append(index)?.write_all(line.as_bytes())?;
        }
        Ok(())
    }
}
