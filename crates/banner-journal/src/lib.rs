//! Active-Message Journal (spec 4.G): a per-device line-delimited JSON
//! file, the authoritative view of "what is showing now" for late-joining
//! readers such as the CGI query endpoint.
//!
//! Concurrency is advisory, not OS-enforced: a writer or reader marks its
//! intent with a sibling "busy" marker file for the duration of its
//! operation (removed on drop), and the rewrite path used by
//! `remove_by_recno` waits up to a grace period for the other side to
//! clear before giving up, per spec 4.G.

use serde_json::{Map, Value};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

const GRACE_PERIOD: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("journal line is malformed JSON: {0}")]
    MalformedLine(#[from] serde_json::Error),
    #[error("journal-busy")]
    Busy,
}

#[derive(Clone, Copy)]
enum BusyKind {
    Read,
    Write,
}

impl BusyKind {
    fn suffix(self) -> &'static str {
        match self {
            BusyKind::Read => ".readbusy",
            BusyKind::Write => ".writebusy",
        }
    }
}

/// RAII guard for a busy marker: removes the marker file on drop, the
/// moment this process's read or write handle on the journal "closes".
struct BusyGuard {
    path: PathBuf,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

pub struct Journal {
    path: PathBuf,
}

impl Journal {
    /// `path` is the journal file for one device, e.g.
    /// `<state-dir>/evolutionActiveMsgs.<device-recno>.json`.
    pub fn new(path: PathBuf) -> Self {
        Journal { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flag_path(&self, kind: BusyKind) -> PathBuf {
        let mut s = self.path.clone().into_os_string();
        s.push(kind.suffix());
        PathBuf::from(s)
    }

    /// Wait up to the grace period for `kind`'s busy marker to clear.
    /// Returns `Err(JournalError::Busy)` if it never clears.
    fn wait_clear(&self, kind: BusyKind) -> Result<(), JournalError> {
        let flag = self.flag_path(kind);
        let deadline = Instant::now() + GRACE_PERIOD;
        while flag.exists() {
            if Instant::now() >= deadline {
                return Err(JournalError::Busy);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }

    /// Mark this operation's busy flag, failing if it is somehow already
    /// held by this same process (it should not be, since operations are
    /// not nested).
    fn acquire(&self, kind: BusyKind) -> Result<BusyGuard, JournalError> {
        let path = self.flag_path(kind);
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Ok(BusyGuard { path })
    }

    /// Append `msg` unless a structurally-equal line (ignoring
    /// `signseqnum` and `dbb_rec_dtsec`) already exists. Returns whether a
    /// line was appended.
    pub fn append(&self, msg: &Value) -> Result<bool, JournalError> {
        if self.wait_clear(BusyKind::Write).is_err() {
            tracing::warn!(path = %self.path.display(), "journal append skipped: busy past grace period");
            return Ok(false);
        }
        let _guard = self.acquire(BusyKind::Write)?;

        let key = equality_key(msg);
        for line in self.read_raw_lines()? {
            let existing: Value = serde_json::from_str(&line)?;
            if equality_key(&existing) == key {
                return Ok(false);
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(msg)?)?;
        Ok(true)
    }

    /// Rewrite the file omitting every line whose `recno_zx` equals
    /// `recno`, via a sibling temp file and atomic rename.
    pub fn remove_by_recno(&self, recno: &str) -> Result<(), JournalError> {
        let _write_guard = self.acquire(BusyKind::Write)?;

        let mut kept = Vec::new();
        for line in self.read_raw_lines()? {
            let value: Value = serde_json::from_str(&line)?;
            let matches = value
                .get("recno_zx")
                .and_then(Value::as_str)
                .is_some_and(|r| r == recno);
            if !matches {
                kept.push(line);
            }
        }

        let tmp_path = self.flag_path(BusyKind::Write).with_extension("rewrite.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            for line in &kept {
                writeln!(tmp, "{line}")?;
            }
            tmp.flush()?;
        }

        if self.wait_clear(BusyKind::Read).is_err() {
            let _ = fs::remove_file(&tmp_path);
            tracing::warn!(path = %self.path.display(), "journal rewrite abandoned: reader busy past grace period");
            return Err(JournalError::Busy);
        }

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Unlink the journal file. Idempotent: a missing file is not an
    /// error.
    pub fn delete(&self) -> Result<(), JournalError> {
        let _guard = self.acquire(BusyKind::Write)?;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Stream every line as a parsed JSON value, in file order. A missing
    /// file reads as empty.
    pub fn read_all(&self) -> Result<Vec<Value>, JournalError> {
        let _guard = self.acquire(BusyKind::Read)?;
        self.read_raw_lines()?
            .into_iter()
            .map(|line| serde_json::from_str(&line).map_err(JournalError::from))
            .collect()
    }

    fn read_raw_lines(&self) -> Result<Vec<String>, JournalError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let reader = BufReader::new(file);
        let mut lines = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
        Ok(lines)
    }
}

/// The journal's notion of identity: all JSON fields except `signseqnum`
/// and `dbb_rec_dtsec`, per the design note in spec 9.
fn equality_key(value: &Value) -> Map<String, Value> {
    let mut map = value.as_object().cloned().unwrap_or_default();
    map.remove("signseqnum");
    map.remove("dbb_rec_dtsec");
    map
}
