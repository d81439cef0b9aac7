//! Append-only write-ahead journal of runtime mutations.
//!
//! File format, one frame per mutation:
//!
//! ```text
//! [len:4][bincode JournalEntry:len]
//! ```
//!
//! `len` is big-endian.  Every entry carries a sequence number, assigned in
//! append order and never reused, so recovery can skip entries a checkpoint
//! already covers.
//!
//! A crash can leave a partial final frame.  [`Journal::replay`] drops such a
//! torn tail with a warning and cuts it off the file; an undecodable frame
//! anywhere else is reported as corruption.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use configx_core::{Branch, KeyPath, MergePolicy, Value};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::snapshot::SnapshotHandle;

const FRAME_HEADER: usize = 4;

/// Errors raised by journal operations.
#[derive(Debug, Error)]
pub enum JournalError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing journal at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A record could not be serialized.
    #[error("failed to encode journal record: {0}")]
    Encode(#[from] bincode::Error),

    /// A complete frame in the middle of the log could not be decoded.
    #[error("corrupt journal frame at byte {offset}: {source}")]
    Corrupt {
        offset: u64,
        #[source]
        source: bincode::Error,
    },

    /// A record is larger than a frame can describe.
    #[error("journal record of {0} bytes exceeds the frame limit")]
    FrameTooLarge(usize),
}

/// One logged mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalRecord {
    Register {
        tree: String,
        root: Branch,
        revision: u64,
        strict: bool,
    },
    Set {
        tree: String,
        path: KeyPath,
        value: Value,
    },
    Delete {
        tree: String,
        path: KeyPath,
    },
    /// `source` is the incoming tree's content at the time of the merge.
    Merge {
        tree: String,
        source: Branch,
        policy: MergePolicy,
    },
    Remove {
        tree: String,
    },
    Restore {
        tree: String,
        snapshot: SnapshotHandle,
    },
}

impl JournalRecord {
    /// The tree the record applies to.
    pub fn tree(&self) -> &str {
        match self {
            JournalRecord::Register { tree, .. }
            | JournalRecord::Set { tree, .. }
            | JournalRecord::Delete { tree, .. }
            | JournalRecord::Merge { tree, .. }
            | JournalRecord::Remove { tree }
            | JournalRecord::Restore { tree, .. } => tree,
        }
    }
}

/// A record with its sequence number, as stored in a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub seq: u64,
    pub record: JournalRecord,
}

/// Handle to the journal file.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: Mutex<File>,
    fsync: bool,
    /// Sequence number of the last appended (or replayed) entry.
    last_seq: AtomicU64,
}

impl Journal {
    /// Opens the journal at `path`, creating an empty one if needed.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Io`] if the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>, fsync: bool) -> Result<Self, JournalError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|source| JournalError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            file: Mutex::new(file),
            fsync,
            last_seq: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sequence number of the newest entry this journal has seen.
    pub fn last_seq(&self) -> u64 {
        self.last_seq.load(Ordering::SeqCst)
    }

    /// Ensures future appends are numbered after `seq`.
    pub fn advance_seq(&self, seq: u64) {
        self.last_seq.fetch_max(seq, Ordering::SeqCst);
    }

    /// Appends `record` and makes it durable per the `fsync` setting.
    /// Returns the sequence number assigned to it.
    ///
    /// # Errors
    ///
    /// [`JournalError::Io`] if the write fails; nothing is counted as
    /// appended in that case.
    pub fn append(&self, record: &JournalRecord) -> Result<u64, JournalError> {
        let mut file = self.file.lock();
        let seq = self.last_seq() + 1;

        let payload = bincode::serialize(&JournalEntry {
            seq,
            record: record.clone(),
        })?;
        let len = u32::try_from(payload.len()).map_err(|_| JournalError::FrameTooLarge(payload.len()))?;
        let mut frame = Vec::with_capacity(FRAME_HEADER + payload.len());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(&payload);

        file.write_all(&frame).map_err(|e| self.io_err(e))?;
        file.flush().map_err(|e| self.io_err(e))?;
        if self.fsync {
            file.sync_data().map_err(|e| self.io_err(e))?;
        }

        self.last_seq.store(seq, Ordering::SeqCst);
        Ok(seq)
    }

    /// Reads every complete entry from the start of the file.
    ///
    /// A torn final frame is dropped and truncated away so later appends
    /// start on a frame boundary.  The journal's sequence counter is advanced
    /// past the last entry read.
    ///
    /// # Errors
    ///
    /// [`JournalError::Corrupt`] for an undecodable complete frame,
    /// [`JournalError::Io`] for read failures.
    pub fn replay(&self) -> Result<Vec<JournalEntry>, JournalError> {
        let file = self.file.lock();
        let mut bytes = Vec::new();
        // Appends leave the cursor at the end; reads start from the top.
        (&*file)
            .seek(SeekFrom::Start(0))
            .and_then(|_| (&*file).read_to_end(&mut bytes))
            .map_err(|e| self.io_err(e))?;
        drop(file);

        let mut entries = Vec::new();
        let mut offset = 0usize;
        while offset < bytes.len() {
            let rest = &bytes[offset..];
            if rest.len() < FRAME_HEADER {
                break;
            }
            let len = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
            if rest.len() - FRAME_HEADER < len {
                break;
            }
            let payload = &rest[FRAME_HEADER..FRAME_HEADER + len];
            let entry: JournalEntry =
                bincode::deserialize(payload).map_err(|source| JournalError::Corrupt {
                    offset: offset as u64,
                    source,
                })?;
            entries.push(entry);
            offset += FRAME_HEADER + len;
        }

        if offset < bytes.len() {
            warn!(
                journal = %self.path.display(),
                valid_bytes = offset,
                torn_bytes = bytes.len() - offset,
                "ignoring torn final journal frame"
            );
            self.file
                .lock()
                .set_len(offset as u64)
                .map_err(|e| self.io_err(e))?;
        }

        if let Some(last) = entries.last() {
            self.advance_seq(last.seq);
        }
        debug!(journal = %self.path.display(), entries = entries.len(), "read journal");
        Ok(entries)
    }

    /// Empties the journal.  Sequence numbers keep counting up.
    ///
    /// # Errors
    ///
    /// [`JournalError::Io`] if the file cannot be truncated or synced.
    pub fn truncate(&self) -> Result<(), JournalError> {
        let file = self.file.lock();
        file.set_len(0).map_err(|e| self.io_err(e))?;
        file.sync_all().map_err(|e| self.io_err(e))?;
        debug!(journal = %self.path.display(), last_seq = self.last_seq(), "truncated journal");
        Ok(())
    }

    fn io_err(&self, source: io::Error) -> JournalError {
        JournalError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
