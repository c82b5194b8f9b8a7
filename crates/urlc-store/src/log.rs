use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use urlc_types::UrlRecord;

use crate::error::{StoreError, StoreResult};

/// Flush/sync strategy for the record log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every append. An acknowledged insert survives power loss.
    #[default]
    EveryWrite,
    /// Flush to the OS page cache only.
    OsDefault,
}

/// Result of replaying a log from the beginning.
#[derive(Debug, Default)]
pub struct Replay {
    /// Every decoded record in file order, tombstone lines included.
    pub records: Vec<UrlRecord>,
    /// Bytes of an unterminated trailing line that were cut off.
    pub torn_bytes: u64,
}

/// Append-only JSON-lines log of [`UrlRecord`]s.
///
/// On-disk format: one serialized record per line, each terminated by `\n`.
/// Tombstones are appended as a full copy of the record with
/// `"is_deleted": true`. The file is never rewritten in place; the only
/// truncation is cutting an unterminated tail left behind by a crash.
pub struct RecordLog {
    path: PathBuf,
    /// Appends are pre-buffered per call, so the handle is written directly.
    file: File,
    /// Current end of the file.
    offset: u64,
    sync_mode: SyncMode,
    /// Set when a failed append could not be cut back; the file may end in
    /// a partial line and must not be appended to.
    unusable: bool,
}

impl RecordLog {
    /// Open (or create) the log at `path` and replay it.
    ///
    /// A complete line that fails to decode aborts the open with
    /// [`StoreError::CorruptLog`]. An unterminated last line is treated as the
    /// end of the stream and truncated away so later appends start on a line
    /// boundary.
    pub fn open(path: &Path, sync_mode: SyncMode) -> StoreResult<(Self, Replay)> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let (replay, valid_len) = Self::read_records(path)?;
        if replay.torn_bytes > 0 {
            warn!(
                path = %path.display(),
                torn_bytes = replay.torn_bytes,
                "unterminated tail in record log; truncating"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        debug!(path = %path.display(), records = replay.records.len(), "record log replayed");
        Ok((
            Self {
                path: path.to_path_buf(),
                file,
                offset: valid_len,
                sync_mode,
                unusable: false,
            },
            replay,
        ))
    }

    /// Read every complete line. Returns the records and the byte length of
    /// the well-formed prefix.
    fn read_records(path: &Path) -> StoreResult<(Replay, u64)> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut replay = Replay::default();
        let mut valid_len: u64 = 0;
        let mut line_no = 0usize;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let read = reader.read_until(b'\n', &mut buf)?;
            if read == 0 {
                break;
            }
            if buf.last() != Some(&b'\n') {
                replay.torn_bytes = read as u64;
                break;
            }
            line_no += 1;
            valid_len += read as u64;

            let line = &buf[..buf.len() - 1];
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let record: UrlRecord =
                serde_json::from_slice(line).map_err(|e| StoreError::CorruptLog {
                    line: line_no,
                    reason: e.to_string(),
                })?;
            replay.records.push(record);
        }

        Ok((replay, valid_len))
    }

    /// Append `records` as one write, then `fsync` under
    /// [`SyncMode::EveryWrite`]. Returns the byte offset of the first line.
    ///
    /// On failure the file is cut back to its previous length so a partial
    /// write never leaves a broken line in front of later appends. If that
    /// cut fails too, every later append fails with
    /// [`StoreError::LogUnusable`].
    pub fn append(&mut self, records: &[UrlRecord]) -> StoreResult<u64> {
        if self.unusable {
            return Err(StoreError::LogUnusable(self.path.clone()));
        }
        let mut payload = Vec::new();
        for record in records {
            serde_json::to_writer(&mut payload, record)?;
            payload.push(b'\n');
        }

        let start = self.offset;
        if let Err(e) = self.write_durably(&payload) {
            self.rollback_to(start);
            return Err(e.into());
        }
        self.offset += payload.len() as u64;

        debug!(offset = start, lines = records.len(), len = payload.len(), "log append");
        Ok(start)
    }

    fn write_durably(&mut self, payload: &[u8]) -> std::io::Result<()> {
        self.file.write_all(payload)?;
        if self.sync_mode == SyncMode::EveryWrite {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn rollback_to(&mut self, len: u64) {
        let file = &mut self.file;
        let restored = file.set_len(len).and_then(|_| file.seek(SeekFrom::End(0)));
        if let Err(e) = restored {
            self.unusable = true;
            error!(
                path = %self.path.display(),
                error = %e,
                "could not roll back failed log append; log closed to writes"
            );
        }
    }

    /// `fsync` the file.
    pub fn sync(&mut self) -> StoreResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Current end of the log in bytes.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use urlc_types::ShortId;

    fn rec(id: &str, payload: &str) -> UrlRecord {
        UrlRecord::new(ShortId::new_unchecked(id), payload, "owner")
    }

    #[test]
    fn append_and_replay_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.log");
        let (mut log, replay) = RecordLog::open(&path, SyncMode::EveryWrite).unwrap();
        assert!(replay.records.is_empty());

        let a = rec("a", "https://a");
        let b = rec("b", "https://b");
        log.append(&[a.clone()]).unwrap();
        log.append(&[b.clone(), b.tombstoned()]).unwrap();
        drop(log);

        let (_, replay) = RecordLog::open(&path, SyncMode::EveryWrite).unwrap();
        assert_eq!(replay.records, vec![a, b.clone(), b.tombstoned()]);
        assert_eq!(replay.torn_bytes, 0);
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/urls.log");
        let (log, _) = RecordLog::open(&path, SyncMode::OsDefault).unwrap();
        assert_eq!(log.offset(), 0);
        assert!(path.exists());
    }

    #[test]
    fn append_returns_increasing_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offsets.log");
        let (mut log, _) = RecordLog::open(&path, SyncMode::OsDefault).unwrap();

        let off1 = log.append(&[rec("a", "https://a")]).unwrap();
        let off2 = log.append(&[rec("b", "https://b")]).unwrap();
        assert_eq!(off1, 0);
        assert!(off2 > off1);
        assert_eq!(log.offset(), fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn torn_tail_is_ignored_and_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tail.log");
        let (mut log, _) = RecordLog::open(&path, SyncMode::EveryWrite).unwrap();
        log.append(&[rec("a", "https://a")]).unwrap();
        let good_len = log.offset();
        drop(log);

        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(br#"{"user_id":"owner","uuid":"#).unwrap();
        }

        let (mut log, replay) = RecordLog::open(&path, SyncMode::EveryWrite).unwrap();
        assert_eq!(replay.records.len(), 1);
        assert!(replay.torn_bytes > 0);
        assert_eq!(fs::metadata(&path).unwrap().len(), good_len);

        log.append(&[rec("b", "https://b")]).unwrap();
        drop(log);
        let (_, replay) = RecordLog::open(&path, SyncMode::EveryWrite).unwrap();
        assert_eq!(replay.records.len(), 2);
    }

    #[test]
    fn corrupt_complete_line_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.log");
        let (mut log, _) = RecordLog::open(&path, SyncMode::EveryWrite).unwrap();
        log.append(&[rec("a", "https://a")]).unwrap();
        drop(log);

        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"not json at all\n").unwrap();
        }

        let err = RecordLog::open(&path, SyncMode::EveryWrite).err().unwrap();
        assert!(matches!(err, StoreError::CorruptLog { line: 2, .. }));
    }

    #[test]
    fn blank_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.log");
        let line = serde_json::to_string(&rec("a", "https://a")).unwrap();
        fs::write(&path, format!("\n{line}\n\n")).unwrap();

        let (_, replay) = RecordLog::open(&path, SyncMode::EveryWrite).unwrap();
        assert_eq!(replay.records.len(), 1);
    }

    #[test]
    fn failed_rollback_refuses_later_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.log");
        let (mut log, _) = RecordLog::open(&path, SyncMode::EveryWrite).unwrap();
        log.append(&[rec("a", "https://a")]).unwrap();
        let len = std::fs::metadata(&path).unwrap().len();

        // A read-only handle fails both the write and the truncation.
        log.file = File::open(&path).unwrap();
        assert!(matches!(
            log.append(&[rec("b", "https://b")]),
            Err(StoreError::Io(_))
        ));

        log.file = OpenOptions::new().append(true).open(&path).unwrap();
        assert!(matches!(
            log.append(&[rec("c", "https://c")]),
            Err(StoreError::LogUnusable(_))
        ));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), len);
    }
}
