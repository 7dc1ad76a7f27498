use crate::record::{self, LINE_ENDING, RECORD_DIGITS, SLOT_WIDTH};
use crate::NumlogError;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// A file of fixed-width slots where a record's index is its own address.
///
/// Slot `i` starts at byte `i * SLOT_WIDTH` and is either never written
/// (reads back as zero bytes or past end-of-file) or holds the 9-digit text
/// of `i` plus a line terminator. The file is sparse, so only written slots
/// take up disk space.
pub struct RecordStore {
    file: File,
    path: PathBuf,
}

impl RecordStore {
    /// Delete any existing file at `path` and start a fresh, empty store
    pub fn create(path: impl AsRef<Path>) -> Result<Self, NumlogError> {
        let path = path.as_ref().to_path_buf();

        if path.exists() {
            fs::remove_file(&path).map_err(NumlogError::Store)?;
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(NumlogError::Store)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(NumlogError::Store)?;

        let shown = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        info!("Numbers log file path: {}", shown.display());

        Ok(Self { file, path })
    }

    /// Wrap an already opened file; a read-only handle makes every write fail
    #[cfg(test)]
    pub(crate) fn from_file(file: File, path: PathBuf) -> Self {
        Self { file, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the slot for `index`, trimmed of the terminator and any zero fill.
    ///
    /// Returns `None` when the slot was never written.
    pub fn read_slot(&mut self, index: u32) -> Result<Option<String>, NumlogError> {
        self.file
            .seek(SeekFrom::Start(record::slot_offset(index)))
            .map_err(NumlogError::Store)?;

        let mut buffer = [0u8; SLOT_WIDTH];
        let mut filled = 0;
        while filled < SLOT_WIDTH {
            match self.file.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(NumlogError::Store(e)),
            }
        }

        let text = String::from_utf8_lossy(&buffer[..filled]);
        let trimmed = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
        if trimmed.is_empty() {
            Ok(None)
        } else {
            Ok(Some(trimmed.to_string()))
        }
    }

    /// Write `text` and a line terminator into the slot for `index`
    pub fn write_slot(&mut self, index: u32, text: &str) -> Result<(), NumlogError> {
        debug_assert_eq!(text.len(), RECORD_DIGITS);

        let mut line = Vec::with_capacity(SLOT_WIDTH);
        line.extend_from_slice(text.as_bytes());
        line.extend_from_slice(LINE_ENDING.as_bytes());

        self.file
            .seek(SeekFrom::Start(record::slot_offset(index)))
            .map_err(NumlogError::Store)?;
        self.file.write_all(&line).map_err(NumlogError::Store)?;
        self.file.flush().map_err(NumlogError::Store)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_resets_existing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("numbers.log");
        fs::write(&path, "123456789\nleftover").unwrap();

        let store = RecordStore::create(&path).unwrap();

        assert_eq!(fs::metadata(store.path()).unwrap().len(), 0);
    }

    #[test]
    fn test_create_makes_parent_directories() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("state").join("numbers.log");

        RecordStore::create(&path).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_write_then_read_slot() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = RecordStore::create(temp_dir.path().join("numbers.log")).unwrap();

        store.write_slot(5, "000000005").unwrap();
        store.write_slot(6, "000000006").unwrap();

        assert_eq!(store.read_slot(5).unwrap().as_deref(), Some("000000005"));
        assert_eq!(store.read_slot(6).unwrap().as_deref(), Some("000000006"));
    }

    #[test]
    fn test_unwritten_slots_are_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = RecordStore::create(temp_dir.path().join("numbers.log")).unwrap();

        // Past end of file
        assert_eq!(store.read_slot(0).unwrap(), None);
        assert_eq!(store.read_slot(42).unwrap(), None);

        // Zero-filled hole below a written slot
        store.write_slot(10, "000000010").unwrap();
        assert_eq!(store.read_slot(3).unwrap(), None);
        assert_eq!(store.read_slot(9).unwrap(), None);
        assert_eq!(store.read_slot(11).unwrap(), None);
    }

    #[test]
    fn test_slots_are_written_at_value_offset() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("numbers.log");
        let mut store = RecordStore::create(&path).unwrap();

        store.write_slot(2, "000000002").unwrap();
        store.write_slot(0, "000000000").unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 3 * SLOT_WIDTH);
        assert_eq!(&bytes[..RECORD_DIGITS], b"000000000");
        assert!(bytes[SLOT_WIDTH..2 * SLOT_WIDTH].iter().all(|b| *b == 0));
        assert_eq!(&bytes[2 * SLOT_WIDTH..2 * SLOT_WIDTH + RECORD_DIGITS], b"000000002");
    }

    #[test]
    fn test_rewrite_leaves_neighbours_untouched() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = RecordStore::create(temp_dir.path().join("numbers.log")).unwrap();

        store.write_slot(7, "000000007").unwrap();
        store.write_slot(8, "000000008").unwrap();
        store.write_slot(7, "000000007").unwrap();

        assert_eq!(store.read_slot(7).unwrap().as_deref(), Some("000000007"));
        assert_eq!(store.read_slot(8).unwrap().as_deref(), Some("000000008"));
    }

    #[test]
    fn test_large_index_uses_sparse_offset() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("numbers.log");
        let mut store = RecordStore::create(&path).unwrap();

        store.write_slot(123_456_789, "123456789").unwrap();

        assert_eq!(store.read_slot(123_456_789).unwrap().as_deref(), Some("123456789"));
        assert_eq!(
            fs::metadata(&path).unwrap().len(),
            record::slot_offset(123_456_789) + SLOT_WIDTH as u64
        );
    }
}
