use crate::record;
use crate::record_store::RecordStore;
use crate::NumlogError;
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Counters captured by one status report
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Status {
    /// Unique numbers received since the previous report
    pub unique: u64,
    /// Duplicates received since the previous report
    pub duplicates: u64,
    /// Unique numbers received since startup
    pub unique_total: u64,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Received {} unique numbers, {} duplicates. Unique total: {}",
            self.unique, self.duplicates, self.unique_total
        )
    }
}

/// What `add_number` did with a record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Addition {
    Unique,
    Duplicate,
}

struct NumbersInner {
    store: RecordStore,
    duplicates_seen: FxHashSet<u32>,
    unique_since_report: u64,
    duplicates_since_report: u64,
    unique_total: u64,
}

/// Deduplicates incoming records against the record store and keeps the
/// rolling counters for status reports.
///
/// Everything sits behind one mutex, so every `add_number` and `status`
/// call across all connections has a single order.
pub struct NumbersTracker {
    inner: Mutex<NumbersInner>,
}

impl NumbersTracker {
    pub fn new(store: RecordStore) -> Self {
        Self {
            inner: Mutex::new(NumbersInner {
                store,
                duplicates_seen: FxHashSet::default(),
                unique_since_report: 0,
                duplicates_since_report: 0,
                unique_total: 0,
            }),
        }
    }

    /// Reset the store at `path` and track numbers against it
    pub fn create(path: impl AsRef<Path>) -> Result<Self, NumlogError> {
        Ok(Self::new(RecordStore::create(path)?))
    }

    fn lock(&self) -> MutexGuard<'_, NumbersInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_number(&self, text: &str) -> Result<Addition, NumlogError> {
        let mut inner = self.lock();
        let index = record::normalize(text)?;

        if inner.duplicates_seen.contains(&index) {
            inner.duplicates_since_report += 1;
            return Ok(Addition::Duplicate);
        }

        if inner.store.read_slot(index)?.as_deref() == Some(text) {
            inner.duplicates_seen.insert(index);
            inner.duplicates_since_report += 1;
            return Ok(Addition::Duplicate);
        }

        inner.store.write_slot(index, text)?;
        inner.unique_total += 1;
        inner.unique_since_report += 1;

        Ok(Addition::Unique)
    }

    /// Snapshot the counters and reset the two "since last report" values
    pub fn status(&self) -> Status {
        let mut inner = self.lock();
        let status = Status {
            unique: inner.unique_since_report,
            duplicates: inner.duplicates_since_report,
            unique_total: inner.unique_total,
        };
        inner.unique_since_report = 0;
        inner.duplicates_since_report = 0;
        status
    }

    pub fn unique_total(&self) -> u64 {
        self.lock().unique_total
    }

    /// Read back the stored text for an index, if any
    #[cfg(test)]
    fn stored(&self, index: u32) -> Result<Option<String>, NumlogError> {
        self.lock().store.read_slot(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn status(unique: u64, duplicates: u64, unique_total: u64) -> Status {
        Status { unique, duplicates, unique_total }
    }

    fn tracker(temp_dir: &tempfile::TempDir) -> NumbersTracker {
        NumbersTracker::create(temp_dir.path().join("numbers.log")).unwrap()
    }

    #[test]
    fn test_happy_path_functionality() {
        let temp_dir = tempfile::tempdir().unwrap();
        let numbers = tracker(&temp_dir);

        assert_eq!(numbers.status(), status(0, 0, 0));

        numbers.add_number("000000000").unwrap();
        assert_eq!(numbers.status(), status(1, 0, 1));

        numbers.add_number("123456789").unwrap();
        assert_eq!(numbers.status(), status(1, 0, 2));

        assert_eq!(numbers.status(), status(0, 0, 2));

        numbers.add_number("123456789").unwrap();
        assert_eq!(numbers.status(), status(0, 1, 2));
    }

    #[test]
    fn test_status_line_format() {
        assert_eq!(
            status(3, 2, 10).to_string(),
            "Received 3 unique numbers, 2 duplicates. Unique total: 10"
        );
    }

    #[test]
    fn test_status_serializes_to_json() {
        let json = serde_json::to_string(&status(1, 2, 3)).unwrap();
        assert_eq!(json, r#"{"unique":1,"duplicates":2,"unique_total":3}"#);
    }

    #[test]
    fn test_number_log_updated() {
        let temp_dir = tempfile::tempdir().unwrap();
        let numbers = tracker(&temp_dir);

        numbers.add_number("000000005").unwrap();
        numbers.add_number("000000006").unwrap();

        assert_eq!(numbers.stored(5).unwrap().as_deref(), Some("000000005"));
        assert_eq!(numbers.stored(6).unwrap().as_deref(), Some("000000006"));
        assert_eq!(numbers.stored(7).unwrap(), None);
    }

    #[test]
    fn test_repeat_duplicates_are_counted_every_time() {
        let temp_dir = tempfile::tempdir().unwrap();
        let numbers = tracker(&temp_dir);

        assert_eq!(numbers.add_number("000000042").unwrap(), Addition::Unique);
        assert_eq!(numbers.add_number("000000042").unwrap(), Addition::Duplicate);
        assert_eq!(numbers.add_number("000000042").unwrap(), Addition::Duplicate);
        assert_eq!(numbers.add_number("000000042").unwrap(), Addition::Duplicate);

        assert_eq!(numbers.status(), status(1, 3, 1));
        assert_eq!(numbers.stored(42).unwrap().as_deref(), Some("000000042"));
    }

    #[test]
    fn test_invalid_record_leaves_counters_alone() {
        let temp_dir = tempfile::tempdir().unwrap();
        let numbers = tracker(&temp_dir);
        numbers.add_number("000000001").unwrap();

        let err = numbers.add_number("abc").unwrap_err();
        assert!(matches!(err, NumlogError::InvalidRecord(_)));
        assert!(numbers.add_number("00000001").is_err());
        assert!(numbers.add_number("terminate").is_err());

        assert_eq!(numbers.status(), status(1, 0, 1));
    }

    #[test]
    fn test_store_fault_leaves_counters_alone() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("numbers.log");
        std::fs::write(&path, b"").unwrap();
        let read_only = std::fs::File::open(&path).unwrap();
        let numbers = NumbersTracker::new(RecordStore::from_file(read_only, path));

        let err = numbers.add_number("000000001").unwrap_err();
        assert!(err.is_store_fault());
        assert_eq!(numbers.status(), status(0, 0, 0));
    }

    #[test]
    fn test_unique_total_is_not_consuming() {
        let temp_dir = tempfile::tempdir().unwrap();
        let numbers = tracker(&temp_dir);
        numbers.add_number("000000001").unwrap();
        numbers.add_number("000000002").unwrap();

        assert_eq!(numbers.unique_total(), 2);
        assert_eq!(numbers.status(), status(2, 0, 2));
        assert_eq!(numbers.unique_total(), 2);
    }

    #[test]
    fn test_concurrent_disjoint_records() {
        let temp_dir = tempfile::tempdir().unwrap();
        let numbers = Arc::new(tracker(&temp_dir));
        let threads = 8;
        let per_thread = 250;

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let numbers = Arc::clone(&numbers);
                thread::spawn(move || {
                    for i in 0..per_thread {
                        let value = (t * per_thread + i) as u32;
                        numbers.add_number(&record::format_record(value)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let total = (threads * per_thread) as u64;
        assert_eq!(numbers.status(), status(total, 0, total));
    }

    #[test]
    fn test_concurrent_overlapping_records() {
        let temp_dir = tempfile::tempdir().unwrap();
        let numbers = Arc::new(tracker(&temp_dir));

        // Every thread submits the same 100 records
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let numbers = Arc::clone(&numbers);
                thread::spawn(move || {
                    for value in 0..100u32 {
                        numbers.add_number(&record::format_record(value)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(numbers.status(), status(100, 300, 100));
    }
}
