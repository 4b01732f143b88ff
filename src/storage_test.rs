use std::fs;
use std::io;
use std::path::Path;

use super::*;

/// A volume of fixed size whose only contents are the files in the directory.
struct FakeVolume {
    capacity: u64,
}

impl SpaceProbe for FakeVolume {
    fn available(&self, dir: &Path) -> io::Result<u64> {
        let mut used = 0;
        for entry in fs::read_dir(dir)? {
            used += entry?.metadata()?.len();
        }
        Ok(self.capacity.saturating_sub(used))
    }
}

fn storage(dir: &Path, capacity: u64, max_file_size: u64, margin: u64) -> Storage {
    Storage::with_probe(
        dir,
        max_file_size,
        margin,
        "h264",
        Box::new(FakeVolume { capacity }),
    )
    .unwrap()
}

fn write_file(dir: &Path, name: &str, len: usize) {
    fs::write(dir.join(name), vec![0u8; len]).unwrap();
}

fn names(storage: &Storage) -> Vec<String> {
    storage
        .recordings()
        .unwrap()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

// ------------------------------------------------------------------------
// Destination
// ------------------------------------------------------------------------

#[test]
fn test_destination_budget() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.h264");
    let file = fs::File::create(&path).unwrap();
    let mut dest = Destination::new(path.clone(), file, 100);

    dest.write(&[1u8; 40]).unwrap();
    assert_eq!(dest.remaining(), 60);

    assert!(!dest.fits(70));
    assert!(dest.write(&[2u8; 70]).is_err());
    assert_eq!(dest.remaining(), 60);
    assert_eq!(fs::metadata(&path).unwrap().len(), 40);

    dest.write(&[3u8; 60]).unwrap();
    assert!(dest.is_exhausted());
    assert!(dest.write(&[4u8; 1]).is_err());
    assert!(dest.write(&[]).is_ok());
}

#[test]
fn test_destination_ids_are_unique() {
    let dir = tempfile::tempdir().unwrap();
    let a = Destination::new(
        dir.path().join("a"),
        fs::File::create(dir.path().join("a")).unwrap(),
        1,
    );
    let b = Destination::new(
        dir.path().join("b"),
        fs::File::create(dir.path().join("b")).unwrap(),
        1,
    );
    assert_ne!(a.id(), b.id());
}

#[test]
fn test_discard_removes_only_unused_files() {
    let dir = tempfile::tempdir().unwrap();
    let unused = dir.path().join("unused.h264");
    let used = dir.path().join("used.h264");
    Destination::new(unused.clone(), fs::File::create(&unused).unwrap(), 10).discard();
    let mut dest = Destination::new(used.clone(), fs::File::create(&used).unwrap(), 10);
    dest.write(&[1u8; 3]).unwrap();
    dest.discard();

    assert!(!unused.exists());
    assert_eq!(fs::metadata(&used).unwrap().len(), 3);
}

// ------------------------------------------------------------------------
// Acquisition
// ------------------------------------------------------------------------

#[test]
fn test_acquire_creates_dir_and_file() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("data");
    let storage = storage(&dir, 10_000, 1_000, 0);
    assert!(dir.is_dir());

    let dest = storage.acquire().unwrap();
    assert_eq!(dest.remaining(), 1_000);
    assert!(dest.path().starts_with(&dir));
    assert_eq!(dest.path().extension().unwrap(), "h264");
    assert!(dest.path().exists());
}

#[test]
fn test_acquire_evicts_only_oldest_when_enough() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "2024-01-01_00:00:00.h264", 600);
    write_file(dir.path(), "2024-01-02_00:00:00.h264", 300);
    // 1000 capacity, 900 used: 100 free, 700 needed. Dropping the oldest
    // leaves 700 free.
    let storage = storage(dir.path(), 1_000, 700, 0);

    let dest = storage.acquire().unwrap();
    let left = names(&storage);
    assert!(!left.contains(&"2024-01-01_00:00:00.h264".to_string()));
    assert!(left.contains(&"2024-01-02_00:00:00.h264".to_string()));
    assert_eq!(left.len(), 2);
    let created = dest.path().file_name().unwrap().to_string_lossy().into_owned();
    assert!(left.contains(&created));
}

#[test]
fn test_acquire_evicts_oldest_first_until_space() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "2024-01-03_00:00:00.h264", 200);
    write_file(dir.path(), "2024-01-01_00:00:00.h264", 200);
    write_file(dir.path(), "2024-01-04_00:00:00.h264", 200);
    write_file(dir.path(), "2024-01-02_00:00:00.h264", 200);
    // 1000 capacity, 800 used, margin 100: 100 usable, need 500.
    let storage = storage(dir.path(), 1_000, 500, 100);

    storage.acquire().unwrap();
    let left = names(&storage);
    assert!(!left.contains(&"2024-01-01_00:00:00.h264".to_string()));
    assert!(!left.contains(&"2024-01-02_00:00:00.h264".to_string()));
    assert!(left.contains(&"2024-01-03_00:00:00.h264".to_string()));
    assert!(left.contains(&"2024-01-04_00:00:00.h264".to_string()));
}

#[test]
fn test_acquire_no_eviction_when_space() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "2024-01-01_00:00:00.h264", 100);
    let storage = storage(dir.path(), 10_000, 1_000, 1_000);

    storage.acquire().unwrap();
    assert!(dir.path().join("2024-01-01_00:00:00.h264").exists());
}

#[test]
fn test_acquire_exhausted() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "2024-01-01_00:00:00.h264", 100);
    let storage = storage(dir.path(), 1_000, 2_000, 0);

    match storage.acquire() {
        Err(StorageError::Exhausted { required, .. }) => assert_eq!(required, 2_000),
        other => panic!("expected exhausted, got {:?}", other.map(|d| d.id())),
    }
    assert!(storage.recordings().unwrap().is_empty());
}

#[test]
fn test_acquire_twice_in_same_second() {
    let dir = tempfile::tempdir().unwrap();
    let storage = storage(dir.path(), 100_000, 100, 0);

    let first = storage.acquire().unwrap();
    let second = storage.acquire().unwrap();
    assert_ne!(first.path(), second.path());
    assert_ne!(first.id(), second.id());
}

#[test]
fn test_recordings_sorted_and_skip_dirs() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "b.h264", 1);
    write_file(dir.path(), "a.h264", 1);
    fs::create_dir(dir.path().join("0-subdir")).unwrap();
    let storage = storage(dir.path(), 1_000, 10, 0);

    assert_eq!(names(&storage), vec!["a.h264", "b.h264"]);
    assert_eq!(
        storage.oldest_recording().unwrap().unwrap(),
        dir.path().join("a.h264")
    );
}

#[test]
fn test_statvfs_reports_space() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Statvfs.available(dir.path()).is_ok());
}
