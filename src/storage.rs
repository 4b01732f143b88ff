//! Recording files and the space they are carved out of.
//!
//! The storage directory is treated as a ring: each recording gets a fixed
//! byte budget, and before a new one is created the oldest recordings are
//! deleted until a full budget (plus a safety margin) fits on the volume.
//! File names embed a sortable timestamp, so lexicographic order is
//! chronological order.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

pub const DEFAULT_STORAGE_DIR: &str = "./data";
pub const DEFAULT_MAX_FILE_SIZE: u64 = 512 * 1024 * 1024;
pub const DEFAULT_SAFETY_MARGIN: u64 = 512 * 1024 * 1024;
pub const DEFAULT_EXTENSION: &str = "h264";

const FILE_NAME_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";

static NEXT_DESTINATION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(
        "no recordings left to remove in {dir}: free space {available} bytes, need {required}"
    )]
    Exhausted {
        dir: PathBuf,
        available: u64,
        required: u64,
    },
    #[error("failed to remove recording {path}: {source}")]
    Remove { path: PathBuf, source: io::Error },
    #[error("failed to create recording {path}: {source}")]
    Create { path: PathBuf, source: io::Error },
    #[error("failed to query storage at {dir}: {source}")]
    Io { dir: PathBuf, source: io::Error },
}

/// An open recording file and what is left of its byte budget.
///
/// `remaining` only ever decreases, by exactly the number of bytes written.
#[derive(Debug)]
pub struct Destination {
    id: u64,
    path: PathBuf,
    file: File,
    budget: u64,
    remaining: u64,
}

impl Destination {
    pub fn new(path: PathBuf, file: File, budget: u64) -> Self {
        Self {
            id: NEXT_DESTINATION_ID.fetch_add(1, Ordering::Relaxed),
            path,
            file,
            budget,
            remaining: budget,
        }
    }

    /// Process-unique identity of the underlying file handle.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn fits(&self, size: usize) -> bool {
        size as u64 <= self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Appends `data` in full. Refuses, without writing anything, when `data`
    /// is larger than the remaining budget.
    pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if !self.fits(data.len()) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "{} bytes do not fit in the {} bytes left in {}",
                    data.len(),
                    self.remaining,
                    self.path.display()
                ),
            ));
        }
        self.file.write_all(data)?;
        self.remaining -= data.len() as u64;
        Ok(())
    }

    /// Closes a destination that will not be used. The file is deleted when
    /// nothing was written to it.
    pub fn discard(self) {
        let Self {
            path,
            file,
            budget,
            remaining,
            ..
        } = self;
        drop(file);
        if remaining < budget {
            return;
        }
        match fs::remove_file(&path) {
            Ok(()) => log::debug!("removed unused recording {}", path.display()),
            Err(e) => log::warn!("failed to remove unused recording {}: {}", path.display(), e),
        }
    }
}

/// Free space on the volume backing a directory.
pub trait SpaceProbe: Send + Sync {
    fn available(&self, dir: &Path) -> io::Result<u64>;
}

/// Queries the filesystem with `statvfs(3)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Statvfs;

impl SpaceProbe for Statvfs {
    fn available(&self, dir: &Path) -> io::Result<u64> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let path = CString::new(dir.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut stat = std::mem::MaybeUninit::<libc::statvfs>::uninit();
        let ret = unsafe { libc::statvfs(path.as_ptr(), stat.as_mut_ptr()) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        let stat = unsafe { stat.assume_init() };
        Ok((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
    }
}

pub struct Storage {
    dir: PathBuf,
    max_file_size: u64,
    safety_margin: u64,
    extension: String,
    probe: Box<dyn SpaceProbe>,
}

impl Storage {
    /// Opens the storage directory, creating it if it does not exist yet.
    pub fn new(
        dir: impl Into<PathBuf>,
        max_file_size: u64,
        safety_margin: u64,
        extension: &str,
    ) -> io::Result<Self> {
        Self::with_probe(dir, max_file_size, safety_margin, extension, Box::new(Statvfs))
    }

    pub fn with_probe(
        dir: impl Into<PathBuf>,
        max_file_size: u64,
        safety_margin: u64,
        extension: &str,
        probe: Box<dyn SpaceProbe>,
    ) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            max_file_size,
            safety_margin,
            extension: extension.trim_start_matches('.').to_string(),
            probe,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Frees room for one full recording and opens a new one named after the
    /// current local time.
    pub fn acquire(&self) -> Result<Destination, StorageError> {
        let mut available = self.usable_space()?;
        while available < self.max_file_size {
            let Some(oldest) = self.oldest_recording()? else {
                return Err(StorageError::Exhausted {
                    dir: self.dir.clone(),
                    available,
                    required: self.max_file_size,
                });
            };
            log::info!(
                "removing {} to free space ({} of {} bytes available)",
                oldest.display(),
                available,
                self.max_file_size
            );
            fs::remove_file(&oldest).map_err(|source| StorageError::Remove {
                path: oldest.clone(),
                source,
            })?;
            available = self.usable_space()?;
        }

        let (path, file) = self.create_recording()?;
        log::info!(
            "created new file: {}, max size of {} bytes",
            path.display(),
            self.max_file_size
        );
        Ok(Destination::new(path, file, self.max_file_size))
    }

    /// The file that sorts first by name, which is the oldest recording.
    pub fn oldest_recording(&self) -> Result<Option<PathBuf>, StorageError> {
        Ok(self.recordings()?.into_iter().next())
    }

    /// All regular files in the storage directory, oldest first.
    pub fn recordings(&self) -> Result<Vec<PathBuf>, StorageError> {
        let io_err = |source| StorageError::Io {
            dir: self.dir.clone(),
            source,
        };
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            if entry.file_type().map_err(io_err)?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    fn usable_space(&self) -> Result<u64, StorageError> {
        let available = self
            .probe
            .available(&self.dir)
            .map_err(|source| StorageError::Io {
                dir: self.dir.clone(),
                source,
            })?;
        Ok(available.saturating_sub(self.safety_margin))
    }

    fn create_recording(&self) -> Result<(PathBuf, File), StorageError> {
        let stem = chrono::Local::now().format(FILE_NAME_FORMAT).to_string();
        let mut suffix = 0u32;
        loop {
            let name = if suffix == 0 {
                format!("{}.{}", stem, self.extension)
            } else {
                format!("{}_{}.{}", stem, suffix, self.extension)
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                // Two rotations within the same second.
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
                Err(source) => return Err(StorageError::Create { path, source }),
            }
        }
    }
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod storage_test;
