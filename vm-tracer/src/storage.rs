//! File storage used for coverage artifacts

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Writable stream handed out by a [`FileStorage`]
pub type FileStream = Box<dyn Write + Send>;

/// Directory and file operations needed to persist artifacts
pub trait FileStorage: Send + Sync + fmt::Debug {
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Create a file that must not exist yet
    ///
    /// Fails with [`io::ErrorKind::AlreadyExists`] when the path is taken.
    fn create_new(&self, path: &Path) -> io::Result<FileStream>;

    /// Open a file for appending, creating it if needed
    fn open_append(&self, path: &Path) -> io::Result<FileStream>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// [`FileStorage`] backed by the local file system
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileStorage;

impl FileStorage for LocalFileStorage {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn create_new(&self, path: &Path) -> io::Result<FileStream> {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn open_append(&self, path: &Path) -> io::Result<FileStream> {
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}
