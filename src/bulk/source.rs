//! Re-openable upload inputs

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

const READ_BUFFER: usize = 128 * 1024;

/// Delimited text that can be read from the start any number of times
///
/// The bulk loader reads a source once for the copy and, if the copy fails,
/// once more for the row-level fallback.
pub trait UploadSource: Sync {
    fn open(&self) -> io::Result<Box<dyn BufRead + '_>>;

    /// Short label for log lines
    fn describe(&self) -> String {
        "<memory>".to_string()
    }
}

impl UploadSource for [u8] {
    fn open(&self) -> io::Result<Box<dyn BufRead + '_>> {
        Ok(Box::new(self))
    }
}

impl UploadSource for Vec<u8> {
    fn open(&self) -> io::Result<Box<dyn BufRead + '_>> {
        Ok(Box::new(self.as_slice()))
    }
}

impl UploadSource for str {
    fn open(&self) -> io::Result<Box<dyn BufRead + '_>> {
        Ok(Box::new(self.as_bytes()))
    }
}

impl UploadSource for String {
    fn open(&self) -> io::Result<Box<dyn BufRead + '_>> {
        Ok(Box::new(self.as_bytes()))
    }
}

impl UploadSource for Path {
    fn open(&self) -> io::Result<Box<dyn BufRead + '_>> {
        let file = File::open(self)?;
        Ok(Box::new(BufReader::with_capacity(READ_BUFFER, file)))
    }

    fn describe(&self) -> String {
        self.display().to_string()
    }
}

impl UploadSource for PathBuf {
    fn open(&self) -> io::Result<Box<dyn BufRead + '_>> {
        self.as_path().open()
    }

    fn describe(&self) -> String {
        self.as_path().describe()
    }
}
