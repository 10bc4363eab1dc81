use super::{IoManager, DATA_FILE_PERM};
use crate::error::Result;
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::Arc;

/// Standard file I/O: the file is opened for create + append + read, and
/// every operation takes the file's own lock so a single `FileIo` can be
/// shared across threads.
pub struct FileIo {
    file: Arc<RwLock<File>>,
}

impl FileIo {
    pub fn new(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .mode(DATA_FILE_PERM)
            .open(path)?;
        Ok(Self {
            file: Arc::new(RwLock::new(file)),
        })
    }
}

impl IoManager for FileIo {
    fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        let mut read = 0;
        while read < buf.len() {
            match file.read(&mut buf[read..])? {
                0 => break,
                n => read += n,
            }
        }
        Ok(read)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut file = self.file.write();
        Ok(file.write(buf)?)
    }

    fn sync(&self) -> Result<()> {
        let file = self.file.read();
        file.sync_all()?;
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        let file = self.file.read();
        Ok(file.metadata()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("000000000.data");
        let io = FileIo::new(&path).unwrap();

        assert_eq!(io.write(b"hello").unwrap(), 5);
        assert_eq!(io.write(b" world").unwrap(), 6);
        assert_eq!(io.size().unwrap(), 11);

        let mut buf = [0u8; 5];
        assert_eq!(io.read(&mut buf, 0).unwrap(), 5);
        assert_eq!(&buf, b"hello");

        let mut buf = [0u8; 6];
        assert_eq!(io.read(&mut buf, 5).unwrap(), 6);
        assert_eq!(&buf, b" world");
    }

    #[test]
    fn reopening_an_existing_file_preserves_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("000000000.data");
        FileIo::new(&path).unwrap().write(b"persisted").unwrap();

        let io = FileIo::new(&path).unwrap();
        assert_eq!(io.size().unwrap(), 9);
    }
}
