use super::IoManager;
use crate::error::{Error, Result};
use memmap2::Mmap;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

/// Read-only memory-mapped I/O, used only to accelerate the sequential
/// scan that startup replay performs. Disallowing writes and syncs at the
/// type level isn't possible in a trait-object world, so they fail
/// fatally at the call site instead, matching the source's panic-on-misuse
/// contract without actually panicking.
pub struct MmapIo {
    // `None` for a zero-length file: `Mmap::map` refuses to map an empty
    // file, and a freshly rotated active file has nothing to replay yet.
    map: Option<Arc<Mmap>>,
}

impl MmapIo {
    pub fn new(path: &Path) -> Result<Self> {
        // Mmap::map requires the backing file to exist, unlike FileIo's
        // create+append open mode, so ensure it first.
        let file = OpenOptions::new().create(true).read(true).open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(Self { map: None });
        }
        // SAFETY: the mapped file is owned by this engine for the
        // lifetime of the mapping and is never truncated while mapped;
        // only the engine's own append path (standard I/O) extends it,
        // and that only happens after this read-only mapping has been
        // dropped during the mmap→standard swap at the end of startup.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self {
            map: Some(Arc::new(map)),
        })
    }
}

impl IoManager for MmapIo {
    fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let Some(map) = &self.map else {
            return Ok(0);
        };
        let offset = offset as usize;
        if offset >= map.len() {
            return Ok(0);
        }
        let end = (offset + buf.len()).min(map.len());
        let n = end - offset;
        buf[..n].copy_from_slice(&map[offset..end]);
        Ok(n)
    }

    fn write(&self, _buf: &[u8]) -> Result<usize> {
        Err(Error::Io(std::io::Error::other(
            "memory-mapped I/O manager is read-only; writes must go through standard file I/O",
        )))
    }

    fn sync(&self) -> Result<()> {
        Err(Error::Io(std::io::Error::other(
            "memory-mapped I/O manager is read-only and has nothing to sync",
        )))
    }

    fn size(&self) -> Result<u64> {
        Ok(self.map.as_ref().map_or(0, |m| m.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fio::FileIo;
    use tempfile::tempdir;

    #[test]
    fn reads_bytes_written_before_mapping() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("000000000.data");
        FileIo::new(&path).unwrap().write(b"mapped data").unwrap();

        let io = MmapIo::new(&path).unwrap();
        assert_eq!(io.size().unwrap(), 11);
        let mut buf = [0u8; 6];
        assert_eq!(io.read(&mut buf, 0).unwrap(), 6);
        assert_eq!(&buf, b"mapped");
    }

    #[test]
    fn write_and_sync_fail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("000000000.data");
        let io = MmapIo::new(&path).unwrap();
        assert!(io.write(b"x").is_err());
        assert!(io.sync().is_err());
    }
}
