use crate::error::{Error, Result};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// A seekable byte source supplied by the host platform.
pub trait PlatformStream: Read + Seek + Send {}

impl<T: Read + Seek + Send> PlatformStream for T {}

enum Backing {
    Native { file: File, writable: bool },
    Memory { data: Vec<u8>, pos: u64 },
    Platform { stream: Box<dyn PlatformStream>, len: u64 },
}

impl fmt::Debug for Backing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backing::Native { writable, .. } => f
                .debug_struct("Native")
                .field("writable", writable)
                .finish(),
            Backing::Memory { data, pos } => f
                .debug_struct("Memory")
                .field("len", &data.len())
                .field("pos", pos)
                .finish(),
            Backing::Platform { len, .. } => f.debug_struct("Platform").field("len", len).finish(),
        }
    }
}

/// An open file returned by the virtual filesystem.
///
/// The backing resource (OS descriptor, decompressed buffer or platform
/// stream) is released when the handle is dropped. [`FileHandle::close`]
/// does the same but also reports flush failures.
///
/// Reads never go past the end of the file: a read at the end returns zero
/// objects and [`FileHandle::eof`] reports true.
#[derive(Debug)]
pub struct FileHandle {
    name: String,
    backing: Backing,
}

impl FileHandle {
    pub(crate) fn native(name: impl Into<String>, file: File, writable: bool) -> Self {
        Self {
            name: name.into(),
            backing: Backing::Native { file, writable },
        }
    }

    /// Create a read-only handle over an in-memory buffer.
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            backing: Backing::Memory { data, pos: 0 },
        }
    }

    /// Create a read-only handle over a platform stream.
    ///
    /// The stream length is measured once and the position rewound to the
    /// start.
    pub fn from_platform<S>(name: impl Into<String>, mut stream: S) -> Result<Self>
    where
        S: PlatformStream + 'static,
    {
        let name = name.into();
        let len = stream
            .seek(SeekFrom::End(0))
            .and_then(|len| stream.seek(SeekFrom::Start(0)).map(|_| len))
            .map_err(|e| Error::from_io(e, &name))?;
        Ok(Self {
            name,
            backing: Backing::Platform {
                stream: Box::new(stream),
                len,
            },
        })
    }

    /// Logical name the handle was opened with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether [`FileHandle::write`] is supported.
    pub fn is_writable(&self) -> bool {
        matches!(self.backing, Backing::Native { writable: true, .. })
    }

    /// Read up to `obj_count` objects of `obj_size` bytes into `buf`.
    ///
    /// Returns the number of whole objects read. Fewer than requested means
    /// the end of the file was reached; trailing bytes of a partial object
    /// are consumed but not counted.
    pub fn read(&mut self, buf: &mut [u8], obj_size: usize, obj_count: usize) -> Result<usize> {
        if obj_size == 0 {
            return Ok(0);
        }
        let max = obj_size
            .checked_mul(obj_count)
            .map_or(buf.len(), |want| want.min(buf.len()));
        let read = self.read_bytes(&mut buf[..max])?;
        Ok(read / obj_size)
    }

    /// Read bytes until `buf` is full or the end of the file is reached.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        match &mut self.backing {
            Backing::Memory { data, pos } => {
                let start = (*pos).min(data.len() as u64) as usize;
                let count = buf.len().min(data.len() - start);
                buf[..count].copy_from_slice(&data[start..start + count]);
                *pos += count as u64;
                Ok(count)
            }
            Backing::Native { file, .. } => {
                fill(file, buf).map_err(|e| Error::from_io(e, &self.name))
            }
            Backing::Platform { stream, .. } => {
                fill(stream, buf).map_err(|e| Error::from_io(e, &self.name))
            }
        }
    }

    /// Read everything from the current position to the end.
    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let remaining = self.len()?.saturating_sub(self.tell()?);
        let mut out = Vec::with_capacity(remaining as usize);
        let mut chunk = [0u8; 8192];
        loop {
            let read = self.read_bytes(&mut chunk)?;
            if read == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..read]);
        }
        Ok(out)
    }

    /// Write `obj_count` objects of `obj_size` bytes from `buf`.
    ///
    /// Fails with [`Error::ReadOnlyBacking`] unless the handle came from
    /// `open_write` or `open_append`.
    pub fn write(&mut self, buf: &[u8], obj_size: usize, obj_count: usize) -> Result<usize> {
        let file = match &mut self.backing {
            Backing::Native {
                file,
                writable: true,
            } => file,
            _ => return Err(Error::ReadOnlyBacking(self.name.clone())),
        };
        if obj_size == 0 {
            return Ok(0);
        }
        let count = obj_count.min(buf.len() / obj_size);
        file.write_all(&buf[..count * obj_size])
            .map_err(|e| Error::from_io(e, &self.name))?;
        Ok(count)
    }

    /// Move to an absolute position.
    ///
    /// Read-only handles reject positions past the end; writable handles
    /// accept them and grow on the next write.
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        if !self.is_writable() {
            let len = self.len()?;
            if pos > len {
                return Err(Error::InvalidSeek { pos, len });
            }
        }
        match &mut self.backing {
            Backing::Memory { pos: cur, .. } => {
                *cur = pos;
                Ok(())
            }
            Backing::Native { file, .. } => file
                .seek(SeekFrom::Start(pos))
                .map(|_| ())
                .map_err(|e| Error::from_io(e, &self.name)),
            Backing::Platform { stream, .. } => stream
                .seek(SeekFrom::Start(pos))
                .map(|_| ())
                .map_err(|e| Error::from_io(e, &self.name)),
        }
    }

    /// Current position.
    pub fn tell(&mut self) -> Result<u64> {
        match &mut self.backing {
            Backing::Memory { pos, .. } => Ok(*pos),
            Backing::Native { file, .. } => file
                .stream_position()
                .map_err(|e| Error::from_io(e, &self.name)),
            Backing::Platform { stream, .. } => stream
                .stream_position()
                .map_err(|e| Error::from_io(e, &self.name)),
        }
    }

    /// Total length in bytes.
    pub fn len(&self) -> Result<u64> {
        match &self.backing {
            Backing::Memory { data, .. } => Ok(data.len() as u64),
            Backing::Native { file, .. } => file
                .metadata()
                .map(|meta| meta.len())
                .map_err(|e| Error::from_io(e, &self.name)),
            Backing::Platform { len, .. } => Ok(*len),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// True iff the position is at or past the end.
    pub fn eof(&mut self) -> Result<bool> {
        let pos = self.tell()?;
        Ok(pos >= self.len()?)
    }

    /// Release the backing resource, flushing pending writes first.
    pub fn close(self) -> Result<()> {
        if let Backing::Native {
            mut file,
            writable: true,
        } = self.backing
        {
            file.flush().map_err(|e| Error::from_io(e, &self.name))?;
        }
        Ok(())
    }
}

fn fill<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn test_memory_read_objects() {
        let mut handle = FileHandle::from_bytes("units.xml", b"0123456789".to_vec());
        let mut buf = [0u8; 16];

        assert_eq!(handle.read(&mut buf, 4, 2).unwrap(), 2);
        assert_eq!(&buf[..8], b"01234567");
        assert!(!handle.eof().unwrap());

        // two bytes left: not a whole 4-byte object
        assert_eq!(handle.read(&mut buf, 4, 1).unwrap(), 0);
        assert!(handle.eof().unwrap());
        assert_eq!(handle.tell().unwrap(), 10);
    }

    #[test]
    fn test_empty_file_is_eof() {
        let mut handle = FileHandle::from_bytes("empty", Vec::new());
        let mut buf = [0u8; 4];
        assert!(handle.eof().unwrap());
        assert_eq!(handle.read(&mut buf, 1, 4).unwrap(), 0);
        assert!(handle.is_empty().unwrap());
    }

    #[test]
    fn test_read_only_seek_bounds() {
        let mut handle = FileHandle::from_bytes("a", b"abc".to_vec());
        handle.seek(3).unwrap();
        assert!(handle.eof().unwrap());
        let err = handle.seek(4).unwrap_err();
        assert!(matches!(err, Error::InvalidSeek { pos: 4, len: 3 }));

        handle.seek(1).unwrap();
        assert_eq!(handle.read_to_end().unwrap(), b"bc");
    }

    #[test]
    fn test_memory_handle_is_read_only() {
        let mut handle = FileHandle::from_bytes("a", b"abc".to_vec());
        assert!(!handle.is_writable());
        let err = handle.write(b"x", 1, 1).unwrap_err();
        assert!(matches!(err, Error::ReadOnlyBacking(_)));
    }

    #[test]
    fn test_native_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.bin");

        let file = File::create(&path).unwrap();
        let mut handle = FileHandle::native("out.bin", file, true);
        assert_eq!(handle.write(b"abcdef", 2, 3).unwrap(), 3);
        handle.seek(10).unwrap();
        assert_eq!(handle.write(b"z", 1, 1).unwrap(), 1);
        handle.close().unwrap();

        let file = File::open(&path).unwrap();
        let mut handle = FileHandle::native("out.bin", file, false);
        assert_eq!(handle.len().unwrap(), 11);
        let data = handle.read_to_end().unwrap();
        assert_eq!(&data[..6], b"abcdef");
        assert_eq!(data[10], b'z');
        assert!(handle.eof().unwrap());
    }

    #[test]
    fn test_platform_stream() {
        let cursor = Cursor::new(b"platform bytes".to_vec());
        let mut handle = FileHandle::from_platform("asset", cursor).unwrap();
        assert_eq!(handle.len().unwrap(), 14);
        assert_eq!(handle.tell().unwrap(), 0);

        let mut buf = [0u8; 8];
        assert_eq!(handle.read(&mut buf, 8, 1).unwrap(), 1);
        assert_eq!(&buf, b"platform");
        assert!(handle.seek(20).is_err());
        assert!(!handle.is_writable());
    }
}
